//! Textual edits of the serving ConfigMap manifest.
//!
//! The manifest is patched as text rather than parsed, so comments, key
//! order and formatting outside the rewritten value survive untouched.

use regex::{Captures, Regex};

use crate::domain::Result;

/// Matches a `<key>: <value>` line. Groups: 1 = indentation, optional list
/// dash, key and separator; 2 = the value (quoted or bare); 3 = trailing
/// comment, whitespace and carriage return.
fn key_pattern(key: &str) -> Result<Regex> {
    let pattern = format!(
        r#"(?m)^([ \t]*(?:-[ \t]+)?{}:[ \t]*)("[^"\r\n]*"|'[^'\r\n]*'|[^\r\n]*?)((?:[ \t]+#[^\r\n]*)?[ \t]*\r?)$"#,
        regex::escape(key)
    );
    Ok(Regex::new(&pattern)?)
}

/// Point `key` at `value` in `manifest`.
///
/// The first occurrence of the key is rewritten with a double-quoted value;
/// later occurrences are left alone. When the key is missing, a ConfigMap
/// entry named `config_map_name` carrying it is appended.
pub fn set_model_path(
    manifest: &str,
    key: &str,
    value: &str,
    config_map_name: &str,
) -> Result<String> {
    let pattern = key_pattern(key)?;
    if pattern.is_match(manifest) {
        let patched = pattern.replacen(manifest, 1, |caps: &Captures| {
            let lead = &caps[1];
            let gap = if lead.ends_with([' ', '\t']) { "" } else { " " };
            format!("{lead}{gap}\"{value}\"{}", &caps[3])
        });
        return Ok(patched.into_owned());
    }

    let mut patched = manifest.to_string();
    if !patched.is_empty() && !patched.ends_with('\n') {
        patched.push('\n');
    }
    patched.push_str(&format!(
        "  - name: {config_map_name}\n    data:\n      {key}: \"{value}\"\n"
    ));
    Ok(patched)
}

/// Current value of the first `key` entry, with surrounding quotes removed.
pub fn read_model_path(manifest: &str, key: &str) -> Result<Option<String>> {
    let pattern = key_pattern(key)?;
    Ok(pattern.captures(manifest).and_then(|caps| {
        let raw = caps[2].trim();
        let unquoted = raw
            .strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
            .or_else(|| raw.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
            .unwrap_or(raw);
        (!unquoted.is_empty()).then(|| unquoted.to_string())
    }))
}
