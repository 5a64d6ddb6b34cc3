//! Run identifiers and job names.
//!
//! A job is named `<kind>-run-<id>` where `<id>` is 8 lowercase hex chars cut
//! from a v4 UUID (32 random bits). The full job name is what callers hold
//! as the run id; bare ids are still accepted when resolving a status.

use crate::domain::RunKind;

const SHORT_ID_LEN: usize = 8;

/// Longest name the API server accepts for a job (an RFC 1123 label).
const MAX_JOB_NAME_LEN: usize = 63;

/// Fresh short identifier, e.g. `3f9c0a1b`.
pub fn generate_run_id() -> String {
    let mut id = uuid::Uuid::new_v4().simple().to_string();
    id.truncate(SHORT_ID_LEN);
    id
}

/// Prefix every job of `kind` carries.
pub fn job_prefix(kind: RunKind) -> &'static str {
    match kind {
        RunKind::Eda => "eda-run-",
        RunKind::Train => "train-run-",
    }
}

/// Canonical job name for a kind and short id.
pub fn job_name(kind: RunKind, short_id: &str) -> String {
    format!("{}{}", job_prefix(kind), short_id)
}

/// Kind encoded in a job name, if it carries a known prefix.
pub fn kind_of(run_id: &str) -> Option<RunKind> {
    RunKind::ALL
        .into_iter()
        .find(|kind| run_id.starts_with(job_prefix(*kind)))
}

/// Whether `name` is a valid RFC 1123 label: lowercase alphanumerics and
/// `-`, at most 63 chars, starting and ending alphanumeric.
pub fn is_valid_job_name(name: &str) -> bool {
    let alnum = |c: char| c.is_ascii_lowercase() || c.is_ascii_digit();
    !name.is_empty()
        && name.len() <= MAX_JOB_NAME_LEN
        && name.chars().all(|c| alnum(c) || c == '-')
        && name.starts_with(alnum)
        && name.ends_with(alnum)
}

/// Job names to try, in order, when resolving `run_id`.
///
/// A run id that already carries a kind prefix is used as-is. A bare id is
/// tried as an EDA run first, then as a training run. Names that could not
/// belong to a job are dropped, so an id like `x/../secrets` yields nothing.
pub fn candidate_job_names(run_id: &str) -> Vec<(RunKind, String)> {
    let candidates = match kind_of(run_id) {
        Some(kind) => vec![(kind, run_id.to_string())],
        None => RunKind::ALL
            .into_iter()
            .map(|kind| (kind, job_name(kind, run_id)))
            .collect(),
    };
    candidates
        .into_iter()
        .filter(|(_, name)| is_valid_job_name(name))
        .collect()
}
