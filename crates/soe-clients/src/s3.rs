//! S3-compatible object store client
//!
//! Path-style requests signed with AWS Signature Version 4, so the same client
//! works against AWS S3 and MinIO. When no access key is configured requests
//! are sent unsigned (anonymous buckets, signing proxies).

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::error::ClientError;
use crate::object_store::{ListPage, ObjectStore, ObjectSummary};
use crate::ClientResult;

type HmacSha256 = Hmac<Sha256>;

/// SHA-256 of an empty payload; every request this client sends is a GET.
const EMPTY_PAYLOAD_SHA256: &str =
    "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

/// Object store connection settings
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectStoreConfig {
    /// Endpoint base URL, e.g. `http://minio.ml.svc:9000`
    pub endpoint: String,
    /// Bucket holding model artifacts
    pub bucket: String,
    /// Signing region
    pub region: String,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
}

impl ObjectStoreConfig {
    pub fn new(endpoint: impl Into<String>, bucket: impl Into<String>) -> Self {
        ObjectStoreConfig {
            endpoint: endpoint.into(),
            bucket: bucket.into(),
            region: "us-east-1".to_string(),
            access_key: None,
            secret_key: None,
        }
    }

    /// Build from `SOE_S3_*` variables. Only the endpoint is required.
    pub fn from_env() -> ClientResult<Self> {
        let endpoint = std::env::var("SOE_S3_ENDPOINT")
            .map_err(|_| ClientError::Config("SOE_S3_ENDPOINT is not set".to_string()))?;
        let bucket = std::env::var("SOE_S3_BUCKET").unwrap_or_else(|_| "models".to_string());

        let mut config = ObjectStoreConfig::new(endpoint, bucket);
        if let Ok(region) = std::env::var("SOE_S3_REGION") {
            config.region = region;
        }
        config.access_key = std::env::var("SOE_S3_ACCESS_KEY").ok();
        config.secret_key = std::env::var("SOE_S3_SECRET_KEY").ok();
        Ok(config)
    }

    pub fn with_credentials(
        mut self,
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> Self {
        self.access_key = Some(access_key.into());
        self.secret_key = Some(secret_key.into());
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }
}

// ---------------------------------------------------------------------------
// SigV4
// ---------------------------------------------------------------------------

/// Percent-encode per SigV4 rules: unreserved characters pass through,
/// `/` is kept only when `keep_slash` is set (object key paths).
pub fn uri_encode(input: &str, keep_slash: bool) -> String {
    let mut encoded = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                encoded.push(byte as char)
            }
            b'/' if keep_slash => encoded.push('/'),
            _ => encoded.push_str(&format!("%{byte:02X}")),
        }
    }
    encoded
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// Derive the SigV4 signing key for a date (`YYYYMMDD`), region and service.
pub fn signing_key(secret_key: &str, date: &str, region: &str, service: &str) -> Vec<u8> {
    let k_date = hmac_sha256(format!("AWS4{secret_key}").as_bytes(), date.as_bytes());
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}

/// A request ready to send: absolute URL plus the headers that were signed.
#[derive(Debug, Clone)]
struct SignedRequest {
    url: String,
    headers: Vec<(&'static str, String)>,
}

// ---------------------------------------------------------------------------
// XML response bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListBucketResult {
    #[serde(default)]
    contents: Vec<XmlObject>,
    #[serde(default)]
    common_prefixes: Vec<XmlCommonPrefix>,
    #[serde(default)]
    next_continuation_token: Option<String>,
    #[serde(default)]
    is_truncated: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct XmlObject {
    key: String,
    #[serde(default)]
    last_modified: Option<String>,
    #[serde(default)]
    size: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct XmlCommonPrefix {
    prefix: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Tagging {
    #[serde(default)]
    tag_set: TagSet,
}

#[derive(Debug, Default, Deserialize)]
struct TagSet {
    #[serde(rename = "Tag", default)]
    tags: Vec<XmlTag>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct XmlTag {
    key: String,
    #[serde(default)]
    value: String,
}

fn parse_list_page(xml: &str) -> ClientResult<ListPage> {
    let result: ListBucketResult = quick_xml::de::from_str(xml)?;
    let objects = result
        .contents
        .into_iter()
        .map(|obj| ObjectSummary {
            last_modified: obj
                .last_modified
                .as_deref()
                .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
                .map(|ts| ts.with_timezone(&Utc)),
            key: obj.key,
            size: obj.size,
        })
        .collect();

    // Some S3 clones omit IsTruncated; a token alone still means "more pages".
    let next_continuation_token = result
        .next_continuation_token
        .filter(|token| result.is_truncated || !token.is_empty());

    Ok(ListPage {
        objects,
        common_prefixes: result.common_prefixes.into_iter().map(|p| p.prefix).collect(),
        next_continuation_token,
    })
}

fn parse_tagging(xml: &str) -> ClientResult<BTreeMap<String, String>> {
    let tagging: Tagging = quick_xml::de::from_str(xml)?;
    Ok(tagging
        .tag_set
        .tags
        .into_iter()
        .map(|tag| (tag.key, tag.value))
        .collect())
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Read-only S3 client for a single bucket
pub struct S3Client {
    config: ObjectStoreConfig,
    host: String,
    http_client: reqwest::Client,
}

impl S3Client {
    pub fn new(config: ObjectStoreConfig) -> ClientResult<Self> {
        let endpoint = reqwest::Url::parse(&config.endpoint)
            .map_err(|e| ClientError::Config(format!("invalid S3 endpoint: {e}")))?;
        let host = match (endpoint.host_str(), endpoint.port()) {
            (Some(host), Some(port)) => format!("{host}:{port}"),
            (Some(host), None) => host.to_string(),
            (None, _) => {
                return Err(ClientError::Config(format!(
                    "S3 endpoint has no host: {}",
                    config.endpoint
                )))
            }
        };

        let http_client = reqwest::Client::builder()
            .user_agent(concat!("soe-runner/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(S3Client {
            config,
            host,
            http_client,
        })
    }

    /// Release the connection pool. Call once at process teardown.
    pub fn shutdown(self) {
        info!(endpoint = %self.config.endpoint, bucket = %self.config.bucket, "Closing object store client");
    }

    /// Build a signed GET for `/{bucket}/{key}` with the given query pairs.
    fn sign_get(&self, key: &str, query: &[(&str, &str)], now: DateTime<Utc>) -> SignedRequest {
        let canonical_uri = if key.is_empty() {
            format!("/{}", uri_encode(&self.config.bucket, false))
        } else {
            format!(
                "/{}/{}",
                uri_encode(&self.config.bucket, false),
                uri_encode(key, true)
            )
        };

        let mut pairs: Vec<(String, String)> = query
            .iter()
            .map(|(k, v)| (uri_encode(k, false), uri_encode(v, false)))
            .collect();
        pairs.sort();
        let canonical_query = pairs
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");

        let base = self.config.endpoint.trim_end_matches('/');
        let url = if canonical_query.is_empty() {
            format!("{base}{canonical_uri}")
        } else {
            format!("{base}{canonical_uri}?{canonical_query}")
        };

        let (access_key, secret_key) = match (&self.config.access_key, &self.config.secret_key) {
            (Some(access), Some(secret)) if !access.is_empty() => (access, secret),
            _ => return SignedRequest { url, headers: Vec::new() },
        };

        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date = now.format("%Y%m%d").to_string();
        let scope = format!("{date}/{}/s3/aws4_request", self.config.region);
        let signed_headers = "host;x-amz-content-sha256;x-amz-date";

        let canonical_request = format!(
            "GET\n{canonical_uri}\n{canonical_query}\nhost:{}\nx-amz-content-sha256:{EMPTY_PAYLOAD_SHA256}\nx-amz-date:{amz_date}\n\n{signed_headers}\n{EMPTY_PAYLOAD_SHA256}",
            self.host
        );
        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{amz_date}\n{scope}\n{}",
            hex::encode(Sha256::digest(canonical_request.as_bytes()))
        );
        let key = signing_key(secret_key, &date, &self.config.region, "s3");
        let signature = hex::encode(hmac_sha256(&key, string_to_sign.as_bytes()));

        SignedRequest {
            url,
            headers: vec![
                ("x-amz-date", amz_date),
                ("x-amz-content-sha256", EMPTY_PAYLOAD_SHA256.to_string()),
                (
                    "authorization",
                    format!(
                        "AWS4-HMAC-SHA256 Credential={access_key}/{scope}, SignedHeaders={signed_headers}, Signature={signature}"
                    ),
                ),
            ],
        }
    }

    async fn get(&self, key: &str, query: &[(&str, &str)]) -> ClientResult<reqwest::Response> {
        let signed = self.sign_get(key, query, Utc::now());
        let mut request = self.http_client.get(&signed.url);
        for (name, value) in &signed.headers {
            request = request.header(*name, value);
        }
        let response = request.send().await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(ClientError::ObjectNotFound(key.to_string()));
        }
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(ClientError::Api { status, message });
        }
        Ok(response)
    }
}

#[async_trait]
impl ObjectStore for S3Client {
    fn bucket(&self) -> &str {
        &self.config.bucket
    }

    async fn list_objects_v2(
        &self,
        prefix: &str,
        delimiter: Option<&str>,
        continuation_token: Option<&str>,
    ) -> ClientResult<ListPage> {
        let mut query = vec![("list-type", "2"), ("prefix", prefix)];
        if let Some(delimiter) = delimiter {
            query.push(("delimiter", delimiter));
        }
        if let Some(token) = continuation_token {
            query.push(("continuation-token", token));
        }

        let body = self.get("", &query).await?.text().await?;
        let page = parse_list_page(&body)?;
        debug!(
            prefix,
            objects = page.objects.len(),
            prefixes = page.common_prefixes.len(),
            truncated = page.next_continuation_token.is_some(),
            "Listed object page"
        );
        Ok(page)
    }

    async fn get_object(&self, key: &str) -> ClientResult<Vec<u8>> {
        Ok(self.get(key, &[]).await?.bytes().await?.to_vec())
    }

    async fn get_object_tagging(&self, key: &str) -> ClientResult<BTreeMap<String, String>> {
        let body = self.get(key, &[("tagging", "")]).await?.text().await?;
        parse_tagging(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn uri_encode_follows_sigv4_rules() {
        assert_eq!(uri_encode("runs/a b/metrics.json", true), "runs/a%20b/metrics.json");
        assert_eq!(uri_encode("runs/", false), "runs%2F");
        assert_eq!(uri_encode("A-z_0.9~", false), "A-z_0.9~");
        assert_eq!(uri_encode("1+1=2", false), "1%2B1%3D2");
    }

    #[test]
    fn signing_key_matches_published_vector() {
        // Derivation example from the AWS SigV4 documentation.
        let key = signing_key(
            "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY",
            "20120215",
            "us-east-1",
            "iam",
        );
        assert_eq!(
            hex::encode(key),
            "f4780e2d9f65fa895f9c67b32ce1baf0b0d8a43505a000a1a9e090d414db404d"
        );
    }

    #[test]
    fn unsigned_request_without_credentials() {
        let client = S3Client::new(ObjectStoreConfig::new("http://minio:9000", "models")).unwrap();
        let signed = client.sign_get("", &[("list-type", "2"), ("prefix", "")], Utc::now());
        assert_eq!(signed.url, "http://minio:9000/models?list-type=2&prefix=");
        assert!(signed.headers.is_empty());
    }

    #[test]
    fn signed_request_carries_authorization() {
        let config = ObjectStoreConfig::new("http://minio:9000/", "models")
            .with_credentials("minio", "minio123");
        let client = S3Client::new(config).unwrap();
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();

        let signed = client.sign_get(
            "",
            &[("prefix", "runs/"), ("list-type", "2"), ("delimiter", "/")],
            now,
        );
        assert_eq!(
            signed.url,
            "http://minio:9000/models?delimiter=%2F&list-type=2&prefix=runs%2F"
        );

        let auth = signed
            .headers
            .iter()
            .find(|(name, _)| *name == "authorization")
            .map(|(_, value)| value.clone())
            .unwrap();
        assert!(auth.starts_with(
            "AWS4-HMAC-SHA256 Credential=minio/20240501/us-east-1/s3/aws4_request"
        ));
        assert!(auth.contains("SignedHeaders=host;x-amz-content-sha256;x-amz-date"));

        // Same inputs, same signature.
        let again = client.sign_get(
            "",
            &[("prefix", "runs/"), ("list-type", "2"), ("delimiter", "/")],
            now,
        );
        assert_eq!(signed.headers, again.headers);
    }

    #[test]
    fn parses_list_bucket_result() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<ListBucketResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/">
  <Name>models</Name>
  <Prefix>runs/</Prefix>
  <KeyCount>3</KeyCount>
  <MaxKeys>1000</MaxKeys>
  <Delimiter>/</Delimiter>
  <IsTruncated>true</IsTruncated>
  <Contents>
    <Key>runs/metrics.json</Key>
    <LastModified>2024-05-01T10:00:00.000Z</LastModified>
    <ETag>"abc"</ETag>
    <Size>42</Size>
    <StorageClass>STANDARD</StorageClass>
  </Contents>
  <Contents>
    <Key>runs/model.pkl</Key>
    <LastModified>2024-05-01T10:00:01.000Z</LastModified>
    <Size>1024</Size>
  </Contents>
  <CommonPrefixes><Prefix>runs/run-41/</Prefix></CommonPrefixes>
  <CommonPrefixes><Prefix>runs/run-42/</Prefix></CommonPrefixes>
  <NextContinuationToken>1ueGcxLPRx1Tr</NextContinuationToken>
</ListBucketResult>"#;

        let page = parse_list_page(xml).unwrap();
        assert_eq!(page.objects.len(), 2);
        assert_eq!(page.objects[0].key, "runs/metrics.json");
        assert_eq!(page.objects[0].size, 42);
        assert_eq!(
            page.objects[0].last_modified,
            Some(Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap())
        );
        assert_eq!(page.common_prefixes, vec!["runs/run-41/", "runs/run-42/"]);
        assert_eq!(page.next_continuation_token.as_deref(), Some("1ueGcxLPRx1Tr"));
    }

    #[test]
    fn parses_final_empty_page() {
        let xml = r#"<ListBucketResult><Name>models</Name><IsTruncated>false</IsTruncated></ListBucketResult>"#;
        let page = parse_list_page(xml).unwrap();
        assert!(page.objects.is_empty());
        assert!(page.common_prefixes.is_empty());
        assert!(page.next_continuation_token.is_none());
    }

    #[test]
    fn parses_tag_set() {
        let xml = r#"<Tagging><TagSet>
            <Tag><Key>stage</Key><Value>candidate</Value></Tag>
            <Tag><Key>dataset</Key><Value>insurance-v3</Value></Tag>
        </TagSet></Tagging>"#;
        let tags = parse_tagging(xml).unwrap();
        assert_eq!(tags.get("stage").map(String::as_str), Some("candidate"));
        assert_eq!(tags.len(), 2);
    }

    #[test]
    fn rejects_malformed_listing() {
        assert!(matches!(
            parse_list_page("<ListBucketResult><Contents><Size>x</Size></Contents>"),
            Err(ClientError::Decode(_))
        ));
    }
}
