//! S3 blob backend.
//!
//! Talks to the S3 REST API directly with AWS Signature V4 authentication
//! (`hmac` + `sha2`, no AWS SDK). Objects are stored at
//! `<prefix><hex digest>`.
//!
//! Against AWS the bucket is addressed virtual-host style
//! (`<bucket>.s3.<region>.amazonaws.com`); with a custom `endpoint_url`
//! (MinIO, LocalStack) path style is used (`<endpoint>/<bucket>/<key>`).
//!
//! # Environment Variables
//!
//! - `AWS_ACCESS_KEY_ID` — required
//! - `AWS_SECRET_ACCESS_KEY` — required
//! - `AWS_SESSION_TOKEN` — optional

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::{Method, StatusCode};
use sha2::{Digest, Sha256};
use std::time::Duration;

use super::{blob_reference, reference_digest, BlobStore};
use crate::config::BlobConfig;
use crate::error::{MirrorError, Service};

type HmacSha256 = Hmac<Sha256>;

/// AWS credentials loaded from environment variables.
#[derive(Clone)]
pub struct AwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl AwsCredentials {
    fn from_env() -> Result<Self> {
        let access_key_id = std::env::var("AWS_ACCESS_KEY_ID")
            .context("AWS_ACCESS_KEY_ID environment variable not set")?;
        let secret_access_key = std::env::var("AWS_SECRET_ACCESS_KEY")
            .context("AWS_SECRET_ACCESS_KEY environment variable not set")?;
        let session_token = std::env::var("AWS_SESSION_TOKEN").ok();

        Ok(Self {
            access_key_id,
            secret_access_key,
            session_token,
        })
    }
}

pub struct S3BlobStore {
    client: reqwest::Client,
    creds: AwsCredentials,
    bucket: String,
    region: String,
    prefix: String,
    endpoint_url: Option<String>,
}

/// A fully signed request, ready to send.
struct SignedRequest {
    url: String,
    headers: Vec<(String, String)>,
}

impl S3BlobStore {
    pub fn from_env(config: &BlobConfig) -> Result<Self> {
        Self::new(config, AwsCredentials::from_env()?)
    }

    pub fn new(config: &BlobConfig, creds: AwsCredentials) -> Result<Self> {
        let bucket = config
            .bucket
            .clone()
            .ok_or_else(|| anyhow::anyhow!("blob.bucket required for s3 backend"))?;
        let region = config
            .region
            .clone()
            .ok_or_else(|| anyhow::anyhow!("blob.region required for s3 backend"))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            creds,
            bucket,
            region,
            prefix: config.prefix.clone(),
            endpoint_url: config.endpoint_url.clone(),
        })
    }

    fn object_key(&self, reference: &str) -> Result<String, MirrorError> {
        Ok(format!("{}{}", self.prefix, reference_digest(reference)?))
    }

    /// `(scheme, host, canonical uri)` for an object key.
    fn locate(&self, key: &str) -> (String, String, String) {
        let encoded_key = key.split('/').map(uri_encode).collect::<Vec<_>>().join("/");
        match self.endpoint_url {
            Some(ref endpoint) => {
                let scheme = if endpoint.starts_with("http://") {
                    "http"
                } else {
                    "https"
                };
                let host = endpoint
                    .trim_start_matches("https://")
                    .trim_start_matches("http://")
                    .trim_end_matches('/')
                    .to_string();
                (
                    scheme.to_string(),
                    host,
                    format!("/{}/{}", uri_encode(&self.bucket), encoded_key),
                )
            }
            None => (
                "https".to_string(),
                format!("{}.s3.{}.amazonaws.com", self.bucket, self.region),
                format!("/{}", encoded_key),
            ),
        }
    }

    fn sign(&self, method: &Method, key: &str, payload: &[u8], now: DateTime<Utc>) -> SignedRequest {
        let (scheme, host, canonical_uri) = self.locate(key);
        let date_stamp = now.format("%Y%m%d").to_string();
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let payload_hash = hex_sha256(payload);

        let mut headers = vec![
            ("host".to_string(), host.clone()),
            ("x-amz-content-sha256".to_string(), payload_hash.clone()),
            ("x-amz-date".to_string(), amz_date.clone()),
        ];
        if let Some(ref token) = self.creds.session_token {
            headers.push(("x-amz-security-token".to_string(), token.clone()));
        }
        headers.sort_by(|a, b| a.0.cmp(&b.0));

        let signed_headers = headers
            .iter()
            .map(|(k, _)| k.as_str())
            .collect::<Vec<_>>()
            .join(";");
        let canonical_headers: String = headers
            .iter()
            .map(|(k, v)| format!("{}:{}\n", k, v))
            .collect();

        let canonical_request = format!(
            "{}\n{}\n\n{}\n{}\n{}",
            method.as_str(),
            canonical_uri,
            canonical_headers,
            signed_headers,
            payload_hash
        );

        let credential_scope = format!("{}/{}/s3/aws4_request", date_stamp, self.region);
        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{}\n{}\n{}",
            amz_date,
            credential_scope,
            hex_sha256(canonical_request.as_bytes())
        );

        let signing_key =
            derive_signing_key(&self.creds.secret_access_key, &date_stamp, &self.region, "s3");
        let signature = hex::encode(hmac_sha256(&signing_key, string_to_sign.as_bytes()));

        let authorization = format!(
            "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
            self.creds.access_key_id, credential_scope, signed_headers, signature
        );

        // `host` is set by the HTTP client from the URL
        let mut out: Vec<(String, String)> =
            headers.into_iter().filter(|(k, _)| k != "host").collect();
        out.push(("authorization".to_string(), authorization));

        SignedRequest {
            url: format!("{}://{}{}", scheme, host, canonical_uri),
            headers: out,
        }
    }

    async fn send(
        &self,
        method: Method,
        key: &str,
        body: Vec<u8>,
    ) -> Result<reqwest::Response, MirrorError> {
        let signed = self.sign(&method, key, &body, Utc::now());
        let mut req = self.client.request(method, &signed.url);
        for (k, v) in &signed.headers {
            req = req.header(k.as_str(), v.as_str());
        }
        if !body.is_empty() {
            req = req.body(body);
        }
        req.send()
            .await
            .map_err(|e| MirrorError::transient(Service::BlobStore, e))
    }
}

fn status_error(op: &str, key: &str, status: StatusCode) -> MirrorError {
    MirrorError::transient(
        Service::BlobStore,
        format!("S3 {} failed (HTTP {}) for key '{}'", op, status, key),
    )
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn put(&self, content: &[u8]) -> Result<String, MirrorError> {
        let reference = blob_reference(content);
        let key = self.object_key(&reference)?;
        let resp = self.send(Method::PUT, &key, content.to_vec()).await?;
        if !resp.status().is_success() {
            return Err(status_error("PutObject", &key, resp.status()));
        }
        Ok(reference)
    }

    async fn get(&self, reference: &str) -> Result<Vec<u8>, MirrorError> {
        let key = self.object_key(reference)?;
        let resp = self.send(Method::GET, &key, Vec::new()).await?;
        match resp.status() {
            StatusCode::NOT_FOUND => Err(MirrorError::NotFound(format!("blob {}", reference))),
            status if status.is_success() => resp
                .bytes()
                .await
                .map(|b| b.to_vec())
                .map_err(|e| MirrorError::transient(Service::BlobStore, e)),
            status => Err(status_error("GetObject", &key, status)),
        }
    }

    async fn delete(&self, reference: &str) -> Result<(), MirrorError> {
        let key = self.object_key(reference)?;
        let resp = self.send(Method::DELETE, &key, Vec::new()).await?;
        match resp.status() {
            StatusCode::NOT_FOUND => Ok(()),
            status if status.is_success() => Ok(()),
            status => Err(status_error("DeleteObject", &key, status)),
        }
    }
}

// ============ AWS SigV4 Helpers ============

fn hex_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    // HMAC accepts keys of any length, so this cannot fail
    let mut mac = match HmacSha256::new_from_slice(key) {
        Ok(mac) => mac,
        Err(_) => unreachable!("HMAC can take key of any size"),
    };
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// ```text
/// kDate    = HMAC("AWS4" + secret, dateStamp)
/// kRegion  = HMAC(kDate, region)
/// kService = HMAC(kRegion, service)
/// kSigning = HMAC(kService, "aws4_request")
/// ```
fn derive_signing_key(secret_key: &str, date_stamp: &str, region: &str, service: &str) -> Vec<u8> {
    let k_date = hmac_sha256(
        format!("AWS4{}", secret_key).as_bytes(),
        date_stamp.as_bytes(),
    );
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}

/// RFC 3986 encoding of everything except `A-Z a-z 0-9 - _ . ~`.
fn uri_encode(s: &str) -> String {
    let mut result = String::new();
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                result.push(byte as char);
            }
            _ => result.push_str(&format!("%{:02X}", byte)),
        }
    }
    result
}
