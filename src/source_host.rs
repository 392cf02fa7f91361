//! Source host content API.
//!
//! Fetches the raw bytes of one path at one commit. The production
//! implementation talks to the GitHub contents API:
//!
//! ```text
//! GET {api_url}/repos/{owner}/{repo}/contents/{path}?ref={sha}
//! ```
//!
//! # Response Handling
//!
//! | Response | Result |
//! |----------|--------|
//! | `type: "file"`, `encoding: "base64"` | decoded content |
//! | `type: "file"`, `encoding: "none"` (files over 1 MB) | raw bytes from `download_url` |
//! | `type` = `dir` / `submodule` / `symlink`, or an array | [`MirrorError::NotFound`] |
//! | HTTP 404 | [`MirrorError::NotFound`] |
//! | network error, timeout, any other status | [`MirrorError::Transient`] |

use anyhow::Result;
use async_trait::async_trait;
use base64::Engine;
use reqwest::header::{ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use std::time::Duration;

use crate::config::SourceHostConfig;
use crate::error::{MirrorError, Service};

#[async_trait]
pub trait SourceHost: Send + Sync {
    /// Raw content of `path` in `repo_full_name` at commit `sha`.
    async fn fetch_file(
        &self,
        repo_full_name: &str,
        path: &str,
        sha: &str,
    ) -> Result<Vec<u8>, MirrorError>;
}

/// GitHub contents API client.
pub struct GitHubContents {
    client: reqwest::Client,
    api_url: Url,
    token: Option<String>,
}

#[derive(Deserialize)]
struct ContentEntry {
    #[serde(rename = "type")]
    entry_type: String,
    #[serde(default)]
    encoding: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    download_url: Option<String>,
}

impl GitHubContents {
    /// Build a client from configuration. The token is read from the
    /// environment variable named by `token_env`; a missing token means
    /// unauthenticated requests.
    pub fn new(config: &SourceHostConfig) -> Result<Self> {
        let token = std::env::var(&config.token_env).ok();
        Self::with_token(config, token)
    }

    pub fn with_token(config: &SourceHostConfig, token: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        let api_url = Url::parse(&config.api_url)?;
        Ok(Self {
            client,
            api_url,
            token,
        })
    }

    fn contents_url(&self, repo_full_name: &str, path: &str, sha: &str) -> Result<Url, MirrorError> {
        let mut url = self.api_url.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                MirrorError::DataIntegrity(format!("source host url cannot be a base: {}", self.api_url))
            })?;
            segments.pop_if_empty().push("repos");
            segments.extend(repo_full_name.split('/'));
            segments.push("contents");
            segments.extend(path.split('/').filter(|s| !s.is_empty()));
        }
        url.query_pairs_mut().append_pair("ref", sha);
        Ok(url)
    }

    fn request(&self, url: Url, accept: &str) -> reqwest::RequestBuilder {
        let mut req = self
            .client
            .get(url)
            .header(ACCEPT, accept)
            .header(USER_AGENT, concat!("repo-mirror/", env!("CARGO_PKG_VERSION")));
        if let Some(ref token) = self.token {
            req = req.header(AUTHORIZATION, format!("Bearer {}", token));
        }
        req
    }

    async fn download_raw(&self, download_url: &str, what: &str) -> Result<Vec<u8>, MirrorError> {
        let url = Url::parse(download_url)
            .map_err(|e| MirrorError::transient(Service::SourceHost, e))?;
        let resp = self
            .request(url, "application/octet-stream")
            .send()
            .await
            .map_err(|e| MirrorError::transient(Service::SourceHost, e))?;

        match resp.status() {
            StatusCode::NOT_FOUND => Err(MirrorError::NotFound(what.to_string())),
            status if status.is_success() => resp
                .bytes()
                .await
                .map(|b| b.to_vec())
                .map_err(|e| MirrorError::transient(Service::SourceHost, e)),
            status => Err(MirrorError::transient(
                Service::SourceHost,
                format!("raw download returned HTTP {}", status),
            )),
        }
    }
}

#[async_trait]
impl SourceHost for GitHubContents {
    async fn fetch_file(
        &self,
        repo_full_name: &str,
        path: &str,
        sha: &str,
    ) -> Result<Vec<u8>, MirrorError> {
        let what = format!("{}:{}@{}", repo_full_name, path, sha);
        let url = self.contents_url(repo_full_name, path, sha)?;

        let resp = self
            .request(url, "application/vnd.github+json")
            .send()
            .await
            .map_err(|e| MirrorError::transient(Service::SourceHost, e))?;

        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Err(MirrorError::NotFound(what));
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(MirrorError::transient(
                Service::SourceHost,
                format!(
                    "contents API returned HTTP {}: {}",
                    status,
                    body.chars().take(200).collect::<String>()
                ),
            ));
        }

        let json: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| MirrorError::transient(Service::SourceHost, e))?;

        // A directory listing comes back as an array
        if json.is_array() {
            return Err(MirrorError::NotFound(format!("{} (directory)", what)));
        }

        let entry: ContentEntry = serde_json::from_value(json)
            .map_err(|e| MirrorError::transient(Service::SourceHost, e))?;

        if entry.entry_type != "file" {
            return Err(MirrorError::NotFound(format!("{} ({})", what, entry.entry_type)));
        }

        match entry.encoding.as_deref() {
            Some("base64") => decode_base64(entry.content.as_deref().unwrap_or_default()),
            _ => match entry.download_url {
                Some(ref download_url) => self.download_raw(download_url, &what).await,
                None => Ok(entry.content.unwrap_or_default().into_bytes()),
            },
        }
    }
}

/// Decode GitHub's base64, which is wrapped with newlines every 60 columns.
pub fn decode_base64(content: &str) -> Result<Vec<u8>, MirrorError> {
    let compact: String = content.chars().filter(|c| !c.is_whitespace()).collect();
    base64::engine::general_purpose::STANDARD
        .decode(compact)
        .map_err(|e| MirrorError::transient(Service::SourceHost, format!("bad base64 content: {}", e)))
}
