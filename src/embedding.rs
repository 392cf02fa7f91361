//! Embedding service client.
//!
//! File content is handed to an external service that derives search
//! vectors from it. Nothing about the vectors is stored locally; the
//! service owns them, keyed by `(repository_id, path)`.
//!
//! Implementations:
//! - **[`DisabledEmbeddingService`]**: reports itself disabled; the pipeline
//!   skips the index stage entirely.
//! - **[`HttpEmbeddingService`]**: JSON over HTTP.
//!
//! ```text
//! POST   {url}/documents   {"repository_id", "path", "content", "metadata"}
//! DELETE {url}/documents   {"repository_id", "path"}
//! ```
//!
//! Requests are sent once. A failure is reported to the caller, which only
//! logs it.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::StatusCode;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use crate::config::EmbeddingConfig;
use crate::error::{MirrorError, Service};

/// Content submitted for indexing.
#[derive(Debug, Clone, Serialize)]
pub struct EmbeddingRequest {
    pub repository_id: String,
    pub path: String,
    pub content: String,
    pub metadata: serde_json::Value,
}

#[async_trait]
pub trait EmbeddingService: Send + Sync {
    fn is_enabled(&self) -> bool {
        true
    }

    async fn submit(&self, request: &EmbeddingRequest) -> Result<(), MirrorError>;

    /// Drop whatever the service derived from `path`.
    async fn remove(&self, repository_id: &str, path: &str) -> Result<(), MirrorError>;
}

/// Create the configured [`EmbeddingService`].
pub fn create_embedding_service(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingService>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledEmbeddingService)),
        "http" => Ok(Arc::new(HttpEmbeddingService::new(config)?)),
        other => anyhow::bail!("Unknown embedding provider: {}", other),
    }
}

pub struct DisabledEmbeddingService;

#[async_trait]
impl EmbeddingService for DisabledEmbeddingService {
    fn is_enabled(&self) -> bool {
        false
    }

    async fn submit(&self, _request: &EmbeddingRequest) -> Result<(), MirrorError> {
        Ok(())
    }

    async fn remove(&self, _repository_id: &str, _path: &str) -> Result<(), MirrorError> {
        Ok(())
    }
}

pub struct HttpEmbeddingService {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

#[derive(Serialize)]
struct RemoveRequest<'a> {
    repository_id: &'a str,
    path: &'a str,
}

impl HttpEmbeddingService {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env).ok();
        Self::with_api_key(config, api_key)
    }

    pub fn with_api_key(config: &EmbeddingConfig, api_key: Option<String>) -> Result<Self> {
        let url = config
            .url
            .as_ref()
            .context("embedding.url required for http provider")?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            endpoint: format!("{}/documents", url.trim_end_matches('/')),
            api_key,
        })
    }

    async fn send<T: Serialize + ?Sized>(
        &self,
        method: reqwest::Method,
        body: &T,
    ) -> Result<reqwest::Response, MirrorError> {
        let mut req = self.client.request(method, &self.endpoint).json(body);
        if let Some(ref key) = self.api_key {
            req = req.header(AUTHORIZATION, format!("Bearer {}", key));
        }

        req.send()
            .await
            .map_err(|e| MirrorError::transient(Service::Embedding, e))
    }
}

async fn status_error(resp: reqwest::Response) -> MirrorError {
    let status = resp.status();
    let body_text = resp.text().await.unwrap_or_default();
    MirrorError::transient(Service::Embedding, format!("HTTP {}: {}", status, body_text))
}

#[async_trait]
impl EmbeddingService for HttpEmbeddingService {
    async fn submit(&self, request: &EmbeddingRequest) -> Result<(), MirrorError> {
        let resp = self.send(reqwest::Method::POST, request).await?;
        if !resp.status().is_success() {
            return Err(status_error(resp).await);
        }
        Ok(())
    }

    async fn remove(&self, repository_id: &str, path: &str) -> Result<(), MirrorError> {
        let body = RemoveRequest {
            repository_id,
            path,
        };
        let resp = self.send(reqwest::Method::DELETE, &body).await?;
        // 404: nothing was indexed for this path
        if !resp.status().is_success() && resp.status() != StatusCode::NOT_FOUND {
            return Err(status_error(resp).await);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn service(server: &mockito::Server) -> HttpEmbeddingService {
        let config = EmbeddingConfig {
            provider: "http".into(),
            url: Some(format!("{}/", server.url())),
            ..EmbeddingConfig::default()
        };
        HttpEmbeddingService::with_api_key(&config, Some("k3y".into())).unwrap()
    }

    fn request() -> EmbeddingRequest {
        EmbeddingRequest {
            repository_id: "42".into(),
            path: "src/a.py".into(),
            content: "print(1)\n".into(),
            metadata: serde_json::json!({ "language": "python" }),
        }
    }

    #[test]
    fn test_create_disabled() {
        let svc = create_embedding_service(&EmbeddingConfig::default()).unwrap();
        assert!(!svc.is_enabled());
    }

    #[tokio::test]
    async fn test_submit_posts_document() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/documents")
            .match_header("authorization", "Bearer k3y")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "repository_id": "42",
                "path": "src/a.py",
                "metadata": { "language": "python" },
            })))
            .with_status(202)
            .create_async()
            .await;

        service(&server).submit(&request()).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_submit_failure_is_transient_and_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/documents")
            .with_status(503)
            .with_body("overloaded")
            .expect(1)
            .create_async()
            .await;

        let err = service(&server).submit(&request()).await.unwrap_err();
        assert!(matches!(
            err,
            MirrorError::Transient {
                service: Service::Embedding,
                ..
            }
        ));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_remove_tolerates_unknown_document() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("DELETE", "/documents")
            .with_status(404)
            .create_async()
            .await;

        service(&server).remove("42", "gone.md").await.unwrap();
    }
}
