//! Typed webhook jobs and their classification.
//!
//! Inbound events arrive either as a raw webhook (event name header plus a
//! JSON body) or as an already-shaped [`InboundJob`]. Both are validated
//! exactly once here into a [`WebhookJob`] carrying a [`JobPayload`]
//! variant, so the pipeline never does ad hoc field access on JSON.
//!
//! # Classification
//!
//! | Event name | Result |
//! |------------|--------|
//! | `push` | [`JobPayload::Push`] |
//! | `repository` | [`JobPayload::RepositoryMeta`] |
//! | anything else (`ping`, `issues`, ...) | `Ok(None)` (ignored) |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use crate::models::Repository;

/// Error produced when an event does not match the shape of its kind.
#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("invalid {kind} payload: {source}")]
    Payload {
        kind: EventKind,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid job envelope: {0}")]
    Envelope(#[from] serde_json::Error),
}

/// The two job kinds the dispatcher routes on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventKind {
    Push,
    RepositoryMeta,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::Push => f.write_str("push"),
            EventKind::RepositoryMeta => f.write_str("repositoryMeta"),
        }
    }
}

/// A unit of work on the job queue. Consumed exactly once.
#[derive(Debug, Clone)]
pub struct WebhookJob {
    /// Correlation id for logs.
    pub id: Uuid,
    pub repository_id: String,
    pub payload: JobPayload,
    pub enqueued_at: DateTime<Utc>,
}

impl WebhookJob {
    pub fn new(repository_id: impl Into<String>, payload: JobPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            repository_id: repository_id.into(),
            payload,
            enqueued_at: Utc::now(),
        }
    }

    pub fn event_kind(&self) -> EventKind {
        match self.payload {
            JobPayload::Push(_) => EventKind::Push,
            JobPayload::RepositoryMeta(_) => EventKind::RepositoryMeta,
        }
    }

    /// Validate an already-shaped job envelope.
    pub fn from_inbound(inbound: InboundJob) -> Result<Self, ClassifyError> {
        let payload = JobPayload::parse(inbound.event_kind, inbound.payload)?;
        Ok(Self {
            id: Uuid::new_v4(),
            repository_id: inbound.repository_id,
            payload,
            enqueued_at: inbound.timestamp.unwrap_or_else(Utc::now),
        })
    }
}

/// Job envelope as handed over by an upstream classifier.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundJob {
    pub repository_id: String,
    pub event_kind: EventKind,
    pub payload: serde_json::Value,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Payload variants, one per [`EventKind`].
#[derive(Debug, Clone)]
pub enum JobPayload {
    Push(PushPayload),
    RepositoryMeta(RepositoryMetaPayload),
}

impl JobPayload {
    fn parse(kind: EventKind, value: serde_json::Value) -> Result<Self, ClassifyError> {
        let wrap = |source| ClassifyError::Payload { kind, source };
        match kind {
            EventKind::Push => serde_json::from_value(value).map(JobPayload::Push).map_err(wrap),
            EventKind::RepositoryMeta => serde_json::from_value(value)
                .map(JobPayload::RepositoryMeta)
                .map_err(wrap),
        }
    }

    pub fn repository(&self) -> &RepositorySnapshot {
        match self {
            JobPayload::Push(p) => &p.repository,
            JobPayload::RepositoryMeta(p) => &p.repository,
        }
    }
}

/// Classify a raw webhook delivery by its event name.
///
/// Returns `Ok(None)` for event names this system does not process.
pub fn classify(event_name: &str, body: &[u8]) -> Result<Option<WebhookJob>, ClassifyError> {
    let kind = match event_name {
        "push" => EventKind::Push,
        "repository" => EventKind::RepositoryMeta,
        _ => return Ok(None),
    };

    let value: serde_json::Value = serde_json::from_slice(body)?;
    let payload = JobPayload::parse(kind, value)?;
    let repository_id = payload.repository().id.clone();

    Ok(Some(WebhookJob::new(repository_id, payload)))
}

/// Push event body: new commits landed on a branch.
#[derive(Debug, Clone, Deserialize)]
pub struct PushPayload {
    #[serde(rename = "ref", default)]
    pub git_ref: Option<String>,
    #[serde(default)]
    pub commits: Vec<CommitEntry>,
    pub repository: RepositorySnapshot,
}

/// One commit inside a push payload.
#[derive(Debug, Clone, Deserialize)]
pub struct CommitEntry {
    pub id: String,
    #[serde(default)]
    pub message: String,
    pub author: CommitAuthor,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub added: Vec<String>,
    #[serde(default)]
    pub modified: Vec<String>,
    #[serde(default)]
    pub removed: Vec<String>,
}

impl CommitEntry {
    pub fn files_changed_count(&self) -> usize {
        self.added.len() + self.modified.len() + self.removed.len()
    }

    /// Added then modified paths, in payload order.
    pub fn changed_paths(&self) -> impl Iterator<Item = &str> {
        self.added
            .iter()
            .chain(self.modified.iter())
            .map(String::as_str)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommitAuthor {
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// Repository-level event body (visibility change, rename, ...).
#[derive(Debug, Clone, Deserialize)]
pub struct RepositoryMetaPayload {
    pub action: String,
    pub repository: RepositorySnapshot,
}

/// The `repository` object carried by every webhook body.
#[derive(Debug, Clone, Deserialize)]
pub struct RepositorySnapshot {
    #[serde(deserialize_with = "id_as_string")]
    pub id: String,
    pub name: String,
    pub full_name: String,
    #[serde(default)]
    pub private: bool,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub default_branch: Option<String>,
}

impl RepositorySnapshot {
    pub fn to_repository(&self) -> Repository {
        Repository {
            id: self.id.clone(),
            name: self.name.clone(),
            full_name: self.full_name.clone(),
            private: self.private,
            archived: self.archived,
            default_branch: self.default_branch.clone(),
            last_activity_at: None,
        }
    }
}

/// Upstream ids are numeric in webhook bodies but strings everywhere else.
fn id_as_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Number(u64),
        Text(String),
    }

    match RawId::deserialize(deserializer)? {
        RawId::Number(n) => Ok(n.to_string()),
        RawId::Text(s) => Ok(s),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PUSH: &str = r#"{
        "ref": "refs/heads/main",
        "commits": [{
            "id": "abc123",
            "message": "Add parser",
            "author": { "name": "Ada", "email": "ada@example.com" },
            "timestamp": "2024-05-01T10:00:00-07:00",
            "url": "https://github.com/acme/widgets/commit/abc123",
            "added": ["src/parser.rs"],
            "modified": ["README.md"],
            "removed": []
        }],
        "repository": { "id": 42, "name": "widgets", "full_name": "acme/widgets", "private": true }
    }"#;

    #[test]
    fn test_classify_push() {
        let job = classify("push", PUSH.as_bytes()).unwrap().unwrap();
        assert_eq!(job.event_kind(), EventKind::Push);
        assert_eq!(job.repository_id, "42");

        let JobPayload::Push(push) = &job.payload else {
            panic!("expected push payload");
        };
        assert_eq!(push.git_ref.as_deref(), Some("refs/heads/main"));
        let commit = &push.commits[0];
        assert_eq!(commit.files_changed_count(), 2);
        assert_eq!(
            commit.changed_paths().collect::<Vec<_>>(),
            vec!["src/parser.rs", "README.md"]
        );
        assert_eq!(commit.timestamp.to_rfc3339(), "2024-05-01T17:00:00+00:00");
    }

    #[test]
    fn test_classify_repository_meta() {
        let body = br#"{
            "action": "renamed",
            "repository": { "id": "42", "name": "gadgets", "full_name": "acme/gadgets" }
        }"#;
        let job = classify("repository", body).unwrap().unwrap();
        assert_eq!(job.event_kind(), EventKind::RepositoryMeta);
        assert_eq!(job.payload.repository().full_name, "acme/gadgets");
    }

    #[test]
    fn test_classify_ignores_other_events() {
        assert!(classify("ping", b"{}").unwrap().is_none());
        assert!(classify("issues", b"not even json").unwrap().is_none());
    }

    #[test]
    fn test_classify_rejects_wrong_shape() {
        let err = classify("push", br#"{"commits": []}"#).unwrap_err();
        assert!(matches!(
            err,
            ClassifyError::Payload {
                kind: EventKind::Push,
                ..
            }
        ));
        assert!(classify("push", b"{").is_err());
    }

    #[test]
    fn test_from_inbound() {
        let inbound: InboundJob = serde_json::from_str(&format!(
            r#"{{ "repositoryId": "42", "eventKind": "push", "payload": {}, "timestamp": "2024-05-01T00:00:00Z" }}"#,
            PUSH
        ))
        .unwrap();
        let job = WebhookJob::from_inbound(inbound).unwrap();
        assert_eq!(job.event_kind(), EventKind::Push);
        assert_eq!(job.enqueued_at.to_rfc3339(), "2024-05-01T00:00:00+00:00");
    }

    #[test]
    fn test_from_inbound_kind_mismatch() {
        let inbound: InboundJob = serde_json::from_str(&format!(
            r#"{{ "repositoryId": "42", "eventKind": "repositoryMeta", "payload": {} }}"#,
            PUSH
        ))
        .unwrap();
        assert!(WebhookJob::from_inbound(inbound).is_err());
    }
}
