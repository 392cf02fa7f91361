//! # repo-mirror
//!
//! Keeps a stored mirror of a repository's file tree, and the search
//! artifacts derived from it, in sync with upstream webhook events.
//!
//! ## Architecture
//!
//! ```text
//! POST /webhook ─► classify ─► JobQueue ─► worker ─► Dispatcher
//!                                                      │
//!                           ┌──────────────────────────┴───────────┐
//!                           ▼                                      ▼
//!                    CommitIngestor                         MetadataUpdater
//!                           │
//!                           ▼
//!                     FilePipeline
//!          fetch ─► store ─► metadata ─► index  /  delete
//!            │        │         │          │
//!       SourceHost BlobStore  Store  EmbeddingService
//! ```
//!
//! Jobs are processed one at a time in arrival order. Within a push, commits
//! run in payload order and paths in array order. A failure in one path or
//! one commit is recorded in its report and never stops the rest.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`db`] | SQLite connection pool |
//! | [`migrate`] | Schema creation |
//! | [`sqlite_store`] | SQLite implementation of the core `Store` trait |
//! | [`error`] | Pipeline error taxonomy |
//! | [`source_host`] | Content API client |
//! | [`blob`] | Blob storage backends |
//! | [`embedding`] | Embedding service client |
//! | [`pipeline`] | Per-file stages |
//! | [`ingest`] | Commit ingestion for push jobs |
//! | [`metadata`] | Repository-level updates |
//! | [`dispatch`] | Job validation and routing |
//! | [`queue`] | FIFO job queue and worker |
//! | [`server`] | HTTP intake |
//! | [`app`] | Composition root |

pub mod app;
pub mod blob;
pub mod config;
pub mod db;
pub mod dispatch;
pub mod embedding;
pub mod error;
pub mod ingest;
pub mod inspect;
pub mod metadata;
pub mod migrate;
pub mod pipeline;
pub mod queue;
pub mod replay;
pub mod server;
pub mod source_host;
pub mod sqlite_store;
