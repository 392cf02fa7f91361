//! # repo-mirror core
//!
//! Runtime-independent logic for repo-mirror: persisted models, typed
//! webhook payloads and their classification, the static file-type table,
//! and the [`store::Store`] abstraction with an in-memory implementation.
//!
//! This crate has no tokio, sqlx, or HTTP dependencies. Everything that
//! talks to the network or the database lives in the `repo-mirror` crate.

pub mod event;
pub mod filetype;
pub mod models;
pub mod store;
