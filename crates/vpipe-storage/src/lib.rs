//! S3/MinIO object store client.
//!
//! This crate provides the three operations the worker needs against the
//! object store: download to a local path, upload from a local path, and an
//! existence probe. Uploads are last-writer-wins at a key, which is what the
//! idempotent re-run contract relies on.

pub mod client;
pub mod error;

pub use client::{ObjectStore, ObjectStoreConfig};
pub use error::{StorageError, StorageResult};
