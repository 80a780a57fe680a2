//! Transcode worker runtime.
//!
//! This crate provides:
//! - The claim loop: pop a token, take the lease, claim the row, run the plan
//! - The idempotent per-job plan (download, transcode, upload, record)
//! - The retry state machine with backoff and dead-lettering
//! - The stale-job sweeper and dispatch reconciler
//! - Graceful shutdown

pub mod config;
pub mod error;
pub mod metrics;
pub mod plan;
pub mod retry;
pub mod runner;
pub mod sweeper;

pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use runner::Worker;
pub use sweeper::Sweeper;
