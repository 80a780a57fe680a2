//! Redis-backed work queue and lease registry.
//!
//! This crate provides:
//! - The pending/dead-letter job lists (`jobs:pending`, `jobs:dead`)
//! - Advisory per-job leases with server-evaluated ownership checks
//!
//! The queue moves job ids only; the job store holds all payload. Delivery
//! is at-least-once: a token lost between pop and claim is recovered by the
//! sweeper re-pushing the stalled job.

pub mod error;
pub mod lease;
pub mod queue;

pub use error::{QueueError, QueueResult};
pub use lease::LeaseRegistry;
pub use queue::{QueueConfig, WorkQueue};
