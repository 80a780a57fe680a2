//! Shared data models for the transcode pipeline.
//!
//! This crate provides the persisted row types and status machinery shared
//! by the store, worker, and API crates:
//! - Jobs and their lifecycle states
//! - Renditions (one requested output resolution per row)

pub mod job;
pub mod rendition;

pub use job::{Job, JobStatus};
pub use rendition::Rendition;
