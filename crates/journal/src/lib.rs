//! Checkpoint records and the metadata index
//!
//! This crate provides:
//! - The checkpoint record and its status machine
//! - The JSON metadata document (atomic replace, size cap, advisory lock)
//! - Query filters over recorded checkpoints
//! - Retention rules and per-project statistics
//! - Recovery of corrupt documents and abandoned temp files

pub mod checkpoint;
pub mod metadata;
pub mod query;
pub mod recovery;
pub mod retention;

// Re-exports
pub use checkpoint::{Checkpoint, CheckpointStatus};
pub use metadata::{MetadataStore, DEFAULT_CAPACITY};
pub use query::CheckpointQuery;
pub use retention::ProjectStats;

/// Result type for journal operations
pub type Result<T> = ckpt_core::Result<T>;
