//! ckpt core - shared primitives for the checkpoint engine
//!
//! This crate provides the leaf components every other crate builds on:
//! - Project and checkpoint identifiers
//! - Configuration loading with per-field recovery
//! - Glob exclusion matching
//! - Advisory file locks with bounded backoff
//! - Installation layout and path validation

pub mod config;
pub mod error;
pub mod exclude;
pub mod hash;
pub mod lock;
pub mod paths;

// Re-export main types for convenience
pub use config::{Config, ConfigStore, ConfigWarning};
pub use error::{CheckpointError, Result};
pub use exclude::ExclusionMatcher;
pub use hash::{CheckpointId, ProjectHash};
pub use lock::{FileLock, LockPolicy};
pub use paths::{validate_relative, CheckpointHome};
