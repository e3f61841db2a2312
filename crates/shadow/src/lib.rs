//! Shadow repositories - isolated per-project snapshot stores
//!
//! Each protected project gets its own store under `<home>/projects/<hash>`.
//! The store is driven through the [`StorageEngine`] trait; the shipped
//! engine runs the `git` binary against a private git directory so snapshots
//! never touch the project's own history, remotes, or hooks.

pub mod engine;
pub mod git;
pub mod ignore;
pub mod repo;
pub mod scan;
pub mod store;

pub use engine::{ChangeKind, CommitOutcome, FileChange, RevisionInfo, StorageEngine, TreeId};
pub use git::GitEngine;
pub use ignore::ProjectIgnores;
pub use repo::{
    count_changes, RestoreMode, RestorePlan, RestoreReport, ShadowOptions, ShadowRepository, SnapshotMeta,
    SnapshotOutcome,
};
pub use scan::{ScanReport, TreeScanner};
pub use store::{housekeep, list_stores, remove_store, StoreEntry, StoreMarker};

/// Result type for shadow store operations
pub type Result<T> = ckpt_core::Result<T>;
