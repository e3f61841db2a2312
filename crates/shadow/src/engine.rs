//! Storage engine interface
//!
//! Everything the shadow repository needs from its versioned store. The
//! engine owns a store for exactly one project working tree; snapshots are
//! built in two steps: [`StorageEngine::stage`] turns an explicit file list
//! into an immutable tree, and [`StorageEngine::commit`] records that tree as
//! a revision unless it equals the current head.

use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ckpt_core::CheckpointId;

/// Content id of a staged tree
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TreeId(pub String);

impl TreeId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TreeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Result of [`StorageEngine::commit`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// A new revision was recorded
    Created(CheckpointId),
    /// The tree equals the current head (or is empty with no head yet)
    Unchanged(Option<CheckpointId>),
}

/// One entry of the revision history
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevisionInfo {
    pub id: CheckpointId,
    pub timestamp: DateTime<Utc>,
    pub subject: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
}

/// A path that differs between two trees
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    pub path: String,
    pub kind: ChangeKind,
}

/// Versioned store backing one shadow repository
///
/// Tree-ish arguments (`from`, `to`) accept either a revision id or a [`TreeId`] string.
#[async_trait]
pub trait StorageEngine: Send + Sync {
    /// Whether the store exists on disk
    fn is_initialized(&self) -> bool;

    /// Create the store; must be idempotent
    async fn init(&self) -> Result<()>;

    /// Current head revision, if any
    async fn head(&self) -> Result<Option<CheckpointId>>;

    /// Record the working-tree content of `files` as a tree
    async fn stage(&self, files: &[String]) -> Result<TreeId>;

    /// Record `tree` as a new head revision unless it is unchanged
    async fn commit(&self, tree: &TreeId, message: &str) -> Result<CommitOutcome>;

    /// Unified diff between two tree-ish ids
    async fn diff(&self, from: &str, to: &str) -> Result<String>;

    /// Per-path change summary between two tree-ish ids
    async fn diff_summary(&self, from: &str, to: &str) -> Result<Vec<FileChange>>;

    /// Write every file of `revision` into the working tree
    async fn checkout(&self, revision: &CheckpointId) -> Result<()>;

    /// Paths recorded in `revision`
    async fn files(&self, revision: &CheckpointId) -> Result<Vec<String>>;

    /// Revision history, newest first
    async fn log(&self) -> Result<Vec<RevisionInfo>>;

    /// Storage housekeeping
    async fn gc(&self) -> Result<()>;
}
