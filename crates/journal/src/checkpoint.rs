//! Checkpoint data structures

use chrono::{DateTime, Utc};
use ckpt_core::{CheckpointError, CheckpointId, ProjectHash};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a checkpoint
///
/// A checkpoint is recorded `pending` before the protected edit runs and moves
/// to `completed` or `failed` once the edit's outcome is known. Terminal
/// statuses never change again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointStatus {
    Pending,
    /// Older documents spell this `success`
    #[serde(alias = "success")]
    Completed,
    Failed,
}

impl CheckpointStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// Legal transitions: pending→completed and pending→failed
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!((self, next), (Self::Pending, Self::Completed) | (Self::Pending, Self::Failed))
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for CheckpointStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CheckpointStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "completed" | "success" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown status `{}` (expected pending, completed or failed)", other)),
        }
    }
}

/// One recorded snapshot of a project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Revision id in the project's shadow store
    pub id: CheckpointId,
    pub project_hash: ProjectHash,
    pub timestamp: DateTime<Utc>,
    /// Tool that triggered the checkpoint (`Edit`, `Write`, `Manual`, ...)
    pub tool: String,
    pub session_id: String,
    #[serde(default)]
    pub message: Option<String>,
    /// Affected paths, relative to the project root
    #[serde(default)]
    pub files: Vec<String>,
    pub status: CheckpointStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_updated: Option<DateTime<Utc>>,
}

impl Checkpoint {
    /// Create a pending checkpoint
    pub fn new(
        id: CheckpointId,
        project_hash: ProjectHash,
        timestamp: DateTime<Utc>,
        tool: impl Into<String>,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            id,
            project_hash,
            timestamp,
            tool: tool.into(),
            session_id: session_id.into(),
            message: None,
            files: Vec::new(),
            status: CheckpointStatus::Pending,
            status_updated: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_files(mut self, files: Vec<String>) -> Self {
        self.files = files;
        self
    }

    /// Record directly in a final status (for checkpoints no post call will follow)
    pub fn with_status(mut self, status: CheckpointStatus) -> Self {
        self.status = status;
        self
    }

    pub fn short_id(&self) -> &str {
        self.id.short()
    }

    /// Apply a status change, rejecting anything but pending→terminal
    pub fn transition(&mut self, next: CheckpointStatus, at: DateTime<Utc>) -> Result<(), CheckpointError> {
        if !self.status.can_transition_to(next) {
            return Err(CheckpointError::InvalidTransition {
                id: self.id.to_string(),
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        self.status_updated = Some(at);
        Ok(())
    }

    /// Case-insensitive match against message, tool name and affected paths
    ///
    /// `needle` must already be lowercase.
    pub fn mentions(&self, needle: &str) -> bool {
        self.message
            .as_deref()
            .is_some_and(|m| m.to_lowercase().contains(needle))
            || self.tool.to_lowercase().contains(needle)
            || self.files.iter().any(|f| f.to_lowercase().contains(needle))
    }

    /// Whether any affected path contains `fragment`
    pub fn touches(&self, fragment: &str) -> bool {
        self.files.iter().any(|f| f.contains(fragment))
    }
}
