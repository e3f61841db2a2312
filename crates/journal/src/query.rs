//! Filters over recorded checkpoints

use crate::checkpoint::{Checkpoint, CheckpointStatus};
use chrono::{DateTime, Utc};
use ckpt_core::ProjectHash;

/// Conjunction of optional filters; an empty query matches everything
#[derive(Debug, Clone, Default)]
pub struct CheckpointQuery {
    pub project: Option<ProjectHash>,
    pub session: Option<String>,
    pub tool: Option<String>,
    pub status: Option<CheckpointStatus>,
    /// Substring of an affected path
    pub file: Option<String>,
    /// Inclusive lower bound
    pub since: Option<DateTime<Utc>>,
    /// Inclusive upper bound
    pub until: Option<DateTime<Utc>>,
    /// Case-insensitive text over message, tool and paths (stored lowercase)
    text: Option<String>,
    pub limit: Option<usize>,
}

impl CheckpointQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn project(mut self, project: &ProjectHash) -> Self {
        self.project = Some(project.clone());
        self
    }

    pub fn session(mut self, session: impl Into<String>) -> Self {
        self.session = Some(session.into());
        self
    }

    pub fn tool(mut self, tool: impl Into<String>) -> Self {
        self.tool = Some(tool.into());
        self
    }

    pub fn status(mut self, status: CheckpointStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn file(mut self, fragment: impl Into<String>) -> Self {
        self.file = Some(fragment.into());
        self
    }

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn until(mut self, until: DateTime<Utc>) -> Self {
        self.until = Some(until);
        self
    }

    pub fn text(mut self, term: &str) -> Self {
        self.text = Some(term.to_lowercase());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, cp: &Checkpoint) -> bool {
        if self.project.as_ref().is_some_and(|p| &cp.project_hash != p) {
            return false;
        }
        if self.session.as_ref().is_some_and(|s| &cp.session_id != s) {
            return false;
        }
        if self.tool.as_ref().is_some_and(|t| !cp.tool.eq_ignore_ascii_case(t)) {
            return false;
        }
        if self.status.is_some_and(|s| cp.status != s) {
            return false;
        }
        if self.file.as_ref().is_some_and(|f| !cp.touches(f)) {
            return false;
        }
        if self.since.is_some_and(|t| cp.timestamp < t) {
            return false;
        }
        if self.until.is_some_and(|t| cp.timestamp > t) {
            return false;
        }
        if self.text.as_ref().is_some_and(|t| !cp.mentions(t)) {
            return false;
        }
        true
    }
}
