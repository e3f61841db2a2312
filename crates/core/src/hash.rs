//! Identifiers for projects and checkpoints
//!
//! A project is identified by a BLAKE3 digest of its canonical absolute path,
//! so the same directory always maps to the same shadow store regardless of
//! how it was reached (relative paths, `..`, symlinked parents).
//!
//! Checkpoint ids are the revision ids of the shadow store: lowercase hex
//! object names, 40 characters for SHA-1 repositories or 64 for SHA-256.

use crate::error::{CheckpointError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Stable identifier of a protected project directory
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectHash(String);

impl ProjectHash {
    /// Number of hex characters kept from the digest
    pub const LEN: usize = 16;

    /// Hash an already-canonical path
    pub fn from_canonical(path: &Path) -> Self {
        use std::os::unix::ffi::OsStrExt;

        let digest = blake3::hash(path.as_os_str().as_bytes());
        let hex = digest.to_hex();
        Self(hex.as_str()[..Self::LEN].to_string())
    }

    /// Canonicalize `project_path` and hash it
    ///
    /// Returns the hash together with the canonical path it was derived from.
    pub fn identify(project_path: &Path) -> Result<(Self, PathBuf)> {
        let canonical = project_path.canonicalize().map_err(|e| {
            CheckpointError::path_validation(
                project_path.display().to_string(),
                format!("cannot resolve project directory: {}", e),
            )
        })?;
        Ok((Self::from_canonical(&canonical), canonical))
    }

    /// Parse a hash previously produced by [`ProjectHash::from_canonical`]
    pub fn parse(s: &str) -> Option<Self> {
        if s.len() == Self::LEN && is_lower_hex(s) {
            Some(Self(s.to_string()))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for ProjectHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ProjectHash({})", self.0)
    }
}

impl std::fmt::Display for ProjectHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Revision id of a checkpoint in its shadow store
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CheckpointId(String);

impl CheckpointId {
    /// Minimum length accepted for a prefix lookup
    pub const MIN_PREFIX: usize = 4;

    /// Parse a full revision id
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if (s.len() == 40 || s.len() == 64) && is_lower_hex(s) {
            Ok(Self(s.to_string()))
        } else {
            Err(CheckpointError::UnknownCheckpoint(s.to_string()))
        }
    }

    /// Whether `reference` is usable as an id prefix
    pub fn is_prefix_candidate(reference: &str) -> bool {
        reference.len() >= Self::MIN_PREFIX && is_lower_hex(&reference.to_ascii_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 8 characters, for display
    pub fn short(&self) -> &str {
        &self.0[..8]
    }

    pub fn starts_with(&self, prefix: &str) -> bool {
        self.0.starts_with(&prefix.to_ascii_lowercase())
    }
}

impl TryFrom<String> for CheckpointId {
    type Error = CheckpointError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<CheckpointId> for String {
    fn from(id: CheckpointId) -> Self {
        id.0
    }
}

impl std::fmt::Debug for CheckpointId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CheckpointId({})", self.0)
    }
}

impl std::fmt::Display for CheckpointId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

fn is_lower_hex(s: &str) -> bool {
    s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}
