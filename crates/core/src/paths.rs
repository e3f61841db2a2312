//! Installation layout and project-relative path validation
//!
//! ```text
//! <home>/
//!   metadata.json
//!   locks/metadata.lock
//!   locks/<project_hash>.lock
//!   projects/<project_hash>/repo.git
//!   projects/<project_hash>/project.json
//!   logs/ckpt.log
//! ```

use crate::error::{CheckpointError, Result};
use crate::hash::ProjectHash;
use std::path::{Component, Path, PathBuf};

/// Environment variable overriding the installation data directory
pub const HOME_ENV: &str = "CKPT_HOME";

/// Root of all checkpoint state for one installation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointHome {
    root: PathBuf,
}

impl CheckpointHome {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve from `CKPT_HOME`, falling back to the platform data directory
    pub fn from_env() -> Result<Self> {
        if let Some(root) = std::env::var_os(HOME_ENV) {
            if !root.is_empty() {
                return Ok(Self::new(root));
            }
        }

        dirs::data_dir()
            .map(|d| Self::new(d.join("ckpt")))
            .ok_or_else(|| CheckpointError::Config {
                field: HOME_ENV.to_string(),
                message: "no data directory available; set CKPT_HOME".to_string(),
            })
    }

    /// Create the top-level directories
    pub fn ensure(&self) -> Result<()> {
        std::fs::create_dir_all(self.locks_dir())?;
        std::fs::create_dir_all(self.projects_dir())?;
        std::fs::create_dir_all(self.logs_dir())?;
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.root.join("metadata.json")
    }

    pub fn locks_dir(&self) -> PathBuf {
        self.root.join("locks")
    }

    pub fn metadata_lock_path(&self) -> PathBuf {
        self.locks_dir().join("metadata.lock")
    }

    /// Lock guarding one project's shadow store
    pub fn project_lock_path(&self, project: &ProjectHash) -> PathBuf {
        self.locks_dir().join(format!("{}.lock", project))
    }

    pub fn projects_dir(&self) -> PathBuf {
        self.root.join("projects")
    }

    pub fn project_dir(&self, project: &ProjectHash) -> PathBuf {
        self.projects_dir().join(project.as_str())
    }

    /// Git directory of a project's shadow store
    pub fn repo_dir(&self, project: &ProjectHash) -> PathBuf {
        self.project_dir(project).join("repo.git")
    }

    /// Marker recording which source directory a store belongs to
    pub fn marker_path(&self, project: &ProjectHash) -> PathBuf {
        self.project_dir(project).join("project.json")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    pub fn log_path(&self) -> PathBuf {
        self.logs_dir().join("ckpt.log")
    }
}

/// Turn a user- or tool-supplied path into a `/`-joined path relative to `project_root`
///
/// `project_root` must be canonical. Absolute paths must lie inside it; relative
/// paths are taken relative to it. `..` may not climb above the root.
pub fn validate_relative(project_root: &Path, raw: &str) -> Result<String> {
    let reject = |reason: &str| CheckpointError::path_validation(raw, reason);

    if raw.trim().is_empty() {
        return Err(reject("path is empty"));
    }
    if raw.contains('\0') {
        return Err(reject("path contains a NUL byte"));
    }

    let candidate = Path::new(raw);
    let relative = if candidate.is_absolute() {
        let normalized = normalize_lexically(candidate).ok_or_else(|| reject("path climbs above /"))?;
        match normalized.strip_prefix(project_root) {
            Ok(rel) => rel.to_path_buf(),
            Err(_) => {
                // The project root is canonical; the tool may have used a symlinked spelling
                let resolved = canonicalize_existing_prefix(&normalized);
                resolved
                    .strip_prefix(project_root)
                    .map(Path::to_path_buf)
                    .map_err(|_| reject("path is outside the project"))?
            }
        }
    } else {
        candidate.to_path_buf()
    };

    let mut parts: Vec<String> = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => match part.to_str() {
                Some(s) => parts.push(s.to_string()),
                None => return Err(reject("path is not valid UTF-8")),
            },
            Component::CurDir => {}
            Component::ParentDir => {
                if parts.pop().is_none() {
                    return Err(reject("path traverses outside the project"));
                }
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(reject("path is outside the project"));
            }
        }
    }

    if parts.is_empty() {
        return Err(reject("path refers to the project root"));
    }
    if parts.iter().any(|p| p == ".git") {
        return Err(reject("path is inside a .git directory"));
    }

    Ok(parts.join("/"))
}

/// Resolve `.` and `..` without touching the filesystem
fn normalize_lexically(path: &Path) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                if !out.pop() || out.as_os_str().is_empty() {
                    return None;
                }
            }
            Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    Some(out)
}

/// Canonicalize the longest existing ancestor and re-append the rest
fn canonicalize_existing_prefix(path: &Path) -> PathBuf {
    let mut existing = path.to_path_buf();
    let mut tail = Vec::new();

    while !existing.exists() {
        match (existing.file_name().map(|n| n.to_os_string()), existing.parent()) {
            (Some(name), Some(parent)) => {
                tail.push(name);
                existing = parent.to_path_buf();
            }
            _ => return path.to_path_buf(),
        }
    }

    let mut resolved = existing.canonicalize().unwrap_or(existing);
    for name in tail.into_iter().rev() {
        resolved.push(name);
    }
    resolved
}
