//! Enumeration and removal of shadow stores under `<home>/projects`
//!
//! Each store directory carries a `project.json` marker naming the source
//! directory it protects. A store whose marker is missing, unreadable, or
//! points at a directory that no longer exists is orphaned.

use crate::engine::StorageEngine;
use crate::git::GitEngine;
use crate::Result;
use chrono::{DateTime, Utc};
use ckpt_core::{CheckpointError, CheckpointHome, FileLock, LockPolicy, ProjectHash};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use walkdir::WalkDir;

/// Contents of `project.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreMarker {
    pub source_path: PathBuf,
    pub created_at: DateTime<Utc>,
}

impl StoreMarker {
    pub fn new(source_path: impl Into<PathBuf>) -> Self {
        Self {
            source_path: source_path.into(),
            created_at: Utc::now(),
        }
    }

    pub fn read(path: &Path) -> Option<Self> {
        let contents = std::fs::read(path).ok()?;
        serde_json::from_slice(&contents).ok()
    }

    /// Atomic write via temp file + rename
    pub fn write(&self, path: &Path) -> Result<()> {
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir)?;

        let mut temp = tempfile::Builder::new()
            .prefix(".project")
            .suffix(".tmp")
            .tempfile_in(dir)?;
        temp.write_all(&serde_json::to_vec_pretty(self)?)?;
        temp.as_file().sync_all()?;
        temp.persist(path).map_err(|e| CheckpointError::Io(e.error))?;
        Ok(())
    }
}

/// One store found on disk
#[derive(Debug, Clone)]
pub struct StoreEntry {
    pub hash: ProjectHash,
    pub dir: PathBuf,
    pub marker: Option<StoreMarker>,
    pub size_bytes: u64,
}

impl StoreEntry {
    pub fn is_orphaned(&self) -> bool {
        match &self.marker {
            Some(marker) => !marker.source_path.is_dir(),
            None => true,
        }
    }

    pub fn source_path(&self) -> Option<&Path> {
        self.marker.as_ref().map(|m| m.source_path.as_path())
    }
}

/// All stores under `home`, sorted by hash
pub fn list_stores(home: &CheckpointHome) -> Result<Vec<StoreEntry>> {
    let projects_dir = home.projects_dir();
    if !projects_dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut entries = Vec::new();
    for entry in std::fs::read_dir(&projects_dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name();
        let Some(hash) = name.to_str().and_then(ProjectHash::parse) else {
            tracing::debug!("Ignoring foreign entry {}", entry.path().display());
            continue;
        };

        entries.push(StoreEntry {
            marker: StoreMarker::read(&home.marker_path(&hash)),
            size_bytes: dir_size(&entry.path()),
            dir: entry.path(),
            hash,
        });
    }

    entries.sort_by(|a, b| a.hash.as_str().cmp(b.hash.as_str()));
    Ok(entries)
}

/// Delete a store directory under its project lock
pub async fn remove_store(home: &CheckpointHome, hash: &ProjectHash, policy: &LockPolicy) -> Result<()> {
    let _lock = FileLock::acquire_async(&home.project_lock_path(hash), policy).await?;

    let dir = home.project_dir(hash);
    if dir.exists() {
        tokio::fs::remove_dir_all(&dir).await?;
        tracing::info!("Removed shadow store {}", dir.display());
    }
    Ok(())
}

/// Run storage housekeeping on a store under its project lock
pub async fn housekeep(
    home: &CheckpointHome,
    hash: &ProjectHash,
    policy: &LockPolicy,
    timeout: Duration,
) -> Result<()> {
    let repo_dir = home.repo_dir(hash);
    let work_tree = StoreMarker::read(&home.marker_path(hash))
        .map(|m| m.source_path)
        .filter(|p| p.is_dir())
        .unwrap_or_else(|| home.project_dir(hash));

    let engine = GitEngine::new(repo_dir, work_tree, timeout);
    if !engine.is_initialized() {
        return Ok(());
    }

    let _lock = FileLock::acquire_async(&home.project_lock_path(hash), policy).await?;
    engine.gc().await
}

fn dir_size(dir: &Path) -> u64 {
    WalkDir::new(dir)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.metadata().ok())
        .map(|m| m.len())
        .sum()
}
