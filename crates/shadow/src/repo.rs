//! Per-project shadow repository
//!
//! A [`ShadowRepository`] owns one isolated store under
//! `<home>/projects/<hash>/repo.git` and snapshots the project's working tree
//! into it. Every mutating call (snapshot, restore, gc, first-time init) holds
//! the project lock, so snapshots of one project are totally ordered by lock
//! acquisition and a restore can never interleave with a snapshot.

use crate::engine::{ChangeKind, CommitOutcome, FileChange, RevisionInfo, StorageEngine};
use crate::git::GitEngine;
use crate::ignore::ProjectIgnores;
use crate::scan::{ScanReport, TreeScanner};
use crate::store::StoreMarker;
use crate::Result;
use chrono::{DateTime, Utc};
use ckpt_core::{
    validate_relative, CheckpointError, CheckpointHome, CheckpointId, ConfigStore, ExclusionMatcher, FileLock,
    LockPolicy, ProjectHash,
};
use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use walkdir::WalkDir;

/// Filtering and timeout settings for one repository
#[derive(Debug, Clone)]
pub struct ShadowOptions {
    pub matcher: ExclusionMatcher,
    pub max_file_size: u64,
    pub lock_policy: LockPolicy,
    pub storage_timeout: Duration,
}

impl Default for ShadowOptions {
    fn default() -> Self {
        Self::from_config(&ConfigStore::default()).0
    }
}

impl ShadowOptions {
    /// Build from effective config; malformed exclusion patterns are returned
    pub fn from_config(config: &ConfigStore) -> (Self, Vec<CheckpointError>) {
        let (matcher, errors) = ExclusionMatcher::compile(config.exclude_patterns());
        let options = Self {
            matcher,
            max_file_size: config.max_file_size_bytes(),
            lock_policy: LockPolicy::with_timeout(config.lock_timeout()),
            storage_timeout: config.storage_timeout(),
        };
        (options, errors)
    }
}

/// Who asked for a snapshot; stored as commit trailers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotMeta {
    pub tool: String,
    pub session_id: String,
}

impl SnapshotMeta {
    pub fn new(tool: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            session_id: session_id.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotOutcome {
    /// A new revision was recorded
    Created {
        id: CheckpointId,
        created_at: DateTime<Utc>,
        /// Affected paths to record on the checkpoint
        files: Vec<String>,
        report: ScanReport,
    },
    /// Nothing trackable changed since `head`
    Unchanged { head: Option<CheckpointId> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RestoreMode {
    /// Overwrite files from the checkpoint, leave everything else alone
    #[default]
    Merge,
    /// Merge, then delete trackable files the checkpoint does not have
    Full,
}

impl RestoreMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RestoreMode::Merge => "merge",
            RestoreMode::Full => "full",
        }
    }
}

impl std::fmt::Display for RestoreMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RestoreMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "merge" => Ok(RestoreMode::Merge),
            "full" => Ok(RestoreMode::Full),
            other => Err(format!("unknown restore mode `{}` (expected merge or full)", other)),
        }
    }
}

/// What a restore would do, computed without touching the working tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestorePlan {
    pub id: CheckpointId,
    pub mode: RestoreMode,
    /// Files the checkpoint will write
    pub write: Vec<String>,
    /// Files a full restore will delete
    pub delete: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreReport {
    pub written: Vec<String>,
    pub deleted: Vec<String>,
    pub dirs_removed: Vec<String>,
}

/// Isolated snapshot store for one project
pub struct ShadowRepository {
    project_root: PathBuf,
    project_hash: ProjectHash,
    repo_dir: PathBuf,
    marker_path: PathBuf,
    lock_path: PathBuf,
    options: ShadowOptions,
    scanner: TreeScanner,
    engine: Box<dyn StorageEngine>,
}

impl std::fmt::Debug for ShadowRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShadowRepository")
            .field("project_root", &self.project_root)
            .field("project_hash", &self.project_hash)
            .field("repo_dir", &self.repo_dir)
            .finish_non_exhaustive()
    }
}

impl ShadowRepository {
    /// Stable hash of a project directory
    pub fn identify(project_path: &Path) -> Result<ProjectHash> {
        ProjectHash::identify(project_path).map(|(hash, _)| hash)
    }

    /// Open (without creating) the store for `project_path`
    pub fn open(home: &CheckpointHome, project_path: &Path, options: ShadowOptions) -> Result<Self> {
        let (project_hash, project_root) = ProjectHash::identify(project_path)?;
        if !project_root.is_dir() {
            return Err(CheckpointError::path_validation(
                project_path.display().to_string(),
                "project path is not a directory",
            ));
        }

        let repo_dir = home.repo_dir(&project_hash);
        let engine = GitEngine::new(&repo_dir, &project_root, options.storage_timeout);
        let scanner = TreeScanner::new(&project_root, options.matcher.clone(), options.max_file_size);

        Ok(Self {
            marker_path: home.marker_path(&project_hash),
            lock_path: home.project_lock_path(&project_hash),
            project_root,
            project_hash,
            repo_dir,
            options,
            scanner,
            engine: Box::new(engine),
        })
    }

    /// Replace the storage engine
    pub fn with_engine(mut self, engine: Box<dyn StorageEngine>) -> Self {
        self.engine = engine;
        self
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn project_hash(&self) -> &ProjectHash {
        &self.project_hash
    }

    pub fn repo_dir(&self) -> &Path {
        &self.repo_dir
    }

    pub fn options(&self) -> &ShadowOptions {
        &self.options
    }

    pub fn is_initialized(&self) -> bool {
        self.engine.is_initialized()
    }

    /// Acquire the project lock
    pub async fn lock(&self) -> Result<FileLock> {
        FileLock::acquire_async(&self.lock_path, &self.options.lock_policy).await
    }

    /// Create the store if needed; safe to call repeatedly
    pub async fn ensure_initialized(&self) -> Result<()> {
        if self.engine.is_initialized() && self.marker_path.is_file() {
            return Ok(());
        }
        let _lock = self.lock().await?;
        self.init_locked().await
    }

    async fn init_locked(&self) -> Result<()> {
        self.engine.init().await?;
        if StoreMarker::read(&self.marker_path).is_none() {
            StoreMarker::new(&self.project_root).write(&self.marker_path)?;
        }
        Ok(())
    }

    /// Validate affected paths and drop those that are excluded or oversized
    ///
    /// Paths that do not exist yet are kept (the tool may be about to create
    /// them). Any path escaping the project is an error.
    pub fn filter_paths<S: AsRef<str>>(&self, paths: &[S]) -> Result<Vec<String>> {
        let mut kept = BTreeSet::new();
        for raw in paths {
            let rel = validate_relative(&self.project_root, raw.as_ref())?;
            if self.admits(&rel) {
                kept.insert(rel);
            } else {
                tracing::debug!("Filtered affected path {}", rel);
            }
        }
        Ok(kept.into_iter().collect())
    }

    fn admits(&self, rel: &str) -> bool {
        if self.options.matcher.matches(rel) {
            return false;
        }
        match std::fs::symlink_metadata(self.project_root.join(rel)) {
            Ok(meta) if meta.is_dir() => false,
            Ok(meta) => meta.file_type().is_symlink() || meta.len() <= self.options.max_file_size,
            Err(_) => true,
        }
    }

    /// Record the filtered working tree as a new revision
    ///
    /// `paths` are the affected files recorded on the checkpoint. When empty,
    /// the files changed since the previous head are recorded instead.
    pub async fn snapshot(&self, paths: &[String], message: &str, meta: &SnapshotMeta) -> Result<SnapshotOutcome> {
        let (outcome, _lock) = self.snapshot_held(paths, message, meta).await?;
        Ok(outcome)
    }

    /// [`snapshot`](Self::snapshot), handing back the still-held project lock
    ///
    /// Callers that record the revision elsewhere keep the guard until that
    /// record is written, so records of one project land in commit order.
    pub async fn snapshot_held(
        &self,
        paths: &[String],
        message: &str,
        meta: &SnapshotMeta,
    ) -> Result<(SnapshotOutcome, FileLock)> {
        let lock = self.lock().await?;
        let outcome = self.snapshot_locked(paths, message, meta).await?;
        Ok((outcome, lock))
    }

    async fn snapshot_locked(&self, paths: &[String], message: &str, meta: &SnapshotMeta) -> Result<SnapshotOutcome> {
        if !self.engine.is_initialized() {
            self.init_locked().await?;
        }

        let report = self.scan().await?;
        for (path, size) in &report.oversized {
            tracing::warn!("Skipped {} ({} bytes) from snapshot: over size limit", path, size);
        }

        let previous = self.engine.head().await?;
        let tree = self.engine.stage(&report.files).await?;
        let outcome = self.engine.commit(&tree, &commit_message(message, meta)).await?;

        match outcome {
            CommitOutcome::Unchanged(head) => {
                tracing::debug!("No trackable change in {}; head {:?}", self.project_root.display(), head);
                Ok(SnapshotOutcome::Unchanged { head })
            }
            CommitOutcome::Created(id) => {
                let files = if !paths.is_empty() {
                    paths.to_vec()
                } else if let Some(previous) = &previous {
                    self.engine
                        .diff_summary(previous.as_str(), id.as_str())
                        .await?
                        .into_iter()
                        .map(|c| c.path)
                        .collect()
                } else {
                    report.files.clone()
                };
                tracing::info!("Snapshot {} of {} ({} files)", id.short(), self.project_root.display(), report.files.len());
                Ok(SnapshotOutcome::Created {
                    id,
                    created_at: Utc::now(),
                    files,
                    report,
                })
            }
        }
    }

    /// Unified diff from `from` to `to`, or to the current working state when `to` is `None`
    pub async fn diff(&self, from: &CheckpointId, to: Option<&CheckpointId>) -> Result<String> {
        let target = self.target(to).await?;
        self.engine.diff(from.as_str(), &target).await
    }

    /// Per-file changes from `from` to `to` (or the current working state)
    pub async fn changes(&self, from: &CheckpointId, to: Option<&CheckpointId>) -> Result<Vec<FileChange>> {
        let target = self.target(to).await?;
        self.engine.diff_summary(from.as_str(), &target).await
    }

    async fn target(&self, to: Option<&CheckpointId>) -> Result<String> {
        self.require_initialized()?;
        match to {
            Some(id) => Ok(id.as_str().to_string()),
            None => {
                let report = self.scan().await?;
                Ok(self.engine.stage(&report.files).await?.0)
            }
        }
    }

    /// Compute a restore without applying it
    ///
    /// Fails with `PathValidation` when writing the checkpoint would remove
    /// current content the plan does not list for deletion: the contents of a
    /// directory standing where the checkpoint has a file, or a file standing
    /// where the checkpoint needs a directory.
    pub async fn plan_restore(&self, id: &CheckpointId, mode: RestoreMode) -> Result<RestorePlan> {
        self.require_initialized()?;
        let write = self.engine.files(id).await?;

        let delete = match mode {
            RestoreMode::Merge => Vec::new(),
            RestoreMode::Full => {
                let keep: HashSet<&str> = write.iter().map(String::as_str).collect();
                self.scan()
                    .await?
                    .files
                    .into_iter()
                    .filter(|f| !keep.contains(f.as_str()))
                    .collect()
            }
        };

        let root = self.project_root.clone();
        let targets = write.clone();
        let displaced = tokio::task::spawn_blocking(move || displaced_by(&root, &targets))
            .await
            .map_err(join_error)?;

        let planned: HashSet<&str> = delete.iter().map(String::as_str).collect();
        let blocked: Vec<&str> = displaced
            .iter()
            .map(String::as_str)
            .filter(|f| !planned.contains(f))
            .collect();
        if let Some(first) = blocked.first() {
            let mut listed = blocked.iter().take(5).copied().collect::<Vec<_>>().join(", ");
            if blocked.len() > 5 {
                listed.push_str(&format!(" and {} more", blocked.len() - 5));
            }
            return Err(CheckpointError::path_validation(
                *first,
                format!(
                    "a {} restore of {} would remove {} current file(s) in its way ({}); move them aside first",
                    mode,
                    id.short(),
                    blocked.len(),
                    listed
                ),
            ));
        }

        Ok(RestorePlan {
            id: id.clone(),
            mode,
            write,
            delete,
        })
    }

    /// Restore the working tree to checkpoint `id`
    pub async fn restore(&self, id: &CheckpointId, mode: RestoreMode) -> Result<RestoreReport> {
        let _lock = self.lock().await?;
        let plan = self.plan_restore(id, mode).await?;

        // Deletions go first so nothing planned stands in the checkout's way
        let mut report = RestoreReport {
            written: plan.write,
            ..RestoreReport::default()
        };

        let mut parents = BTreeSet::new();
        for rel in plan.delete {
            let full = self.project_root.join(&rel);
            match std::fs::remove_file(&full) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            }
            if let Some(parent) = Path::new(&rel).parent() {
                if !parent.as_os_str().is_empty() {
                    parents.insert(parent.to_path_buf());
                }
            }
            report.deleted.push(rel);
        }

        // Deepest first so nested empty directories collapse upward
        let mut candidates: Vec<PathBuf> = parents.into_iter().collect();
        candidates.sort_by_key(|p| std::cmp::Reverse(p.components().count()));
        for dir in candidates {
            let mut current = Some(dir.as_path());
            while let Some(rel_dir) = current {
                if rel_dir.as_os_str().is_empty() {
                    break;
                }
                let full = self.project_root.join(rel_dir);
                if !is_empty_dir(&full) || std::fs::remove_dir(&full).is_err() {
                    break;
                }
                report.dirs_removed.push(rel_dir.to_string_lossy().replace('\\', "/"));
                current = rel_dir.parent();
            }
        }

        self.engine.checkout(id).await?;
        report.dirs_removed.retain(|d| !self.project_root.join(d).is_dir());

        tracing::info!(
            "Restored {} ({}) in {}: {} written, {} deleted",
            id.short(),
            mode,
            self.project_root.display(),
            report.written.len(),
            report.deleted.len()
        );
        Ok(report)
    }

    /// Files recorded in checkpoint `id`
    pub async fn files(&self, id: &CheckpointId) -> Result<Vec<String>> {
        self.require_initialized()?;
        self.engine.files(id).await
    }

    pub async fn head(&self) -> Result<Option<CheckpointId>> {
        if !self.engine.is_initialized() {
            return Ok(None);
        }
        self.engine.head().await
    }

    /// Revision history, newest first
    pub async fn list_revisions(&self) -> Result<Vec<RevisionInfo>> {
        if !self.engine.is_initialized() {
            return Ok(Vec::new());
        }
        self.engine.log().await
    }

    /// Storage housekeeping under the project lock
    pub async fn gc(&self) -> Result<()> {
        if !self.engine.is_initialized() {
            return Ok(());
        }
        let _lock = self.lock().await?;
        self.engine.gc().await
    }

    async fn scan(&self) -> Result<ScanReport> {
        let ignores = ProjectIgnores::load(&self.project_root, self.options.storage_timeout).await;
        let scanner = self.scanner.clone();
        tokio::task::spawn_blocking(move || scanner.scan_with(&ignores))
            .await
            .map_err(join_error)
    }

    fn require_initialized(&self) -> Result<()> {
        if self.engine.is_initialized() {
            Ok(())
        } else {
            Err(CheckpointError::UnknownCheckpoint(format!(
                "no checkpoints recorded for {}",
                self.project_root.display()
            )))
        }
    }
}

/// Count changes by kind: (added, removed, modified)
pub fn count_changes(changes: &[FileChange]) -> (usize, usize, usize) {
    changes.iter().fold((0, 0, 0), |(a, d, m), change| match change.kind {
        ChangeKind::Added => (a + 1, d, m),
        ChangeKind::Deleted => (a, d + 1, m),
        ChangeKind::Modified => (a, d, m + 1),
    })
}

fn commit_message(message: &str, meta: &SnapshotMeta) -> String {
    let subject = message.lines().next().map(str::trim).filter(|s| !s.is_empty()).unwrap_or("Checkpoint");
    format!(
        "{}\n\nCheckpoint-Tool: {}\nCheckpoint-Session: {}\n",
        subject,
        one_line(&meta.tool),
        one_line(&meta.session_id)
    )
}

fn one_line(value: &str) -> String {
    value.replace(['\n', '\r'], " ")
}

/// Current files that writing `targets` would remove
///
/// That is everything under a directory standing where a target file goes,
/// and any file or link standing where a target needs a parent directory.
fn displaced_by(root: &Path, targets: &[String]) -> Vec<String> {
    let mut found = BTreeSet::new();
    let mut seen_parents = HashSet::new();

    for target in targets {
        let parts: Vec<&str> = target.split('/').collect();
        for depth in 1..=parts.len() {
            let rel = parts[..depth].join("/");
            let is_target = depth == parts.len();
            if !is_target && !seen_parents.insert(rel.clone()) {
                continue;
            }
            let Ok(meta) = std::fs::symlink_metadata(root.join(&rel)) else {
                break;
            };

            if is_target {
                if meta.is_dir() {
                    let inside = WalkDir::new(root.join(&rel)).follow_links(false).min_depth(1);
                    for entry in inside.into_iter().filter_map(|e| e.ok()) {
                        if entry.file_type().is_dir() {
                            continue;
                        }
                        if let Ok(path) = entry.path().strip_prefix(root) {
                            found.insert(path.to_string_lossy().replace('\\', "/"));
                        }
                    }
                }
            } else if !meta.is_dir() {
                found.insert(rel);
                break;
            }
        }
    }

    found.into_iter().collect()
}

fn join_error(e: tokio::task::JoinError) -> CheckpointError {
    CheckpointError::Io(std::io::Error::new(std::io::ErrorKind::Other, e))
}

fn is_empty_dir(path: &Path) -> bool {
    std::fs::read_dir(path).map(|mut it| it.next().is_none()).unwrap_or(false)
}
