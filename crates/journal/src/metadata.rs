//! Durable metadata index over checkpoints
//!
//! The index is a single pretty-printed JSON array (oldest record first)
//! shared by every project of an installation. Writers:
//!
//! 1. take the metadata lock (advisory, bounded wait with backoff)
//! 2. read the current document
//! 3. apply their change in memory
//! 4. write a temp file in the same directory, fsync it, rename it over the document
//!
//! Readers do not lock; they may see a slightly stale document but never a
//! torn one. A document that fails to parse is moved aside and the store
//! continues as empty.

use crate::checkpoint::{Checkpoint, CheckpointStatus};
use crate::query::CheckpointQuery;
use crate::recovery::{self, TEMP_PREFIX, TEMP_SUFFIX};
use crate::retention::{self, ProjectStats};
use crate::Result;
use chrono::{DateTime, Utc};
use ckpt_core::{CheckpointError, CheckpointHome, CheckpointId, FileLock, LockPolicy, ProjectHash};
use std::collections::BTreeSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default cap on the serialized document (1 MiB)
pub const DEFAULT_CAPACITY: u64 = 1024 * 1024;

/// Temp files older than this are treated as abandoned
const TEMP_MAX_AGE: Duration = Duration::from_secs(3600);

/// Handle on the metadata document; cheap to clone, holds no open files
#[derive(Debug, Clone)]
pub struct MetadataStore {
    path: PathBuf,
    lock_path: PathBuf,
    policy: LockPolicy,
    capacity: u64,
}

impl MetadataStore {
    /// Store at the installation's standard location
    pub fn open(home: &CheckpointHome, policy: LockPolicy) -> Self {
        Self::at(home.metadata_path(), home.metadata_lock_path(), policy)
    }

    pub fn at(path: impl Into<PathBuf>, lock_path: impl Into<PathBuf>, policy: LockPolicy) -> Self {
        Self {
            path: path.into(),
            lock_path: lock_path.into(),
            policy,
            capacity: DEFAULT_CAPACITY,
        }
    }

    pub fn with_capacity(mut self, bytes: u64) -> Self {
        self.capacity = bytes;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Record a new checkpoint
    ///
    /// Fails with `CapacityExceeded` when the document would outgrow its cap,
    /// and with `DuplicateCheckpoint` when the id is already recorded for the project.
    pub fn append(&self, checkpoint: Checkpoint) -> Result<()> {
        self.mutate(|records| {
            if records
                .iter()
                .any(|c| c.id == checkpoint.id && c.project_hash == checkpoint.project_hash)
            {
                return Err(CheckpointError::DuplicateCheckpoint(checkpoint.id.to_string()));
            }
            tracing::debug!(
                "Recording checkpoint {} ({}) for project {}",
                checkpoint.short_id(),
                checkpoint.status,
                checkpoint.project_hash
            );
            records.push(checkpoint);
            Ok(((), true))
        })
    }

    /// Matching checkpoints, newest first
    ///
    /// Ordered by timestamp; records sharing a timestamp keep document order,
    /// later entries first. Works on a snapshot of the document taken when called.
    pub fn query(&self, query: &CheckpointQuery) -> Result<impl Iterator<Item = Checkpoint>> {
        let records = self.read_snapshot()?;
        let limit = query.limit.unwrap_or(usize::MAX);

        let mut matching: Vec<(usize, Checkpoint)> = records
            .into_iter()
            .enumerate()
            .filter(|(_, cp)| query.matches(cp))
            .collect();
        matching.sort_by(|(pos_a, a), (pos_b, b)| b.timestamp.cmp(&a.timestamp).then(pos_b.cmp(pos_a)));

        Ok(matching.into_iter().map(|(_, cp)| cp).take(limit))
    }

    /// Every record, oldest first
    pub fn all(&self) -> Result<Vec<Checkpoint>> {
        self.read_snapshot()
    }

    pub fn get(&self, id: &CheckpointId) -> Result<Option<Checkpoint>> {
        Ok(self.read_snapshot()?.into_iter().rev().find(|c| &c.id == id))
    }

    /// Resolve a full id or a unique prefix (at least four hex characters)
    pub fn resolve(&self, project: Option<&ProjectHash>, reference: &str) -> Result<Checkpoint> {
        let reference = reference.trim().to_ascii_lowercase();
        let records = self.read_snapshot()?;
        let in_scope = |c: &&Checkpoint| project.map_or(true, |p| &c.project_hash == p);

        if let Ok(id) = CheckpointId::parse(&reference) {
            return records
                .iter()
                .rev()
                .filter(in_scope)
                .find(|c| c.id == id)
                .cloned()
                .ok_or(CheckpointError::UnknownCheckpoint(reference));
        }

        if !CheckpointId::is_prefix_candidate(&reference) {
            return Err(CheckpointError::UnknownCheckpoint(reference));
        }

        let mut matching: Vec<&Checkpoint> = records
            .iter()
            .filter(in_scope)
            .filter(|c| c.id.starts_with(&reference))
            .collect();
        matching.dedup_by(|a, b| a.id == b.id);

        match matching.len() {
            0 => Err(CheckpointError::UnknownCheckpoint(reference)),
            1 => Ok(matching[0].clone()),
            count => Err(CheckpointError::AmbiguousCheckpoint {
                prefix: reference,
                count,
            }),
        }
    }

    /// Newest checkpoint of a project
    pub fn latest(&self, project: &ProjectHash) -> Result<Option<Checkpoint>> {
        Ok(self.query(&CheckpointQuery::new().project(project).limit(1))?.next())
    }

    /// Newest pending checkpoint matching a project, session and tool
    pub fn latest_pending(&self, project: &ProjectHash, session: &str, tool: &str) -> Result<Option<Checkpoint>> {
        let query = CheckpointQuery::new()
            .project(project)
            .session(session)
            .tool(tool)
            .status(CheckpointStatus::Pending)
            .limit(1);
        Ok(self.query(&query)?.next())
    }

    /// Move a checkpoint out of `pending`
    pub fn update_status(&self, id: &CheckpointId, status: CheckpointStatus) -> Result<Checkpoint> {
        let now = Utc::now();
        self.mutate(|records| {
            let record = records
                .iter_mut()
                .rev()
                .find(|c| &c.id == id)
                .ok_or_else(|| CheckpointError::UnknownCheckpoint(id.to_string()))?;
            record.transition(status, now)?;
            Ok((record.clone(), true))
        })
    }

    /// Remove records older than `older_than`, keeping each project's newest
    ///
    /// Returns the number removed.
    pub fn prune(&self, older_than: DateTime<Utc>, project: Option<&ProjectHash>) -> Result<usize> {
        self.mutate(|records| {
            let expired = retention::expired_indices(records, older_than, project);
            if expired.is_empty() {
                return Ok((0, false));
            }
            let removed = expired.len();
            let doomed: BTreeSet<usize> = expired.into_iter().collect();
            let mut index = 0;
            records.retain(|_| {
                let keep = !doomed.contains(&index);
                index += 1;
                keep
            });
            Ok((removed, true))
        })
    }

    /// What [`MetadataStore::prune`] would remove, without removing it
    pub fn prune_candidates(&self, older_than: DateTime<Utc>, project: Option<&ProjectHash>) -> Result<Vec<Checkpoint>> {
        let records = self.read_snapshot()?;
        Ok(retention::expired_indices(&records, older_than, project)
            .into_iter()
            .map(|i| records[i].clone())
            .collect())
    }

    /// Pending records created before `older_than`
    pub fn stale_pending(&self, older_than: DateTime<Utc>, project: Option<&ProjectHash>) -> Result<Vec<Checkpoint>> {
        let records = self.read_snapshot()?;
        Ok(retention::stale_pending_indices(&records, older_than, project)
            .into_iter()
            .map(|i| records[i].clone())
            .collect())
    }

    /// Mark pending records created before `older_than` as failed
    pub fn reclaim_stale(&self, older_than: DateTime<Utc>, project: Option<&ProjectHash>) -> Result<Vec<CheckpointId>> {
        let now = Utc::now();
        self.mutate(|records| {
            let stale = retention::stale_pending_indices(records, older_than, project);
            let mut reclaimed = Vec::with_capacity(stale.len());
            for i in stale {
                records[i].transition(CheckpointStatus::Failed, now)?;
                tracing::info!("Reclaimed stale pending checkpoint {}", records[i].short_id());
                reclaimed.push(records[i].id.clone());
            }
            let changed = !reclaimed.is_empty();
            Ok((reclaimed, changed))
        })
    }

    /// Drop every record of a project; returns the number removed
    pub fn remove_project(&self, project: &ProjectHash) -> Result<usize> {
        self.mutate(|records| {
            let before = records.len();
            records.retain(|c| &c.project_hash != project);
            let removed = before - records.len();
            Ok((removed, removed > 0))
        })
    }

    /// Projects with at least one record
    pub fn projects(&self) -> Result<Vec<ProjectHash>> {
        let records = self.read_snapshot()?;
        let projects: BTreeSet<ProjectHash> = records.into_iter().map(|c| c.project_hash).collect();
        Ok(projects.into_iter().collect())
    }

    pub fn stats(&self, project: &ProjectHash) -> Result<ProjectStats> {
        let records = self.read_snapshot()?;
        Ok(ProjectStats::compute(records.iter().filter(|c| &c.project_hash == project)))
    }

    /// Serialized size of the current document in bytes
    pub fn size_bytes(&self) -> u64 {
        std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
    }

    /// Lock, load, apply `f`, and write back if it reports a change
    fn mutate<T>(&self, f: impl FnOnce(&mut Vec<Checkpoint>) -> Result<(T, bool)>) -> Result<T> {
        let _lock = FileLock::acquire(&self.lock_path, &self.policy)?;

        if let Some(dir) = self.path.parent() {
            if let Err(e) = recovery::cleanup_temp_files(dir, TEMP_MAX_AGE) {
                tracing::debug!("Temp file cleanup skipped: {}", e);
            }
        }

        let mut records = match self.read_document() {
            Ok(records) => records,
            Err(CheckpointError::MetadataCorruption { .. }) => {
                recovery::quarantine_corrupt(&self.path)?;
                Vec::new()
            }
            Err(e) => return Err(e),
        };

        let (value, changed) = f(&mut records)?;
        if changed {
            self.write_document(&records)?;
        }
        Ok(value)
    }

    /// Lock-free read; a corrupt document reads as empty
    fn read_snapshot(&self) -> Result<Vec<Checkpoint>> {
        match self.read_document() {
            Err(CheckpointError::MetadataCorruption { path, .. }) => {
                tracing::warn!(
                    "Metadata document {} is unreadable; treating it as empty until the next write",
                    path.display()
                );
                Ok(Vec::new())
            }
            other => other,
        }
    }

    fn read_document(&self) -> Result<Vec<Checkpoint>> {
        let content = match std::fs::read(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        if content.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }

        serde_json::from_slice(&content).map_err(|e| {
            tracing::debug!("Metadata parse error: {}", e);
            CheckpointError::MetadataCorruption {
                path: self.path.clone(),
                backup: None,
            }
        })
    }

    fn write_document(&self, records: &[Checkpoint]) -> Result<()> {
        let serialized = serde_json::to_vec_pretty(records)?;
        let size = serialized.len() as u64;
        if size > self.capacity {
            return Err(CheckpointError::CapacityExceeded {
                size,
                limit: self.capacity,
            });
        }

        let dir = self
            .path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        std::fs::create_dir_all(&dir)?;

        let mut temp = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .suffix(TEMP_SUFFIX)
            .tempfile_in(&dir)?;
        temp.write_all(&serialized)?;
        temp.as_file().sync_all()?;
        temp.persist(&self.path).map_err(|e| CheckpointError::Io(e.error))?;

        Ok(())
    }
}
