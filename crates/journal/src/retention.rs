//! Retention rules and per-project statistics
//!
//! Age-based pruning never takes a project's most recent checkpoint, even
//! when it is older than the cutoff: every project keeps at least one
//! recovery point until the user removes the project explicitly.

use crate::checkpoint::{Checkpoint, CheckpointStatus};
use chrono::{DateTime, Utc};
use ckpt_core::ProjectHash;
use std::collections::HashMap;

/// Indices of records eligible for pruning
///
/// A record is eligible when it is older than `older_than`, belongs to
/// `project` (if given), and is not the newest record of its project.
pub fn expired_indices(
    records: &[Checkpoint],
    older_than: DateTime<Utc>,
    project: Option<&ProjectHash>,
) -> Vec<usize> {
    let newest = newest_per_project(records);

    records
        .iter()
        .enumerate()
        .filter(|(_, cp)| project.map_or(true, |p| &cp.project_hash == p))
        .filter(|(_, cp)| cp.timestamp < older_than)
        .filter(|(i, cp)| newest.get(&cp.project_hash) != Some(i))
        .map(|(i, _)| i)
        .collect()
}

/// Indices of pending records created before `older_than`
pub fn stale_pending_indices(
    records: &[Checkpoint],
    older_than: DateTime<Utc>,
    project: Option<&ProjectHash>,
) -> Vec<usize> {
    records
        .iter()
        .enumerate()
        .filter(|(_, cp)| project.map_or(true, |p| &cp.project_hash == p))
        .filter(|(_, cp)| cp.status == CheckpointStatus::Pending && cp.timestamp < older_than)
        .map(|(i, _)| i)
        .collect()
}

/// Index of the newest record for each project; later entries win ties
fn newest_per_project(records: &[Checkpoint]) -> HashMap<&ProjectHash, usize> {
    let mut newest: HashMap<&ProjectHash, usize> = HashMap::new();
    for (i, cp) in records.iter().enumerate() {
        match newest.get(&cp.project_hash) {
            Some(&j) if records[j].timestamp > cp.timestamp => {}
            _ => {
                newest.insert(&cp.project_hash, i);
            }
        }
    }
    newest
}

/// Summary of one project's checkpoint history
#[derive(Debug, Clone, Default)]
pub struct ProjectStats {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub pending: usize,
    pub latest: Option<Checkpoint>,
    /// Most frequently affected paths, most frequent first (at most five)
    pub most_modified: Vec<(String, usize)>,
}

impl ProjectStats {
    pub const TOP_FILES: usize = 5;

    pub fn compute<'a>(records: impl IntoIterator<Item = &'a Checkpoint>) -> Self {
        let mut stats = Self::default();
        let mut counts: HashMap<&str, usize> = HashMap::new();

        for cp in records {
            stats.total += 1;
            match cp.status {
                CheckpointStatus::Completed => stats.completed += 1,
                CheckpointStatus::Failed => stats.failed += 1,
                CheckpointStatus::Pending => stats.pending += 1,
            }
            for file in &cp.files {
                *counts.entry(file.as_str()).or_default() += 1;
            }
            if stats.latest.as_ref().map_or(true, |l| cp.timestamp >= l.timestamp) {
                stats.latest = Some(cp.clone());
            }
        }

        let mut ranked: Vec<(String, usize)> = counts
            .into_iter()
            .map(|(path, count)| (path.to_string(), count))
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(Self::TOP_FILES);
        stats.most_modified = ranked;

        stats
    }
}
