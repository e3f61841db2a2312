//! Retention sweeps and orphaned-store cleanup

use crate::confirm::{Gated, Intent};
use crate::context::Context;
use anyhow::{Context as _, Result};
use chrono::{DateTime, Duration, Utc};
use ckpt_core::{CheckpointId, ProjectHash};
use journal::Checkpoint;
use shadow::StoreEntry;

/// What a sweep removed (or, for a dry run, would remove)
#[derive(Debug, Clone, Default)]
pub struct SweepReport {
    pub dry_run: bool,
    pub cutoff: Option<DateTime<Utc>>,
    /// Expired records
    pub pruned: Vec<Checkpoint>,
    /// Pending records past the stale threshold, now failed
    pub reclaimed: Vec<CheckpointId>,
    /// Stores that got housekeeping
    pub housekept: usize,
}

#[derive(Debug, Clone, Default)]
pub struct OrphanReport {
    pub removed: Vec<ProjectHash>,
    pub records_removed: usize,
    pub bytes_freed: u64,
}

pub struct RetentionManager {
    ctx: Context,
}

impl RetentionManager {
    pub fn new(ctx: Context) -> Self {
        Self { ctx }
    }

    /// Prune expired records and reclaim stale pending ones
    ///
    /// `retention_days` overrides the configured value. `project` limits the
    /// sweep to one project; `None` sweeps every project.
    pub async fn sweep(
        &self,
        now: DateTime<Utc>,
        retention_days: Option<u32>,
        project: Option<&ProjectHash>,
        dry_run: bool,
    ) -> Result<SweepReport> {
        let days = retention_days.unwrap_or_else(|| self.ctx.config.retention_days()).max(1);
        let cutoff = now - Duration::days(i64::from(days));
        let stale_after = Duration::from_std(self.ctx.config.stale_pending_after()).unwrap_or(Duration::hours(1));
        let stale_cutoff = now - stale_after;
        let scope = project.cloned();

        let mut report = SweepReport {
            dry_run,
            cutoff: Some(cutoff),
            ..SweepReport::default()
        };

        if dry_run {
            let scope_a = scope.clone();
            report.pruned = self
                .ctx
                .metadata(move |store| store.prune_candidates(cutoff, scope_a.as_ref()))
                .await?;
            let scope_b = scope.clone();
            report.reclaimed = self
                .ctx
                .metadata(move |store| store.stale_pending(stale_cutoff, scope_b.as_ref()))
                .await?
                .into_iter()
                .map(|c| c.id)
                .collect();
            return Ok(report);
        }

        let scope_a = scope.clone();
        report.reclaimed = self
            .ctx
            .metadata(move |store| store.reclaim_stale(stale_cutoff, scope_a.as_ref()))
            .await
            .context("Failed to reclaim stale checkpoints")?;

        let scope_b = scope.clone();
        report.pruned = self
            .ctx
            .metadata(move |store| {
                let doomed = store.prune_candidates(cutoff, scope_b.as_ref())?;
                let removed = store.prune(cutoff, scope_b.as_ref())?;
                if removed != doomed.len() {
                    tracing::debug!("Prune removed {} of {} candidates", removed, doomed.len());
                }
                Ok(doomed)
            })
            .await
            .context("Failed to prune checkpoints")?;

        let stores = shadow::list_stores(&self.ctx.home)?;
        for entry in stores.iter().filter(|s| scope.as_ref().map_or(true, |p| &s.hash == p)) {
            match shadow::housekeep(
                &self.ctx.home,
                &entry.hash,
                &self.ctx.lock_policy(),
                self.ctx.config.storage_timeout(),
            )
            .await
            {
                Ok(()) => report.housekept += 1,
                Err(e) => tracing::warn!("Housekeeping of store {} failed: {}", entry.hash, e),
            }
        }

        tracing::info!(
            "Sweep removed {} checkpoints older than {} days, reclaimed {} stale",
            report.pruned.len(),
            days,
            report.reclaimed.len()
        );
        Ok(report)
    }

    /// Stores whose source project no longer exists
    pub fn orphans(&self) -> Result<Vec<StoreEntry>> {
        Ok(shadow::list_stores(&self.ctx.home)?
            .into_iter()
            .filter(StoreEntry::is_orphaned)
            .collect())
    }

    /// Find orphaned stores; delete them and their records only when confirmed
    pub async fn orphan_scan(&self, intent: Intent) -> Result<Gated<Vec<StoreEntry>, OrphanReport>> {
        let orphans = self.orphans()?;

        match intent {
            Intent::DryRun => return Ok(Gated::Previewed(orphans)),
            Intent::Prompt if !orphans.is_empty() => return Ok(Gated::AwaitingConfirmation(orphans)),
            Intent::Prompt => return Ok(Gated::Done(OrphanReport::default())),
            Intent::Confirmed => {}
        }

        let mut report = OrphanReport::default();
        for entry in orphans {
            shadow::remove_store(&self.ctx.home, &entry.hash, &self.ctx.lock_policy())
                .await
                .with_context(|| format!("Failed to remove store {}", entry.dir.display()))?;

            let hash = entry.hash.clone();
            report.records_removed += self.ctx.metadata(move |store| store.remove_project(&hash)).await?;
            report.bytes_freed += entry.size_bytes;
            report.removed.push(entry.hash);
        }

        tracing::info!("Removed {} orphaned stores", report.removed.len());
        Ok(Gated::Done(report))
    }
}
