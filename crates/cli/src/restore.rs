//! Restore workflow: list, preview and execute restores for one project

use crate::confirm::{Gated, Intent};
use crate::context::Context;
use crate::engine::{CheckpointEngine, PreOutcome};
use anyhow::{bail, Context as _, Result};
use ckpt_core::CheckpointId;
use journal::{Checkpoint, CheckpointQuery};
use shadow::{count_changes, RestoreMode, RestorePlan, RestoreReport, ShadowRepository};
use std::path::Path;

/// Session id recorded on pre-restore safety checkpoints
const RESTORE_SESSION: &str = "restore";

/// Diff of a checkpoint against the current working state
#[derive(Debug, Clone)]
pub struct Preview {
    pub checkpoint: Checkpoint,
    pub diff: String,
    /// Present now, absent from the checkpoint
    pub added: usize,
    /// In the checkpoint, missing now
    pub removed: usize,
    pub modified: usize,
}

/// Outcome of a confirmed restore
#[derive(Debug, Clone)]
pub struct Restored {
    pub report: RestoreReport,
    /// Checkpoint of the state just before the restore, if anything had changed
    pub safety: Option<Checkpoint>,
}

pub struct RestoreWorkflow {
    ctx: Context,
    repo: ShadowRepository,
}

impl RestoreWorkflow {
    pub fn open(ctx: &Context, project: &Path) -> Result<Self> {
        let repo = ctx
            .shadow(project)
            .with_context(|| format!("Cannot open checkpoints for {}", project.display()))?;
        Ok(Self { ctx: ctx.clone(), repo })
    }

    pub fn repository(&self) -> &ShadowRepository {
        &self.repo
    }

    /// This project's checkpoints matching `query`, newest first
    pub async fn list(&self, query: CheckpointQuery) -> Result<Vec<Checkpoint>> {
        let query = query.project(self.repo.project_hash());
        Ok(self
            .ctx
            .metadata(move |store| Ok(store.query(&query)?.collect::<Vec<_>>()))
            .await?)
    }

    /// Case-insensitive search over messages, tools and paths
    pub async fn search(&self, term: &str, limit: Option<usize>) -> Result<Vec<Checkpoint>> {
        let mut query = CheckpointQuery::new().text(term);
        query.limit = limit;
        self.list(query).await
    }

    /// Resolve a full id, unique prefix, or 1-based index into [`list`](Self::list)
    pub async fn resolve(&self, reference: &str) -> Result<Checkpoint> {
        let reference = reference.trim();
        if reference.len() < CheckpointId::MIN_PREFIX {
            if let Ok(index) = reference.parse::<usize>() {
                let candidates = self.list(CheckpointQuery::new()).await?;
                return match index.checked_sub(1).and_then(|i| candidates.get(i)) {
                    Some(cp) => Ok(cp.clone()),
                    None => bail!("No checkpoint at index {} ({} available)", index, candidates.len()),
                };
            }
        }

        let project = self.repo.project_hash().clone();
        let reference = reference.to_string();
        Ok(self
            .ctx
            .metadata(move |store| store.resolve(Some(&project), &reference))
            .await?)
    }

    pub async fn preview(&self, checkpoint: &Checkpoint) -> Result<Preview> {
        let diff = self.repo.diff(&checkpoint.id, None).await.context("Failed to diff checkpoint")?;
        let changes = self.repo.changes(&checkpoint.id, None).await?;
        let (added, removed, modified) = count_changes(&changes);

        Ok(Preview {
            checkpoint: checkpoint.clone(),
            diff,
            added,
            removed,
            modified,
        })
    }

    /// Restore `checkpoint`, gated by `intent`
    ///
    /// A confirmed restore first checkpoints the current state so the restore
    /// itself can be undone.
    pub async fn execute(
        &self,
        engine: &CheckpointEngine,
        checkpoint: &Checkpoint,
        mode: RestoreMode,
        intent: Intent,
    ) -> Result<Gated<RestorePlan, Restored>> {
        let plan = self
            .repo
            .plan_restore(&checkpoint.id, mode)
            .await
            .with_context(|| format!("Cannot restore checkpoint {}", checkpoint.short_id()))?;

        match intent {
            Intent::DryRun => return Ok(Gated::Previewed(plan)),
            Intent::Prompt => return Ok(Gated::AwaitingConfirmation(plan)),
            Intent::Confirmed => {}
        }

        let message = format!("Before restoring {}", checkpoint.short_id());
        let safety = match engine
            .checkpoint_now(self.repo.project_root(), "Restore", RESTORE_SESSION, &message)
            .await
            .context("Failed to checkpoint current state before restoring")?
        {
            PreOutcome::Created(cp) => Some(cp),
            PreOutcome::Skipped(_) => None,
        };

        let report = self
            .repo
            .restore(&checkpoint.id, mode)
            .await
            .with_context(|| format!("Failed to restore checkpoint {}", checkpoint.short_id()))?;

        Ok(Gated::Done(Restored { report, safety }))
    }
}
