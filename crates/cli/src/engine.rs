//! Checkpoint engine - orchestrates hook calls across both stores
//!
//! A hook-driven checkpoint moves through
//! `Received → Validated → Snapshotted → AwaitingResult → Finalized`.
//! The pre-operation path is the failure-isolation boundary: whatever goes
//! wrong inside it is logged and reported as a skip, never as an error, so
//! the edit being protected always proceeds.

use crate::context::Context;
use crate::hook::ToolInvocation;
use chrono::Utc;
use ckpt_core::{CheckpointError, CheckpointId, ProjectHash};
use journal::{Checkpoint, CheckpointStatus};
use shadow::{ShadowRepository, SnapshotMeta, SnapshotOutcome};
use std::fmt;
use std::path::Path;
use tokio::time::timeout;

/// Session id recorded on manual checkpoints
pub const MANUAL_SESSION: &str = "manual";

/// Where a hook-driven checkpoint is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    Validated,
    Snapshotted,
    AwaitingResult,
    Finalized(CheckpointStatus),
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Received => f.write_str("received"),
            Stage::Validated => f.write_str("validated"),
            Stage::Snapshotted => f.write_str("snapshotted"),
            Stage::AwaitingResult => f.write_str("awaiting result"),
            Stage::Finalized(status) => write!(f, "finalized ({})", status),
        }
    }
}

/// Why no checkpoint was taken
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    Disabled,
    UnsupportedTool(String),
    AllPathsFiltered,
    ProjectUnresolvable(String),
    /// The working tree already matches `head`
    NoChanges { head: Option<CheckpointId> },
    TimedOut,
    Failed(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Disabled => f.write_str("checkpointing is disabled"),
            SkipReason::UnsupportedTool(tool) => write!(f, "tool `{}` does not edit files", tool),
            SkipReason::AllPathsFiltered => f.write_str("every affected path is excluded or oversized"),
            SkipReason::ProjectUnresolvable(detail) => write!(f, "project directory unresolvable: {}", detail),
            SkipReason::NoChanges { .. } => f.write_str("no changes since the last checkpoint"),
            SkipReason::TimedOut => f.write_str("timed out"),
            SkipReason::Failed(detail) => write!(f, "failed: {}", detail),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PreOutcome {
    Created(Checkpoint),
    Skipped(SkipReason),
}

impl PreOutcome {
    pub fn checkpoint(&self) -> Option<&Checkpoint> {
        match self {
            PreOutcome::Created(cp) => Some(cp),
            PreOutcome::Skipped(_) => None,
        }
    }
}

/// How a post-operation call finds its checkpoint
#[derive(Debug, Clone, Copy)]
pub enum Correlation<'a> {
    /// Full id or unique prefix
    Id(&'a str),
    /// Newest pending checkpoint for this project, session and tool
    Latest {
        project: &'a Path,
        session: &'a str,
        tool: &'a str,
    },
}

pub struct CheckpointEngine {
    ctx: Context,
}

impl CheckpointEngine {
    pub fn new(ctx: Context) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    /// Snapshot before a tool runs; never fails
    pub async fn pre_operation(&self, invocation: &ToolInvocation, session: &str, project: &Path) -> PreOutcome {
        let budget = self.ctx.config.storage_timeout() + self.ctx.config.lock_timeout();

        let outcome = match timeout(budget, self.try_pre_operation(invocation, session, project)).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err((stage, e))) if e.is_retryable() => {
                tracing::warn!("Checkpoint skipped at {} stage: {}", stage, e);
                PreOutcome::Skipped(SkipReason::TimedOut)
            }
            Ok(Err((stage, e))) => {
                tracing::error!("Checkpoint failed at {} stage: {}", stage, e);
                PreOutcome::Skipped(SkipReason::Failed(e.to_string()))
            }
            Err(_) => {
                tracing::warn!("Checkpoint skipped: exceeded {:?} budget", budget);
                PreOutcome::Skipped(SkipReason::TimedOut)
            }
        };

        if let PreOutcome::Skipped(reason) = &outcome {
            tracing::debug!("{} for {} skipped: {}", invocation.tool_name(), project.display(), reason);
        }
        outcome
    }

    async fn try_pre_operation(
        &self,
        invocation: &ToolInvocation,
        session: &str,
        project: &Path,
    ) -> Result<PreOutcome, (Stage, CheckpointError)> {
        let mut stage = Stage::Received;
        tracing::debug!("{} {} in {}", stage, invocation.tool_name(), project.display());

        if !self.ctx.config.is_enabled() {
            return Ok(PreOutcome::Skipped(SkipReason::Disabled));
        }
        if !invocation.is_supported() {
            return Ok(PreOutcome::Skipped(SkipReason::UnsupportedTool(
                invocation.tool_name().to_string(),
            )));
        }

        let repo = match self.ctx.shadow(project) {
            Ok(repo) => repo,
            Err(e) => return Ok(PreOutcome::Skipped(SkipReason::ProjectUnresolvable(e.to_string()))),
        };

        // Invocations without paths (manual, or a payload missing `file_path`) snapshot everything
        let affected = invocation.affected_paths();
        let paths = repo.filter_paths(&affected).map_err(|e| (stage, e))?;
        if !affected.is_empty() && paths.is_empty() {
            return Ok(PreOutcome::Skipped(SkipReason::AllPathsFiltered));
        }
        stage = Stage::Validated;

        // The project lock stays held until the record is appended
        let meta = SnapshotMeta::new(invocation.tool_name(), session);
        let (outcome, _lock) = repo
            .snapshot_held(&paths, &invocation.describe(), &meta)
            .await
            .map_err(|e| (stage, e))?;
        stage = Stage::Snapshotted;

        let checkpoint = match self.record(&repo, outcome, &meta, &invocation.describe(), CheckpointStatus::Pending).await {
            Ok(PreOutcome::Created(cp)) => cp,
            Ok(skipped) => return Ok(skipped),
            Err(e) => return Err((stage, e)),
        };

        tracing::info!("{} checkpoint {} ({})", Stage::AwaitingResult, checkpoint.short_id(), checkpoint.tool);
        Ok(PreOutcome::Created(checkpoint))
    }

    /// Record a tool's result; unknown or already-final checkpoints are logged and ignored
    pub async fn post_operation(&self, correlation: Correlation<'_>, success: bool) -> Option<Checkpoint> {
        let status = if success {
            CheckpointStatus::Completed
        } else {
            CheckpointStatus::Failed
        };

        match self.try_post_operation(correlation, status).await {
            Ok(Some(checkpoint)) => {
                tracing::info!("{} checkpoint {}", Stage::Finalized(status), checkpoint.short_id());
                Some(checkpoint)
            }
            Ok(None) => {
                tracing::debug!("No pending checkpoint for {:?}", correlation);
                None
            }
            Err(e) => {
                tracing::warn!("Could not finalize checkpoint: {}", e);
                None
            }
        }
    }

    async fn try_post_operation(
        &self,
        correlation: Correlation<'_>,
        status: CheckpointStatus,
    ) -> ckpt_core::Result<Option<Checkpoint>> {
        let target = match correlation {
            Correlation::Id(reference) => {
                let reference = reference.to_string();
                self.ctx.metadata(move |store| store.resolve(None, &reference)).await?
            }
            Correlation::Latest { project, session, tool } => {
                let (hash, _) = ProjectHash::identify(project)?;
                let (session, tool) = (session.to_string(), tool.to_string());
                match self
                    .ctx
                    .metadata(move |store| store.latest_pending(&hash, &session, &tool))
                    .await?
                {
                    Some(cp) => cp,
                    None => return Ok(None),
                }
            }
        };

        let id = target.id.clone();
        let updated = self.ctx.metadata(move |store| store.update_status(&id, status)).await?;
        Ok(Some(updated))
    }

    /// Session-end checkpoint, when `checkpoint_on_stop` is on; never fails
    pub async fn on_stop(&self, session: &str, project: &Path) -> PreOutcome {
        if !self.ctx.config.is_enabled() || !self.ctx.config.checkpoint_on_stop() {
            return PreOutcome::Skipped(SkipReason::Disabled);
        }

        let budget = self.ctx.config.storage_timeout() + self.ctx.config.lock_timeout();
        match timeout(budget, self.checkpoint_now(project, "Stop", session, "Session end checkpoint")).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) if e.is_retryable() => {
                tracing::warn!("Session end checkpoint skipped: {}", e);
                PreOutcome::Skipped(SkipReason::TimedOut)
            }
            Ok(Err(e)) => {
                tracing::error!("Session end checkpoint failed: {}", e);
                PreOutcome::Skipped(SkipReason::Failed(e.to_string()))
            }
            Err(_) => PreOutcome::Skipped(SkipReason::TimedOut),
        }
    }

    /// User-requested checkpoint; errors are returned
    ///
    /// Runs even when hook checkpointing is disabled.
    pub async fn manual(&self, message: Option<&str>, project: &Path) -> ckpt_core::Result<PreOutcome> {
        let message = ToolInvocation::Manual {
            message: message.map(str::to_string),
        }
        .describe();
        self.checkpoint_now(project, "Manual", MANUAL_SESSION, &message).await
    }

    /// Snapshot the whole project and record it directly as completed
    pub async fn checkpoint_now(
        &self,
        project: &Path,
        tool: &str,
        session: &str,
        message: &str,
    ) -> ckpt_core::Result<PreOutcome> {
        let repo = self.ctx.shadow(project)?;
        let meta = SnapshotMeta::new(tool, session);
        let (outcome, _lock) = repo.snapshot_held(&[], message, &meta).await?;
        self.record(&repo, outcome, &meta, message, CheckpointStatus::Completed).await
    }

    async fn record(
        &self,
        repo: &ShadowRepository,
        outcome: SnapshotOutcome,
        meta: &SnapshotMeta,
        message: &str,
        status: CheckpointStatus,
    ) -> ckpt_core::Result<PreOutcome> {
        let (id, created_at, files) = match outcome {
            SnapshotOutcome::Created { id, created_at, files, .. } => (id, created_at, files),
            SnapshotOutcome::Unchanged { head } => return Ok(PreOutcome::Skipped(SkipReason::NoChanges { head })),
        };

        let mut checkpoint = Checkpoint::new(
            id,
            repo.project_hash().clone(),
            created_at,
            meta.tool.clone(),
            meta.session_id.clone(),
        )
        .with_message(message)
        .with_files(files);
        if status != CheckpointStatus::Pending {
            checkpoint = checkpoint.with_status(status);
            checkpoint.status_updated = Some(Utc::now());
        }

        let record = checkpoint.clone();
        if let Err(e) = self.ctx.metadata(move |store| store.append(record)).await {
            // The revision exists but no record claims it; the next snapshot supersedes it
            tracing::error!("Revision {} created but not recorded: {}", checkpoint.short_id(), e);
            return Err(e);
        }
        Ok(PreOutcome::Created(checkpoint))
    }
}
