//! Hook entry points called by the host agent
//!
//! Reads one JSON payload from stdin. Apart from unparseable input, every
//! outcome exits successfully: a failed checkpoint must never fail the tool
//! call it guards.

use crate::context::Context;
use crate::engine::{CheckpointEngine, Correlation, PreOutcome, SkipReason};
use crate::hook::HookPayload;
use anyhow::{Context as _, Result};
use clap::ValueEnum;
use std::io::Read;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum HookKind {
    /// Before a tool runs
    Pre,
    /// After a tool ran
    Post,
    /// When the agent session ends
    Stop,
}

pub async fn run(ctx: Option<&Context>, kind: HookKind, project: Option<&Path>) -> Result<()> {
    // 1. Read and decode the payload
    let mut input = String::new();
    std::io::stdin()
        .read_to_string(&mut input)
        .context("Failed to read hook input")?;
    let payload = HookPayload::parse(&input).context("Invalid JSON input")?;

    let Some(ctx) = ctx else {
        eprintln!("Warning: Could not create checkpoint (no data directory)");
        return Ok(());
    };

    // 2. Resolve the project: --project, then the payload's cwd, then ours
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let project = project.unwrap_or_else(|| payload.project_dir(&cwd)).to_path_buf();

    let engine = CheckpointEngine::new(ctx.clone());

    // 3. Dispatch
    match kind {
        HookKind::Pre => {
            let invocation = payload.invocation();
            let outcome = engine.pre_operation(&invocation, payload.session(), &project).await;
            report(&outcome, &invocation.affected_paths());
        }
        HookKind::Post => {
            let invocation = payload.invocation();
            let correlation = match payload.checkpoint_id.as_deref() {
                Some(id) if !id.trim().is_empty() => Correlation::Id(id),
                _ => Correlation::Latest {
                    project: &project,
                    session: payload.session(),
                    tool: invocation.tool_name(),
                },
            };
            engine.post_operation(correlation, payload.success()).await;
        }
        HookKind::Stop => {
            let outcome = engine.on_stop(payload.session(), &project).await;
            report(&outcome, &[]);
        }
    }

    Ok(())
}

fn report(outcome: &PreOutcome, paths: &[String]) {
    match outcome {
        PreOutcome::Created(cp) => eprintln!("Created checkpoint: {}", cp.short_id()),
        PreOutcome::Skipped(SkipReason::AllPathsFiltered) => {
            for path in paths {
                eprintln!("Skipping checkpoint for excluded file: {}", path);
            }
        }
        PreOutcome::Skipped(SkipReason::TimedOut | SkipReason::Failed(_)) => {
            eprintln!("Warning: Could not create checkpoint")
        }
        PreOutcome::Skipped(_) => {}
    }
}
