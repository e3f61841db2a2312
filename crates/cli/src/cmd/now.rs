//! Create a manual checkpoint

use crate::context::Context;
use crate::engine::{CheckpointEngine, PreOutcome, SkipReason};
use crate::util;
use anyhow::{Context as _, Result};
use owo_colors::OwoColorize;
use std::path::Path;

pub async fn run(ctx: &Context, message: Option<&str>, project: Option<&Path>) -> Result<()> {
    // 1. Resolve project
    let project = util::project_dir(project)?;

    // 2. Snapshot
    let engine = CheckpointEngine::new(ctx.clone());
    let outcome = engine
        .manual(message, &project)
        .await
        .context("Failed to create checkpoint")?;

    // 3. Report
    match outcome {
        PreOutcome::Created(cp) => {
            println!("{} Created checkpoint {}", "✓".green(), cp.short_id().yellow());
            if let Some(message) = &cp.message {
                println!("  {}", message.dimmed());
            }
            if !cp.files.is_empty() {
                println!("  {} files changed since the previous checkpoint", cp.files.len());
            }
        }
        PreOutcome::Skipped(SkipReason::NoChanges { head }) => {
            let head = head.map(|h| h.short().to_string()).unwrap_or_else(|| "none".to_string());
            println!("{}", format!("No changes since the last checkpoint ({})", head).dimmed());
        }
        PreOutcome::Skipped(reason) => println!("{}", format!("Checkpoint skipped: {}", reason).yellow()),
    }

    Ok(())
}
