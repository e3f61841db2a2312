//! Restore the working tree to a checkpoint

use crate::confirm::{self, Gated, Intent};
use crate::context::Context;
use crate::engine::CheckpointEngine;
use crate::restore::{Restored, RestoreWorkflow};
use crate::util;
use anyhow::{bail, Result};
use journal::{Checkpoint, CheckpointQuery};
use owo_colors::OwoColorize;
use shadow::{RestoreMode, RestorePlan};
use std::path::Path;

/// Candidates offered when no checkpoint is named
const PICK_LIMIT: usize = 20;

pub async fn run(
    ctx: &Context,
    checkpoint: Option<&str>,
    mode: RestoreMode,
    yes: bool,
    dry_run: bool,
    project: Option<&Path>,
) -> Result<()> {
    // 1. Open workflow for the project
    let project = util::project_dir(project)?;
    let workflow = RestoreWorkflow::open(ctx, &project)?;

    // 2. Resolve the checkpoint, interactively if not named
    let target = match checkpoint {
        Some(reference) => workflow.resolve(reference).await?,
        None => match pick(&workflow).await? {
            Some(cp) => cp,
            None => return Ok(()),
        },
    };

    // 3. Preview
    let preview = workflow.preview(&target).await?;
    println!("{}", "Restore Checkpoint".bold());
    println!("{}", util::SEPARATOR);
    println!();
    println!(
        "Checkpoint: {} {}",
        target.short_id().yellow(),
        util::format_relative_time(target.timestamp).dimmed()
    );
    println!("Created:    {}", util::format_absolute_time(target.timestamp));
    println!("Tool:       {}", target.tool.cyan());
    if let Some(message) = &target.message {
        println!("Message:    {}", message);
    }
    println!("Mode:       {}", mode);
    println!();
    println!(
        "Current state vs checkpoint: {} added, {} modified, {} removed",
        preview.added.to_string().green(),
        preview.modified.to_string().yellow(),
        preview.removed.to_string().red()
    );

    // 4. Gate and execute
    let engine = CheckpointEngine::new(ctx.clone());
    let outcome = workflow
        .execute(&engine, &target, mode, Intent::from_flags(yes, dry_run))
        .await?;

    let restored = match outcome {
        Gated::Done(restored) => restored,
        Gated::Previewed(plan) => {
            print_plan(&plan);
            println!();
            println!("{}", "Dry run: nothing was changed".dimmed());
            return Ok(());
        }
        Gated::AwaitingConfirmation(plan) => {
            print_plan(&plan);
            println!();
            println!("{}", "⚠️  Warning: This will overwrite files in your working directory!".red().bold());
            if !confirm::ask("Continue?")? {
                println!("{}", "Restore cancelled".yellow());
                return Ok(());
            }
            match workflow.execute(&engine, &target, mode, Intent::Confirmed).await? {
                Gated::Done(restored) => restored,
                _ => bail!("Restore did not run"),
            }
        }
    };

    // 5. Report
    print_restored(&target, &restored, mode);
    Ok(())
}

async fn pick(workflow: &RestoreWorkflow) -> Result<Option<Checkpoint>> {
    let candidates = workflow.list(CheckpointQuery::new().limit(PICK_LIMIT)).await?;
    if candidates.is_empty() {
        println!("{}", "No checkpoints to restore".dimmed());
        return Ok(None);
    }

    for (i, cp) in candidates.iter().enumerate() {
        util::display_checkpoint_compact(cp, Some(i + 1));
    }
    println!();

    let answer = confirm::prompt_line("Checkpoint to restore (number, empty to cancel):")?;
    if answer.is_empty() {
        println!("{}", "Restore cancelled".yellow());
        return Ok(None);
    }
    let index: usize = match answer.parse() {
        Ok(index) => index,
        Err(_) => bail!("Not a number: {}", answer),
    };
    match index.checked_sub(1).and_then(|i| candidates.get(i)) {
        Some(cp) => Ok(Some(cp.clone())),
        None => bail!("No checkpoint at index {}", index),
    }
}

fn print_plan(plan: &RestorePlan) {
    println!();
    println!("Files to write:  {}", plan.write.len());
    if plan.mode == RestoreMode::Full {
        println!("Files to delete: {}", plan.delete.len());
        for path in plan.delete.iter().take(10) {
            println!("  {} {}", "-".red(), path);
        }
        if plan.delete.len() > 10 {
            println!("  ... and {} more", plan.delete.len() - 10);
        }
    }
}

fn print_restored(target: &Checkpoint, restored: &Restored, mode: RestoreMode) {
    println!();
    if let Some(safety) = &restored.safety {
        println!(
            "{} Saved current state as {}",
            "✓".green(),
            safety.short_id().yellow()
        );
    }
    println!(
        "{} Restored {} files from {}",
        "✓".green(),
        restored.report.written.len().to_string().green(),
        target.short_id().yellow()
    );
    if !restored.report.deleted.is_empty() {
        println!(
            "{} Deleted {} files not in the checkpoint",
            "✓".green(),
            restored.report.deleted.len()
        );
    }
    if let Some(safety) = &restored.safety {
        println!();
        println!("{}", format!("Undo with: {}", undo_command(safety, mode)).dimmed());
    }
}

/// Command that puts back the state saved before a restore
fn undo_command(safety: &Checkpoint, mode: RestoreMode) -> String {
    match mode {
        RestoreMode::Merge => format!("ckpt restore {}", safety.short_id()),
        RestoreMode::Full => format!("ckpt restore {} --mode full", safety.short_id()),
    }
}
