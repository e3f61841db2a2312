//! Show differences between a checkpoint and another checkpoint or the working tree

use crate::context::Context;
use crate::restore::RestoreWorkflow;
use crate::util;
use anyhow::{Context as _, Result};
use owo_colors::OwoColorize;
use shadow::{ChangeKind, FileChange};
use std::path::Path;

pub async fn run(
    ctx: &Context,
    checkpoint: &str,
    other: Option<&str>,
    stat: bool,
    project: Option<&Path>,
) -> Result<()> {
    // 1. Resolve both sides
    let project = util::project_dir(project)?;
    let workflow = RestoreWorkflow::open(ctx, &project)?;
    let from = workflow.resolve(checkpoint).await?;
    let to = match other {
        Some(reference) => Some(workflow.resolve(reference).await?),
        None => None,
    };

    let target = to
        .as_ref()
        .map(|cp| cp.short_id().to_string())
        .unwrap_or_else(|| "working tree".to_string());
    println!("{} {} {}", from.short_id().yellow(), "→".dimmed(), target.yellow());
    println!("{}", util::SEPARATOR);

    let repo = workflow.repository();
    let to_id = to.as_ref().map(|cp| &cp.id);

    // 2. Summary or full diff
    if stat {
        let changes = repo.changes(&from.id, to_id).await.context("Failed to compute changes")?;
        print_stat(&changes);
        return Ok(());
    }

    let diff = repo.diff(&from.id, to_id).await.context("Failed to compute diff")?;
    if diff.trim().is_empty() {
        println!("{}", "No differences".dimmed());
    } else {
        util::print_diff(&diff);
    }

    Ok(())
}

fn print_stat(changes: &[FileChange]) {
    if changes.is_empty() {
        println!("{}", "No differences".dimmed());
        return;
    }

    for change in changes {
        let marker = match change.kind {
            ChangeKind::Added => "A".green().to_string(),
            ChangeKind::Modified => "M".yellow().to_string(),
            ChangeKind::Deleted => "D".red().to_string(),
        };
        println!("  {} {}", marker, change.path);
    }

    let (added, removed, modified) = shadow::count_changes(changes);
    println!();
    println!(
        "{} added, {} modified, {} deleted",
        added.to_string().green(),
        modified.to_string().yellow(),
        removed.to_string().red()
    );
}
