//! Retention sweep and orphaned-store cleanup

use crate::cleanup::{RetentionManager, SweepReport};
use crate::confirm::{self, Gated, Intent};
use crate::context::Context;
use crate::util;
use anyhow::{bail, Result};
use chrono::Utc;
use ckpt_core::ProjectHash;
use owo_colors::OwoColorize;
use std::path::Path;

#[derive(Debug, Default, Clone, Copy)]
pub struct CleanOptions {
    pub dry_run: bool,
    pub orphaned: bool,
    pub retention_days: Option<u32>,
    pub yes: bool,
    pub force: bool,
    pub all: bool,
}

pub async fn run(ctx: &Context, options: CleanOptions, project: Option<&Path>) -> Result<()> {
    // 1. Honour auto_cleanup
    if !ctx.config.auto_cleanup() && !options.force && !options.dry_run {
        bail!("auto_cleanup is disabled in the config; re-run with --force or --dry-run");
    }

    let manager = RetentionManager::new(ctx.clone());

    // 2. Orphaned stores
    if options.orphaned {
        return clean_orphans(&manager, Intent::from_flags(options.yes, options.dry_run)).await;
    }

    // 3. Retention sweep, scoped to this project unless --all
    let scope = if options.all {
        None
    } else {
        let project = util::project_dir(project)?;
        Some(ProjectHash::identify(&project)?.0)
    };

    let report = manager
        .sweep(Utc::now(), options.retention_days, scope.as_ref(), options.dry_run)
        .await?;
    print_sweep(&report);
    Ok(())
}

async fn clean_orphans(manager: &RetentionManager, intent: Intent) -> Result<()> {
    let done = match manager.orphan_scan(intent).await? {
        Gated::Done(report) => report,
        Gated::Previewed(orphans) => {
            if orphans.is_empty() {
                println!("{}", "No orphaned stores".dimmed());
            } else {
                println!("Would remove {} orphaned stores:", orphans.len());
                for entry in &orphans {
                    println!("  {} {}", entry.hash.as_str().yellow(), describe(entry));
                }
            }
            return Ok(());
        }
        Gated::AwaitingConfirmation(orphans) => {
            println!("{} orphaned stores:", orphans.len());
            for entry in &orphans {
                println!("  {} {}", entry.hash.as_str().yellow(), describe(entry));
            }
            println!();
            if !confirm::ask("Delete these stores and their checkpoints?")? {
                println!("{}", "Cleanup cancelled".yellow());
                return Ok(());
            }
            match manager.orphan_scan(Intent::Confirmed).await? {
                Gated::Done(report) => report,
                _ => bail!("Cleanup did not run"),
            }
        }
    };

    if done.removed.is_empty() {
        println!("{}", "No orphaned stores".dimmed());
    } else {
        println!(
            "{} Removed {} stores and {} checkpoints, freed {}",
            "✓".green(),
            done.removed.len(),
            done.records_removed,
            util::format_size(done.bytes_freed)
        );
    }
    Ok(())
}

fn describe(entry: &shadow::StoreEntry) -> String {
    let source = entry
        .source_path()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "(unknown source)".to_string());
    format!("{} {}", source, util::format_size(entry.size_bytes).dimmed())
}

fn print_sweep(report: &SweepReport) {
    let verb = if report.dry_run { "Would remove" } else { "Removed" };

    if let Some(cutoff) = report.cutoff {
        println!("{}", format!("Cutoff: {}", util::format_absolute_time(cutoff)).dimmed());
    }
    println!("{} {} expired checkpoints", verb, report.pruned.len().to_string().bold());
    for cp in report.pruned.iter().take(10) {
        util::display_checkpoint_compact(cp, None);
    }
    if report.pruned.len() > 10 {
        println!("  ... and {} more", report.pruned.len() - 10);
    }

    if !report.reclaimed.is_empty() {
        let verb = if report.dry_run { "Would mark" } else { "Marked" };
        println!("{} {} stale pending checkpoints as failed", verb, report.reclaimed.len());
    }
    if !report.dry_run && report.housekept > 0 {
        println!("{}", format!("Compacted {} stores", report.housekept).dimmed());
    }
}
