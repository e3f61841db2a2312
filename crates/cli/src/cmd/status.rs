//! Show checkpoint status for the current project

use crate::context::Context;
use crate::util;
use anyhow::{Context as _, Result};
use owo_colors::OwoColorize;
use std::path::Path;

pub async fn run(ctx: &Context, project: Option<&Path>) -> Result<()> {
    // 1. Identify project and its store
    let project = util::project_dir(project)?;
    let repo = ctx.shadow(&project).context("Failed to identify project")?;
    let hash = repo.project_hash().clone();

    let store_size = shadow::list_stores(&ctx.home)?
        .into_iter()
        .find(|entry| entry.hash == hash)
        .map(|entry| entry.size_bytes);

    // 2. Gather statistics
    let stats_hash = hash.clone();
    let stats = ctx.metadata(move |store| store.stats(&stats_hash)).await?;

    // 3. Display
    println!("{}", "Checkpoint Status".bold());
    println!("{}", util::SEPARATOR);
    println!();
    println!("Project:     {}", repo.project_root().display());
    println!("Hash:        {}", hash.as_str().yellow());
    match store_size {
        Some(size) => println!(
            "Store:       {} ({})",
            repo.repo_dir().display(),
            util::format_size(size)
        ),
        None => println!("Store:       {}", "not created yet".dimmed()),
    }
    println!(
        "Enabled:     {}",
        if ctx.config.is_enabled() { "yes".green().to_string() } else { "no".red().to_string() }
    );
    println!();

    println!("{}", "Checkpoints".bold());
    println!(
        "  {} total, {} completed, {} failed, {} pending",
        stats.total.to_string().bold(),
        stats.completed.to_string().green(),
        stats.failed.to_string().red(),
        stats.pending.to_string().yellow()
    );
    if let Some(latest) = &stats.latest {
        println!();
        println!("{}", "Latest".bold());
        util::display_checkpoint_compact(latest, None);
    }

    if !stats.most_modified.is_empty() {
        println!();
        println!("{}", "Most modified files".bold());
        for (path, count) in &stats.most_modified {
            println!("  {:>4}  {}", count.to_string().cyan(), path);
        }
    }

    println!();
    println!(
        "{}",
        format!("Metadata: {} ({})", ctx.home.metadata_path().display(), util::format_size(ctx.metadata.size_bytes()))
            .dimmed()
    );

    Ok(())
}
