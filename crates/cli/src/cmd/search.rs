//! Search checkpoint messages, tools and paths

use crate::context::Context;
use crate::restore::RestoreWorkflow;
use crate::util;
use anyhow::{bail, Result};
use owo_colors::OwoColorize;
use std::path::Path;

pub async fn run(ctx: &Context, term: &str, limit: Option<usize>, project: Option<&Path>) -> Result<()> {
    if term.trim().is_empty() {
        bail!("Search term must not be empty");
    }

    let project = util::project_dir(project)?;
    let workflow = RestoreWorkflow::open(ctx, &project)?;
    let matches = workflow.search(term, limit).await?;

    if matches.is_empty() {
        println!("{}", format!("No checkpoints matching \"{}\"", term).dimmed());
        return Ok(());
    }

    println!("{} matching \"{}\"", matches.len().to_string().bold(), term.cyan());
    println!("{}", util::SEPARATOR);
    for cp in &matches {
        util::display_checkpoint_compact(cp, None);
    }

    Ok(())
}
