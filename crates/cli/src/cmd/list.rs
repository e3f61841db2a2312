//! List checkpoints for the current project

use crate::context::Context;
use crate::restore::RestoreWorkflow;
use crate::util;
use anyhow::{anyhow, Result};
use chrono::{Duration, Utc};
use journal::{CheckpointQuery, CheckpointStatus};
use owo_colors::OwoColorize;
use std::path::Path;

#[derive(Debug, Default, Clone)]
pub struct ListFilters {
    pub limit: Option<usize>,
    pub session: Option<String>,
    pub file: Option<String>,
    pub status: Option<String>,
    pub days: Option<u32>,
}

impl ListFilters {
    fn to_query(&self) -> Result<CheckpointQuery> {
        let mut query = CheckpointQuery::new();
        if let Some(session) = &self.session {
            query = query.session(session.clone());
        }
        if let Some(file) = &self.file {
            query = query.file(file.clone());
        }
        if let Some(status) = &self.status {
            let status: CheckpointStatus = status.parse().map_err(|e: String| anyhow!(e))?;
            query = query.status(status);
        }
        if let Some(days) = self.days {
            query = query.since(Utc::now() - Duration::days(i64::from(days)));
        }
        if let Some(limit) = self.limit {
            query = query.limit(limit);
        }
        Ok(query)
    }
}

pub async fn run(ctx: &Context, filters: ListFilters, project: Option<&Path>) -> Result<()> {
    let project = util::project_dir(project)?;
    let workflow = RestoreWorkflow::open(ctx, &project)?;
    let checkpoints = workflow.list(filters.to_query()?).await?;

    if checkpoints.is_empty() {
        println!("{}", "No checkpoints found".dimmed());
        return Ok(());
    }

    println!("{}", format!("Checkpoints for {}", project.display()).bold());
    println!("{}", util::SEPARATOR);
    for (i, cp) in checkpoints.iter().enumerate() {
        util::display_checkpoint_compact(cp, Some(i + 1));
    }
    println!();
    println!(
        "{}",
        format!("Restore with: ckpt restore <id|index>  ({} shown)", checkpoints.len()).dimmed()
    );

    Ok(())
}
