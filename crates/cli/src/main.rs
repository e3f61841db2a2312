//! ckpt - checkpoint safety net for file-editing agents

use anyhow::{Context as _, Result};
use ckpt::cmd;
use ckpt::cmd::clean::CleanOptions;
use ckpt::cmd::hook::HookKind;
use ckpt::cmd::list::ListFilters;
use ckpt::context::Context;
use ckpt::logging;
use ckpt_core::CheckpointHome;
use clap::{Parser, Subcommand};
use shadow::RestoreMode;
use std::path::PathBuf;

/// ckpt - Automatic checkpoints before every agent edit
#[derive(Parser)]
#[command(name = "ckpt")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file (default: $CKPT_CONFIG or ~/.config/ckpt/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Project directory (default: current directory)
    #[arg(long, global = true)]
    project: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Handle a hook event (reads JSON from stdin)
    Hook {
        #[arg(value_enum)]
        kind: HookKind,
    },
    /// Create a checkpoint now
    Now {
        /// Checkpoint message
        message: Option<String>,
    },
    /// List checkpoints for this project
    List {
        /// Number of checkpoints to show
        #[arg(short = 'n', long)]
        limit: Option<usize>,
        /// Only checkpoints from this session
        #[arg(long)]
        session: Option<String>,
        /// Only checkpoints touching paths containing this text
        #[arg(long)]
        file: Option<String>,
        /// Only checkpoints with this status (pending, completed, failed)
        #[arg(long)]
        status: Option<String>,
        /// Only checkpoints from the last N days
        #[arg(long)]
        days: Option<u32>,
    },
    /// Search checkpoint messages, tools and files
    Search {
        /// Text to search for (case-insensitive)
        term: String,
        /// Maximum results
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Show changes between a checkpoint and the working tree or another checkpoint
    Diff {
        /// Checkpoint id, prefix or list index
        checkpoint: String,
        /// Second checkpoint (default: current working tree)
        other: Option<String>,
        /// Show changed files only
        #[arg(long)]
        stat: bool,
    },
    /// Restore the working tree to a checkpoint
    Restore {
        /// Checkpoint id, prefix or list index (prompts when omitted)
        checkpoint: Option<String>,
        /// merge: overwrite checkpoint files; full: also delete files not in the checkpoint
        #[arg(long, default_value = "merge")]
        mode: RestoreMode,
        /// Skip confirmation prompt
        #[arg(short = 'y', long)]
        yes: bool,
        /// Show what would change without touching files
        #[arg(long)]
        dry_run: bool,
    },
    /// Show checkpoint status for this project
    Status,
    /// Remove expired checkpoints and orphaned stores
    Clean {
        /// Show what would be removed
        #[arg(long)]
        dry_run: bool,
        /// Remove stores whose project no longer exists
        #[arg(long)]
        orphaned: bool,
        /// Override the configured retention period
        #[arg(long)]
        retention_days: Option<u32>,
        /// Skip confirmation prompt
        #[arg(short = 'y', long)]
        yes: bool,
        /// Clean even when auto_cleanup is disabled
        #[arg(long)]
        force: bool,
        /// Sweep every project, not just this one
        #[arg(long)]
        all: bool,
    },
    /// Show the effective configuration
    Config {
        /// Write a default config file if none exists
        #[arg(long)]
        init: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logging first, so config warnings reach the log
    let ctx = CheckpointHome::from_env()
        .map(|home| {
            logging::init(&home);
            Context::load(home, cli.config.as_deref())
        })
        .context("Failed to locate checkpoint data directory");
    let project = cli.project.as_deref();

    // Hooks tolerate a missing data directory; everything else needs one
    if let Commands::Hook { kind } = cli.command {
        if let Err(e) = &ctx {
            eprintln!("ckpt: {:#}", e);
        }
        return cmd::hook::run(ctx.as_ref().ok(), kind, project).await;
    }
    let ctx = ctx?;

    match cli.command {
        Commands::Hook { .. } => Ok(()),
        Commands::Now { message } => cmd::now::run(&ctx, message.as_deref(), project).await,
        Commands::List { limit, session, file, status, days } => {
            let filters = ListFilters { limit, session, file, status, days };
            cmd::list::run(&ctx, filters, project).await
        }
        Commands::Search { term, limit } => cmd::search::run(&ctx, &term, limit, project).await,
        Commands::Diff { checkpoint, other, stat } => {
            cmd::diff::run(&ctx, &checkpoint, other.as_deref(), stat, project).await
        }
        Commands::Restore { checkpoint, mode, yes, dry_run } => {
            cmd::restore::run(&ctx, checkpoint.as_deref(), mode, yes, dry_run, project).await
        }
        Commands::Status => cmd::status::run(&ctx, project).await,
        Commands::Clean { dry_run, orphaned, retention_days, yes, force, all } => {
            let options = CleanOptions { dry_run, orphaned, retention_days, yes, force, all };
            cmd::clean::run(&ctx, options, project).await
        }
        Commands::Config { init } => cmd::config::run(&ctx, init).await,
    }
}
