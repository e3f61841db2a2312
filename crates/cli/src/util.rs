//! Shared utilities for CLI commands

use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};
use journal::{Checkpoint, CheckpointStatus};
use owo_colors::OwoColorize;
use std::path::{Path, PathBuf};

pub const SEPARATOR: &str = "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━";

/// Project directory: `--project` if given, else the current directory
pub fn project_dir(explicit: Option<&Path>) -> Result<PathBuf> {
    match explicit {
        Some(path) => Ok(path.to_path_buf()),
        None => std::env::current_dir().context("Failed to get current directory"),
    }
}

/// Format timestamp as relative time ("2 hours ago")
pub fn format_relative_time(ts: DateTime<Utc>) -> String {
    let seconds = (Utc::now() - ts).num_seconds();
    if seconds < 0 {
        return "in the future".to_string();
    }

    if seconds < 60 {
        format!("{} seconds ago", seconds)
    } else if seconds < 3600 {
        format!("{} minutes ago", seconds / 60)
    } else if seconds < 86400 {
        format!("{} hours ago", seconds / 3600)
    } else if seconds < 604800 {
        format!("{} days ago", seconds / 86400)
    } else {
        format!("{} weeks ago", seconds / 604800)
    }
}

/// Format timestamp in local time ("2024-01-03 14:30:00")
pub fn format_absolute_time(ts: DateTime<Utc>) -> String {
    ts.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Format file size in human-readable format
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

pub fn status_label(status: CheckpointStatus) -> String {
    match status {
        CheckpointStatus::Completed => status.as_str().green().to_string(),
        CheckpointStatus::Failed => status.as_str().red().to_string(),
        CheckpointStatus::Pending => status.as_str().yellow().to_string(),
    }
}

/// Display a checkpoint in compact format, optionally numbered
pub fn display_checkpoint_compact(cp: &Checkpoint, index: Option<usize>) {
    let number = index.map(|i| format!("{:>3}. ", i)).unwrap_or_default();
    println!(
        "{}{} {} {} {}",
        number,
        cp.short_id().yellow(),
        format_relative_time(cp.timestamp).dimmed(),
        cp.tool.cyan(),
        status_label(cp.status)
    );
    if let Some(message) = &cp.message {
        println!("     {}", message);
    }
    if !cp.files.is_empty() {
        let shown: Vec<&str> = cp.files.iter().take(3).map(String::as_str).collect();
        let more = cp.files.len().saturating_sub(shown.len());
        if more > 0 {
            println!("     {} {}", shown.join(", ").dimmed(), format!("(+{} more)", more).dimmed());
        } else {
            println!("     {}", shown.join(", ").dimmed());
        }
    }
}

/// Colorize a unified diff for the terminal
pub fn print_diff(diff: &str) {
    for line in diff.lines() {
        if line.starts_with("+++") || line.starts_with("---") {
            println!("{}", line.bold());
        } else if line.starts_with('+') {
            println!("{}", line.green());
        } else if line.starts_with('-') {
            println!("{}", line.red());
        } else if line.starts_with("@@") {
            println!("{}", line.cyan());
        } else {
            println!("{}", line);
        }
    }
}
