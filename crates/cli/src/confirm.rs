//! Confirmation gate for destructive actions
//!
//! Workflows never read from the terminal themselves. They take an
//! [`Intent`] decided up front and return a [`Gated`] value; only the command
//! layer turns `AwaitingConfirmation` into an interactive prompt.

use anyhow::{bail, Result};
use owo_colors::OwoColorize;
use std::io::{BufRead, IsTerminal, Write};

/// What the caller decided before the workflow ran
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    /// Ask before doing anything destructive
    Prompt,
    /// Proceed without asking (`--yes`)
    Confirmed,
    /// Compute and report only (`--dry-run`)
    DryRun,
}

impl Intent {
    /// `--dry-run` wins over `--yes`
    pub fn from_flags(yes: bool, dry_run: bool) -> Self {
        if dry_run {
            Intent::DryRun
        } else if yes {
            Intent::Confirmed
        } else {
            Intent::Prompt
        }
    }
}

/// Result of a gated workflow step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Gated<P, R> {
    /// Nothing done yet; the plan needs a decision
    AwaitingConfirmation(P),
    /// Dry run: the plan, nothing done
    Previewed(P),
    Done(R),
}

/// Ask a yes/no question on the terminal
///
/// Fails when stdin is not a terminal; non-interactive callers must pass `--yes`.
pub fn ask(question: &str) -> Result<bool> {
    let stdin = std::io::stdin();
    if !stdin.is_terminal() {
        bail!("Confirmation required but stdin is not a terminal; re-run with --yes");
    }

    print!("{} {} ", question, "[y/N]".dimmed());
    std::io::stdout().flush()?;

    let mut input = String::new();
    stdin.lock().read_line(&mut input)?;
    Ok(matches!(input.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}

/// Read one line from the terminal (for index selection)
pub fn prompt_line(question: &str) -> Result<String> {
    let stdin = std::io::stdin();
    if !stdin.is_terminal() {
        bail!("Input required but stdin is not a terminal; pass the checkpoint explicitly");
    }

    print!("{} ", question);
    std::io::stdout().flush()?;

    let mut input = String::new();
    stdin.lock().read_line(&mut input)?;
    Ok(input.trim().to_string())
}
