//! Show the effective configuration

use crate::context::Context;
use crate::util;
use anyhow::{bail, Context as _, Result};
use ckpt_core::{config, Config};
use owo_colors::OwoColorize;

pub async fn run(ctx: &Context, init: bool) -> Result<()> {
    let location = ctx.config_location();

    if init {
        let Some(path) = location else {
            bail!("No config directory on this platform; set CKPT_CONFIG");
        };
        if path.exists() {
            bail!("Config already exists at {}", path.display());
        }
        config::save(&Config::default(), &path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!("{} Wrote default config to {}", "✓".green(), path.display());
        return Ok(());
    }

    println!("{}", "Configuration".bold());
    println!("{}", util::SEPARATOR);
    match &location {
        Some(path) if path.exists() => println!("Source: {}", path.display()),
        Some(path) => println!(
            "Source: {} {}",
            "defaults".dimmed(),
            format!("({} not found)", path.display()).dimmed()
        ),
        None => println!("Source: {}", "defaults".dimmed()),
    }
    println!("Data:   {}", ctx.home.root().display());
    println!();
    print!("{}", config::render(ctx.config.config()));

    let warnings = ctx.config.warnings();
    if !warnings.is_empty() {
        println!();
        println!("{}", "Warnings".yellow().bold());
        for warning in warnings {
            println!("  {} {}", "⚠".yellow(), warning);
        }
    }

    Ok(())
}
