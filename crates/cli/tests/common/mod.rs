//! Shared helpers for CLI integration tests
#![allow(dead_code)]

pub mod cli;
pub mod fixtures;

pub use fixtures::{ProjectSize, ProjectTemplate, TestProject};

use ckpt::context::Context;
use ckpt_core::{CheckpointHome, Config, ConfigStore};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Skip the current test when `git` is not on PATH
macro_rules! require_git {
    () => {
        if !$crate::common::git_available() {
            eprintln!("skipping: git not found on PATH");
            return Ok(());
        }
    };
}

pub fn git_available() -> bool {
    std::process::Command::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Isolated installation: its own data directory and config file
pub struct TestEnv {
    home: TempDir,
    config_path: PathBuf,
}

impl TestEnv {
    pub fn new() -> anyhow::Result<Self> {
        let home = TempDir::new()?;
        let config_path = home.path().join("config.toml");
        Ok(Self { home, config_path })
    }

    pub fn home_dir(&self) -> &Path {
        self.home.path()
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Write a config file the binary will pick up
    pub fn write_config(&self, toml: &str) -> anyhow::Result<()> {
        std::fs::write(&self.config_path, toml)?;
        Ok(())
    }

    pub fn context(&self) -> Context {
        self.context_with(Config::default())
    }

    pub fn context_with(&self, config: Config) -> Context {
        Context::new(
            CheckpointHome::new(self.home.path()),
            ConfigStore::from_config(config),
        )
    }
}
