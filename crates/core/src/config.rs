//! Checkpoint configuration
//!
//! Config is stored at `~/.config/ckpt/config.toml` (Linux) or the platform
//! equivalent, and can be redirected with `CKPT_CONFIG`.
//!
//! Loading never fails. Each field is read on its own: a missing field takes
//! its default, a field of the wrong type falls back to the default, and an
//! out-of-range number is clamped to the nearest bound. Every recovery is
//! recorded as a [`ConfigWarning`] so callers can surface it.

use crate::error::{CheckpointError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use toml::Value;

/// Environment variable overriding the config file location
pub const CONFIG_ENV: &str = "CKPT_CONFIG";

/// Effective checkpoint configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Master switch for hook-driven checkpoints (default: true)
    pub enabled: bool,

    /// Days a checkpoint is kept before a sweep may prune it (default: 7, range 1-365)
    pub retention_days: u32,

    /// Glob patterns removed from snapshots
    pub exclude_patterns: Vec<String>,

    /// Files larger than this are left out of snapshots (default: 100, range 0.1-1000)
    pub max_file_size_mb: f64,

    /// Take a checkpoint when an agent session ends (default: false)
    pub checkpoint_on_stop: bool,

    /// Allow `clean` to delete without --force (default: true)
    pub auto_cleanup: bool,

    /// Bound on each storage-engine invocation (default: 30, range 1-600)
    pub storage_timeout_secs: u64,

    /// Bound on lock waits (default: 5, range 1-120)
    pub lock_timeout_secs: u64,

    /// Pending checkpoints older than this are reclaimed as failed (default: 60, range 1-10080)
    pub stale_pending_minutes: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            enabled: true,
            retention_days: 7,
            exclude_patterns: vec![
                "*.log".to_string(),
                "node_modules/".to_string(),
                ".env".to_string(),
                "__pycache__/".to_string(),
            ],
            max_file_size_mb: 100.0,
            checkpoint_on_stop: false,
            auto_cleanup: true,
            storage_timeout_secs: 30,
            lock_timeout_secs: 5,
            stale_pending_minutes: 60,
        }
    }
}

/// One recovered field: what was wrong and what was used instead
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigWarning {
    pub field: String,
    pub message: String,
}

impl ConfigWarning {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "config field `{}`: {}", self.field, self.message)
    }
}

impl From<ConfigWarning> for CheckpointError {
    fn from(warning: ConfigWarning) -> Self {
        CheckpointError::Config {
            field: warning.field,
            message: warning.message,
        }
    }
}

/// Loaded configuration plus the warnings produced while loading it
#[derive(Debug, Clone)]
pub struct ConfigStore {
    config: Config,
    warnings: Vec<ConfigWarning>,
    source: Option<PathBuf>,
}

impl ConfigStore {
    /// Wrap an in-memory config, applying the same bounds as a loaded file
    pub fn from_config(config: Config) -> Self {
        match Value::try_from(&config) {
            Ok(value) => Self::from_value(&value),
            Err(_) => Self::defaults(),
        }
    }

    /// Load from `path`; a missing file yields defaults without warnings
    pub fn load(path: &Path) -> Self {
        let mut store = match fs::read_to_string(path) {
            Ok(content) => Self::from_toml_str(&content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("Config not found at {}, using defaults", path.display());
                Self::defaults()
            }
            Err(e) => {
                let mut store = Self::defaults();
                store.warn(
                    "config",
                    format!("cannot read {}: {}; using defaults", path.display(), e),
                );
                store
            }
        };
        store.source = Some(path.to_path_buf());
        for warning in &store.warnings {
            tracing::warn!("{}", warning);
        }
        store
    }

    /// Load from `CKPT_CONFIG` or the platform config directory
    pub fn load_default() -> Self {
        match default_path() {
            Some(path) => Self::load(&path),
            None => {
                tracing::debug!("Could not determine config directory, using defaults");
                Self::defaults()
            }
        }
    }

    /// Parse a TOML document, recovering field by field
    pub fn from_toml_str(content: &str) -> Self {
        match content.parse::<toml::Table>() {
            Ok(table) => Self::from_value(&Value::Table(table)),
            Err(e) => {
                let mut store = Self::defaults();
                store.warn("config", format!("invalid TOML ({}); using defaults", e.message()));
                store
            }
        }
    }

    fn defaults() -> Self {
        Self {
            config: Config::default(),
            warnings: Vec::new(),
            source: None,
        }
    }

    fn from_value(value: &Value) -> Self {
        let mut store = Self::defaults();
        let Some(table) = value.as_table() else {
            store.warn("config", "document is not a table; using defaults");
            return store;
        };

        let defaults = Config::default();
        let mut reader = FieldReader {
            table,
            warnings: Vec::new(),
        };

        let config = Config {
            enabled: reader.bool("enabled", defaults.enabled),
            retention_days: reader.number("retention_days", defaults.retention_days as f64, 1.0, 365.0, true) as u32,
            exclude_patterns: reader.patterns("exclude_patterns", &defaults.exclude_patterns),
            max_file_size_mb: reader.number("max_file_size_mb", defaults.max_file_size_mb, 0.1, 1000.0, false),
            checkpoint_on_stop: reader.bool("checkpoint_on_stop", defaults.checkpoint_on_stop),
            auto_cleanup: reader.bool("auto_cleanup", defaults.auto_cleanup),
            storage_timeout_secs: reader.number("storage_timeout_secs", defaults.storage_timeout_secs as f64, 1.0, 600.0, true) as u64,
            lock_timeout_secs: reader.number("lock_timeout_secs", defaults.lock_timeout_secs as f64, 1.0, 120.0, true) as u64,
            stale_pending_minutes: reader.number("stale_pending_minutes", defaults.stale_pending_minutes as f64, 1.0, 10080.0, true) as u64,
        };

        store.config = config;
        store.warnings = reader.warnings;
        store
    }

    fn warn(&mut self, field: &str, message: impl Into<String>) {
        self.warnings.push(ConfigWarning::new(field, message));
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Every recovered field, in the order the fields were read
    pub fn warnings(&self) -> &[ConfigWarning] {
        &self.warnings
    }

    /// File the config was loaded from, if any
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn exclude_patterns(&self) -> &[String] {
        &self.config.exclude_patterns
    }

    pub fn retention_days(&self) -> u32 {
        self.config.retention_days
    }

    pub fn max_file_size_bytes(&self) -> u64 {
        (self.config.max_file_size_mb * 1024.0 * 1024.0) as u64
    }

    pub fn checkpoint_on_stop(&self) -> bool {
        self.config.checkpoint_on_stop
    }

    pub fn auto_cleanup(&self) -> bool {
        self.config.auto_cleanup
    }

    pub fn storage_timeout(&self) -> Duration {
        Duration::from_secs(self.config.storage_timeout_secs)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.config.lock_timeout_secs)
    }

    pub fn stale_pending_after(&self) -> Duration {
        Duration::from_secs(self.config.stale_pending_minutes * 60)
    }
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::defaults()
    }
}

/// Per-field extraction from a TOML table
struct FieldReader<'a> {
    table: &'a toml::Table,
    warnings: Vec<ConfigWarning>,
}

impl FieldReader<'_> {
    fn warn(&mut self, field: &str, message: String) {
        self.warnings.push(ConfigWarning::new(field, message));
    }

    fn bool(&mut self, field: &str, default: bool) -> bool {
        match self.table.get(field) {
            None => default,
            Some(Value::Boolean(b)) => *b,
            Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "on" | "1" => true,
                "false" | "no" | "off" | "0" => false,
                _ => {
                    self.warn(field, format!("`{}` is not a boolean; using {}", s, default));
                    default
                }
            },
            Some(other) => {
                self.warn(field, format!("expected a boolean, found {}; using {}", other.type_str(), default));
                default
            }
        }
    }

    fn number(&mut self, field: &str, default: f64, min: f64, max: f64, integer: bool) -> f64 {
        let raw = match self.table.get(field) {
            None => return default,
            Some(Value::Integer(i)) => *i as f64,
            Some(Value::Float(f)) => *f,
            Some(Value::String(s)) => match s.trim().parse::<f64>() {
                Ok(n) => n,
                Err(_) => {
                    self.warn(field, format!("`{}` is not a number; using {}", s, default));
                    return default;
                }
            },
            Some(other) => {
                self.warn(field, format!("expected a number, found {}; using {}", other.type_str(), default));
                return default;
            }
        };

        if !raw.is_finite() {
            self.warn(field, format!("{} is not finite; using {}", raw, default));
            return default;
        }

        let value = if integer { raw.trunc() } else { raw };
        if value < min {
            self.warn(field, format!("{} is below the minimum; clamped to {}", raw, min));
            min
        } else if value > max {
            self.warn(field, format!("{} is above the maximum; clamped to {}", raw, max));
            max
        } else {
            value
        }
    }

    fn patterns(&mut self, field: &str, default: &[String]) -> Vec<String> {
        match self.table.get(field) {
            None => default.to_vec(),
            Some(Value::Array(items)) => {
                let mut patterns = Vec::with_capacity(items.len());
                for (i, item) in items.iter().enumerate() {
                    match item {
                        Value::String(s) if !s.trim().is_empty() => patterns.push(s.clone()),
                        Value::String(_) => {
                            self.warn(field, format!("entry {} is empty; skipped", i));
                        }
                        other => {
                            self.warn(field, format!("entry {} is a {}, not a string; skipped", i, other.type_str()));
                        }
                    }
                }
                patterns
            }
            Some(other) => {
                self.warn(field, format!("expected a list, found {}; using an empty list", other.type_str()));
                Vec::new()
            }
        }
    }
}

/// Get the config file path (`CKPT_CONFIG` wins over the platform directory)
pub fn default_path() -> Option<PathBuf> {
    if let Some(path) = std::env::var_os(CONFIG_ENV) {
        if !path.is_empty() {
            return Some(PathBuf::from(path));
        }
    }
    dirs::config_dir().map(|c| c.join("ckpt").join("config.toml"))
}

/// Save configuration as TOML, creating parent directories
pub fn save(config: &Config, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let content = toml::to_string_pretty(config).map_err(|e| CheckpointError::Config {
        field: "config".to_string(),
        message: format!("cannot serialize: {}", e),
    })?;
    fs::write(path, content)?;

    tracing::info!("Saved config to {}", path.display());
    Ok(())
}

/// Render a config as TOML
pub fn render(config: &Config) -> String {
    toml::to_string_pretty(config).unwrap_or_default()
}

/// Generate example config content for display
pub fn example_config() -> String {
    let mut content = String::from("# ckpt configuration\n");
    content.push_str("# Location: ~/.config/ckpt/config.toml (override with CKPT_CONFIG)\n\n");
    content.push_str(&render(&Config::default()));
    content
}
