//! Dual-channel logging
//!
//! - stderr: terse notices, `WARN` and above (`DEBUG` with `CKPT_DEBUG=1`)
//! - `<home>/logs/ckpt.log`: full diagnostics, `DEBUG` by default, filter
//!   overridable through `CKPT_LOG`
//!
//! The log file is rotated at startup once it passes [`MAX_LOG_BYTES`].

use ckpt_core::CheckpointHome;
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::filter::{EnvFilter, LevelFilter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

pub const LOG_ENV: &str = "CKPT_LOG";
pub const DEBUG_ENV: &str = "CKPT_DEBUG";

pub const MAX_LOG_BYTES: u64 = 10 * 1024 * 1024;
pub const KEPT_GENERATIONS: usize = 3;

/// Install the global subscriber
///
/// Failing to open the log file only drops the file channel.
pub fn init(home: &CheckpointHome) {
    let debug = std::env::var(DEBUG_ENV).map(|v| v == "1" || v.eq_ignore_ascii_case("true")).unwrap_or(false);
    let stderr_level = if debug { LevelFilter::DEBUG } else { LevelFilter::WARN };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .without_time()
        .with_target(false)
        .with_level(debug)
        .with_filter(stderr_level);

    let file_layer = open_log(&home.log_path()).map(|file| {
        let filter = std::env::var(LOG_ENV)
            .ok()
            .and_then(|directive| EnvFilter::try_new(directive).ok())
            .unwrap_or_else(|| EnvFilter::new("debug"));
        tracing_subscriber::fmt::layer()
            .with_writer(Mutex::new(file))
            .with_ansi(false)
            .with_target(true)
            .with_filter(filter)
    });

    // A second init (tests) keeps the first subscriber
    let _ = tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .try_init();
}

fn open_log(path: &Path) -> Option<std::fs::File> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).ok()?;
    }
    if let Err(e) = rotate(path, MAX_LOG_BYTES, KEPT_GENERATIONS) {
        eprintln!("ckpt: log rotation failed: {}", e);
    }
    OpenOptions::new().create(true).append(true).open(path).ok()
}

/// Shift `log` → `log.1` → ... → `log.<keep>` when `log` exceeds `max_bytes`
pub fn rotate(path: &Path, max_bytes: u64, keep: usize) -> std::io::Result<bool> {
    let size = match std::fs::metadata(path) {
        Ok(meta) => meta.len(),
        Err(_) => return Ok(false),
    };
    if size <= max_bytes || keep == 0 {
        return Ok(false);
    }

    let generation = |n: usize| {
        let mut name = path.as_os_str().to_os_string();
        name.push(format!(".{}", n));
        std::path::PathBuf::from(name)
    };

    let oldest = generation(keep);
    if oldest.exists() {
        std::fs::remove_file(&oldest)?;
    }
    for n in (1..keep).rev() {
        let from = generation(n);
        if from.exists() {
            std::fs::rename(&from, generation(n + 1))?;
        }
    }
    std::fs::rename(path, generation(1))?;
    Ok(true)
}
