//! Crash recovery for the metadata document
//!
//! Two things can be left behind by an interrupted writer: a temp file that
//! never got renamed into place, and (rarely, via outside edits) a document
//! that no longer parses. Neither may stop checkpointing.

use crate::Result;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

/// Prefix of temp files written next to the metadata document
pub const TEMP_PREFIX: &str = ".metadata";
/// Suffix of temp files written next to the metadata document
pub const TEMP_SUFFIX: &str = ".tmp";

/// Move an unparseable document aside as `<name>.corrupt-<unix_ms>`
///
/// Returns the backup path. The caller then treats the store as empty.
pub fn quarantine_corrupt(path: &Path) -> Result<PathBuf> {
    let stamp = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "metadata.json".to_string());
    let backup = path.with_file_name(format!("{}.corrupt-{}", file_name, stamp));

    std::fs::rename(path, &backup)?;
    tracing::warn!(
        "Recovery: metadata document {} was unreadable; preserved as {}",
        path.display(),
        backup.display()
    );
    Ok(backup)
}

/// Delete abandoned temp files older than `max_age` in `dir`
///
/// Returns how many were removed. Younger files may belong to a live writer.
pub fn cleanup_temp_files(dir: &Path, max_age: Duration) -> Result<usize> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e.into()),
    };

    let now = SystemTime::now();
    let mut removed = 0;

    for entry in entries {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if !(name.starts_with(TEMP_PREFIX) && name.ends_with(TEMP_SUFFIX)) {
            continue;
        }

        let modified = entry.metadata().and_then(|m| m.modified()).unwrap_or(now);
        let age = now.duration_since(modified).unwrap_or_default();
        if age < max_age {
            continue;
        }

        match std::fs::remove_file(entry.path()) {
            Ok(()) => {
                removed += 1;
                tracing::info!("Recovery: removed incomplete write {}", entry.path().display());
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }

    Ok(removed)
}
