//! Working-tree scanner
//!
//! Walks a project root and yields the `/`-separated relative paths that are
//! trackable under the current exclusion rules, the project's own ignore
//! rules and the size limit. Symlinks are reported as entries of their own
//! and never followed.

use crate::ignore::ProjectIgnores;
use ckpt_core::ExclusionMatcher;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// Result of one scan
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// Trackable paths, sorted
    pub files: Vec<String>,
    /// Files and directories removed by exclusion patterns
    pub excluded: usize,
    /// Files and directories the project's ignore rules left out
    pub ignored: usize,
    /// Files over the size limit, with their size in bytes
    pub oversized: Vec<(String, u64)>,
}

/// Filters a working tree through exclusion rules and a size limit
#[derive(Debug, Clone)]
pub struct TreeScanner {
    root: PathBuf,
    matcher: ExclusionMatcher,
    max_file_size: u64,
}

impl TreeScanner {
    pub fn new(root: impl Into<PathBuf>, matcher: ExclusionMatcher, max_file_size: u64) -> Self {
        Self {
            root: root.into(),
            matcher,
            max_file_size,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn matcher(&self) -> &ExclusionMatcher {
        &self.matcher
    }

    /// Walk the whole tree
    pub fn scan(&self) -> ScanReport {
        self.scan_with(&ProjectIgnores::default())
    }

    /// Walk the whole tree, also leaving out what `ignores` names
    pub fn scan_with(&self, ignores: &ProjectIgnores) -> ScanReport {
        let mut report = ScanReport::default();
        let mut pruned = 0usize;
        let mut ignored_dirs = 0usize;

        let walker = WalkDir::new(&self.root)
            .follow_links(false)
            .min_depth(1)
            .into_iter()
            .filter_entry(|e| {
                if !e.file_type().is_dir() {
                    return true;
                }
                if e.file_name() == ".git" {
                    return false;
                }
                match self.relative(e) {
                    Some(rel) if self.matcher.matches_dir(&rel) => {
                        pruned += 1;
                        false
                    }
                    Some(rel) if ignores.ignores_dir(&rel) => {
                        ignored_dirs += 1;
                        false
                    }
                    _ => true,
                }
            });

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!("Skipping unreadable entry during scan: {}", e);
                    continue;
                }
            };
            if entry.file_type().is_dir() {
                continue;
            }

            let Some(rel) = self.relative(&entry) else {
                tracing::warn!("Skipping non UTF-8 path {}", entry.path().display());
                continue;
            };

            if self.matcher.matches(&rel) {
                report.excluded += 1;
                continue;
            }
            if ignores.ignores_file(&rel) {
                report.ignored += 1;
                continue;
            }

            // Links are stored as links; their target size is irrelevant
            if !entry.file_type().is_symlink() {
                let size = match entry.metadata() {
                    Ok(meta) => meta.len(),
                    Err(e) => {
                        tracing::warn!("Cannot stat {}: {}", rel, e);
                        continue;
                    }
                };
                if size > self.max_file_size {
                    tracing::info!(
                        "Excluding {} from snapshot: {} bytes exceeds limit of {} bytes",
                        rel,
                        size,
                        self.max_file_size
                    );
                    report.oversized.push((rel, size));
                    continue;
                }
            }

            report.files.push(rel);
        }

        report.excluded += pruned;
        report.ignored += ignored_dirs;
        report.files.sort();
        report
    }

    /// Whether a single relative path would be included by [`scan`](Self::scan)
    pub fn is_trackable(&self, rel: &str) -> bool {
        if rel.split('/').any(|c| c == ".git") || self.matcher.matches(rel) {
            return false;
        }

        let full = self.root.join(rel);
        let meta = match std::fs::symlink_metadata(&full) {
            Ok(meta) => meta,
            Err(_) => return false,
        };
        if meta.is_dir() {
            return false;
        }
        meta.file_type().is_symlink() || meta.len() <= self.max_file_size
    }

    fn relative(&self, entry: &DirEntry) -> Option<String> {
        let rel = entry.path().strip_prefix(&self.root).ok()?;
        let mut parts = Vec::new();
        for component in rel.components() {
            parts.push(component.as_os_str().to_str()?);
        }
        Some(parts.join("/"))
    }
}
