//! The project's own ignore rules
//!
//! Inside a git work tree the ignored set comes from git itself:
//! `git ls-files -z --others --ignored --exclude-standard --directory` lists
//! ignored files, and each wholly ignored directory once with a trailing `/`.
//! Outside a work tree the root `.gitignore` is read and translated into
//! exclusion patterns. Negations (`!pattern`) are not supported there and
//! are dropped.
//!
//! Loading never fails; an unreadable or unavailable rule source means
//! nothing is ignored.

use ckpt_core::ExclusionMatcher;
use std::collections::HashSet;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

/// Paths the project itself marks as ignored
#[derive(Debug, Clone, Default)]
pub struct ProjectIgnores {
    dirs: HashSet<String>,
    files: HashSet<String>,
    rules: ExclusionMatcher,
}

impl ProjectIgnores {
    /// Ask git for the project's ignored paths, falling back to the root `.gitignore`
    pub async fn load(project_root: &Path, limit: Duration) -> Self {
        let mut cmd = Command::new("git");
        cmd.current_dir(project_root)
            .args(["ls-files", "-z", "--others", "--ignored", "--exclude-standard", "--directory"])
            .env("GIT_TERMINAL_PROMPT", "0")
            .env_remove("GIT_DIR")
            .env_remove("GIT_WORK_TREE")
            .env_remove("GIT_INDEX_FILE")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        match timeout(limit, cmd.output()).await {
            Ok(Ok(output)) if output.status.success() => Self::from_listing(&output.stdout),
            Ok(Ok(_)) | Ok(Err(_)) => Self::from_gitignore_file(project_root),
            Err(_) => {
                tracing::warn!(
                    "Listing ignored files in {} timed out after {:?}; ignore rules not applied",
                    project_root.display(),
                    limit
                );
                Self::default()
            }
        }
    }

    /// Parse NUL-separated `ls-files --directory` output
    pub fn from_listing(stdout: &[u8]) -> Self {
        let mut ignores = Self::default();
        for entry in stdout.split(|b| *b == 0).filter(|e| !e.is_empty()) {
            let entry = String::from_utf8_lossy(entry);
            match entry.strip_suffix('/') {
                Some(dir) => ignores.dirs.insert(dir.to_string()),
                None => ignores.files.insert(entry.into_owned()),
            };
        }
        ignores
    }

    fn from_gitignore_file(project_root: &Path) -> Self {
        match std::fs::read_to_string(project_root.join(".gitignore")) {
            Ok(content) => Self::from_gitignore(&content),
            Err(_) => Self::default(),
        }
    }

    /// Translate `.gitignore` lines into exclusion patterns
    pub fn from_gitignore(content: &str) -> Self {
        let mut patterns = Vec::new();
        for line in content.lines() {
            let line = line.trim_end();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if line.starts_with('!') {
                tracing::debug!("Ignoring unsupported negated pattern {}", line);
                continue;
            }

            let (body, dir_only) = match line.strip_suffix('/') {
                Some(body) => (body, true),
                None => (line, false),
            };
            // A slash anywhere but the end anchors the pattern at the root
            let anchored = body.contains('/');
            let body = body.trim_start_matches('/');
            if body.is_empty() {
                continue;
            }

            match (anchored, dir_only) {
                (false, true) => patterns.push(format!("{}/", body)),
                (false, false) => {
                    patterns.push(body.to_string());
                    patterns.push(format!("*/{}", body));
                    patterns.push(format!("{}/", body));
                }
                (true, true) => patterns.push(format!("{}/*", body)),
                (true, false) => {
                    patterns.push(body.to_string());
                    patterns.push(format!("{}/*", body));
                }
            }
        }

        let (rules, errors) = ExclusionMatcher::compile(&patterns);
        if !errors.is_empty() {
            tracing::debug!("{} .gitignore patterns could not be used", errors.len());
        }
        Self {
            rules,
            ..Self::default()
        }
    }

    /// Whether the directory at `rel_dir`, and everything beneath it, is ignored
    pub fn ignores_dir(&self, rel_dir: &str) -> bool {
        self.dirs.contains(rel_dir) || self.rules.matches_dir(rel_dir)
    }

    pub fn ignores_file(&self, rel_path: &str) -> bool {
        self.files.contains(rel_path) || self.rules.matches(rel_path)
    }

    pub fn is_empty(&self) -> bool {
        self.dirs.is_empty() && self.files.is_empty() && self.rules.is_empty()
    }
}
