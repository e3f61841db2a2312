//! Storage engine backed by the `git` binary
//!
//! Every invocation runs as
//! `git --git-dir <store>/repo.git --work-tree <project> -c core.hooksPath=/dev/null ...`
//! with system and global configuration disabled and a fixed identity, so
//! neither the user's git setup nor the project's own repository can leak in.
//! Staging and checkout use a throw-away index file, leaving no shared index
//! state between concurrent readers.
//!
//! Each call is bounded by a timeout; the child is killed if it overruns.

use crate::engine::{ChangeKind, CommitOutcome, FileChange, RevisionInfo, StorageEngine, TreeId};
use crate::Result;
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use ckpt_core::{CheckpointError, CheckpointId};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;

/// Branch holding the checkpoint history
const HEAD_REF: &str = "refs/heads/main";

/// Object name of the empty tree (SHA-1)
const EMPTY_TREE: &str = "4b825dc642cb6eb9a060e54bf8d69288fbee4904";

const IDENTITY_NAME: &str = "ckpt";
const IDENTITY_EMAIL: &str = "ckpt@localhost";

/// Git-backed [`StorageEngine`]
#[derive(Debug, Clone)]
pub struct GitEngine {
    program: OsString,
    git_dir: PathBuf,
    work_tree: PathBuf,
    timeout: Duration,
}

impl GitEngine {
    pub fn new(git_dir: impl Into<PathBuf>, work_tree: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: OsString::from("git"),
            git_dir: git_dir.into(),
            work_tree: work_tree.into(),
            timeout,
        }
    }

    /// Use a different executable in place of `git`
    pub fn with_program(mut self, program: impl Into<OsString>) -> Self {
        self.program = program.into();
        self
    }

    pub fn git_dir(&self) -> &Path {
        &self.git_dir
    }

    /// Whether a `git` executable can be run at all
    pub async fn available() -> bool {
        Command::new("git")
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }

    fn base_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.current_dir(&self.work_tree)
            .env("GIT_CONFIG_NOSYSTEM", "1")
            .env("GIT_CONFIG_GLOBAL", "/dev/null")
            .env("GIT_TERMINAL_PROMPT", "0")
            .env("GIT_AUTHOR_NAME", IDENTITY_NAME)
            .env("GIT_AUTHOR_EMAIL", IDENTITY_EMAIL)
            .env("GIT_COMMITTER_NAME", IDENTITY_NAME)
            .env("GIT_COMMITTER_EMAIL", IDENTITY_EMAIL)
            .env_remove("GIT_DIR")
            .env_remove("GIT_WORK_TREE")
            .env_remove("GIT_INDEX_FILE")
            .env_remove("GIT_OBJECT_DIRECTORY")
            .env_remove("GIT_ALTERNATE_OBJECT_DIRECTORIES")
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    fn repo_command(&self, index: Option<&Path>) -> Command {
        let mut cmd = self.base_command();
        cmd.arg("--git-dir")
            .arg(&self.git_dir)
            .arg("--work-tree")
            .arg(&self.work_tree)
            .args([
                "-c",
                "core.hooksPath=/dev/null",
                "-c",
                "core.autocrlf=false",
                "-c",
                "core.symlinks=true",
                "-c",
                "core.quotePath=false",
            ]);
        if let Some(index) = index {
            cmd.env("GIT_INDEX_FILE", index);
        }
        cmd
    }

    /// Run to completion under the timeout; only timeouts and spawn failures are errors
    async fn output(&self, mut cmd: Command, label: String, stdin: Option<Vec<u8>>) -> Result<Output> {
        cmd.stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() });

        let mut child = cmd.spawn().map_err(|e| CheckpointError::StorageCommand {
            command: label.clone(),
            status: "failed to start".to_string(),
            stderr: e.to_string(),
        })?;

        let run = async move {
            if let Some(input) = stdin {
                if let Some(mut pipe) = child.stdin.take() {
                    pipe.write_all(&input).await?;
                    // Dropping the pipe closes it so the child sees EOF
                }
            }
            child.wait_with_output().await
        };

        match timeout(self.timeout, run).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => {
                tracing::warn!("Storage command `{}` timed out after {:?}", label, self.timeout);
                Err(CheckpointError::StorageTimeout {
                    command: label,
                    timeout: self.timeout,
                })
            }
        }
    }

    /// Run and require success; returns stdout
    async fn run(&self, args: &[&str], index: Option<&Path>, stdin: Option<Vec<u8>>) -> Result<Vec<u8>> {
        let mut cmd = self.repo_command(index);
        cmd.args(args);
        let label = label(args);
        let output = self.output(cmd, label.clone(), stdin).await?;
        check(label, output)
    }

    async fn run_text(&self, args: &[&str]) -> Result<String> {
        let stdout = self.run(args, None, None).await?;
        Ok(String::from_utf8_lossy(&stdout).trim().to_string())
    }

    async fn tree_of(&self, revision: &CheckpointId) -> Result<String> {
        self.run_text(&["rev-parse", &format!("{}^{{tree}}", revision)]).await
    }

    /// Private index file inside the git dir, removed on drop
    fn scratch_index(&self) -> Result<tempfile::TempDir> {
        Ok(tempfile::Builder::new()
            .prefix("index-")
            .tempdir_in(&self.git_dir)?)
    }
}

#[async_trait]
impl StorageEngine for GitEngine {
    fn is_initialized(&self) -> bool {
        self.git_dir.join("HEAD").is_file() && self.git_dir.join("objects").is_dir()
    }

    async fn init(&self) -> Result<()> {
        if self.is_initialized() {
            return Ok(());
        }
        if let Some(parent) = self.git_dir.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut cmd = self.base_command();
        cmd.args(["init", "--quiet", "--bare"]).arg(&self.git_dir);
        let output = self.output(cmd, "git init".to_string(), None).await?;
        check("git init".to_string(), output)?;

        // The work tree is always passed explicitly
        self.run(&["config", "core.bare", "false"], None, None).await?;
        self.run(&["config", "core.logAllRefUpdates", "false"], None, None).await?;
        self.run(&["symbolic-ref", "HEAD", HEAD_REF], None, None).await?;

        tracing::info!("Initialized shadow store at {}", self.git_dir.display());
        Ok(())
    }

    async fn head(&self) -> Result<Option<CheckpointId>> {
        let mut cmd = self.repo_command(None);
        let spec = format!("{}^{{commit}}", HEAD_REF);
        cmd.args(["rev-parse", "--verify", "--quiet", &spec]);
        let output = self.output(cmd, "git rev-parse --verify".to_string(), None).await?;

        if !output.status.success() {
            return Ok(None);
        }
        let text = String::from_utf8_lossy(&output.stdout);
        Ok(Some(CheckpointId::parse(text.trim())?))
    }

    async fn stage(&self, files: &[String]) -> Result<TreeId> {
        let scratch = self.scratch_index()?;
        let index = scratch.path().join("index");

        if !files.is_empty() {
            let mut input = Vec::with_capacity(files.iter().map(|f| f.len() + 1).sum());
            for file in files {
                input.extend_from_slice(file.as_bytes());
                input.push(0);
            }
            // --remove drops paths deleted since the scan instead of failing
            self.run(
                &["update-index", "--add", "--remove", "-z", "--stdin"],
                Some(&index),
                Some(input),
            )
            .await?;
        }

        let tree = self.run(&["write-tree"], Some(&index), None).await?;
        Ok(TreeId(String::from_utf8_lossy(&tree).trim().to_string()))
    }

    async fn commit(&self, tree: &TreeId, message: &str) -> Result<CommitOutcome> {
        let head = self.head().await?;

        match &head {
            Some(head_id) => {
                if self.tree_of(head_id).await? == tree.as_str() {
                    return Ok(CommitOutcome::Unchanged(head));
                }
            }
            None => {
                if tree.as_str() == EMPTY_TREE {
                    return Ok(CommitOutcome::Unchanged(None));
                }
            }
        }

        let parent = head.as_ref().map(|h| h.to_string());
        let mut args = vec!["commit-tree", tree.as_str()];
        if let Some(parent) = &parent {
            args.push("-p");
            args.push(parent);
        }
        args.extend(["-F", "-"]);
        let commit = self.run(&args, None, Some(message.as_bytes().to_vec())).await?;
        let commit = CheckpointId::parse(String::from_utf8_lossy(&commit).trim())?;

        // Compare-and-swap against the head we built on
        let old = parent.unwrap_or_default();
        self.run(
            &["update-ref", "-m", "checkpoint", HEAD_REF, commit.as_str(), &old],
            None,
            None,
        )
        .await?;

        Ok(CommitOutcome::Created(commit))
    }

    async fn diff(&self, from: &str, to: &str) -> Result<String> {
        let stdout = self
            .run(&["diff", "--no-color", "--no-ext-diff", "--no-renames", from, to], None, None)
            .await?;
        Ok(String::from_utf8_lossy(&stdout).into_owned())
    }

    async fn diff_summary(&self, from: &str, to: &str) -> Result<Vec<FileChange>> {
        let stdout = self
            .run(&["diff", "--name-status", "--no-renames", "-z", from, to], None, None)
            .await?;
        Ok(parse_name_status(&stdout))
    }

    async fn checkout(&self, revision: &CheckpointId) -> Result<()> {
        let scratch = self.scratch_index()?;
        let index = scratch.path().join("index");

        self.run(&["read-tree", revision.as_str()], Some(&index), None).await?;
        self.run(&["checkout-index", "--all", "--force"], Some(&index), None).await?;
        Ok(())
    }

    async fn files(&self, revision: &CheckpointId) -> Result<Vec<String>> {
        let stdout = self
            .run(&["ls-tree", "-r", "-z", "--name-only", revision.as_str()], None, None)
            .await?;
        Ok(stdout
            .split(|b| *b == 0)
            .filter(|p| !p.is_empty())
            .map(|p| String::from_utf8_lossy(p).into_owned())
            .collect())
    }

    async fn log(&self) -> Result<Vec<RevisionInfo>> {
        if self.head().await?.is_none() {
            return Ok(Vec::new());
        }

        let stdout = self
            .run(&["log", "--format=%H%x1f%ct%x1f%s%x1e", HEAD_REF], None, None)
            .await?;
        let text = String::from_utf8_lossy(&stdout);

        let mut revisions = Vec::new();
        for record in text.split('\x1e') {
            let record = record.trim_matches(|c| c == '\n' || c == '\r');
            if record.is_empty() {
                continue;
            }
            let mut fields = record.split('\x1f');
            let (Some(id), Some(ts), subject) = (fields.next(), fields.next(), fields.next()) else {
                continue;
            };
            let timestamp = ts
                .parse::<i64>()
                .ok()
                .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
                .unwrap_or_default();
            revisions.push(RevisionInfo {
                id: CheckpointId::parse(id)?,
                timestamp,
                subject: subject.unwrap_or_default().to_string(),
            });
        }
        Ok(revisions)
    }

    async fn gc(&self) -> Result<()> {
        self.run(&["gc", "--auto", "--quiet"], None, None).await?;
        Ok(())
    }
}

fn label(args: &[&str]) -> String {
    match args.first() {
        Some(sub) => format!("git {}", sub),
        None => "git".to_string(),
    }
}

fn check(label: String, output: Output) -> Result<Vec<u8>> {
    if output.status.success() {
        return Ok(output.stdout);
    }
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    tracing::debug!("`{}` failed: {}", label, stderr);
    Err(CheckpointError::StorageCommand {
        command: label,
        status: output.status.to_string(),
        stderr,
    })
}

/// Parse `git diff --name-status -z` output
fn parse_name_status(raw: &[u8]) -> Vec<FileChange> {
    let mut fields = raw.split(|b| *b == 0).filter(|f| !f.is_empty());
    let mut changes = Vec::new();

    while let (Some(status), Some(path)) = (fields.next(), fields.next()) {
        let kind = match status.first() {
            Some(b'A') => ChangeKind::Added,
            Some(b'D') => ChangeKind::Deleted,
            _ => ChangeKind::Modified,
        };
        changes.push(FileChange {
            path: String::from_utf8_lossy(path).into_owned(),
            kind,
        });
    }
    changes
}
