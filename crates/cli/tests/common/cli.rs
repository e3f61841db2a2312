//! Run the `ckpt` binary against an isolated installation

use anyhow::{bail, Result};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use super::TestEnv;

/// Output of one `ckpt` run
#[derive(Debug)]
pub struct CommandResult {
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

impl CommandResult {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }

    pub fn contains_stdout(&self, needle: &str) -> bool {
        self.stdout.contains(needle)
    }

    pub fn contains_stderr(&self, needle: &str) -> bool {
        self.stderr.contains(needle)
    }
}

pub struct CkptCommand {
    cwd: PathBuf,
    home: PathBuf,
    config: PathBuf,
    args: Vec<String>,
    stdin: Option<String>,
}

impl CkptCommand {
    pub fn new(env: &TestEnv, cwd: &Path) -> Self {
        Self {
            cwd: cwd.to_path_buf(),
            home: env.home_dir().to_path_buf(),
            config: env.config_path().to_path_buf(),
            args: Vec::new(),
            stdin: None,
        }
    }

    pub fn args(mut self, args: &[&str]) -> Self {
        self.args.extend(args.iter().map(|a| a.to_string()));
        self
    }

    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    pub fn execute(self) -> Result<CommandResult> {
        let start = Instant::now();
        let mut child = Command::new(env!("CARGO_BIN_EXE_ckpt"))
            .args(&self.args)
            .current_dir(&self.cwd)
            .env("CKPT_HOME", &self.home)
            .env("CKPT_CONFIG", &self.config)
            .env("NO_COLOR", "1")
            .env_remove("CKPT_LOG")
            .env_remove("CKPT_DEBUG")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        if let Some(mut pipe) = child.stdin.take() {
            if let Some(input) = &self.stdin {
                pipe.write_all(input.as_bytes())?;
            }
        }

        let output = child.wait_with_output()?;
        Ok(CommandResult {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            duration: start.elapsed(),
        })
    }

    pub fn assert_success(self) -> Result<CommandResult> {
        let description = self.args.join(" ");
        let result = self.execute()?;
        if !result.success() {
            bail!(
                "`ckpt {}` failed ({:?})\nstdout:\n{}\nstderr:\n{}",
                description,
                result.status,
                result.stdout,
                result.stderr
            );
        }
        Ok(result)
    }

    pub fn assert_failure(self) -> Result<CommandResult> {
        let description = self.args.join(" ");
        let result = self.execute()?;
        if result.success() {
            bail!("`ckpt {}` unexpectedly succeeded\nstdout:\n{}", description, result.stdout);
        }
        Ok(result)
    }
}

/// Hook payload for a file-editing tool call
pub fn tool_payload(tool: &str, file_path: &Path, session: &str, cwd: &Path) -> String {
    serde_json::json!({
        "tool_name": tool,
        "tool_input": { "file_path": file_path },
        "session_id": session,
        "cwd": cwd,
    })
    .to_string()
}

/// Post-call payload carrying the tool's result
pub fn result_payload(tool: &str, file_path: &Path, session: &str, cwd: &Path, success: bool) -> String {
    serde_json::json!({
        "tool_name": tool,
        "tool_input": { "file_path": file_path },
        "session_id": session,
        "cwd": cwd,
        "tool_response": { "success": success },
    })
    .to_string()
}

/// Extract the short id from "Created checkpoint: <id>"
pub fn extract_checkpoint_id(output: &str) -> Option<String> {
    output.lines().find_map(|line| {
        line.split_once("Created checkpoint: ")
            .map(|(_, rest)| rest.trim().to_string())
    })
}
