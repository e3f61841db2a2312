//! Hook payload decoding
//!
//! The host agent sends one JSON object per hook call on stdin. Tool input
//! is loosely shaped, so it is decoded into a [`ToolInvocation`] keyed by
//! tool name, with an `Unknown` fallback for tools that do not edit files.

use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Raw hook payload
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HookPayload {
    #[serde(default)]
    pub tool_name: String,
    #[serde(default)]
    pub tool_input: Value,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub tool_response: Option<Value>,
    /// Explicit correlation with the pre-call checkpoint
    #[serde(default, alias = "correlation_key")]
    pub checkpoint_id: Option<String>,
    /// Directory the agent was working in
    #[serde(default)]
    pub cwd: Option<PathBuf>,
}

impl HookPayload {
    pub fn parse(input: &str) -> serde_json::Result<Self> {
        serde_json::from_str(input)
    }

    /// Session id, or `unknown` when the host sent none
    pub fn session(&self) -> &str {
        self.session_id
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or("unknown")
    }

    /// Whether the tool call succeeded; absent means success
    pub fn success(&self) -> bool {
        self.tool_response
            .as_ref()
            .and_then(|r| r.get("success"))
            .and_then(Value::as_bool)
            .unwrap_or(true)
    }

    pub fn invocation(&self) -> ToolInvocation {
        ToolInvocation::from_payload(&self.tool_name, &self.tool_input)
    }

    /// Project directory: the payload's `cwd`, else `fallback`
    pub fn project_dir<'a>(&'a self, fallback: &'a Path) -> &'a Path {
        self.cwd
            .as_deref()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(fallback)
    }
}

/// A tool call, decoded by tool name
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolInvocation {
    Write { file_path: String },
    Edit { file_path: String },
    MultiEdit { file_path: String, edits: Vec<EditTarget> },
    Manual { message: Option<String> },
    Unknown { tool_name: String },
}

/// One entry of a MultiEdit `edits` array
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct EditTarget {
    #[serde(default)]
    pub file_path: Option<String>,
}

impl ToolInvocation {
    pub fn from_payload(tool_name: &str, input: &Value) -> Self {
        let file_path = || {
            input
                .get("file_path")
                .or_else(|| input.get("path"))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };

        match tool_name {
            "Write" => ToolInvocation::Write { file_path: file_path() },
            "Edit" => ToolInvocation::Edit { file_path: file_path() },
            "MultiEdit" => {
                let edits = input
                    .get("edits")
                    .and_then(Value::as_array)
                    .map(|items| {
                        items
                            .iter()
                            .map(|item| serde_json::from_value(item.clone()).unwrap_or_default())
                            .collect()
                    })
                    .unwrap_or_default();
                ToolInvocation::MultiEdit {
                    file_path: file_path(),
                    edits,
                }
            }
            "Manual" => ToolInvocation::Manual {
                message: input.get("message").and_then(Value::as_str).map(str::to_string),
            },
            other => ToolInvocation::Unknown {
                tool_name: other.to_string(),
            },
        }
    }

    pub fn tool_name(&self) -> &str {
        match self {
            ToolInvocation::Write { .. } => "Write",
            ToolInvocation::Edit { .. } => "Edit",
            ToolInvocation::MultiEdit { .. } => "MultiEdit",
            ToolInvocation::Manual { .. } => "Manual",
            ToolInvocation::Unknown { tool_name } => tool_name,
        }
    }

    /// Whether this tool mutates files we know how to find
    pub fn is_supported(&self) -> bool {
        !matches!(self, ToolInvocation::Unknown { .. })
    }

    /// Paths the call will touch, as given by the tool; duplicates and blanks removed
    pub fn affected_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = match self {
            ToolInvocation::Write { file_path } | ToolInvocation::Edit { file_path } => vec![file_path.clone()],
            ToolInvocation::MultiEdit { file_path, edits } => std::iter::once(file_path.clone())
                .chain(edits.iter().filter_map(|e| e.file_path.clone()))
                .collect(),
            ToolInvocation::Manual { .. } | ToolInvocation::Unknown { .. } => Vec::new(),
        };
        paths.retain(|p| !p.trim().is_empty());
        let mut seen = std::collections::HashSet::new();
        paths.retain(|p| seen.insert(p.clone()));
        paths
    }

    /// Checkpoint message for this call
    pub fn describe(&self) -> String {
        match self {
            ToolInvocation::Write { file_path } if file_path.trim().is_empty() => "Before creating new file".to_string(),
            ToolInvocation::Write { file_path } => format!("Before creating {}", display_name(file_path)),
            ToolInvocation::Edit { file_path } => format!("Before editing {}", display_name(file_path)),
            ToolInvocation::MultiEdit { file_path, edits } => {
                format!("Before {} edits to {}", edits.len(), display_name(file_path))
            }
            ToolInvocation::Manual { message } => message
                .as_deref()
                .filter(|m| !m.trim().is_empty())
                .unwrap_or("Manual checkpoint")
                .to_string(),
            ToolInvocation::Unknown { tool_name } => format!("Before {}", tool_name),
        }
    }
}

fn display_name(file_path: &str) -> String {
    Path::new(file_path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| file_path.to_string())
}
