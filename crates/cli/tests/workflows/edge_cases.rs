//! Edge cases: malformed input, filtered paths, disabled config, hostile paths

use anyhow::Result;
use ckpt::engine::{CheckpointEngine, PreOutcome, SkipReason};
use ckpt::hook::ToolInvocation;
use ckpt_core::Config;

use crate::common::cli::{tool_payload, CkptCommand};
use crate::common::{ProjectSize, ProjectTemplate, TestEnv, TestProject};

fn edit(project: &TestProject, rel: &str) -> ToolInvocation {
    ToolInvocation::Edit {
        file_path: project.path(rel).to_string_lossy().into_owned(),
    }
}

#[test]
fn test_invalid_json_exits_nonzero() -> Result<()> {
    let env = TestEnv::new()?;
    let project = TestProject::new(ProjectTemplate::rust_project(ProjectSize::Tiny))?;

    let result = CkptCommand::new(&env, project.root())
        .args(&["hook", "pre"])
        .stdin("{not json")
        .execute()?;
    assert_eq!(result.status, Some(1));
    assert!(result.contains_stderr("Invalid JSON input"));
    Ok(())
}

#[test]
fn test_hook_exits_zero_when_checkpoint_fails() -> Result<()> {
    let env = TestEnv::new()?;
    let project = TestProject::new(ProjectTemplate::rust_project(ProjectSize::Tiny))?;
    let missing = project.root().join("does-not-exist");

    // Unresolvable project directory
    let payload = tool_payload("Edit", &missing.join("a.rs"), "s", &missing);
    CkptCommand::new(&env, project.root())
        .args(&["hook", "pre"])
        .stdin(payload)
        .assert_success()?;

    // Post call with nothing to correlate
    let payload = serde_json::json!({ "tool_name": "Edit", "checkpoint_id": "deadbeef" }).to_string();
    CkptCommand::new(&env, project.root())
        .args(&["hook", "post"])
        .stdin(payload)
        .assert_success()?;
    Ok(())
}

#[test]
fn test_excluded_file_skips_with_notice() -> Result<()> {
    require_git!();
    let env = TestEnv::new()?;
    let project = TestProject::new(ProjectTemplate::mixed_project(ProjectSize::Tiny))?;
    let root = project.root().to_path_buf();

    let result = CkptCommand::new(&env, &root)
        .args(&["hook", "pre"])
        .stdin(tool_payload("Edit", &project.path("debug.log"), "s", &root))
        .assert_success()?;
    assert!(result.contains_stderr("Skipping checkpoint for excluded file"));
    assert!(env.context().metadata.all()?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_skip_reasons() -> Result<()> {
    require_git!();
    let env = TestEnv::new()?;
    let project = TestProject::new(ProjectTemplate::mixed_project(ProjectSize::Tiny))?;

    let engine = CheckpointEngine::new(env.context());

    // Tools that do not edit files
    let read = ToolInvocation::Unknown { tool_name: "Read".into() };
    assert_eq!(
        engine.pre_operation(&read, "s", project.root()).await,
        PreOutcome::Skipped(SkipReason::UnsupportedTool("Read".into()))
    );

    // Directory patterns exclude at any depth
    let nested = edit(&project, "node_modules/left-pad/index.js");
    assert_eq!(
        engine.pre_operation(&nested, "s", project.root()).await,
        PreOutcome::Skipped(SkipReason::AllPathsFiltered)
    );

    // Path traversal is rejected before any storage call
    let escape = ToolInvocation::Edit { file_path: "../../etc/passwd".into() };
    assert!(matches!(
        engine.pre_operation(&escape, "s", project.root()).await,
        PreOutcome::Skipped(SkipReason::Failed(_))
    ));
    assert!(engine.context().metadata.all()?.is_empty());

    // Disabled config skips hooks but not manual checkpoints
    let disabled = CheckpointEngine::new(env.context_with(Config {
        enabled: false,
        ..Config::default()
    }));
    assert_eq!(
        disabled.pre_operation(&edit(&project, "src/main.rs"), "s", project.root()).await,
        PreOutcome::Skipped(SkipReason::Disabled)
    );
    assert!(matches!(
        disabled.manual(None, project.root()).await?,
        PreOutcome::Created(_)
    ));
    Ok(())
}

#[tokio::test]
async fn test_pathless_invocations_snapshot_whole_project() -> Result<()> {
    require_git!();
    let env = TestEnv::new()?;
    let mut project = TestProject::new(ProjectTemplate::rust_project(ProjectSize::Tiny))?;
    let engine = CheckpointEngine::new(env.context());

    let manual = ToolInvocation::from_payload("Manual", &serde_json::json!({ "message": "hi" }));
    let checkpoint = match engine.pre_operation(&manual, "s", project.root()).await {
        PreOutcome::Created(cp) => cp,
        PreOutcome::Skipped(reason) => anyhow::bail!("manual checkpoint skipped: {}", reason),
    };
    assert_eq!(checkpoint.message.as_deref(), Some("hi"));
    assert_eq!(checkpoint.tool, "Manual");

    // A Write payload that lost its file_path still protects the project
    project.modify_files(&["notes.txt"], "draft\n")?;
    let write = ToolInvocation::from_payload("Write", &serde_json::json!({ "content": "x" }));
    let checkpoint = match engine.pre_operation(&write, "s", project.root()).await {
        PreOutcome::Created(cp) => cp,
        PreOutcome::Skipped(reason) => anyhow::bail!("write checkpoint skipped: {}", reason),
    };
    assert_eq!(checkpoint.message.as_deref(), Some("Before creating new file"));
    assert!(checkpoint.files.iter().any(|f| f == "notes.txt"));
    Ok(())
}

#[tokio::test]
async fn test_nested_env_is_not_excluded() -> Result<()> {
    require_git!();
    let env = TestEnv::new()?;
    let mut project = TestProject::new(ProjectTemplate::mixed_project(ProjectSize::Tiny))?;
    project.modify_files(&["config/.env"], "NESTED=1\n")?;

    let engine = CheckpointEngine::new(env.context());
    let outcome = engine.pre_operation(&edit(&project, "config/.env"), "s", project.root()).await;
    let checkpoint = match outcome {
        PreOutcome::Created(cp) => cp,
        PreOutcome::Skipped(reason) => anyhow::bail!("checkpoint skipped: {}", reason),
    };

    let files = engine.context().shadow(project.root())?.files(&checkpoint.id).await?;
    assert!(files.iter().any(|f| f == "config/.env"));
    assert!(!files.iter().any(|f| f == ".env"));
    assert!(!files.iter().any(|f| f.starts_with("node_modules/")));
    assert!(!files.iter().any(|f| f.contains("__pycache__")));
    assert!(!files.iter().any(|f| f.ends_with(".log")));
    Ok(())
}

#[test]
fn test_config_command_reports_warnings() -> Result<()> {
    let env = TestEnv::new()?;
    let project = TestProject::new(ProjectTemplate::rust_project(ProjectSize::Tiny))?;
    env.write_config("retention_days = 9000\nmax_file_size_mb = \"lots\"\n")?;

    let result = CkptCommand::new(&env, project.root()).args(&["config"]).assert_success()?;
    assert!(result.contains_stdout("retention_days = 365"));
    assert!(result.contains_stdout("max_file_size_mb"));
    assert!(result.contains_stdout("Warnings"));
    Ok(())
}
