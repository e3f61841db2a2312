//! Restore and rewind tests
//!
//! Checkpoint a state, mutate the tree, then bring it back in merge and
//! full mode, through both the workflow API and the binary.

use anyhow::{bail, Result};
use ckpt::confirm::{Gated, Intent};
use ckpt::engine::{CheckpointEngine, PreOutcome};
use ckpt::hook::ToolInvocation;
use ckpt::restore::RestoreWorkflow;
use journal::{Checkpoint, CheckpointQuery};
use shadow::RestoreMode;

use crate::common::cli::CkptCommand;
use crate::common::{ProjectSize, ProjectTemplate, TestEnv, TestProject};

async fn checkpoint(engine: &CheckpointEngine, project: &TestProject, file: &str) -> Result<Checkpoint> {
    let invocation = ToolInvocation::Edit {
        file_path: project.path(file).to_string_lossy().into_owned(),
    };
    match engine.pre_operation(&invocation, "restore-test", project.root()).await {
        PreOutcome::Created(cp) => Ok(cp),
        PreOutcome::Skipped(reason) => bail!("checkpoint skipped: {}", reason),
    }
}

#[tokio::test]
async fn test_full_restore_round_trip() -> Result<()> {
    require_git!();
    let env = TestEnv::new()?;
    let ctx = env.context();
    let engine = CheckpointEngine::new(ctx.clone());
    let mut project = TestProject::new(ProjectTemplate::mixed_project(ProjectSize::Small))?;

    let before = project.state()?;
    let saved = checkpoint(&engine, &project, "src/lib.rs").await?;

    // Mutate: edit, add, delete
    project.modify_files(&["src/lib.rs", "docs/new.md"], "changed\n")?;
    project.add_files(3)?;
    let victim = project.files[0].strip_prefix(project.root())?.to_string_lossy().into_owned();
    project.delete_files(&[victim.as_str()])?;
    assert_ne!(project.state()?, before);

    let workflow = RestoreWorkflow::open(&ctx, project.root())?;
    let outcome = workflow.execute(&engine, &saved, RestoreMode::Full, Intent::Confirmed).await?;
    let restored = match outcome {
        Gated::Done(restored) => restored,
        other => bail!("restore did not run: {:?}", other),
    };

    assert_eq!(project.state()?, before);
    assert!(restored.report.deleted.iter().any(|p| p == "docs/new.md"));
    assert!(restored.report.deleted.iter().any(|p| p == "added_file_0.rs"));

    // Excluded content survives a full restore untouched
    assert!(project.path("node_modules/left-pad/index.js").exists());
    assert!(project.path(".env").exists());

    // The pre-restore state was itself checkpointed
    let safety = restored.safety.expect("restore should checkpoint the mutated state");
    assert_eq!(safety.tool, "Restore");
    assert_eq!(
        safety.message.as_deref(),
        Some(format!("Before restoring {}", saved.short_id()).as_str())
    );

    Ok(())
}

#[tokio::test]
async fn test_merge_restore_keeps_new_files() -> Result<()> {
    require_git!();
    let env = TestEnv::new()?;
    let ctx = env.context();
    let engine = CheckpointEngine::new(ctx.clone());
    let mut project = TestProject::new(ProjectTemplate::rust_project(ProjectSize::Tiny))?;

    project.modify_files(&["src/main.rs"], "// version 1\nfn main() {}\n")?;
    let saved = checkpoint(&engine, &project, "src/main.rs").await?;

    project.modify_files(&["src/main.rs"], "// version 2\n")?;
    project.modify_files(&["scratch.txt"], "keep me\n")?;

    let workflow = RestoreWorkflow::open(&ctx, project.root())?;
    let outcome = workflow.execute(&engine, &saved, RestoreMode::Merge, Intent::Confirmed).await?;
    assert!(matches!(outcome, Gated::Done(_)));

    assert!(project.read("src/main.rs")?.contains("version 1"));
    assert_eq!(project.read("scratch.txt")?, "keep me\n");
    Ok(())
}

#[tokio::test]
async fn test_preview_and_dry_run_change_nothing() -> Result<()> {
    require_git!();
    let env = TestEnv::new()?;
    let ctx = env.context();
    let engine = CheckpointEngine::new(ctx.clone());
    let mut project = TestProject::new(ProjectTemplate::rust_project(ProjectSize::Tiny))?;

    project.modify_files(&["a.txt", "b.txt"], "original\n")?;
    let saved = checkpoint(&engine, &project, "a.txt").await?;

    project.modify_files(&["a.txt"], "edited\n")?;
    project.delete_files(&["b.txt"])?;
    project.modify_files(&["c.txt"], "new\n")?;
    let mutated = project.state()?;

    let workflow = RestoreWorkflow::open(&ctx, project.root())?;
    let preview = workflow.preview(&saved).await?;
    assert_eq!((preview.added, preview.removed, preview.modified), (1, 1, 1));

    match workflow.execute(&engine, &saved, RestoreMode::Full, Intent::DryRun).await? {
        Gated::Previewed(plan) => assert_eq!(plan.delete, vec!["c.txt".to_string()]),
        other => bail!("expected a preview, got {:?}", other),
    }
    assert!(matches!(
        workflow.execute(&engine, &saved, RestoreMode::Full, Intent::Prompt).await?,
        Gated::AwaitingConfirmation(_)
    ));

    assert_eq!(project.state()?, mutated);
    assert_eq!(ctx.metadata.all()?.len(), 1, "no safety checkpoint without confirmation");
    Ok(())
}

#[tokio::test]
async fn test_resolve_by_index_prefix_and_id() -> Result<()> {
    require_git!();
    let env = TestEnv::new()?;
    let ctx = env.context();
    let engine = CheckpointEngine::new(ctx.clone());
    let mut project = TestProject::new(ProjectTemplate::rust_project(ProjectSize::Tiny))?;

    let first = checkpoint(&engine, &project, "src/main.rs").await?;
    project.modify_files(&["src/main.rs"], "next\n")?;
    let second = checkpoint(&engine, &project, "src/main.rs").await?;

    let workflow = RestoreWorkflow::open(&ctx, project.root())?;
    assert_eq!(workflow.resolve("1").await?.id, second.id);
    assert_eq!(workflow.resolve("2").await?.id, first.id);
    assert_eq!(workflow.resolve(first.short_id()).await?.id, first.id);
    assert_eq!(workflow.resolve(second.id.as_str()).await?.id, second.id);
    assert!(workflow.resolve("9").await.is_err());

    let listed = workflow.list(CheckpointQuery::new()).await?;
    assert_eq!(listed.len(), 2);
    Ok(())
}

#[test]
fn test_restore_command_with_yes() -> Result<()> {
    require_git!();
    let env = TestEnv::new()?;
    let mut project = TestProject::new(ProjectTemplate::rust_project(ProjectSize::Tiny))?;
    let root = project.root().to_path_buf();

    project.modify_files(&["src/main.rs"], "// version 1\n")?;
    CkptCommand::new(&env, &root).args(&["now", "v1"]).assert_success()?;
    let id = env.context().metadata.all()?[0].id.to_string();

    project.modify_files(&["src/main.rs"], "// version 2\n")?;
    project.modify_files(&["stray.rs"], "// stray\n")?;

    // Without a terminal and without --yes the restore refuses
    let refused = CkptCommand::new(&env, &root)
        .args(&["restore", &id, "--mode", "full"])
        .assert_failure()?;
    assert!(refused.contains_stderr("--yes"));
    assert!(project.read("src/main.rs")?.contains("version 2"));

    let dry = CkptCommand::new(&env, &root)
        .args(&["restore", &id, "--mode", "full", "--dry-run"])
        .assert_success()?;
    assert!(dry.contains_stdout("stray.rs"));
    assert!(project.path("stray.rs").exists());

    let restored = CkptCommand::new(&env, &root)
        .args(&["restore", &id, "--mode", "full", "--yes"])
        .assert_success()?;
    assert!(project.read("src/main.rs")?.contains("version 1"));
    assert!(restored.contains_stdout("--mode full"));
    assert!(!project.path("stray.rs").exists());

    // The diff against the working tree is now empty
    let diff = CkptCommand::new(&env, &root)
        .args(&["diff", &id, "--stat"])
        .assert_success()?;
    assert!(diff.contains_stdout("No differences"));
    Ok(())
}
