//! Retention sweep and orphan cleanup tests

use anyhow::{bail, Result};
use chrono::{Duration, Utc};
use ckpt::cleanup::RetentionManager;
use ckpt::confirm::{Gated, Intent};
use ckpt::engine::{CheckpointEngine, PreOutcome};
use ckpt_core::ProjectHash;
use journal::CheckpointStatus;

use crate::common::cli::CkptCommand;
use crate::common::{ProjectSize, ProjectTemplate, TestEnv, TestProject};

async fn manual(engine: &CheckpointEngine, project: &TestProject, message: &str) -> Result<()> {
    match engine.manual(Some(message), project.root()).await? {
        PreOutcome::Created(_) => Ok(()),
        PreOutcome::Skipped(reason) => bail!("checkpoint skipped: {}", reason),
    }
}

#[tokio::test]
async fn test_sweep_keeps_newest_per_project() -> Result<()> {
    require_git!();
    let env = TestEnv::new()?;
    let ctx = env.context();
    let engine = CheckpointEngine::new(ctx.clone());
    let mut project = TestProject::new(ProjectTemplate::rust_project(ProjectSize::Tiny))?;

    for round in 0..3 {
        project.modify_files(&["src/main.rs"], &format!("// round {}\n", round))?;
        manual(&engine, &project, &format!("round {}", round)).await?;
    }

    let manager = RetentionManager::new(ctx.clone());
    let later = Utc::now() + Duration::days(30);

    // Dry run reports without removing
    let preview = manager.sweep(later, None, None, true).await?;
    assert!(preview.dry_run);
    assert_eq!(preview.pruned.len(), 2);
    assert_eq!(ctx.metadata.all()?.len(), 3);

    let report = manager.sweep(later, None, None, false).await?;
    assert_eq!(report.pruned.len(), 2);
    assert_eq!(report.housekept, 1);

    let remaining = ctx.metadata.all()?;
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].message.as_deref(), Some("round 2"));
    Ok(())
}

#[tokio::test]
async fn test_sweep_reclaims_stale_pending() -> Result<()> {
    require_git!();
    let env = TestEnv::new()?;
    let ctx = env.context();
    let engine = CheckpointEngine::new(ctx.clone());
    let project = TestProject::new(ProjectTemplate::rust_project(ProjectSize::Tiny))?;

    let invocation = ckpt::hook::ToolInvocation::Edit {
        file_path: project.path("src/main.rs").to_string_lossy().into_owned(),
    };
    let pending = match engine.pre_operation(&invocation, "s", project.root()).await {
        PreOutcome::Created(cp) => cp,
        PreOutcome::Skipped(reason) => bail!("checkpoint skipped: {}", reason),
    };
    assert_eq!(pending.status, CheckpointStatus::Pending);

    // Two hours on, the post call never came
    let manager = RetentionManager::new(ctx.clone());
    let report = manager.sweep(Utc::now() + Duration::hours(2), None, None, false).await?;
    assert_eq!(report.reclaimed, vec![pending.id.clone()]);

    let record = ctx.metadata.get(&pending.id)?.expect("record kept");
    assert_eq!(record.status, CheckpointStatus::Failed);
    Ok(())
}

#[tokio::test]
async fn test_sweep_scoped_to_one_project() -> Result<()> {
    require_git!();
    let env = TestEnv::new()?;
    let ctx = env.context();
    let engine = CheckpointEngine::new(ctx.clone());
    let mut alpha = TestProject::new(ProjectTemplate::rust_project(ProjectSize::Tiny))?;
    let mut beta = TestProject::new(ProjectTemplate::rust_project(ProjectSize::Tiny))?;

    for round in 0..2 {
        alpha.modify_files(&["a.txt"], &round.to_string())?;
        manual(&engine, &alpha, "alpha").await?;
        beta.modify_files(&["b.txt"], &round.to_string())?;
        manual(&engine, &beta, "beta").await?;
    }

    let alpha_hash = ProjectHash::identify(alpha.root())?.0;
    let manager = RetentionManager::new(ctx.clone());
    let report = manager
        .sweep(Utc::now() + Duration::days(30), Some(1), Some(&alpha_hash), false)
        .await?;
    assert_eq!(report.pruned.len(), 1);
    assert!(report.pruned.iter().all(|cp| cp.project_hash == alpha_hash));
    assert_eq!(ctx.metadata.all()?.len(), 3);
    Ok(())
}

#[tokio::test]
async fn test_orphan_scan_removes_deleted_projects() -> Result<()> {
    require_git!();
    let env = TestEnv::new()?;
    let ctx = env.context();
    let engine = CheckpointEngine::new(ctx.clone());
    let kept = TestProject::new(ProjectTemplate::rust_project(ProjectSize::Tiny))?;
    let gone = TestProject::new(ProjectTemplate::rust_project(ProjectSize::Tiny))?;

    manual(&engine, &kept, "kept").await?;
    manual(&engine, &gone, "gone").await?;
    let gone_hash = ProjectHash::identify(gone.root())?.0;
    let gone_store = ctx.home.project_dir(&gone_hash);
    drop(gone);

    let manager = RetentionManager::new(ctx.clone());

    match manager.orphan_scan(Intent::DryRun).await? {
        Gated::Previewed(orphans) => {
            assert_eq!(orphans.len(), 1);
            assert_eq!(orphans[0].hash, gone_hash);
        }
        other => bail!("expected a preview, got {:?}", other),
    }
    assert!(matches!(
        manager.orphan_scan(Intent::Prompt).await?,
        Gated::AwaitingConfirmation(_)
    ));
    assert!(gone_store.exists());

    let report = match manager.orphan_scan(Intent::Confirmed).await? {
        Gated::Done(report) => report,
        other => bail!("orphan scan did not run: {:?}", other),
    };
    assert_eq!(report.removed, vec![gone_hash.clone()]);
    assert_eq!(report.records_removed, 1);
    assert!(!gone_store.exists());

    let remaining = ctx.metadata.all()?;
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].message.as_deref(), Some("kept"));
    Ok(())
}

#[test]
fn test_clean_honours_auto_cleanup() -> Result<()> {
    require_git!();
    let env = TestEnv::new()?;
    let project = TestProject::new(ProjectTemplate::rust_project(ProjectSize::Tiny))?;
    let root = project.root().to_path_buf();
    env.write_config("auto_cleanup = false\n")?;

    CkptCommand::new(&env, &root).args(&["now"]).assert_success()?;

    let refused = CkptCommand::new(&env, &root).args(&["clean"]).assert_failure()?;
    assert!(refused.contains_stderr("--force"));

    CkptCommand::new(&env, &root).args(&["clean", "--dry-run"]).assert_success()?;
    let forced = CkptCommand::new(&env, &root).args(&["clean", "--force"]).assert_success()?;
    assert!(forced.contains_stdout("expired checkpoints"));

    // The newest checkpoint always survives
    assert_eq!(env.context().metadata.all()?.len(), 1);
    Ok(())
}
