//! Concurrent hook calls against one project and one metadata document

use anyhow::Result;
use ckpt::engine::{CheckpointEngine, PreOutcome, SkipReason};
use ckpt::hook::ToolInvocation;
use std::collections::HashSet;
use std::sync::Arc;

use crate::common::{ProjectSize, ProjectTemplate, TestEnv, TestProject};

const WORKERS: usize = 8;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_pre_operations_do_not_tear() -> Result<()> {
    require_git!();
    let env = TestEnv::new()?;
    let ctx = env.context();
    let engine = Arc::new(CheckpointEngine::new(ctx.clone()));
    let mut project = TestProject::new(ProjectTemplate::rust_project(ProjectSize::Small))?;

    // Each worker edits its own file, then checkpoints
    let mut handles = Vec::new();
    for i in 0..WORKERS {
        let rel = format!("worker_{}.txt", i);
        project.modify_files(&[rel.as_str()], &format!("worker {}\n", i))?;
        let engine = Arc::clone(&engine);
        let root = project.root().to_path_buf();
        let invocation = ToolInvocation::Write {
            file_path: root.join(&rel).to_string_lossy().into_owned(),
        };
        let session = format!("session-{}", i);
        handles.push(tokio::spawn(async move {
            engine.pre_operation(&invocation, &session, &root).await
        }));
    }

    let mut created = Vec::new();
    for handle in handles {
        match handle.await? {
            PreOutcome::Created(cp) => created.push(cp),
            // A racing worker may already have captured the same tree
            PreOutcome::Skipped(SkipReason::NoChanges { head }) => assert!(head.is_some()),
            PreOutcome::Skipped(other) => panic!("unexpected skip: {}", other),
        }
    }
    assert!(!created.is_empty());

    // Every created checkpoint is recorded once, and the document parses
    let records = ctx.metadata.all()?;
    assert_eq!(records.len(), created.len());
    let ids: HashSet<_> = records.iter().map(|c| c.id.clone()).collect();
    assert_eq!(ids.len(), records.len());

    // Each record names a distinct, readable revision
    let repo = ctx.shadow(project.root())?;
    let revisions: HashSet<_> = repo.list_revisions().await?.into_iter().map(|r| r.id).collect();
    for record in &records {
        assert!(revisions.contains(&record.id), "missing revision {}", record.id);
        repo.files(&record.id).await?;
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_projects_share_metadata() -> Result<()> {
    require_git!();
    let env = TestEnv::new()?;
    let ctx = env.context();
    let engine = Arc::new(CheckpointEngine::new(ctx.clone()));

    let projects: Vec<TestProject> = (0..WORKERS)
        .map(|_| TestProject::new(ProjectTemplate::rust_project(ProjectSize::Tiny)))
        .collect::<Result<_>>()?;

    let mut handles = Vec::new();
    for project in &projects {
        let engine = Arc::clone(&engine);
        let root = project.root().to_path_buf();
        let invocation = ToolInvocation::Edit {
            file_path: root.join("src/main.rs").to_string_lossy().into_owned(),
        };
        handles.push(tokio::spawn(async move {
            engine.pre_operation(&invocation, "shared", &root).await
        }));
    }

    for handle in handles {
        assert!(matches!(handle.await?, PreOutcome::Created(_)));
    }

    // One record per project, none lost to a racing write
    let records = ctx.metadata.all()?;
    assert_eq!(records.len(), WORKERS);
    let hashes: HashSet<_> = records.iter().map(|c| c.project_hash.clone()).collect();
    assert_eq!(hashes.len(), WORKERS);
    Ok(())
}
