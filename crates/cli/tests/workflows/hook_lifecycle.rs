//! Hook lifecycle tests driving the `ckpt` binary
//!
//! pre → tool runs → post, as the host agent would call it.

use anyhow::Result;
use ckpt_core::ProjectHash;
use journal::{CheckpointQuery, CheckpointStatus};

use crate::common::cli::{extract_checkpoint_id, result_payload, tool_payload, CkptCommand};
use crate::common::{ProjectSize, ProjectTemplate, TestEnv, TestProject};

#[test]
fn test_pre_post_cycle_completes_checkpoint() -> Result<()> {
    require_git!();
    let env = TestEnv::new()?;
    let mut project = TestProject::new(ProjectTemplate::rust_project(ProjectSize::Small))?;
    let root = project.root().to_path_buf();
    let target = project.path("src/lib.rs");

    // 1. Pre hook snapshots the current state
    let pre = CkptCommand::new(&env, &root)
        .args(&["hook", "pre"])
        .stdin(tool_payload("Edit", &target, "session-1", &root))
        .assert_success()?;
    let short = extract_checkpoint_id(&pre.stderr).expect("pre hook should report a checkpoint");
    assert!(pre.stdout.is_empty(), "hook stdout must stay clean: {}", pre.stdout);

    // 2. The tool edits the file
    project.modify_files(&["src/lib.rs"], "pub fn edited() {}\n")?;

    // 3. Post hook finalizes it
    CkptCommand::new(&env, &root)
        .args(&["hook", "post"])
        .stdin(result_payload("Edit", &target, "session-1", &root, true))
        .assert_success()?;

    let ctx = env.context();
    let all = ctx.metadata.all()?;
    assert_eq!(all.len(), 1);
    let checkpoint = &all[0];
    assert!(checkpoint.id.as_str().starts_with(&short));
    assert_eq!(checkpoint.status, CheckpointStatus::Completed);
    assert_eq!(checkpoint.tool, "Edit");
    assert_eq!(checkpoint.session_id, "session-1");
    assert_eq!(checkpoint.files, vec!["src/lib.rs".to_string()]);
    assert_eq!(checkpoint.message.as_deref(), Some("Before editing lib.rs"));
    assert_eq!(checkpoint.project_hash, ProjectHash::identify(&root)?.0);

    Ok(())
}

#[test]
fn test_failed_tool_marks_checkpoint_failed() -> Result<()> {
    require_git!();
    let env = TestEnv::new()?;
    let project = TestProject::new(ProjectTemplate::rust_project(ProjectSize::Tiny))?;
    let root = project.root().to_path_buf();
    let target = project.path("notes.md");

    CkptCommand::new(&env, &root)
        .args(&["hook", "pre"])
        .stdin(tool_payload("Write", &target, "s", &root))
        .assert_success()?;
    CkptCommand::new(&env, &root)
        .args(&["hook", "post"])
        .stdin(result_payload("Write", &target, "s", &root, false))
        .assert_success()?;

    let statuses: Vec<_> = env.context().metadata.all()?.into_iter().map(|c| c.status).collect();
    assert_eq!(statuses, vec![CheckpointStatus::Failed]);
    Ok(())
}

#[test]
fn test_repeated_pre_without_changes_is_idempotent() -> Result<()> {
    require_git!();
    let env = TestEnv::new()?;
    let project = TestProject::new(ProjectTemplate::rust_project(ProjectSize::Tiny))?;
    let root = project.root().to_path_buf();
    let target = project.path("src/main.rs");

    for _ in 0..3 {
        CkptCommand::new(&env, &root)
            .args(&["hook", "pre"])
            .stdin(tool_payload("Edit", &target, "s", &root))
            .assert_success()?;
    }

    let ctx = env.context();
    assert_eq!(ctx.metadata.all()?.len(), 1);
    let repo = ctx.shadow(&root)?;
    let revisions = tokio::runtime::Runtime::new()?.block_on(repo.list_revisions())?;
    assert_eq!(revisions.len(), 1);
    Ok(())
}

#[test]
fn test_list_and_status_show_checkpoints() -> Result<()> {
    require_git!();
    let env = TestEnv::new()?;
    let mut project = TestProject::new(ProjectTemplate::rust_project(ProjectSize::Small))?;
    let root = project.root().to_path_buf();

    CkptCommand::new(&env, &root).args(&["now", "first pass"]).assert_success()?;
    project.modify_files(&["src/extra.rs"], "fn extra() {}\n")?;
    CkptCommand::new(&env, &root).args(&["now", "second pass"]).assert_success()?;

    let list = CkptCommand::new(&env, &root).args(&["list"]).assert_success()?;
    assert!(list.contains_stdout("first pass"));
    assert!(list.contains_stdout("second pass"));
    // Newest first
    let first = list.stdout.find("second pass").unwrap_or(usize::MAX);
    let second = list.stdout.find("first pass").unwrap_or(0);
    assert!(first < second);

    let search = CkptCommand::new(&env, &root).args(&["search", "SECOND"]).assert_success()?;
    assert!(search.contains_stdout("second pass"));
    assert!(!search.contains_stdout("first pass"));

    let status = CkptCommand::new(&env, &root).args(&["status"]).assert_success()?;
    assert!(status.contains_stdout(ProjectHash::identify(&root)?.0.as_str()));
    assert!(status.contains_stdout("Most modified files"));

    let ctx = env.context();
    let manual = ctx.metadata.query(&CheckpointQuery::new().tool("Manual"))?.count();
    assert_eq!(manual, 2);
    Ok(())
}

#[test]
fn test_stop_hook_respects_config() -> Result<()> {
    require_git!();
    let env = TestEnv::new()?;
    let project = TestProject::new(ProjectTemplate::rust_project(ProjectSize::Tiny))?;
    let root = project.root().to_path_buf();
    let payload = serde_json::json!({ "session_id": "s", "cwd": root }).to_string();

    // Off by default
    CkptCommand::new(&env, &root)
        .args(&["hook", "stop"])
        .stdin(payload.clone())
        .assert_success()?;
    assert!(env.context().metadata.all()?.is_empty());

    env.write_config("checkpoint_on_stop = true\n")?;
    CkptCommand::new(&env, &root)
        .args(&["hook", "stop"])
        .stdin(payload)
        .assert_success()?;

    let all = env.context().metadata.all()?;
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].tool, "Stop");
    assert_eq!(all[0].status, CheckpointStatus::Completed);
    assert_eq!(all[0].message.as_deref(), Some("Session end checkpoint"));
    Ok(())
}
