//! Interrupted growth runs and their recovery.
//!
//! These tests verify that a story survives interruption:
//! - An aborted run leaves a tree the planner can resume from
//! - A crash between child creation and branch marking is detected, not repaired
//! - Progress persists across `JsonFileStore` instances
//! - Corrupt trees are rejected with the offending ids

use story_tree::testing::{RecordBuilder, ScriptedGenerator, ScriptedResponse};
use story_tree::{
    plan_resume, GrowthEngine, GrowthError, JsonFileStore, MemoryStore, SceneletStore,
    StoryBrief, ValidationError,
};
use tempfile::TempDir;

const STORY: &str = "lighthouse";

fn brief() -> StoryBrief {
    StoryBrief::new("A keeper tends a lighthouse on a cursed shore.")
}

#[tokio::test]
async fn test_interrupted_run_resumes_to_completion() {
    let generator = ScriptedGenerator::new(vec![
        ScriptedResponse::linear("Fog"),
        ScriptedResponse::branch("Which door?", vec![("Left", "Left hall"), ("Right", "Right hall")]),
    ]);
    let engine = GrowthEngine::new(generator.clone(), MemoryStore::new());

    // The script runs dry on the third call.
    let err = engine.start(STORY, &brief()).await.unwrap_err();
    assert!(matches!(err, GrowthError::Generation { .. }));

    let records = engine.store().records().await;
    assert_eq!(records.len(), 3);
    let plan = plan_resume(STORY, &records).unwrap();
    let descriptions: Vec<_> = plan
        .pending_tasks
        .iter()
        .map(|t| t.path_context.last().unwrap().description.as_str())
        .collect();
    assert_eq!(descriptions, vec!["Left hall", "Right hall"]);

    generator.queue(ScriptedResponse::concluding("Left end"));
    generator.queue(ScriptedResponse::concluding("Right end"));
    let report = engine.resume(STORY, &brief()).await.unwrap();
    assert_eq!(report.generation_calls, 2);
    assert_eq!(report.terminals, 2);

    let plan = plan_resume(STORY, &engine.store().records().await).unwrap();
    assert!(plan.is_complete());

    // Resuming a finished story is a no-op.
    let calls = generator.calls();
    let report = engine.resume(STORY, &brief()).await.unwrap();
    assert_eq!(report.generation_calls, 0);
    assert_eq!(generator.calls(), calls);
}

#[tokio::test]
async fn test_resume_of_unknown_story_starts_fresh() {
    let generator = ScriptedGenerator::new(vec![ScriptedResponse::concluding("Short tale")]);
    let engine = GrowthEngine::new(generator, MemoryStore::new());

    let report = engine.resume("new-story", &brief()).await.unwrap();
    assert_eq!(report.scenelets_created, 1);
    assert_eq!(report.story_id, "new-story");
}

#[tokio::test]
async fn test_crash_before_branch_marking_is_detected() {
    let generator = ScriptedGenerator::new(vec![
        ScriptedResponse::linear("Fog"),
        ScriptedResponse::branch("Which door?", vec![("Left", "L"), ("Right", "R")]),
    ]);
    let store = MemoryStore::new();
    // Root and both children are written; marking the parent fails.
    store.fail_after_writes(3);
    let engine = GrowthEngine::new(generator, store);

    let err = engine.start(STORY, &brief()).await.unwrap_err();
    assert!(matches!(err, GrowthError::Store { .. }));

    let records = engine.store().records().await;
    assert_eq!(records.len(), 3);
    let root = records.iter().find(|r| r.is_root()).unwrap();
    assert!(!root.is_branch_point);
    let left = records
        .iter()
        .find(|r| r.choice_label_from_parent.as_deref() == Some("Left"))
        .unwrap();

    assert_eq!(
        plan_resume(STORY, &records).unwrap_err(),
        ValidationError::UnflaggedBranch {
            scenelet_id: root.id.clone(),
            child_id: left.id.clone(),
        }
    );

    engine.store().heal();
    let err = engine.resume(STORY, &brief()).await.unwrap_err();
    assert!(matches!(
        err,
        GrowthError::Validation(ValidationError::UnflaggedBranch { .. })
    ));
}

#[tokio::test]
async fn test_file_store_progress_survives_restart() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("stories").join("lighthouse.json");

    {
        let generator = ScriptedGenerator::new(vec![ScriptedResponse::linear("Fog")]);
        let engine = GrowthEngine::new(generator, JsonFileStore::new(&path));
        assert!(engine.start(STORY, &brief()).await.is_err());
    }
    assert!(path.exists());

    let generator = ScriptedGenerator::new(vec![ScriptedResponse::concluding("Dawn")]);
    let engine = GrowthEngine::new(generator.clone(), JsonFileStore::new(&path));
    let report = engine.resume(STORY, &brief()).await.unwrap();
    assert_eq!(report.generation_calls, 1);
    assert!(generator.requests()[0].user_content.contains("Fog"));

    let records = JsonFileStore::new(&path)
        .list_scenelets_by_story(STORY)
        .await
        .unwrap();
    assert_eq!(records.len(), 2);
    assert!(plan_resume(STORY, &records).unwrap().is_complete());
}

#[tokio::test]
async fn test_multiple_roots_block_resume() {
    let store = MemoryStore::with_records(vec![
        RecordBuilder::new(STORY, "root-a").at(0).build(),
        RecordBuilder::new(STORY, "root-b").at(1).build(),
    ]);
    let generator = ScriptedGenerator::default();
    let engine = GrowthEngine::new(generator.clone(), store);

    let err = engine.resume(STORY, &brief()).await.unwrap_err();
    let message = err.to_string();
    assert!(message.contains("root-a") && message.contains("root-b"));
    assert_eq!(generator.calls(), 0);
}

#[tokio::test]
async fn test_terminal_with_child_blocks_resume() {
    let store = MemoryStore::with_records(vec![
        RecordBuilder::new(STORY, "r").at(0).build(),
        RecordBuilder::new(STORY, "end").parent("r").terminal().at(1).build(),
        RecordBuilder::new(STORY, "after").parent("end").at(2).build(),
    ]);
    let engine = GrowthEngine::new(ScriptedGenerator::default(), store);

    let err = engine.resume(STORY, &brief()).await.unwrap_err();
    assert!(matches!(
        err,
        GrowthError::Validation(ValidationError::TerminalHasChildren { ref scenelet_id })
            if scenelet_id == "end"
    ));
}

#[tokio::test]
async fn test_other_stories_are_ignored() {
    let store = MemoryStore::with_records(vec![
        RecordBuilder::new("other", "x").at(0).build(),
        RecordBuilder::new("other", "y").at(1).build(),
        RecordBuilder::new(STORY, "r").terminal().at(2).build(),
    ]);
    let engine = GrowthEngine::new(ScriptedGenerator::default(), store);

    let report = engine.resume(STORY, &brief()).await.unwrap();
    assert_eq!(report.generation_calls, 0);
}
