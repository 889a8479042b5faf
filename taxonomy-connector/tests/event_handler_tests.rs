//! Event dispatcher tests
//!
//! Tagging work is captured by a recording runner instead of the vendor.

mod helpers;

use async_trait::async_trait;
use helpers::setup_test_db;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use taxonomy_common::events::{EventBus, EventKind, TaxonomyEvent};
use taxonomy_connector::db::skills::{upsert_skill, SkillInput};
use taxonomy_connector::db::xblocks::{get_xblock, list_xblock_skill_data, mark_verified, upsert_xblock, upsert_xblock_skill};
use taxonomy_connector::services::{
    run_event_listener, EventDispatcher, HandlerContext, HandlerOutcome, TaggingTask, TaskQueue, TaskRunner,
};
use tokio::sync::Mutex;

const USAGE_KEY: &str = "block-v1:edX+X+1+type@html+block@a";

#[derive(Default)]
struct Recorder {
    seen: Mutex<Vec<TaggingTask>>,
}

#[async_trait]
impl TaskRunner for Recorder {
    async fn run(&self, task: &TaggingTask) -> anyhow::Result<()> {
        self.seen.lock().await.push(task.clone());
        Ok(())
    }
}

fn dispatcher(pool: &SqlitePool) -> (EventDispatcher, Arc<Recorder>) {
    let recorder = Arc::new(Recorder::default());
    let (queue, _worker) = TaskQueue::start(recorder.clone(), 16);
    let dispatcher = EventDispatcher::new(HandlerContext {
        db: pool.clone(),
        queue,
    });
    (dispatcher, recorder)
}

/// Tagged xblock with two skills; returns (xblock id, skill ids)
async fn seed_xblock(pool: &SqlitePool) -> (i64, Vec<i64>) {
    let xblock_id = upsert_xblock(pool, USAGE_KEY, Some("course-v1:edX+X+1"), "hash").await.unwrap();
    let mut skill_ids = Vec::new();
    for name in ["Rust", "SQL"] {
        let id = upsert_skill(
            pool,
            &SkillInput {
                external_id: format!("KS-{}", name),
                name: name.to_string(),
                description: String::new(),
                info_url: None,
                type_id: None,
                type_name: None,
            },
        )
        .await
        .unwrap();
        upsert_xblock_skill(pool, xblock_id, id).await.unwrap();
        skill_ids.push(id);
    }
    (xblock_id, skill_ids)
}

async fn wait_for_tasks(recorder: &Recorder, n: usize) -> Vec<TaggingTask> {
    for _ in 0..100 {
        let seen = recorder.seen.lock().await.clone();
        if seen.len() >= n {
            return seen;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("expected {} tagging tasks", n);
}

#[tokio::test]
async fn test_every_event_kind_has_a_handler() {
    let pool = setup_test_db().await;
    let (dispatcher, _) = dispatcher(&pool);

    let mut expected = EventKind::ALL.to_vec();
    expected.sort_by_key(|k| k.as_str());
    assert_eq!(dispatcher.registered_kinds(), expected);
}

#[tokio::test]
async fn test_publish_and_update_events_enqueue_tagging() {
    let pool = setup_test_db().await;
    let (dispatcher, recorder) = dispatcher(&pool);

    let outcome = dispatcher
        .dispatch(&TaxonomyEvent::XBlockPublished {
            usage_key: USAGE_KEY.to_string(),
            block_type: Some("html".to_string()),
        })
        .await
        .unwrap();
    assert!(matches!(outcome, HandlerOutcome::Enqueued { .. }));

    dispatcher
        .dispatch(&TaxonomyEvent::CourseUpdated {
            course_id: "course-v1:edX+X+1".to_string(),
        })
        .await
        .unwrap();
    dispatcher
        .dispatch(&TaxonomyEvent::ProgramUpdated {
            program_id: "prog-uuid".to_string(),
        })
        .await
        .unwrap();

    let seen = wait_for_tasks(&recorder, 3).await;
    assert_eq!(
        seen,
        vec![
            TaggingTask::XBlock {
                usage_key: USAGE_KEY.to_string()
            },
            TaggingTask::Course {
                course_key: "course-v1:edX+X+1".to_string()
            },
            TaggingTask::Program {
                program_uuid: "prog-uuid".to_string()
            },
        ]
    );
}

#[tokio::test]
async fn test_votes_increment_open_rows_only() {
    let pool = setup_test_db().await;
    let (dispatcher, _) = dispatcher(&pool);
    let (xblock_id, skills) = seed_xblock(&pool).await;

    let vote = TaxonomyEvent::XBlockSkillVerified {
        usage_key: USAGE_KEY.to_string(),
        verified_skills: vec![skills[0]],
        ignored_skills: vec![skills[1]],
    };
    let outcome = dispatcher.dispatch(&vote).await.unwrap();
    assert_eq!(outcome, HandlerOutcome::VotesRecorded { verified: 1, ignored: 1 });

    // Redelivery counts again
    dispatcher.dispatch(&vote).await.unwrap();
    let rows = list_xblock_skill_data(&pool, xblock_id).await.unwrap();
    assert_eq!(rows[0].verified_count, 2);
    assert_eq!(rows[1].ignored_count, 2);

    assert!(mark_verified(&pool, rows[0].id).await.unwrap());
    let outcome = dispatcher.dispatch(&vote).await.unwrap();
    assert_eq!(outcome, HandlerOutcome::VotesRecorded { verified: 0, ignored: 1 });
    let rows = list_xblock_skill_data(&pool, xblock_id).await.unwrap();
    assert_eq!(rows[0].verified_count, 2);
}

#[tokio::test]
async fn test_votes_for_unknown_xblock_or_empty_lists_are_skipped() {
    let pool = setup_test_db().await;
    let (dispatcher, _) = dispatcher(&pool);

    let unknown = dispatcher
        .dispatch(&TaxonomyEvent::XBlockSkillVerified {
            usage_key: "block-v1:missing".to_string(),
            verified_skills: vec![1],
            ignored_skills: vec![],
        })
        .await
        .unwrap();
    assert!(matches!(unknown, HandlerOutcome::Skipped { .. }));

    let empty = dispatcher
        .dispatch(&TaxonomyEvent::XBlockSkillVerified {
            usage_key: USAGE_KEY.to_string(),
            verified_skills: vec![],
            ignored_skills: vec![],
        })
        .await
        .unwrap();
    assert!(matches!(empty, HandlerOutcome::Skipped { .. }));
}

#[tokio::test]
async fn test_delete_removes_xblock_and_its_skills() {
    let pool = setup_test_db().await;
    let (dispatcher, _) = dispatcher(&pool);
    let (xblock_id, _) = seed_xblock(&pool).await;

    let event = TaxonomyEvent::XBlockDeleted {
        usage_key: USAGE_KEY.to_string(),
    };
    assert_eq!(dispatcher.dispatch(&event).await.unwrap(), HandlerOutcome::Deleted { found: true });
    assert!(get_xblock(&pool, USAGE_KEY).await.unwrap().is_none());
    assert!(list_xblock_skill_data(&pool, xblock_id).await.unwrap().is_empty());

    assert_eq!(dispatcher.dispatch(&event).await.unwrap(), HandlerOutcome::Deleted { found: false });
}

#[tokio::test]
async fn test_duplicate_copies_whitelisted_skills_with_fresh_counters() {
    let pool = setup_test_db().await;
    let (dispatcher, _) = dispatcher(&pool);
    let (source_id, skills) = seed_xblock(&pool).await;

    sqlx::query("UPDATE xblock_skill_data SET verified_count = 5 WHERE xblock_id = ?")
        .bind(source_id)
        .execute(&pool)
        .await
        .unwrap();
    sqlx::query("UPDATE xblock_skill_data SET is_blacklisted = 1 WHERE xblock_id = ? AND skill_id = ?")
        .bind(source_id)
        .bind(skills[1])
        .execute(&pool)
        .await
        .unwrap();

    let copy_key = "block-v1:edX+Y+2+type@html+block@copy";
    let outcome = dispatcher
        .dispatch(&TaxonomyEvent::XBlockDuplicated {
            source_usage_key: USAGE_KEY.to_string(),
            usage_key: copy_key.to_string(),
        })
        .await
        .unwrap();
    assert_eq!(outcome, HandlerOutcome::Duplicated { copied: 1 });

    let copy = get_xblock(&pool, copy_key).await.unwrap().unwrap();
    assert_eq!(copy.course_key.as_deref(), Some("course-v1:edX+Y+2"));
    assert_eq!(copy.hash_content.as_deref(), Some("hash"));
    let rows = list_xblock_skill_data(&pool, copy.id).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].skill_id, skills[0]);
    assert_eq!(rows[0].verified_count, 0);
}

#[tokio::test]
async fn test_duplicate_of_untagged_xblock_is_skipped() {
    let pool = setup_test_db().await;
    let (dispatcher, _) = dispatcher(&pool);

    let outcome = dispatcher
        .dispatch(&TaxonomyEvent::XBlockDuplicated {
            source_usage_key: "block-v1:missing".to_string(),
            usage_key: "block-v1:copy".to_string(),
        })
        .await
        .unwrap();
    assert!(matches!(outcome, HandlerOutcome::Skipped { .. }));
    assert!(get_xblock(&pool, "block-v1:copy").await.unwrap().is_none());
}

#[tokio::test]
async fn test_bus_events_reach_dispatcher() {
    let pool = setup_test_db().await;
    let (dispatcher, _) = dispatcher(&pool);
    seed_xblock(&pool).await;

    let bus = EventBus::new(16);
    let listener = tokio::spawn(run_event_listener(Arc::new(dispatcher), bus.clone()));
    while bus.subscriber_count() == 0 {
        tokio::task::yield_now().await;
    }

    bus.emit(TaxonomyEvent::XBlockDeleted {
        usage_key: USAGE_KEY.to_string(),
    })
    .unwrap();

    for _ in 0..100 {
        if get_xblock(&pool, USAGE_KEY).await.unwrap().is_none() {
            listener.abort();
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("bus event was not handled");
}
