//! Integration tests for `MemoryStore`: concurrent cap enforcement and
//! snapshot persistence.

use std::sync::Arc;

use earnguard_common::{ContentType, Creator, EarningRecord, EngagementEvent, EngagementKind, Post};
use earnguard_store::{CommitOutcome, DailyCapGuard, MemoryStore, Store, StoreError};

fn earning(id: usize, amount: f64) -> EarningRecord {
    EarningRecord {
        id: format!("e{}", id),
        owner_id: "creator".to_string(),
        post_id: "post".to_string(),
        amount,
        created_at: 1_000,
        paid: false,
        held_until: None,
        hold_reason: None,
    }
}

async fn seeded() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store
        .put_post(Post::new("post", "creator", ContentType::Text, 0))
        .await
        .expect("put post");
    store
        .put_creator(Creator::new("creator", 0))
        .await
        .expect("put creator");
    store
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_commits_never_exceed_daily_cap() {
    let store = seeded().await;
    let guard = DailyCapGuard {
        day_start: 0,
        cap: 100.0,
    };

    let mut handles = Vec::new();
    for i in 0..25 {
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            store.commit_earning(earning(i, 10.0), Some(guard)).await
        }));
    }

    let mut committed = 0;
    let mut rejected = 0;
    for h in handles {
        match h.await.expect("join").expect("commit") {
            CommitOutcome::Committed { day_total } => {
                assert!(day_total <= 100.0);
                committed += 1;
            }
            CommitOutcome::CapExceeded { .. } => rejected += 1,
        }
    }

    assert_eq!(committed, 10);
    assert_eq!(rejected, 15);
    assert_eq!(store.sum_earnings_since("creator", 0).await.unwrap(), 100.0);
    let creator = store.get_creator("creator").await.unwrap().unwrap();
    assert_eq!(creator.total_earnings, 100.0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_duplicate_likes_record_once() {
    let store = seeded().await;
    let mut handles = Vec::new();
    for _ in 0..16 {
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            store
                .insert_engagement(EngagementEvent {
                    actor_id: "fan".to_string(),
                    post_id: "post".to_string(),
                    kind: EngagementKind::Like,
                    created_at: 5,
                    comment_chars: None,
                    comment_text: None,
                })
                .await
        }));
    }

    let mut ok = 0;
    for h in handles {
        match h.await.expect("join") {
            Ok(_) => ok += 1,
            Err(StoreError::Conflict(_)) => {}
            Err(other) => panic!("unexpected error: {}", other),
        }
    }
    assert_eq!(ok, 1);
    assert_eq!(store.get_post("post").await.unwrap().unwrap().likes, 1);
}

#[tokio::test]
async fn snapshot_roundtrip_preserves_dedup_index() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("state").join("earnguard.json");

    let store = seeded().await;
    let like = EngagementEvent {
        actor_id: "fan".to_string(),
        post_id: "post".to_string(),
        kind: EngagementKind::Like,
        created_at: 5,
        comment_chars: None,
        comment_text: None,
    };
    store.insert_engagement(like.clone()).await.expect("insert");
    store
        .commit_earning(earning(1, 2.5), None)
        .await
        .expect("commit");
    store.save_snapshot(&path).expect("save");
    assert!(!path.with_extension("tmp").exists());

    let restored = MemoryStore::load_snapshot(&path).expect("load");
    assert_eq!(restored.stats(), store.stats());
    let post = restored.get_post("post").await.unwrap().unwrap();
    assert_eq!(post.likes, 1);
    assert_eq!(post.total_earnings, 2.5);

    let dup = restored.insert_engagement(like).await;
    assert!(matches!(dup, Err(StoreError::Conflict(_))));
}

#[tokio::test]
async fn load_missing_snapshot_starts_empty() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = MemoryStore::load_snapshot(dir.path().join("absent.json")).expect("load");
    assert_eq!(store.stats().posts, 0);
}

#[tokio::test]
async fn corrupt_snapshot_is_persistence_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("bad.json");
    std::fs::write(&path, b"{not json").expect("write");
    let err = MemoryStore::load_snapshot(&path).unwrap_err();
    assert!(matches!(err, StoreError::Persistence(_)));
}
