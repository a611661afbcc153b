//! Strike ladder escalation, side effects, expiry and admin clears.

mod support;

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;

use earnguard_common::{AccountStatus, Mode, StrikeAction, WarningReason, WarningRecord};
use earnguard_engine::{EngineError, IntegrityEngineBuilder, Notifier};
use earnguard_store::{MemoryStore, Store};

use support::*;

#[derive(Default)]
struct RecordingNotifier {
    sent: Mutex<Vec<(String, u8)>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify_warning(&self, warning: &WarningRecord) -> Result<(), String> {
        self.sent
            .lock()
            .push((warning.owner_id.clone(), warning.strike_level));
        Ok(())
    }
}

async fn warn(engine: &earnguard_engine::IntegrityEngine, owner: &str, now: u64) -> earnguard_engine::IssuedWarning {
    engine
        .issue_warning(owner, WarningReason::EngagementVelocity, json!({"test": true}), now)
        .await
        .expect("issue warning")
}

#[tokio::test]
async fn ladder_escalates_to_suspension() {
    let store = Arc::new(MemoryStore::new());
    verified_creator(store.as_ref(), "c1", 60).await;
    post_with_counts(store.as_ref(), "p1", "c1", 0, 0).await;
    unpaid_earning(store.as_ref(), "e1", "c1", "p1", 5.0).await;
    let notifier = Arc::new(RecordingNotifier::default());
    let engine = IntegrityEngineBuilder::new(store.clone())
        .with_notifier(notifier.clone())
        .build()
        .expect("engine");

    let w1 = warn(&engine, "c1", NOW).await;
    assert_eq!(w1.warning.strike_level, 1);
    assert_eq!(w1.warning.action, StrikeAction::LogOnly);
    assert_eq!(w1.status, AccountStatus::Active);
    assert_eq!(w1.warning.expires_at, Some(NOW + 30 * DAY));

    let w2 = warn(&engine, "c1", NOW + 1).await;
    assert_eq!(w2.warning.strike_level, 2);
    assert_eq!(w2.warning.action, StrikeAction::Notify);
    assert_eq!(notifier.sent.lock().as_slice(), &[("c1".to_string(), 2)]);

    let w3 = warn(&engine, "c1", NOW + 2).await;
    assert_eq!(w3.warning.strike_level, 3);
    assert_eq!(w3.status, AccountStatus::Probation);
    let probation_end = NOW + 2 + 7 * DAY;
    assert_eq!(w3.hold_until, Some(probation_end));
    assert_eq!(w3.earnings_held, 1);
    let creator = store.get_creator("c1").await.expect("get").expect("creator");
    assert_eq!(creator.probation_until, Some(probation_end));
    assert!(!creator.can_earn(NOW + 3));

    // a fifth warning with four active computes level 4
    let w4 = warn(&engine, "c1", NOW + 3).await;
    assert_eq!(w4.warning.strike_level, 4);
    assert_eq!(w4.status, AccountStatus::Suspended);
    let w5 = warn(&engine, "c1", NOW + 4).await;
    assert_eq!(w5.warning.strike_level, 4);
    assert!(matches!(w5.warning.action, StrikeAction::Suspend { review_hold_days: 3650 }));

    let records = store.earnings_for_owner("c1").await.expect("records");
    assert_eq!(records[0].held_until, Some(NOW + 4 + 3650 * DAY));
    assert_eq!(records[0].hold_reason.as_deref(), Some("SUSPENDED_PENDING_REVIEW"));

    let status = engine.creator_status("c1", NOW + 5).await.expect("status");
    assert_eq!(status.status, AccountStatus::Suspended);
    assert!(!status.can_earn);
    assert_eq!(status.active_strikes, 5);
    assert!(matches!(status.next_strike_action, StrikeAction::Suspend { .. }));
    assert_eq!(engine.metrics().warnings_issued.get(), 5);
    assert_eq!(engine.metrics().suspensions.get(), 1);
}

#[tokio::test]
async fn warnings_decay_out_of_the_window() {
    let store = Arc::new(MemoryStore::new());
    verified_creator(store.as_ref(), "c1", 60).await;
    let engine = engine(store.clone(), Mode::Beta);

    warn(&engine, "c1", NOW).await;
    warn(&engine, "c1", NOW + 1).await;

    // live count ignores old warnings even before the sweep runs
    let later = NOW + 31 * DAY;
    let w = warn(&engine, "c1", later).await;
    assert_eq!(w.warning.strike_level, 1);
}

#[tokio::test]
async fn expiry_sweep_is_idempotent() {
    let store = Arc::new(MemoryStore::new());
    verified_creator(store.as_ref(), "c1", 60).await;
    let engine = engine(store.clone(), Mode::Beta);
    warn(&engine, "c1", NOW).await;

    let report = engine.expire_warnings(NOW + 29 * DAY).await.expect("sweep");
    assert_eq!(report.warnings_cleared, 0);

    let report = engine.expire_warnings(NOW + 30 * DAY).await.expect("sweep");
    assert_eq!(report.warnings_cleared, 1);

    let report = engine.expire_warnings(NOW + 30 * DAY).await.expect("sweep");
    assert_eq!(report.warnings_cleared, 0);

    let warnings = store.warnings_for_owner("c1").await.expect("warnings");
    assert_eq!(warnings[0].cleared_by.as_deref(), Some(earnguard_store::EXPIRY_SWEEP_ACTOR));
}

#[tokio::test]
async fn sweep_restores_lapsed_probation() {
    let store = Arc::new(MemoryStore::new());
    verified_creator(store.as_ref(), "c1", 60).await;
    let engine = engine(store.clone(), Mode::Beta);
    for i in 0..3 {
        warn(&engine, "c1", NOW + i).await;
    }
    let status = engine.creator_status("c1", NOW + 3).await.expect("status");
    assert_eq!(status.status, AccountStatus::Probation);
    assert!(!status.can_earn);

    // elapsed probation can earn before the sweep
    let after = NOW + 8 * DAY;
    let status = engine.creator_status("c1", after).await.expect("status");
    assert!(status.can_earn);

    let report = engine.expire_warnings(after).await.expect("sweep");
    assert_eq!(report.probations_restored, 1);
    let status = engine.creator_status("c1", after).await.expect("status");
    assert_eq!(status.status, AccountStatus::Active);
}

#[tokio::test]
async fn admin_clear_raises_trust_once() {
    let store = Arc::new(MemoryStore::new());
    verified_creator(store.as_ref(), "c1", 60).await;
    let engine = engine(store.clone(), Mode::Beta);
    let w = warn(&engine, "c1", NOW).await;

    assert!(engine.clear_warning(&w.warning.id, "admin", NOW + 10).await.expect("clear"));
    assert!(!engine.clear_warning(&w.warning.id, "admin", NOW + 20).await.expect("clear"));

    let status = engine.creator_status("c1", NOW + 30).await.expect("status");
    assert_eq!(status.trust_score, 55);
    assert_eq!(status.active_strikes, 0);
    assert_eq!(status.next_strike_action, StrikeAction::LogOnly);

    let e = engine.clear_warning("missing", "admin", NOW).await.unwrap_err();
    assert!(matches!(e, EngineError::NotFound { entity: "warning", .. }));
}

#[tokio::test]
async fn warning_for_unknown_owner_is_not_found() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine(store.clone(), Mode::Natural);
    let e = engine
        .issue_warning("ghost", WarningReason::ActivityVelocity, json!({}), NOW)
        .await
        .unwrap_err();
    assert!(matches!(e, EngineError::NotFound { entity: "creator", .. }));
    assert_eq!(store.stats().warnings, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_warnings_get_distinct_levels() {
    let store = Arc::new(MemoryStore::new());
    verified_creator(store.as_ref(), "c1", 60).await;
    let engine = Arc::new(engine(store.clone(), Mode::Beta));

    let mut handles = Vec::new();
    for i in 0..3 {
        let engine = Arc::clone(&engine);
        handles.push(tokio::spawn(async move {
            engine
                .issue_warning("c1", WarningReason::EngagementVelocity, json!({}), NOW + i)
                .await
                .map(|w| w.warning.strike_level)
        }));
    }
    let mut levels = Vec::new();
    for h in handles {
        levels.push(h.await.expect("join").expect("issue"));
    }
    levels.sort_unstable();
    assert_eq!(levels, vec![1, 2, 3]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn probation_landing_mid_commit_still_holds_the_new_earning() {
    // stagger the third strike across every step of the pipeline
    for (round, delay_ms) in [0u64, 60, 150, 250, 400].into_iter().enumerate() {
        let store = Arc::new(MemoryStore::new());
        let creator = format!("c{round}");
        let post = format!("p{round}");
        verified_creator(store.as_ref(), &creator, 60).await;
        post_with_counts(store.as_ref(), &post, &creator, 10, 1).await;
        let engine = Arc::new(engine(store.clone(), Mode::Beta));
        warn(&engine, &creator, NOW).await;
        warn(&engine, &creator, NOW + 1).await;
        store.set_latency_ms(50);

        let processing = {
            let engine = Arc::clone(&engine);
            let (post, creator) = (post.clone(), creator.clone());
            tokio::spawn(async move { engine.process_earnings(&post, &creator, NOW + 2).await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
        let strike = warn(&engine, &creator, NOW + 2).await;
        let result = processing.await.expect("join").expect("process");

        assert_eq!(strike.warning.strike_level, 3);
        let probation_end = strike.hold_until.expect("probation hold");
        store.set_latency_ms(0);
        let records = store.earnings_for_owner(&creator).await.expect("records");
        assert_eq!(records.len(), usize::from(result.success), "round {round}");
        for record in records.iter().filter(|r| !r.paid) {
            assert!(
                record.held_until.map_or(false, |h| h >= probation_end),
                "round {round}: earning {} left unheld ({:?})",
                record.id,
                record.held_until
            );
        }
    }
}
