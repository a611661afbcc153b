//! Fixtures shared by the engine integration tests.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use earnguard_common::{
    AccountStatus, ContentType, Creator, EarningRecord, EngagementEvent, EngagementKind,
    FlaggedContent, Mode, ModeThresholds, Post, PostId, ReviewDecision, SwappableModeProvider,
    UserId, WarningRecord,
};
use earnguard_engine::{EngagementOutcome, EngagementRequest, IntegrityEngine, IntegrityEngineBuilder};
use earnguard_store::{
    CommitOutcome, DailyCapGuard, FlagUpsert, MemoryStore, Store, StoreError, StoreResult,
};

pub const DAY: u64 = 86_400;
/// Day 100, 01:00 UTC.
pub const NOW: u64 = 100 * DAY + 3_600;

pub fn engine(store: Arc<dyn Store>, mode: Mode) -> IntegrityEngine {
    engine_with(store, SwappableModeProvider::with_defaults(mode))
}

pub fn engine_with(store: Arc<dyn Store>, modes: SwappableModeProvider) -> IntegrityEngine {
    IntegrityEngineBuilder::new(store)
        .with_mode_provider(Arc::new(modes))
        .build()
        .expect("engine")
}

/// Provider running `mode` with custom thresholds for it.
pub fn provider(mode: Mode, thresholds: ModeThresholds) -> SwappableModeProvider {
    match mode {
        Mode::Beta => SwappableModeProvider::new(mode, thresholds, ModeThresholds::natural_default()),
        Mode::Natural => SwappableModeProvider::new(mode, ModeThresholds::beta_default(), thresholds),
    }
}

/// Verified STANDARD creator created `age_days` before [`NOW`].
pub async fn verified_creator(store: &dyn Store, id: &str, age_days: u64) -> Creator {
    let mut creator = Creator::new(id, NOW - age_days * DAY);
    creator.email_verified = true;
    creator.phone_verified = true;
    store.put_creator(creator.clone()).await.expect("put creator");
    creator
}

/// Unverified creator, used as an engaging actor.
pub async fn actor(store: &dyn Store, id: &str) -> Creator {
    let creator = Creator::new(id, 0);
    store.put_creator(creator.clone()).await.expect("put actor");
    creator
}

/// TEXT post with counters set directly and no engagement events.
pub async fn post_with_counts(store: &dyn Store, id: &str, author: &str, likes: u64, comments: u64) -> Post {
    let mut post = Post::new(id, author, ContentType::Text, 0);
    post.likes = likes;
    post.comments = comments;
    store.put_post(post.clone()).await.expect("put post");
    post
}

pub async fn unpaid_earning(store: &dyn Store, id: &str, owner: &str, post: &str, amount: f64) {
    let record = EarningRecord {
        id: id.to_string(),
        owner_id: owner.to_string(),
        post_id: post.to_string(),
        amount,
        created_at: NOW - 2 * DAY,
        paid: false,
        held_until: None,
        hold_reason: None,
    };
    store.commit_earning(record, None).await.expect("commit");
}

pub async fn engage(
    engine: &IntegrityEngine,
    actor_id: &str,
    post_id: &str,
    kind: EngagementKind,
    now: u64,
) -> EngagementOutcome {
    let comment_text = match kind {
        EngagementKind::Comment => Some("short comment".to_string()),
        _ => None,
    };
    engine
        .record_engagement(
            EngagementRequest {
                actor_id: actor_id.to_string(),
                post_id: post_id.to_string(),
                kind,
                comment_text,
            },
            now,
        )
        .await
        .expect("record engagement")
}

// ════════════════════════════════════════════════════════════════════════════
// FLAKY STORE
// ════════════════════════════════════════════════════════════════════════════

/// Delegates to a [`MemoryStore`] but fails the named operations with
/// `Unavailable`.
#[derive(Default)]
pub struct FlakyStore {
    pub inner: MemoryStore,
    failing: Mutex<HashSet<&'static str>>,
}

impl FlakyStore {
    pub fn fail(&self, op: &'static str) {
        self.failing.lock().insert(op);
    }

    pub fn heal(&self) {
        self.failing.lock().clear();
    }

    fn check(&self, op: &'static str) -> StoreResult<()> {
        if self.failing.lock().contains(op) {
            return Err(StoreError::Unavailable(format!("{} failed by test", op)));
        }
        Ok(())
    }
}

#[async_trait]
impl Store for FlakyStore {
    async fn get_post(&self, post_id: &str) -> StoreResult<Option<Post>> {
        self.check("get_post")?;
        self.inner.get_post(post_id).await
    }

    async fn put_post(&self, post: Post) -> StoreResult<()> {
        self.check("put_post")?;
        self.inner.put_post(post).await
    }

    async fn posts_engaged_since(&self, since: u64) -> StoreResult<Vec<Post>> {
        self.check("posts_engaged_since")?;
        self.inner.posts_engaged_since(since).await
    }

    async fn get_creator(&self, creator_id: &str) -> StoreResult<Option<Creator>> {
        self.check("get_creator")?;
        self.inner.get_creator(creator_id).await
    }

    async fn put_creator(&self, creator: Creator) -> StoreResult<()> {
        self.check("put_creator")?;
        self.inner.put_creator(creator).await
    }

    async fn set_account_status(
        &self,
        creator_id: &str,
        status: AccountStatus,
        probation_until: Option<u64>,
    ) -> StoreResult<()> {
        self.check("set_account_status")?;
        self.inner
            .set_account_status(creator_id, status, probation_until)
            .await
    }

    async fn adjust_trust_score(&self, creator_id: &str, delta: i32) -> StoreResult<i32> {
        self.check("adjust_trust_score")?;
        self.inner.adjust_trust_score(creator_id, delta).await
    }

    async fn restore_lapsed_probations(&self, now: u64) -> StoreResult<Vec<UserId>> {
        self.check("restore_lapsed_probations")?;
        self.inner.restore_lapsed_probations(now).await
    }

    async fn insert_engagement(&self, event: EngagementEvent) -> StoreResult<Post> {
        self.check("insert_engagement")?;
        self.inner.insert_engagement(event).await
    }

    async fn engagement_exists(
        &self,
        actor_id: &str,
        post_id: &str,
        kind: EngagementKind,
    ) -> StoreResult<bool> {
        self.check("engagement_exists")?;
        self.inner.engagement_exists(actor_id, post_id, kind).await
    }

    async fn count_post_engagements_since(
        &self,
        post_id: &str,
        kind: EngagementKind,
        since: u64,
    ) -> StoreResult<u64> {
        self.check("count_post_engagements_since")?;
        self.inner
            .count_post_engagements_since(post_id, kind, since)
            .await
    }

    async fn count_actor_engagements_since(&self, actor_id: &str, since: u64) -> StoreResult<u64> {
        self.check("count_actor_engagements_since")?;
        self.inner.count_actor_engagements_since(actor_id, since).await
    }

    async fn comment_lengths(&self, post_id: &str) -> StoreResult<Vec<u32>> {
        self.check("comment_lengths")?;
        self.inner.comment_lengths(post_id).await
    }

    async fn actor_engagement_counts(&self, post_id: &str) -> StoreResult<Vec<(UserId, u64)>> {
        self.check("actor_engagement_counts")?;
        self.inner.actor_engagement_counts(post_id).await
    }

    async fn actor_post_sets_since(&self, since: u64) -> StoreResult<Vec<(UserId, Vec<PostId>)>> {
        self.check("actor_post_sets_since")?;
        self.inner.actor_post_sets_since(since).await
    }

    async fn sum_earnings_since(&self, owner_id: &str, since: u64) -> StoreResult<f64> {
        self.check("sum_earnings_since")?;
        self.inner.sum_earnings_since(owner_id, since).await
    }

    async fn commit_earning(
        &self,
        record: EarningRecord,
        guard: Option<DailyCapGuard>,
    ) -> StoreResult<CommitOutcome> {
        self.check("commit_earning")?;
        self.inner.commit_earning(record, guard).await
    }

    async fn earnings_for_owner(&self, owner_id: &str) -> StoreResult<Vec<EarningRecord>> {
        self.check("earnings_for_owner")?;
        self.inner.earnings_for_owner(owner_id).await
    }

    async fn extend_holds_for_post(&self, post_id: &str, until: u64, reason: &str) -> StoreResult<usize> {
        self.check("extend_holds_for_post")?;
        self.inner.extend_holds_for_post(post_id, until, reason).await
    }

    async fn extend_holds_for_owner(&self, owner_id: &str, until: u64, reason: &str) -> StoreResult<usize> {
        self.check("extend_holds_for_owner")?;
        self.inner.extend_holds_for_owner(owner_id, until, reason).await
    }

    async fn insert_warning(&self, warning: WarningRecord) -> StoreResult<()> {
        self.check("insert_warning")?;
        self.inner.insert_warning(warning).await
    }

    async fn get_warning(&self, warning_id: &str) -> StoreResult<Option<WarningRecord>> {
        self.check("get_warning")?;
        self.inner.get_warning(warning_id).await
    }

    async fn count_active_warnings(&self, owner_id: &str, window_start: u64) -> StoreResult<u64> {
        self.check("count_active_warnings")?;
        self.inner.count_active_warnings(owner_id, window_start).await
    }

    async fn warnings_for_owner(&self, owner_id: &str) -> StoreResult<Vec<WarningRecord>> {
        self.check("warnings_for_owner")?;
        self.inner.warnings_for_owner(owner_id).await
    }

    async fn clear_warning(&self, warning_id: &str, cleared_by: &str, now: u64) -> StoreResult<bool> {
        self.check("clear_warning")?;
        self.inner.clear_warning(warning_id, cleared_by, now).await
    }

    async fn clear_expired_warnings(&self, now: u64) -> StoreResult<Vec<WarningRecord>> {
        self.check("clear_expired_warnings")?;
        self.inner.clear_expired_warnings(now).await
    }

    async fn upsert_flag(&self, flag: FlaggedContent) -> StoreResult<FlagUpsert> {
        self.check("upsert_flag")?;
        self.inner.upsert_flag(flag).await
    }

    async fn unresolved_flags(&self) -> StoreResult<Vec<FlaggedContent>> {
        self.check("unresolved_flags")?;
        self.inner.unresolved_flags().await
    }

    async fn unresolved_flags_for(&self, content_id: &str) -> StoreResult<Vec<FlaggedContent>> {
        self.check("unresolved_flags_for")?;
        self.inner.unresolved_flags_for(content_id).await
    }

    async fn resolve_flags(
        &self,
        content_id: &str,
        decision: ReviewDecision,
        reviewer: &str,
        notes: Option<String>,
        now: u64,
    ) -> StoreResult<Vec<FlaggedContent>> {
        self.check("resolve_flags")?;
        self.inner
            .resolve_flags(content_id, decision, reviewer, notes, now)
            .await
    }
}
