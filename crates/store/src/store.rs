//! # Store Contract
//!
//! The operations the engine needs from durable storage. Implementations
//! must be safe for concurrent use from many request tasks.
//!
//! ## Atomicity
//!
//! Three operations are atomic as a unit and must not be split into
//! read/compare/write steps by an implementation:
//!
//! - [`Store::insert_engagement`]: dedup check, event insert, post counter increment
//! - [`Store::commit_earning`]: daily sum, cap check, record insert, post and creator totals
//! - [`Store::upsert_flag`]: lookup of the unresolved (content, reason) flag and insert/update
//!
//! All timestamps are caller-supplied Unix seconds.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use earnguard_common::{
    AccountStatus, Creator, EarningRecord, EngagementEvent, EngagementKind, FlaggedContent, Post,
    PostId, ReviewDecision, UserId, WarningRecord,
};

use crate::error::StoreResult;

/// `cleared_by` recorded on warnings cleared by the expiry sweep.
pub const EXPIRY_SWEEP_ACTOR: &str = "system:expiry";

/// Daily-cap condition evaluated inside [`Store::commit_earning`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DailyCapGuard {
    /// Start of the UTC day to sum over.
    pub day_start: u64,
    /// Maximum allowed day total including the new record.
    pub cap: f64,
}

/// Result of [`Store::commit_earning`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum CommitOutcome {
    /// Record written. `day_total` includes it.
    Committed { day_total: f64 },
    /// Nothing written. `day_total` is the total before the attempt.
    CapExceeded { day_total: f64, cap: f64 },
}

/// Result of [`Store::upsert_flag`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlagUpsert {
    Inserted(String),
    /// An unresolved flag for the same (content, reason) was refreshed.
    Updated(String),
}

impl FlagUpsert {
    pub fn id(&self) -> &str {
        match self {
            FlagUpsert::Inserted(id) | FlagUpsert::Updated(id) => id,
        }
    }
}

#[async_trait]
pub trait Store: Send + Sync {
    // ── posts ──────────────────────────────────────────────────────────────

    async fn get_post(&self, post_id: &str) -> StoreResult<Option<Post>>;

    async fn put_post(&self, post: Post) -> StoreResult<()>;

    /// Posts whose `last_engaged_at >= since`, ordered by id.
    async fn posts_engaged_since(&self, since: u64) -> StoreResult<Vec<Post>>;

    // ── creators ───────────────────────────────────────────────────────────

    async fn get_creator(&self, creator_id: &str) -> StoreResult<Option<Creator>>;

    async fn put_creator(&self, creator: Creator) -> StoreResult<()>;

    /// Sets status and probation end. `NotFound` if the creator is missing.
    async fn set_account_status(
        &self,
        creator_id: &str,
        status: AccountStatus,
        probation_until: Option<u64>,
    ) -> StoreResult<()>;

    /// Adds `delta` to the trust score, clamped to the valid range.
    /// Returns the new score.
    async fn adjust_trust_score(&self, creator_id: &str, delta: i32) -> StoreResult<i32>;

    /// Moves every PROBATION creator whose probation ended at or before
    /// `now` back to ACTIVE. Returns their ids, sorted.
    async fn restore_lapsed_probations(&self, now: u64) -> StoreResult<Vec<UserId>>;

    // ── engagement ─────────────────────────────────────────────────────────

    /// Inserts the event and increments the post counter for its kind.
    ///
    /// `Conflict` if the (actor, post, kind) tuple exists, `NotFound` if the
    /// post is missing. Returns the updated post.
    async fn insert_engagement(&self, event: EngagementEvent) -> StoreResult<Post>;

    /// Whether the (actor, post, kind) tuple is already recorded.
    async fn engagement_exists(
        &self,
        actor_id: &str,
        post_id: &str,
        kind: EngagementKind,
    ) -> StoreResult<bool>;

    /// Events of `kind` on a post with `created_at >= since`.
    async fn count_post_engagements_since(
        &self,
        post_id: &str,
        kind: EngagementKind,
        since: u64,
    ) -> StoreResult<u64>;

    /// Events of any kind given by an actor with `created_at >= since`.
    async fn count_actor_engagements_since(&self, actor_id: &str, since: u64)
        -> StoreResult<u64>;

    /// Character lengths of every comment on a post.
    async fn comment_lengths(&self, post_id: &str) -> StoreResult<Vec<u32>>;

    /// Per-actor like + comment counts on a post, ordered by actor id.
    async fn actor_engagement_counts(&self, post_id: &str) -> StoreResult<Vec<(UserId, u64)>>;

    /// For each actor with likes or comments since `since`, the sorted,
    /// distinct posts engaged. Ordered by actor id.
    async fn actor_post_sets_since(&self, since: u64) -> StoreResult<Vec<(UserId, Vec<PostId>)>>;

    // ── earnings ledger ────────────────────────────────────────────────────

    /// Sum of the owner's earnings created at or after `since`, paid or not.
    async fn sum_earnings_since(&self, owner_id: &str, since: u64) -> StoreResult<f64>;

    /// Atomically checks `guard` (if any), then inserts the record and adds
    /// its amount to the post's and the creator's totals.
    ///
    /// `NotFound` if the post or creator is missing; nothing is written.
    async fn commit_earning(
        &self,
        record: EarningRecord,
        guard: Option<DailyCapGuard>,
    ) -> StoreResult<CommitOutcome>;

    /// All of an owner's earning records, oldest first.
    async fn earnings_for_owner(&self, owner_id: &str) -> StoreResult<Vec<EarningRecord>>;

    /// Extends `held_until` on the post's unpaid records. Holds never move
    /// earlier. Returns the number of records changed.
    async fn extend_holds_for_post(
        &self,
        post_id: &str,
        until: u64,
        reason: &str,
    ) -> StoreResult<usize>;

    /// Same as [`Store::extend_holds_for_post`] for every unpaid record of
    /// an owner.
    async fn extend_holds_for_owner(
        &self,
        owner_id: &str,
        until: u64,
        reason: &str,
    ) -> StoreResult<usize>;

    // ── warnings ───────────────────────────────────────────────────────────

    async fn insert_warning(&self, warning: WarningRecord) -> StoreResult<()>;

    async fn get_warning(&self, warning_id: &str) -> StoreResult<Option<WarningRecord>>;

    /// Uncleared warnings created at or after `window_start`.
    async fn count_active_warnings(&self, owner_id: &str, window_start: u64)
        -> StoreResult<u64>;

    /// All warnings of an owner, oldest first.
    async fn warnings_for_owner(&self, owner_id: &str) -> StoreResult<Vec<WarningRecord>>;

    /// Soft-clears a warning. `Ok(false)` if it was already cleared,
    /// `NotFound` if it does not exist.
    async fn clear_warning(&self, warning_id: &str, cleared_by: &str, now: u64)
        -> StoreResult<bool>;

    /// Clears every uncleared warning with `expires_at <= now`.
    /// Returns the records it cleared.
    async fn clear_expired_warnings(&self, now: u64) -> StoreResult<Vec<WarningRecord>>;

    // ── flagged content ────────────────────────────────────────────────────

    /// Inserts the flag, or refreshes the unresolved flag with the same
    /// (content, reason): details are replaced, `flagged_at` keeps the first
    /// detection and `hold_until` only moves forward.
    async fn upsert_flag(&self, flag: FlaggedContent) -> StoreResult<FlagUpsert>;

    /// Unresolved flags, oldest first.
    async fn unresolved_flags(&self) -> StoreResult<Vec<FlaggedContent>>;

    async fn unresolved_flags_for(&self, content_id: &str) -> StoreResult<Vec<FlaggedContent>>;

    /// Resolves every unresolved flag on a post. Returns the resolved records.
    async fn resolve_flags(
        &self,
        content_id: &str,
        decision: ReviewDecision,
        reviewer: &str,
        notes: Option<String>,
        now: u64,
    ) -> StoreResult<Vec<FlaggedContent>>;
}
