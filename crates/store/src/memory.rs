//! In-memory [`Store`] implementation.
//!
//! All tables sit behind one `parking_lot::RwLock`, so every trait method is
//! atomic with respect to every other. The lock is never held across an
//! `.await`.
//!
//! # Features
//!
//! - Snapshot persistence to a JSON file (write to `.tmp`, then rename)
//! - Simulated latency (async, non-blocking) for timeout tests
//! - Simulated outage: every call returns [`StoreError::Unavailable`]

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use earnguard_common::time::day_start;
use earnguard_common::types::{TRUST_SCORE_MAX, TRUST_SCORE_MIN};
use earnguard_common::{
    round_amount, AccountStatus, Creator, EarningRecord, EngagementEvent, EngagementKind,
    FlaggedContent, Post, PostId, ReviewDecision, UserId, WarningRecord,
};

use crate::error::{StoreError, StoreResult};
use crate::store::{CommitOutcome, DailyCapGuard, FlagUpsert, Store, EXPIRY_SWEEP_ACTOR};

/// Tolerance for cap comparisons on rounded amounts.
const CAP_EPSILON: f64 = 1e-9;

// ════════════════════════════════════════════════════════════════════════════
// TABLES
// ════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Default, Serialize, Deserialize)]
struct Tables {
    posts: BTreeMap<PostId, Post>,
    creators: BTreeMap<UserId, Creator>,
    engagements: Vec<EngagementEvent>,
    earnings: Vec<EarningRecord>,
    warnings: Vec<WarningRecord>,
    flags: Vec<FlaggedContent>,
    /// Dedup index over `engagements`; rebuilt on load.
    #[serde(skip)]
    engagement_keys: HashSet<(UserId, PostId, EngagementKind)>,
}

impl Tables {
    fn rebuild_indexes(&mut self) {
        self.engagement_keys = self.engagements.iter().map(|e| e.dedup_key()).collect();
    }

    fn sum_since(&self, owner_id: &str, since: u64) -> f64 {
        let total: f64 = self
            .earnings
            .iter()
            .filter(|e| e.owner_id == owner_id && e.created_at >= since)
            .map(|e| e.amount)
            .sum();
        round_amount(total)
    }

    fn extend_holds<F>(&mut self, until: u64, reason: &str, select: F) -> usize
    where
        F: Fn(&EarningRecord) -> bool,
    {
        self.earnings
            .iter_mut()
            .filter(|e| !e.paid && select(&**e))
            .filter_map(|e| e.extend_hold(until, reason).then_some(()))
            .count()
    }
}

/// Row counts, for logs and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub posts: usize,
    pub creators: usize,
    pub engagements: usize,
    pub earnings: usize,
    pub warnings: usize,
    pub flags: usize,
}

// ════════════════════════════════════════════════════════════════════════════
// MEMORY STORE
// ════════════════════════════════════════════════════════════════════════════

pub struct MemoryStore {
    tables: RwLock<Tables>,
    unavailable: AtomicBool,
    latency_ms: AtomicU64,
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("stats", &self.stats())
            .field("unavailable", &self.unavailable.load(Ordering::Relaxed))
            .field("latency_ms", &self.latency_ms.load(Ordering::Relaxed))
            .finish()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            unavailable: AtomicBool::new(false),
            latency_ms: AtomicU64::new(0),
        }
    }

    /// Toggle the simulated outage.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Delay every call by `ms` milliseconds.
    pub fn set_latency_ms(&self, ms: u64) {
        self.latency_ms.store(ms, Ordering::SeqCst);
    }

    pub fn stats(&self) -> StoreStats {
        let t = self.tables.read();
        StoreStats {
            posts: t.posts.len(),
            creators: t.creators.len(),
            engagements: t.engagements.len(),
            earnings: t.earnings.len(),
            warnings: t.warnings.len(),
            flags: t.flags.len(),
        }
    }

    async fn gate(&self, op: &'static str) -> StoreResult<()> {
        let latency = self.latency_ms.load(Ordering::Relaxed);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if self.unavailable.load(Ordering::Relaxed) {
            warn!(op, "MemoryStore: simulated outage");
            return Err(StoreError::Unavailable(format!(
                "simulated outage during {}",
                op
            )));
        }
        Ok(())
    }

    // ── snapshot persistence ───────────────────────────────────────────────

    /// Writes all tables to `path` as JSON.
    pub fn save_snapshot(&self, path: impl AsRef<Path>) -> StoreResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let bytes = {
            let t = self.tables.read();
            serde_json::to_vec_pretty(&*t)?
        };

        let temp_path = path.with_extension("tmp");
        {
            let mut file = File::create(&temp_path)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
        }
        fs::rename(&temp_path, path)?;

        debug!(path = %path.display(), bytes = bytes.len(), "snapshot written");
        Ok(())
    }

    /// Loads a snapshot. A missing file yields an empty store.
    pub fn load_snapshot(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            info!(path = %path.display(), "no snapshot found, starting empty");
            return Ok(Self::new());
        }

        let bytes = fs::read(path)?;
        let mut tables: Tables = serde_json::from_slice(&bytes)?;
        tables.rebuild_indexes();

        let store = Self {
            tables: RwLock::new(tables),
            unavailable: AtomicBool::new(false),
            latency_ms: AtomicU64::new(0),
        };
        info!(path = %path.display(), stats = ?store.stats(), "snapshot loaded");
        Ok(store)
    }
}

// ════════════════════════════════════════════════════════════════════════════
// STORE IMPLEMENTATION
// ════════════════════════════════════════════════════════════════════════════

#[async_trait]
impl Store for MemoryStore {
    async fn get_post(&self, post_id: &str) -> StoreResult<Option<Post>> {
        self.gate("get_post").await?;
        Ok(self.tables.read().posts.get(post_id).cloned())
    }

    async fn put_post(&self, post: Post) -> StoreResult<()> {
        self.gate("put_post").await?;
        self.tables.write().posts.insert(post.id.clone(), post);
        Ok(())
    }

    async fn posts_engaged_since(&self, since: u64) -> StoreResult<Vec<Post>> {
        self.gate("posts_engaged_since").await?;
        let t = self.tables.read();
        Ok(t.posts
            .values()
            .filter(|p| p.last_engaged_at > 0 && p.last_engaged_at >= since)
            .cloned()
            .collect())
    }

    async fn get_creator(&self, creator_id: &str) -> StoreResult<Option<Creator>> {
        self.gate("get_creator").await?;
        Ok(self.tables.read().creators.get(creator_id).cloned())
    }

    async fn put_creator(&self, creator: Creator) -> StoreResult<()> {
        self.gate("put_creator").await?;
        self.tables
            .write()
            .creators
            .insert(creator.id.clone(), creator);
        Ok(())
    }

    async fn set_account_status(
        &self,
        creator_id: &str,
        status: AccountStatus,
        probation_until: Option<u64>,
    ) -> StoreResult<()> {
        self.gate("set_account_status").await?;
        let mut t = self.tables.write();
        let creator = t
            .creators
            .get_mut(creator_id)
            .ok_or_else(|| StoreError::not_found("creator", creator_id))?;
        creator.status = status;
        creator.probation_until = probation_until;
        Ok(())
    }

    async fn adjust_trust_score(&self, creator_id: &str, delta: i32) -> StoreResult<i32> {
        self.gate("adjust_trust_score").await?;
        let mut t = self.tables.write();
        let creator = t
            .creators
            .get_mut(creator_id)
            .ok_or_else(|| StoreError::not_found("creator", creator_id))?;
        creator.trust_score = creator
            .trust_score
            .saturating_add(delta)
            .clamp(TRUST_SCORE_MIN, TRUST_SCORE_MAX);
        Ok(creator.trust_score)
    }

    async fn restore_lapsed_probations(&self, now: u64) -> StoreResult<Vec<UserId>> {
        self.gate("restore_lapsed_probations").await?;
        let mut t = self.tables.write();
        let mut restored = Vec::new();
        for creator in t.creators.values_mut() {
            let lapsed = creator.status == AccountStatus::Probation
                && creator.probation_until.map_or(true, |until| until <= now);
            if lapsed {
                creator.status = AccountStatus::Active;
                creator.probation_until = None;
                restored.push(creator.id.clone());
            }
        }
        Ok(restored)
    }

    async fn insert_engagement(&self, event: EngagementEvent) -> StoreResult<Post> {
        self.gate("insert_engagement").await?;
        let mut t = self.tables.write();
        if !t.posts.contains_key(&event.post_id) {
            return Err(StoreError::not_found("post", event.post_id.clone()));
        }
        let key = event.dedup_key();
        if t.engagement_keys.contains(&key) {
            return Err(StoreError::Conflict(format!(
                "{} by {} on post {} already recorded",
                event.kind, event.actor_id, event.post_id
            )));
        }

        let post = t
            .posts
            .get_mut(&event.post_id)
            .ok_or_else(|| StoreError::not_found("post", event.post_id.clone()))?;
        match event.kind {
            EngagementKind::Like => post.likes = post.likes.saturating_add(1),
            EngagementKind::Comment => post.comments = post.comments.saturating_add(1),
            EngagementKind::Share => post.shares = post.shares.saturating_add(1),
        }
        post.last_engaged_at = post.last_engaged_at.max(event.created_at);
        let updated = post.clone();

        t.engagement_keys.insert(key);
        t.engagements.push(event);
        Ok(updated)
    }

    async fn engagement_exists(
        &self,
        actor_id: &str,
        post_id: &str,
        kind: EngagementKind,
    ) -> StoreResult<bool> {
        self.gate("engagement_exists").await?;
        let t = self.tables.read();
        Ok(t.engagement_keys
            .contains(&(actor_id.to_string(), post_id.to_string(), kind)))
    }

    async fn count_post_engagements_since(
        &self,
        post_id: &str,
        kind: EngagementKind,
        since: u64,
    ) -> StoreResult<u64> {
        self.gate("count_post_engagements_since").await?;
        let t = self.tables.read();
        Ok(t.engagements
            .iter()
            .filter(|e| e.post_id == post_id && e.kind == kind && e.created_at >= since)
            .count() as u64)
    }

    async fn count_actor_engagements_since(
        &self,
        actor_id: &str,
        since: u64,
    ) -> StoreResult<u64> {
        self.gate("count_actor_engagements_since").await?;
        let t = self.tables.read();
        Ok(t.engagements
            .iter()
            .filter(|e| e.actor_id == actor_id && e.created_at >= since)
            .count() as u64)
    }

    async fn comment_lengths(&self, post_id: &str) -> StoreResult<Vec<u32>> {
        self.gate("comment_lengths").await?;
        let t = self.tables.read();
        Ok(t.engagements
            .iter()
            .filter(|e| e.post_id == post_id && e.kind == EngagementKind::Comment)
            .map(|e| e.comment_chars.unwrap_or(0))
            .collect())
    }

    async fn actor_engagement_counts(&self, post_id: &str) -> StoreResult<Vec<(UserId, u64)>> {
        self.gate("actor_engagement_counts").await?;
        let t = self.tables.read();
        let mut counts: BTreeMap<&str, u64> = BTreeMap::new();
        for e in t
            .engagements
            .iter()
            .filter(|e| e.post_id == post_id && e.kind != EngagementKind::Share)
        {
            *counts.entry(e.actor_id.as_str()).or_insert(0) += 1;
        }
        Ok(counts
            .into_iter()
            .map(|(actor, n)| (actor.to_string(), n))
            .collect())
    }

    async fn actor_post_sets_since(
        &self,
        since: u64,
    ) -> StoreResult<Vec<(UserId, Vec<PostId>)>> {
        self.gate("actor_post_sets_since").await?;
        let t = self.tables.read();
        let mut sets: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        for e in t
            .engagements
            .iter()
            .filter(|e| e.created_at >= since && e.kind != EngagementKind::Share)
        {
            sets.entry(e.actor_id.as_str())
                .or_default()
                .insert(e.post_id.as_str());
        }
        Ok(sets
            .into_iter()
            .map(|(actor, posts)| {
                (
                    actor.to_string(),
                    posts.into_iter().map(str::to_string).collect(),
                )
            })
            .collect())
    }

    async fn sum_earnings_since(&self, owner_id: &str, since: u64) -> StoreResult<f64> {
        self.gate("sum_earnings_since").await?;
        Ok(self.tables.read().sum_since(owner_id, since))
    }

    async fn commit_earning(
        &self,
        record: EarningRecord,
        guard: Option<DailyCapGuard>,
    ) -> StoreResult<CommitOutcome> {
        self.gate("commit_earning").await?;
        let mut t = self.tables.write();

        if !t.posts.contains_key(&record.post_id) {
            return Err(StoreError::not_found("post", record.post_id.clone()));
        }
        if !t.creators.contains_key(&record.owner_id) {
            return Err(StoreError::not_found("creator", record.owner_id.clone()));
        }

        let since = guard.map_or_else(|| day_start(record.created_at), |g| g.day_start);
        let current = t.sum_since(&record.owner_id, since);
        let amount = round_amount(record.amount);
        let projected = round_amount(current + amount);

        if let Some(g) = guard {
            if projected > g.cap + CAP_EPSILON {
                return Ok(CommitOutcome::CapExceeded {
                    day_total: current,
                    cap: g.cap,
                });
            }
        }

        let Tables {
            posts,
            creators,
            earnings,
            ..
        } = &mut *t;
        if let Some(post) = posts.get_mut(&record.post_id) {
            post.total_earnings = round_amount(post.total_earnings + amount);
        }
        if let Some(creator) = creators.get_mut(&record.owner_id) {
            creator.total_earnings = round_amount(creator.total_earnings + amount);
        }
        earnings.push(EarningRecord { amount, ..record });

        Ok(CommitOutcome::Committed {
            day_total: projected,
        })
    }

    async fn earnings_for_owner(&self, owner_id: &str) -> StoreResult<Vec<EarningRecord>> {
        self.gate("earnings_for_owner").await?;
        let t = self.tables.read();
        Ok(t.earnings
            .iter()
            .filter(|e| e.owner_id == owner_id)
            .cloned()
            .collect())
    }

    async fn extend_holds_for_post(
        &self,
        post_id: &str,
        until: u64,
        reason: &str,
    ) -> StoreResult<usize> {
        self.gate("extend_holds_for_post").await?;
        Ok(self
            .tables
            .write()
            .extend_holds(until, reason, |e| e.post_id == post_id))
    }

    async fn extend_holds_for_owner(
        &self,
        owner_id: &str,
        until: u64,
        reason: &str,
    ) -> StoreResult<usize> {
        self.gate("extend_holds_for_owner").await?;
        Ok(self
            .tables
            .write()
            .extend_holds(until, reason, |e| e.owner_id == owner_id))
    }

    async fn insert_warning(&self, warning: WarningRecord) -> StoreResult<()> {
        self.gate("insert_warning").await?;
        let mut t = self.tables.write();
        if t.warnings.iter().any(|w| w.id == warning.id) {
            return Err(StoreError::Conflict(format!(
                "warning {} already exists",
                warning.id
            )));
        }
        t.warnings.push(warning);
        Ok(())
    }

    async fn get_warning(&self, warning_id: &str) -> StoreResult<Option<WarningRecord>> {
        self.gate("get_warning").await?;
        let t = self.tables.read();
        Ok(t.warnings.iter().find(|w| w.id == warning_id).cloned())
    }

    async fn count_active_warnings(
        &self,
        owner_id: &str,
        window_start: u64,
    ) -> StoreResult<u64> {
        self.gate("count_active_warnings").await?;
        let t = self.tables.read();
        Ok(t.warnings
            .iter()
            .filter(|w| w.owner_id == owner_id && w.is_active(window_start))
            .count() as u64)
    }

    async fn warnings_for_owner(&self, owner_id: &str) -> StoreResult<Vec<WarningRecord>> {
        self.gate("warnings_for_owner").await?;
        let t = self.tables.read();
        Ok(t.warnings
            .iter()
            .filter(|w| w.owner_id == owner_id)
            .cloned()
            .collect())
    }

    async fn clear_warning(
        &self,
        warning_id: &str,
        cleared_by: &str,
        now: u64,
    ) -> StoreResult<bool> {
        self.gate("clear_warning").await?;
        let mut t = self.tables.write();
        let warning = t
            .warnings
            .iter_mut()
            .find(|w| w.id == warning_id)
            .ok_or_else(|| StoreError::not_found("warning", warning_id))?;
        if warning.cleared_at.is_some() {
            return Ok(false);
        }
        warning.cleared_at = Some(now);
        warning.cleared_by = Some(cleared_by.to_string());
        Ok(true)
    }

    async fn clear_expired_warnings(&self, now: u64) -> StoreResult<Vec<WarningRecord>> {
        self.gate("clear_expired_warnings").await?;
        let mut t = self.tables.write();
        let mut cleared = Vec::new();
        for w in t.warnings.iter_mut().filter(|w| w.is_expired(now)) {
            w.cleared_at = Some(now);
            w.cleared_by = Some(EXPIRY_SWEEP_ACTOR.to_string());
            cleared.push(w.clone());
        }
        Ok(cleared)
    }

    async fn upsert_flag(&self, flag: FlaggedContent) -> StoreResult<FlagUpsert> {
        self.gate("upsert_flag").await?;
        let mut t = self.tables.write();
        if let Some(existing) = t
            .flags
            .iter_mut()
            .find(|f| !f.resolved && f.content_id == flag.content_id && f.reason == flag.reason)
        {
            existing.details = flag.details;
            existing.hold_until = match (existing.hold_until, flag.hold_until) {
                (Some(a), Some(b)) => Some(a.max(b)),
                (a, b) => a.or(b),
            };
            return Ok(FlagUpsert::Updated(existing.id.clone()));
        }
        let id = flag.id.clone();
        t.flags.push(flag);
        Ok(FlagUpsert::Inserted(id))
    }

    async fn unresolved_flags(&self) -> StoreResult<Vec<FlaggedContent>> {
        self.gate("unresolved_flags").await?;
        let t = self.tables.read();
        let mut flags: Vec<FlaggedContent> =
            t.flags.iter().filter(|f| !f.resolved).cloned().collect();
        flags.sort_by(|a, b| a.flagged_at.cmp(&b.flagged_at).then_with(|| a.id.cmp(&b.id)));
        Ok(flags)
    }

    async fn unresolved_flags_for(&self, content_id: &str) -> StoreResult<Vec<FlaggedContent>> {
        self.gate("unresolved_flags_for").await?;
        let t = self.tables.read();
        Ok(t.flags
            .iter()
            .filter(|f| !f.resolved && f.content_id == content_id)
            .cloned()
            .collect())
    }

    async fn resolve_flags(
        &self,
        content_id: &str,
        decision: ReviewDecision,
        reviewer: &str,
        notes: Option<String>,
        now: u64,
    ) -> StoreResult<Vec<FlaggedContent>> {
        self.gate("resolve_flags").await?;
        let mut t = self.tables.write();
        let mut resolved = Vec::new();
        for f in t
            .flags
            .iter_mut()
            .filter(|f| !f.resolved && f.content_id == content_id)
        {
            f.resolved = true;
            f.decision = Some(decision);
            f.reviewed_by = Some(reviewer.to_string());
            f.review_notes = notes.clone();
            f.resolved_at = Some(now);
            resolved.push(f.clone());
        }
        Ok(resolved)
    }
}

// ════════════════════════════════════════════════════════════════════════════
// TESTS
// ════════════════════════════════════════════════════════════════════════════
