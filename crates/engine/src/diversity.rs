//! # Diversity Monitor
//!
//! Measures how concentrated a post's engagement is among its engagers.
//!
//! ## Statistics
//!
//! ```text
//! share_i    = count_i / total × 100
//! top10      = Σ share of the 10 largest engagers
//! HHI        = Σ share_i²            (0 = diverse, 10000 = one actor)
//! ```
//!
//! Only likes and comments count. Posts with fewer than `min_engagements`
//! engagements are neutral.
//!
//! ## Actions
//!
//! | Mode | Condition | Action | Score |
//! |------|-----------|--------|-------|
//! | BETA | `top10 > threshold_pct` | APPLY_PENALTY + flag | `penalty_multiplier` |
//! | NATURAL | `top10 > extreme_pct` | WARN | 1.0 |
//! | any | otherwise | NONE | 1.0 |
//!
//! Gaming-pod detection and creator trends are reporting only.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use earnguard_common::{
    DiversityThresholds, FlagReason, FlaggedContent, Mode, ModeSnapshot, Post, PostId, UserId,
};
use earnguard_store::FlagUpsert;

use crate::context::EngineContext;
use crate::error::EngineResult;
use crate::policy::FailPolicy;

/// Number of largest engagers summed into the top share.
pub const TOP_ENGAGERS: usize = 10;

/// Pod detection: minimum shared posts between two actors (exclusive).
pub const POD_MIN_SHARED_POSTS: usize = 5;
/// Pod detection: minimum overlap percentage (exclusive).
pub const POD_MIN_OVERLAP_PCT: f64 = 80.0;

// ════════════════════════════════════════════════════════════════════════════════
// STATISTICS
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DiversityStats {
    pub total: u64,
    pub unique_actors: usize,
    /// Percentage of engagement from the 10 largest engagers.
    pub top10_share_pct: f64,
    /// Herfindahl-Hirschman Index over percentage shares.
    pub hhi: f64,
}

/// Computes concentration statistics from per-actor counts.
#[must_use]
pub fn diversity_stats(counts: &[u64]) -> DiversityStats {
    let nonzero: Vec<u64> = counts.iter().copied().filter(|&c| c > 0).collect();
    let total: u64 = nonzero.iter().fold(0u64, |acc, &c| acc.saturating_add(c));
    if total == 0 {
        return DiversityStats {
            total: 0,
            unique_actors: 0,
            top10_share_pct: 0.0,
            hhi: 0.0,
        };
    }

    let mut sorted = nonzero;
    sorted.sort_unstable_by(|a, b| b.cmp(a));

    let total_f = total as f64;
    let top: u64 = sorted.iter().take(TOP_ENGAGERS).sum();
    let hhi: f64 = sorted
        .iter()
        .map(|&c| {
            let pct = c as f64 / total_f * 100.0;
            pct * pct
        })
        .sum();

    DiversityStats {
        total,
        unique_actors: sorted.len(),
        top10_share_pct: top as f64 / total_f * 100.0,
        hhi: hhi.clamp(0.0, 10_000.0),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiversityAction {
    None,
    ApplyPenalty,
    Warn,
}

/// Action and earnings multiplier for a set of statistics.
#[must_use]
pub fn evaluate(stats: &DiversityStats, mode: Mode, t: &DiversityThresholds) -> (DiversityAction, f64) {
    if stats.total < t.min_engagements || stats.total == 0 {
        return (DiversityAction::None, 1.0);
    }
    match mode {
        Mode::Beta if stats.top10_share_pct > t.threshold_pct => {
            (DiversityAction::ApplyPenalty, t.penalty_multiplier)
        }
        Mode::Natural if stats.top10_share_pct > t.extreme_pct => (DiversityAction::Warn, 1.0),
        _ => (DiversityAction::None, 1.0),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiversityResult {
    pub post_id: PostId,
    pub stats: DiversityStats,
    pub mode: Mode,
    pub action: DiversityAction,
    /// Earnings multiplier in (0, 1].
    pub score: f64,
    /// The counts could not be read; the check was neutral by policy.
    pub monitored: bool,
}

impl DiversityResult {
    fn neutral(post_id: &str, mode: Mode, monitored: bool) -> Self {
        Self {
            post_id: post_id.to_string(),
            stats: diversity_stats(&[]),
            mode,
            action: DiversityAction::None,
            score: 1.0,
            monitored,
        }
    }

    pub fn details(&self) -> serde_json::Value {
        serde_json::json!({
            "total": self.stats.total,
            "unique_actors": self.stats.unique_actors,
            "top10_share_pct": self.stats.top10_share_pct,
            "hhi": self.stats.hhi,
            "mode": self.mode,
            "action": self.action,
            "score": self.score,
        })
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// GAMING PODS
// ════════════════════════════════════════════════════════════════════════════════

/// Two actors whose engaged-post sets overlap suspiciously.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GamingPod {
    pub actor_a: UserId,
    pub actor_b: UserId,
    pub shared_posts: usize,
    /// `|A∩B| / min(|A|, |B|) × 100`
    pub overlap_pct: f64,
}

fn intersection_size(a: &[PostId], b: &[PostId]) -> usize {
    let (mut i, mut j, mut n) = (0, 0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            Ordering::Less => i += 1,
            Ordering::Greater => j += 1,
            Ordering::Equal => {
                n += 1;
                i += 1;
                j += 1;
            }
        }
    }
    n
}

/// Finds actor pairs sharing more than `min_shared` posts with overlap above
/// `min_overlap_pct`. Each post list must be sorted and distinct.
///
/// Sorted by overlap descending, then shared posts descending, then ids.
#[must_use]
pub fn find_gaming_pods(
    sets: &[(UserId, Vec<PostId>)],
    min_shared: usize,
    min_overlap_pct: f64,
) -> Vec<GamingPod> {
    let candidates: Vec<&(UserId, Vec<PostId>)> =
        sets.iter().filter(|(_, posts)| posts.len() > min_shared).collect();

    let mut pods = Vec::new();
    for (i, (actor_a, posts_a)) in candidates.iter().map(|c| (&c.0, &c.1)).enumerate() {
        for (actor_b, posts_b) in candidates.iter().skip(i + 1).map(|c| (&c.0, &c.1)) {
            let shared = intersection_size(posts_a, posts_b);
            if shared <= min_shared {
                continue;
            }
            let smaller = posts_a.len().min(posts_b.len());
            let overlap_pct = shared as f64 / smaller as f64 * 100.0;
            if overlap_pct > min_overlap_pct {
                let (a, b) = if actor_a <= actor_b {
                    (actor_a, actor_b)
                } else {
                    (actor_b, actor_a)
                };
                pods.push(GamingPod {
                    actor_a: a.clone(),
                    actor_b: b.clone(),
                    shared_posts: shared,
                    overlap_pct,
                });
            }
        }
    }

    pods.sort_by(|x, y| {
        y.overlap_pct
            .partial_cmp(&x.overlap_pct)
            .unwrap_or(Ordering::Equal)
            .then_with(|| y.shared_posts.cmp(&x.shared_posts))
            .then_with(|| x.actor_a.cmp(&y.actor_a))
            .then_with(|| x.actor_b.cmp(&y.actor_b))
    });
    pods
}

// ════════════════════════════════════════════════════════════════════════════════
// TRENDS
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiversityTrend {
    pub creator_id: UserId,
    pub posts_analysed: usize,
    pub mean_top10_share_pct: f64,
    pub mean_hhi: f64,
    /// Posts whose top-10 share exceeds the active mode's action threshold.
    pub posts_over_threshold: usize,
}

/// Aggregates per-post statistics by author. Posts with no engagement are
/// skipped. Sorted by creator id.
#[must_use]
pub fn aggregate_trends(
    per_post: &[(UserId, DiversityStats)],
    mode: Mode,
    t: &DiversityThresholds,
) -> Vec<DiversityTrend> {
    let threshold = match mode {
        Mode::Beta => t.threshold_pct,
        Mode::Natural => t.extreme_pct,
    };

    let mut by_creator: BTreeMap<&str, Vec<&DiversityStats>> = BTreeMap::new();
    for (author, stats) in per_post.iter().filter(|(_, s)| s.total > 0) {
        by_creator.entry(author.as_str()).or_default().push(stats);
    }

    by_creator
        .into_iter()
        .map(|(creator, stats)| {
            let n = stats.len();
            let sum_top: f64 = stats.iter().map(|s| s.top10_share_pct).sum();
            let sum_hhi: f64 = stats.iter().map(|s| s.hhi).sum();
            DiversityTrend {
                creator_id: creator.to_string(),
                posts_analysed: n,
                mean_top10_share_pct: sum_top / n as f64,
                mean_hhi: sum_hhi / n as f64,
                posts_over_threshold: stats
                    .iter()
                    .filter(|s| s.top10_share_pct > threshold)
                    .count(),
            }
        })
        .collect()
}

// ════════════════════════════════════════════════════════════════════════════════
// MONITOR
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub struct DiversityMonitor {
    ctx: Arc<EngineContext>,
}

impl DiversityMonitor {
    pub fn new(ctx: Arc<EngineContext>) -> Self {
        Self { ctx }
    }

    /// Reads per-actor counts for a post and evaluates them.
    pub async fn check_post(&self, post_id: &str, snapshot: &ModeSnapshot) -> EngineResult<DiversityResult> {
        let result = self
            .ctx
            .guard
            .call(
                "actor_engagement_counts",
                self.ctx.store.actor_engagement_counts(post_id),
            )
            .await;
        let Some(counts) =
            FailPolicy::Open.resolve("actor_engagement_counts", result, &self.ctx.metrics)?
        else {
            return Ok(DiversityResult::neutral(post_id, snapshot.mode, true));
        };

        let values: Vec<u64> = counts.iter().map(|(_, n)| *n).collect();
        let stats = diversity_stats(&values);
        let (action, score) = evaluate(&stats, snapshot.mode, &snapshot.thresholds.diversity);
        debug!(
            post_id,
            total = stats.total,
            top10 = stats.top10_share_pct,
            hhi = stats.hhi,
            action = ?action,
            "diversity evaluated"
        );

        Ok(DiversityResult {
            post_id: post_id.to_string(),
            stats,
            mode: snapshot.mode,
            action,
            score,
            monitored: false,
        })
    }

    /// Creates or refreshes the post's `LOW_ENGAGEMENT_DIVERSITY` flag.
    /// `None` if the write failed open.
    pub async fn flag_post(
        &self,
        post: &Post,
        result: &DiversityResult,
        now: u64,
    ) -> EngineResult<Option<FlagUpsert>> {
        let flag = FlaggedContent::new(
            Uuid::new_v4().to_string(),
            post,
            FlagReason::LowEngagementDiversity,
            result.details(),
            now,
        );
        let upsert = self
            .ctx
            .guard
            .call("upsert_flag", self.ctx.store.upsert_flag(flag))
            .await;
        let upsert = FailPolicy::Open.resolve("upsert_flag", upsert, &self.ctx.metrics)?;
        if let Some(FlagUpsert::Inserted(id)) = &upsert {
            info!(
                post_id = %post.id,
                flag_id = %id,
                top10 = result.stats.top10_share_pct,
                "low engagement diversity: content flagged"
            );
        }
        Ok(upsert)
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// TESTS
// ════════════════════════════════════════════════════════════════════════════════
