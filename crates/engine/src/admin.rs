//! Moderation operations: flag review, warning clears, and the
//! gaming-pod and diversity-trend reports.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use earnguard_common::time::days;
use earnguard_common::{FlaggedContent, ModeSnapshot, PostId, ReviewDecision, UserId};

use crate::context::EngineContext;
use crate::diversity::{
    aggregate_trends, diversity_stats, find_gaming_pods, DiversityTrend, GamingPod,
    POD_MIN_OVERLAP_PCT, POD_MIN_SHARED_POSTS,
};
use crate::error::{EngineError, EngineResult};
use crate::policy::closed;
use crate::strikes::StrikeLadder;

/// Lookback of the pod and trend reports.
pub const REPORT_LOOKBACK_DAYS: u64 = 7;

/// Trust change for the author when a review clears the post.
pub const REVIEW_CLEARED_TRUST_DELTA: i32 = 5;
/// Trust change for the author when a review confirms manipulation.
pub const REVIEW_CONFIRMED_TRUST_DELTA: i32 = -10;

#[must_use]
pub fn review_trust_delta(decision: ReviewDecision) -> i32 {
    match decision {
        ReviewDecision::Cleared => REVIEW_CLEARED_TRUST_DELTA,
        ReviewDecision::Confirmed => REVIEW_CONFIRMED_TRUST_DELTA,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewOutcome {
    pub post_id: PostId,
    pub author_id: UserId,
    pub decision: ReviewDecision,
    pub flags_resolved: usize,
    /// Author's trust score after the adjustment.
    pub trust_score: i32,
}

#[derive(Debug, Clone)]
pub struct AdminService {
    ctx: Arc<EngineContext>,
    strikes: StrikeLadder,
}

impl AdminService {
    pub fn new(ctx: Arc<EngineContext>) -> Self {
        Self {
            strikes: StrikeLadder::new(ctx.clone()),
            ctx,
        }
    }

    /// Unresolved flags, oldest first.
    pub async fn pending_flagged_posts(&self) -> EngineResult<Vec<FlaggedContent>> {
        closed(
            self.ctx
                .guard
                .call("unresolved_flags", self.ctx.store.unresolved_flags())
                .await,
        )
    }

    /// Resolves every open flag on a post and adjusts the author's trust.
    pub async fn review_flagged_post(
        &self,
        post_id: &str,
        reviewer_id: &str,
        decision: ReviewDecision,
        notes: Option<String>,
        now: u64,
    ) -> EngineResult<ReviewOutcome> {
        let store = &self.ctx.store;
        let guard = &self.ctx.guard;

        let post = closed(guard.call("get_post", store.get_post(post_id)).await)?
            .ok_or_else(|| EngineError::not_found("post", post_id))?;
        let resolved = closed(
            guard
                .call(
                    "resolve_flags",
                    store.resolve_flags(post_id, decision, reviewer_id, notes, now),
                )
                .await,
        )?;
        if resolved.is_empty() {
            return Err(EngineError::not_found("flag", post_id));
        }

        let trust_score = closed(
            guard
                .call(
                    "adjust_trust_score",
                    store.adjust_trust_score(&post.author_id, review_trust_delta(decision)),
                )
                .await,
        )?;

        info!(
            post_id,
            reviewer_id,
            decision = ?decision,
            flags_resolved = resolved.len(),
            author_id = %post.author_id,
            trust_score,
            "flagged post reviewed"
        );

        Ok(ReviewOutcome {
            post_id: post.id,
            author_id: post.author_id,
            decision,
            flags_resolved: resolved.len(),
            trust_score,
        })
    }

    pub async fn clear_warning(&self, warning_id: &str, admin_id: &str, now: u64) -> EngineResult<bool> {
        self.strikes.clear_warning(warning_id, admin_id, now).await
    }

    /// Actor pairs with suspiciously overlapping engagement over the last
    /// seven days. Reporting only.
    pub async fn identify_gaming_pods(&self, now: u64) -> EngineResult<Vec<GamingPod>> {
        let since = now.saturating_sub(days(REPORT_LOOKBACK_DAYS));
        let sets = closed(
            self.ctx
                .guard
                .call("actor_post_sets_since", self.ctx.store.actor_post_sets_since(since))
                .await,
        )?;
        let pods = find_gaming_pods(&sets, POD_MIN_SHARED_POSTS, POD_MIN_OVERLAP_PCT);
        if !pods.is_empty() {
            warn!(actors = sets.len(), pods = pods.len(), "gaming pods detected");
        }
        Ok(pods)
    }

    /// Per-creator diversity over posts engaged in the last seven days.
    pub async fn track_diversity_trends(
        &self,
        now: u64,
        snapshot: &ModeSnapshot,
    ) -> EngineResult<Vec<DiversityTrend>> {
        let store = &self.ctx.store;
        let guard = &self.ctx.guard;
        let since = now.saturating_sub(days(REPORT_LOOKBACK_DAYS));

        let posts = closed(guard.call("posts_engaged_since", store.posts_engaged_since(since)).await)?;
        let mut per_post = Vec::with_capacity(posts.len());
        for post in posts {
            let counts = closed(
                guard
                    .call("actor_engagement_counts", store.actor_engagement_counts(&post.id))
                    .await,
            )?;
            let values: Vec<u64> = counts.into_iter().map(|(_, n)| n).collect();
            per_post.push((post.author_id, diversity_stats(&values)));
        }

        Ok(aggregate_trends(
            &per_post,
            snapshot.mode,
            &snapshot.thresholds.diversity,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_review_deltas() {
        assert_eq!(review_trust_delta(ReviewDecision::Cleared), 5);
        assert_eq!(review_trust_delta(ReviewDecision::Confirmed), -10);
    }
}
