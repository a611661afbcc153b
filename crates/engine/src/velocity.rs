//! # Velocity Monitor
//!
//! Counts engagement events in a trailing window and classifies the count
//! against the active mode's `{ base, extreme }` thresholds.
//!
//! ## Decision Table
//!
//! | Scope | Mode | `count > extreme` | `count > base` | otherwise |
//! |-------|------|-------------------|----------------|-----------|
//! | post (per kind) | BETA | HOLD | HOLD | ALLOW |
//! | post (per kind) | NATURAL | HOLD | WARN | ALLOW |
//! | actor (all given) | BETA | BLOCK | BLOCK | ALLOW |
//! | actor (all given) | NATURAL | HOLD | WARN | ALLOW |
//!
//! Shares are discrete events in the store, so every kind is counted the
//! same way.
//!
//! ## Failure Policy
//!
//! Counting fails open: on a store outage the check returns ALLOW with
//! `monitored = true`.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use earnguard_common::{
    EngagementKind, FlagReason, FlaggedContent, Mode, ModeSnapshot, Post, VelocityLimit,
};
use earnguard_store::FlagUpsert;

use crate::context::EngineContext;
use crate::error::EngineResult;
use crate::policy::FailPolicy;

/// Hold reason written on earnings held for a post spike.
pub const POST_VELOCITY_HOLD_REASON: &str = "VELOCITY_SPIKE";
/// Hold reason written on earnings held for an actor's own activity.
pub const ACTOR_VELOCITY_HOLD_REASON: &str = "ACTIVITY_VELOCITY";

// ════════════════════════════════════════════════════════════════════════════════
// CLASSIFICATION
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VelocityAction {
    Allow,
    /// Action proceeds, a warning is recorded.
    Warn,
    /// Action proceeds, earnings are held and the content flagged.
    Hold,
    /// Action rejected.
    Block,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VelocityScope {
    /// Engagement received by one post, per kind.
    Post,
    /// Engagement given by one actor, all kinds.
    Actor,
}

/// Classifies `count` events inside the window.
#[must_use]
pub fn classify(scope: VelocityScope, mode: Mode, count: u64, limit: VelocityLimit) -> VelocityAction {
    match (mode, scope) {
        (Mode::Beta, VelocityScope::Post) if count > limit.base => VelocityAction::Hold,
        (Mode::Beta, VelocityScope::Actor) if count > limit.base => VelocityAction::Block,
        (Mode::Beta, _) => VelocityAction::Allow,
        (Mode::Natural, _) if count > limit.extreme => VelocityAction::Hold,
        (Mode::Natural, _) if count > limit.base => VelocityAction::Warn,
        (Mode::Natural, _) => VelocityAction::Allow,
    }
}

/// Earliest `created_at` counted in a window ending at `now`.
#[must_use]
#[inline]
pub fn window_start(now: u64, window_secs: u64) -> u64 {
    now.saturating_sub(window_secs)
}

/// One velocity evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VelocityCheck {
    pub scope: VelocityScope,
    pub subject_id: String,
    /// Set for post-scope checks.
    pub kind: Option<EngagementKind>,
    pub count: u64,
    pub limit: VelocityLimit,
    pub window_secs: u64,
    pub mode: Mode,
    pub action: VelocityAction,
    /// The count could not be read; the check allowed by policy.
    pub monitored: bool,
}

impl VelocityCheck {
    fn skipped(
        scope: VelocityScope,
        subject_id: &str,
        kind: Option<EngagementKind>,
        limit: VelocityLimit,
        snapshot: &ModeSnapshot,
    ) -> Self {
        Self {
            scope,
            subject_id: subject_id.to_string(),
            kind,
            count: 0,
            limit,
            window_secs: snapshot.thresholds.velocity.window_secs,
            mode: snapshot.mode,
            action: VelocityAction::Allow,
            monitored: true,
        }
    }

    /// Structured details stored on warnings and flags.
    pub fn details(&self) -> serde_json::Value {
        serde_json::json!({
            "scope": self.scope,
            "subject_id": self.subject_id,
            "kind": self.kind,
            "count": self.count,
            "base": self.limit.base,
            "extreme": self.limit.extreme,
            "window_secs": self.window_secs,
            "mode": self.mode,
            "action": self.action,
        })
    }
}

/// Side effects of a HOLD.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VelocityHold {
    pub hold_until: u64,
    pub earnings_held: usize,
    /// `None` when the flag write failed open.
    pub flag_id: Option<String>,
    /// The flag was created by this hold rather than refreshed.
    pub new_flag: bool,
}

// ════════════════════════════════════════════════════════════════════════════════
// MONITOR
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub struct VelocityMonitor {
    ctx: Arc<EngineContext>,
}

impl VelocityMonitor {
    pub fn new(ctx: Arc<EngineContext>) -> Self {
        Self { ctx }
    }

    /// Checks engagement of `kind` received by a post. The count includes
    /// events already persisted at `now`.
    pub async fn check_post(
        &self,
        post_id: &str,
        kind: EngagementKind,
        now: u64,
        snapshot: &ModeSnapshot,
    ) -> EngineResult<VelocityCheck> {
        let v = &snapshot.thresholds.velocity;
        let limit = v.limit_for(kind);
        let since = window_start(now, v.window_secs);

        let result = self
            .ctx
            .guard
            .call(
                "count_post_engagements_since",
                self.ctx
                    .store
                    .count_post_engagements_since(post_id, kind, since),
            )
            .await;
        let Some(count) = FailPolicy::Open.resolve(
            "count_post_engagements_since",
            result,
            &self.ctx.metrics,
        )?
        else {
            return Ok(VelocityCheck::skipped(
                VelocityScope::Post,
                post_id,
                Some(kind),
                limit,
                snapshot,
            ));
        };

        let action = classify(VelocityScope::Post, snapshot.mode, count, limit);
        self.record(action);
        debug!(post_id, kind = %kind, count, action = ?action, "post velocity");

        Ok(VelocityCheck {
            scope: VelocityScope::Post,
            subject_id: post_id.to_string(),
            kind: Some(kind),
            count,
            limit,
            window_secs: v.window_secs,
            mode: snapshot.mode,
            action,
            monitored: false,
        })
    }

    /// Checks engagement given by an actor. `pending` events not yet
    /// persisted (the triggering one) are added to the stored count.
    pub async fn check_actor(
        &self,
        actor_id: &str,
        pending: u64,
        now: u64,
        snapshot: &ModeSnapshot,
    ) -> EngineResult<VelocityCheck> {
        let v = &snapshot.thresholds.velocity;
        let limit = v.creator_activity;
        let since = window_start(now, v.window_secs);

        let result = self
            .ctx
            .guard
            .call(
                "count_actor_engagements_since",
                self.ctx.store.count_actor_engagements_since(actor_id, since),
            )
            .await;
        let Some(stored) = FailPolicy::Open.resolve(
            "count_actor_engagements_since",
            result,
            &self.ctx.metrics,
        )?
        else {
            return Ok(VelocityCheck::skipped(
                VelocityScope::Actor,
                actor_id,
                None,
                limit,
                snapshot,
            ));
        };

        let count = stored.saturating_add(pending);
        let action = classify(VelocityScope::Actor, snapshot.mode, count, limit);
        self.record(action);
        debug!(actor_id, count, action = ?action, "actor velocity");

        Ok(VelocityCheck {
            scope: VelocityScope::Actor,
            subject_id: actor_id.to_string(),
            kind: None,
            count,
            limit,
            window_secs: v.window_secs,
            mode: snapshot.mode,
            action,
            monitored: false,
        })
    }

    fn record(&self, action: VelocityAction) {
        let m = &self.ctx.metrics;
        match action {
            VelocityAction::Allow => {}
            VelocityAction::Warn => m.velocity_warns.inc(),
            VelocityAction::Hold => m.velocity_holds.inc(),
            VelocityAction::Block => m.velocity_blocks.inc(),
        }
    }

    /// Holds the post's unpaid earnings until `now + hold_secs` and
    /// creates or refreshes its `VELOCITY_SPIKE` flag.
    pub async fn apply_post_hold(
        &self,
        post: &Post,
        check: &VelocityCheck,
        now: u64,
        snapshot: &ModeSnapshot,
    ) -> EngineResult<VelocityHold> {
        let hold_until = now.saturating_add(snapshot.thresholds.velocity.hold_secs);
        let store = &self.ctx.store;
        let metrics = &self.ctx.metrics;

        // Flag before holding: an earning committed between the two steps
        // picks the hold up from the flag when the processor reconciles.
        let mut flag = FlaggedContent::new(
            Uuid::new_v4().to_string(),
            post,
            FlagReason::VelocitySpike,
            check.details(),
            now,
        );
        flag.hold_until = Some(hold_until);
        let upsert = self
            .ctx
            .guard
            .call("upsert_flag", store.upsert_flag(flag))
            .await;
        let upsert = FailPolicy::Open.resolve("upsert_flag", upsert, metrics)?;

        let held = self
            .ctx
            .guard
            .call(
                "extend_holds_for_post",
                store.extend_holds_for_post(&post.id, hold_until, POST_VELOCITY_HOLD_REASON),
            )
            .await;
        let earnings_held = FailPolicy::Open
            .resolve("extend_holds_for_post", held, metrics)?
            .unwrap_or(0);

        match &upsert {
            Some(FlagUpsert::Inserted(id)) => info!(
                post_id = %post.id,
                flag_id = %id,
                count = check.count,
                hold_until,
                earnings_held,
                "velocity spike: content flagged and earnings held"
            ),
            Some(FlagUpsert::Updated(id)) => debug!(
                post_id = %post.id,
                flag_id = %id,
                hold_until,
                "velocity spike: flag refreshed"
            ),
            None => warn!(post_id = %post.id, "velocity spike: flag not written"),
        }

        Ok(VelocityHold {
            hold_until,
            earnings_held,
            new_flag: matches!(upsert, Some(FlagUpsert::Inserted(_))),
            flag_id: upsert.map(|u| u.id().to_string()),
        })
    }

    /// Holds the actor's own unpaid earnings until `now + hold_secs`.
    pub async fn apply_actor_hold(
        &self,
        actor_id: &str,
        now: u64,
        snapshot: &ModeSnapshot,
    ) -> EngineResult<VelocityHold> {
        let hold_until = now.saturating_add(snapshot.thresholds.velocity.hold_secs);
        let held = self
            .ctx
            .guard
            .call(
                "extend_holds_for_owner",
                self.ctx
                    .store
                    .extend_holds_for_owner(actor_id, hold_until, ACTOR_VELOCITY_HOLD_REASON),
            )
            .await;
        let earnings_held = FailPolicy::Open
            .resolve("extend_holds_for_owner", held, &self.ctx.metrics)?
            .unwrap_or(0);
        info!(actor_id, hold_until, earnings_held, "activity velocity: earnings held");
        Ok(VelocityHold {
            hold_until,
            earnings_held,
            flag_id: None,
            new_flag: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIMIT: VelocityLimit = VelocityLimit::new(50, 100);

    #[test]
    fn test_beta_post_holds_above_base() {
        assert_eq!(classify(VelocityScope::Post, Mode::Beta, 50, LIMIT), VelocityAction::Allow);
        assert_eq!(classify(VelocityScope::Post, Mode::Beta, 51, LIMIT), VelocityAction::Hold);
        assert_eq!(classify(VelocityScope::Post, Mode::Beta, 500, LIMIT), VelocityAction::Hold);
    }

    #[test]
    fn test_beta_actor_blocks_above_base() {
        assert_eq!(classify(VelocityScope::Actor, Mode::Beta, 50, LIMIT), VelocityAction::Allow);
        assert_eq!(classify(VelocityScope::Actor, Mode::Beta, 51, LIMIT), VelocityAction::Block);
    }

    #[test]
    fn test_natural_escalates_warn_then_hold() {
        for scope in [VelocityScope::Post, VelocityScope::Actor] {
            assert_eq!(classify(scope, Mode::Natural, 50, LIMIT), VelocityAction::Allow);
            assert_eq!(classify(scope, Mode::Natural, 51, LIMIT), VelocityAction::Warn);
            assert_eq!(classify(scope, Mode::Natural, 100, LIMIT), VelocityAction::Warn);
            assert_eq!(classify(scope, Mode::Natural, 101, LIMIT), VelocityAction::Hold);
        }
    }

    #[test]
    fn test_natural_never_blocks() {
        for count in [0, 51, 101, 10_000] {
            assert_ne!(
                classify(VelocityScope::Actor, Mode::Natural, count, LIMIT),
                VelocityAction::Block
            );
        }
    }

    #[test]
    fn test_window_start_saturates() {
        assert_eq!(window_start(100, 300), 0);
        assert_eq!(window_start(1_000, 300), 700);
    }
}
