//! # Engagement Recording
//!
//! Records one like, comment or share and runs the velocity checks around
//! it.
//!
//! ## Sequence
//!
//! 1. Actor velocity (lock `actor:<id>`), counting the pending event.
//!    BETA over base rejects the event as rate limited.
//! 2. Insert. A repeated (actor, post, kind) is a duplicate, not an error.
//! 3. Actor WARN / HOLD side effects (NATURAL).
//! 4. Post velocity for the event's kind, after the insert.
//!
//! Warnings raised here are advisory: a warning for the same reason inside
//! one velocity window is not repeated, and a store failure while issuing
//! one is logged and skipped.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use earnguard_common::{
    EngagementEvent, EngagementKind, Mode, ModeSnapshot, PostId, StrikeAction, UserId,
    WarningReason,
};
use earnguard_store::StoreError;

use crate::context::EngineContext;
use crate::error::{EngineError, EngineResult};
use crate::policy::{closed, FailPolicy};
use crate::strikes::{StrikeLadder, StrikeOutcome};
use crate::velocity::{VelocityAction, VelocityCheck, VelocityMonitor};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngagementRequest {
    pub actor_id: UserId,
    pub post_id: PostId,
    pub kind: EngagementKind,
    /// Required for comments.
    #[serde(default)]
    pub comment_text: Option<String>,
}

impl EngagementRequest {
    fn validate(&self) -> EngineResult<()> {
        if self.actor_id.trim().is_empty() {
            return Err(EngineError::InvalidInput("actor_id is empty".to_string()));
        }
        if self.post_id.trim().is_empty() {
            return Err(EngineError::InvalidInput("post_id is empty".to_string()));
        }
        match (&self.kind, &self.comment_text) {
            (EngagementKind::Comment, None) => Err(EngineError::InvalidInput(
                "comment_text is required for comments".to_string(),
            )),
            (EngagementKind::Comment, Some(text)) if text.trim().is_empty() => Err(
                EngineError::InvalidInput("comment_text is empty".to_string()),
            ),
            _ => Ok(()),
        }
    }

    fn into_event(self, now: u64) -> EngagementEvent {
        let comment_chars = match self.kind {
            EngagementKind::Comment => self
                .comment_text
                .as_deref()
                .map(|t| u32::try_from(t.chars().count()).unwrap_or(u32::MAX)),
            _ => None,
        };
        EngagementEvent {
            actor_id: self.actor_id,
            post_id: self.post_id,
            kind: self.kind,
            created_at: now,
            comment_chars,
            comment_text: match self.kind {
                EngagementKind::Comment => self.comment_text,
                _ => None,
            },
        }
    }
}

/// Warning raised while recording, as shown to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngagementWarning {
    pub warning_id: String,
    pub owner_id: UserId,
    pub reason: WarningReason,
    pub strike_level: u8,
    pub action: StrikeAction,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EngagementOutcome {
    Recorded {
        post_id: PostId,
        kind: EngagementKind,
        /// Post counter for `kind` after the insert.
        count: u64,
        actor_velocity: VelocityAction,
        post_velocity: VelocityAction,
        warnings: Vec<EngagementWarning>,
        /// Hold placed by this event, if any.
        hold_until: Option<u64>,
        /// A velocity check was skipped because the store failed.
        monitored: bool,
    },
    Duplicate {
        message: String,
    },
    RateLimited {
        retry_after_secs: u64,
        message: String,
        warnings: Vec<EngagementWarning>,
    },
}

impl EngagementOutcome {
    #[must_use]
    pub fn is_recorded(&self) -> bool {
        matches!(self, EngagementOutcome::Recorded { .. })
    }

    #[must_use]
    pub fn is_blocked(&self) -> bool {
        matches!(self, EngagementOutcome::RateLimited { .. })
    }
}

#[derive(Debug, Clone)]
pub struct EngagementRecorder {
    ctx: Arc<EngineContext>,
    velocity: VelocityMonitor,
    strikes: StrikeLadder,
}

impl EngagementRecorder {
    pub fn new(ctx: Arc<EngineContext>) -> Self {
        Self {
            velocity: VelocityMonitor::new(ctx.clone()),
            strikes: StrikeLadder::new(ctx.clone()),
            ctx,
        }
    }

    pub async fn record_engagement(
        &self,
        request: EngagementRequest,
        now: u64,
        snapshot: &ModeSnapshot,
    ) -> EngineResult<EngagementOutcome> {
        request.validate()?;
        let window_secs = snapshot.thresholds.velocity.window_secs;
        let mut warnings = Vec::new();
        let mut hold_until: Option<u64> = None;

        let actor_id = request.actor_id.clone();
        let post_id = request.post_id.clone();
        let kind = request.kind;

        let _actor = self.ctx.locks.lock(&EngineContext::actor_key(&actor_id)).await;

        // ── Step 0: duplicate ──
        // Only this actor can write its dedup key, and the actor lock is held,
        // so the answer holds until the insert below.
        let exists = closed(
            self.ctx
                .guard
                .call(
                    "engagement_exists",
                    self.ctx.store.engagement_exists(&actor_id, &post_id, kind),
                )
                .await,
        )?;
        if exists {
            return Ok(self.duplicate(&actor_id, &post_id, kind));
        }

        // ── Step 1: actor velocity ──
        let actor_check = self.velocity.check_actor(&actor_id, 1, now, snapshot).await?;
        if actor_check.action == VelocityAction::Block {
            if let Some(w) = self
                .advisory_warning(&actor_id, WarningReason::ActivityVelocity, &actor_check, now, snapshot)
                .await?
            {
                warnings.push(w);
            }
            info!(
                actor_id = %actor_id,
                count = actor_check.count,
                limit = actor_check.limit.base,
                "engagement rate limited"
            );
            return Ok(EngagementOutcome::RateLimited {
                retry_after_secs: window_secs,
                message: format!(
                    "too many engagements: more than {} in {} seconds; try again in {} seconds",
                    actor_check.limit.base, window_secs, window_secs
                ),
                warnings,
            });
        }

        // ── Step 2: insert ──
        let event = request.into_event(now);
        let inserted = self
            .ctx
            .guard
            .call("insert_engagement", self.ctx.store.insert_engagement(event))
            .await;
        let post = match inserted {
            Ok(post) => post,
            Err(StoreError::Conflict(_)) => return Ok(self.duplicate(&actor_id, &post_id, kind)),
            Err(e) => return Err(e.into()),
        };
        self.ctx.metrics.engagements_recorded.inc();

        // ── Step 3: actor side effects (NATURAL) ──
        if snapshot.mode == Mode::Natural
            && matches!(actor_check.action, VelocityAction::Warn | VelocityAction::Hold)
        {
            if actor_check.action == VelocityAction::Hold {
                let hold = self.velocity.apply_actor_hold(&actor_id, now, snapshot).await?;
                hold_until = Some(hold.hold_until);
            }
            if let Some(w) = self
                .advisory_warning(&actor_id, WarningReason::ActivityVelocity, &actor_check, now, snapshot)
                .await?
            {
                warnings.push(w);
            }
        }

        // ── Step 4: post velocity ──
        let post_check = self.velocity.check_post(&post.id, kind, now, snapshot).await?;
        if post_check.action == VelocityAction::Hold {
            let hold = self
                .velocity
                .apply_post_hold(&post, &post_check, now, snapshot)
                .await?;
            hold_until = Some(hold_until.map_or(hold.hold_until, |h| h.max(hold.hold_until)));
        }
        let strikes_author = snapshot.mode == Mode::Natural
            && matches!(post_check.action, VelocityAction::Warn | VelocityAction::Hold);
        if strikes_author {
            if let Some(w) = self
                .advisory_warning(
                    &post.author_id,
                    WarningReason::EngagementVelocity,
                    &post_check,
                    now,
                    snapshot,
                )
                .await?
            {
                warnings.push(w);
            }
        }

        Ok(EngagementOutcome::Recorded {
            post_id: post.id.clone(),
            kind,
            count: post.count_of(kind),
            actor_velocity: actor_check.action,
            post_velocity: post_check.action,
            warnings,
            hold_until,
            monitored: actor_check.monitored || post_check.monitored,
        })
    }

    fn duplicate(&self, actor_id: &str, post_id: &str, kind: EngagementKind) -> EngagementOutcome {
        self.ctx.metrics.engagements_duplicate.inc();
        debug!(actor_id, post_id, kind = %kind, "duplicate engagement");
        EngagementOutcome::Duplicate {
            message: format!("{} by {} on post {} already recorded", kind, actor_id, post_id),
        }
    }

    /// Issues a cooldown-limited warning. Missing owners and store outages
    /// are logged and skipped.
    async fn advisory_warning(
        &self,
        owner_id: &str,
        reason: WarningReason,
        check: &VelocityCheck,
        now: u64,
        snapshot: &ModeSnapshot,
    ) -> EngineResult<Option<EngagementWarning>> {
        let result = self
            .strikes
            .issue_warning_with_cooldown(
                owner_id,
                reason,
                check.details(),
                check.window_secs,
                now,
                snapshot,
            )
            .await;
        let outcome = match result {
            Err(EngineError::NotFound { entity, id }) => {
                debug!(entity, id = %id, reason = %reason, "warning skipped: owner not found");
                return Ok(None);
            }
            other => FailPolicy::Open.resolve_engine("issue_warning", other, &self.ctx.metrics)?,
        };
        Ok(match outcome {
            Some(StrikeOutcome::Issued(issued)) => {
                let w = issued.warning;
                Some(EngagementWarning {
                    warning_id: w.id,
                    owner_id: w.owner_id,
                    reason: w.reason,
                    strike_level: w.strike_level,
                    action: w.action,
                    message: w.message,
                })
            }
            Some(StrikeOutcome::Suppressed { .. }) | None => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(kind: EngagementKind, text: Option<&str>) -> EngagementRequest {
        EngagementRequest {
            actor_id: "a1".to_string(),
            post_id: "p1".to_string(),
            kind,
            comment_text: text.map(str::to_string),
        }
    }

    #[test]
    fn test_comment_requires_text() {
        assert!(request(EngagementKind::Comment, None).validate().is_err());
        assert!(request(EngagementKind::Comment, Some("  ")).validate().is_err());
        assert!(request(EngagementKind::Comment, Some("nice")).validate().is_ok());
        assert!(request(EngagementKind::Like, None).validate().is_ok());
    }

    #[test]
    fn test_comment_chars_counted_in_chars() {
        let e = request(EngagementKind::Comment, Some("héllo")).into_event(9);
        assert_eq!(e.comment_chars, Some(5));
        assert_eq!(e.created_at, 9);
    }

    #[test]
    fn test_like_drops_text() {
        let e = request(EngagementKind::Like, Some("ignored")).into_event(1);
        assert_eq!(e.comment_chars, None);
        assert_eq!(e.comment_text, None);
    }

    #[test]
    fn test_outcome_serializes_tagged() {
        let o = EngagementOutcome::Duplicate {
            message: "dup".to_string(),
        };
        let v = serde_json::to_value(&o).unwrap();
        assert_eq!(v["outcome"], "DUPLICATE");
    }
}
