//! # Strike Ladder
//!
//! Progressive warnings for repeat offenders.
//!
//! The level of a new warning is recomputed on every issue from the count
//! of uncleared warnings created inside the rolling window:
//!
//! ```text
//! level = min(active + 1, 4)
//! ```
//!
//! | Level | Action | Side effect |
//! |-------|--------|-------------|
//! | 1 | LOG_ONLY | none |
//! | 2 | EMAIL_NOTIFICATION | creator notified |
//! | 3 | HOLD_EARNINGS | PROBATION for `probation_days`, unpaid earnings held until it ends |
//! | 4 | SUSPEND_ACCOUNT | SUSPENDED, unpaid earnings held until the manual-review date |
//!
//! Warnings carry `expires_at = created_at + window_days`. The expiry sweep
//! marks expired warnings cleared so the decay is durable; the live count
//! above is correct even if the sweep has not run.
//!
//! Issuance for one creator is serialized on the `strikes:<id>` lock so two
//! concurrent violations cannot compute the same level.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use earnguard_common::time::days;
use earnguard_common::{
    AccountStatus, Creator, ModeSnapshot, StrikeAction, StrikeThresholds, UserId, WarningReason,
    WarningRecord,
};
use earnguard_store::EXPIRY_SWEEP_ACTOR;

use crate::context::EngineContext;
use crate::error::{EngineError, EngineResult};
use crate::policy::closed;

/// Highest strike level.
pub const MAX_STRIKE_LEVEL: u8 = 4;

/// Hold reason written on earnings held by probation.
pub const PROBATION_HOLD_REASON: &str = "PROBATION";
/// Hold reason written on earnings held by a suspension.
pub const SUSPENSION_HOLD_REASON: &str = "SUSPENDED_PENDING_REVIEW";

/// Trust score change when an admin clears a warning.
pub const CLEAR_WARNING_TRUST_DELTA: i32 = 5;

/// Level of the next warning given the current active count.
#[must_use]
pub fn strike_level(active_strikes: u64) -> u8 {
    let next = active_strikes.saturating_add(1).min(u64::from(MAX_STRIKE_LEVEL));
    next as u8
}

/// Fixed level → action mapping. Levels above 4 map to suspension.
#[must_use]
pub fn action_for_level(level: u8, t: &StrikeThresholds) -> StrikeAction {
    match level {
        0 | 1 => StrikeAction::LogOnly,
        2 => StrikeAction::Notify,
        3 => StrikeAction::HoldEarnings {
            probation_days: t.probation_days,
        },
        _ => StrikeAction::Suspend {
            review_hold_days: t.manual_review_hold_days,
        },
    }
}

fn warning_message(reason: WarningReason, action: StrikeAction) -> String {
    let what = match reason {
        WarningReason::EngagementVelocity => "unusual engagement velocity on your content",
        WarningReason::ActivityVelocity => "engaging with content faster than allowed",
        WarningReason::LowEngagementDiversity => {
            "engagement on your content comes from too few accounts"
        }
    };
    match action {
        StrikeAction::LogOnly => format!("Warning: {}.", what),
        StrikeAction::Notify => format!(
            "Second warning: {}. Further violations will place your account on probation.",
            what
        ),
        StrikeAction::HoldEarnings { probation_days } => format!(
            "Account on probation for {} days: {}. Earnings are held until probation ends.",
            probation_days, what
        ),
        StrikeAction::Suspend { .. } => format!(
            "Account suspended pending manual review: {}. Earnings are held.",
            what
        ),
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// RESULTS
// ════════════════════════════════════════════════════════════════════════════════

/// A warning that was written, with the side effects of its level.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IssuedWarning {
    pub warning: WarningRecord,
    /// Account status after the action.
    pub status: AccountStatus,
    /// Hold placed on the owner's unpaid earnings, if any.
    pub hold_until: Option<u64>,
    pub earnings_held: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StrikeOutcome {
    Issued(IssuedWarning),
    /// A warning for the same reason is still inside its cooldown.
    Suppressed { existing_warning_id: String },
}

impl StrikeOutcome {
    pub fn issued(&self) -> Option<&IssuedWarning> {
        match self {
            StrikeOutcome::Issued(w) => Some(w),
            StrikeOutcome::Suppressed { .. } => None,
        }
    }
}

/// Result of the expiry sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    pub warnings_cleared: usize,
    pub probations_restored: usize,
}

/// Derived standing of a creator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreatorStatus {
    pub creator_id: UserId,
    pub status: AccountStatus,
    pub can_earn: bool,
    pub active_strikes: u64,
    pub probation_until: Option<u64>,
    /// Action the next warning would trigger.
    pub next_strike_action: StrikeAction,
    pub trust_score: i32,
}

// ════════════════════════════════════════════════════════════════════════════════
// LADDER
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub struct StrikeLadder {
    ctx: Arc<EngineContext>,
}

impl StrikeLadder {
    pub fn new(ctx: Arc<EngineContext>) -> Self {
        Self { ctx }
    }

    /// Issues a warning unconditionally. `NotFound` if the owner does not
    /// exist.
    pub async fn issue_warning(
        &self,
        owner_id: &str,
        reason: WarningReason,
        details: serde_json::Value,
        now: u64,
        snapshot: &ModeSnapshot,
    ) -> EngineResult<IssuedWarning> {
        let _guard = self.ctx.locks.lock(&EngineContext::strike_key(owner_id)).await;
        self.issue_locked(owner_id, reason, details, now, snapshot).await
    }

    /// Issues a warning unless the owner already has an uncleared warning
    /// for the same reason created within `cooldown_secs`. Keeps a burst of
    /// violations from climbing the whole ladder at once.
    pub async fn issue_warning_with_cooldown(
        &self,
        owner_id: &str,
        reason: WarningReason,
        details: serde_json::Value,
        cooldown_secs: u64,
        now: u64,
        snapshot: &ModeSnapshot,
    ) -> EngineResult<StrikeOutcome> {
        let _guard = self.ctx.locks.lock(&EngineContext::strike_key(owner_id)).await;

        let existing = closed(
            self.ctx
                .guard
                .call("warnings_for_owner", self.ctx.store.warnings_for_owner(owner_id))
                .await,
        )?;
        let cooldown_start = now.saturating_sub(cooldown_secs);
        if let Some(recent) = existing
            .iter()
            .rev()
            .find(|w| w.reason == reason && w.is_active(cooldown_start))
        {
            debug!(
                creator_id = owner_id,
                reason = %reason,
                existing = %recent.id,
                "warning suppressed by cooldown"
            );
            return Ok(StrikeOutcome::Suppressed {
                existing_warning_id: recent.id.clone(),
            });
        }

        self.issue_locked(owner_id, reason, details, now, snapshot)
            .await
            .map(StrikeOutcome::Issued)
    }

    async fn issue_locked(
        &self,
        owner_id: &str,
        reason: WarningReason,
        details: serde_json::Value,
        now: u64,
        snapshot: &ModeSnapshot,
    ) -> EngineResult<IssuedWarning> {
        let store = &self.ctx.store;
        let guard = &self.ctx.guard;
        let t = &snapshot.thresholds.strikes;

        // ── Step 1: owner must exist ──
        let creator = closed(guard.call("get_creator", store.get_creator(owner_id)).await)?
            .ok_or_else(|| EngineError::not_found("creator", owner_id))?;

        // ── Step 2: level from the live rolling count ──
        let window_start = now.saturating_sub(days(u64::from(t.window_days)));
        let active = closed(
            guard
                .call(
                    "count_active_warnings",
                    store.count_active_warnings(owner_id, window_start),
                )
                .await,
        )?;
        let level = strike_level(active);
        let action = action_for_level(level, t);

        // ── Step 3: record ──
        let warning = WarningRecord {
            id: Uuid::new_v4().to_string(),
            owner_id: owner_id.to_string(),
            reason,
            details,
            strike_level: level,
            message: warning_message(reason, action),
            action,
            created_at: now,
            expires_at: Some(now.saturating_add(days(u64::from(t.window_days)))),
            cleared_at: None,
            cleared_by: None,
        };
        closed(
            guard
                .call("insert_warning", store.insert_warning(warning.clone()))
                .await,
        )?;
        self.ctx.metrics.warnings_issued.inc();

        // ── Step 4: level side effects ──
        let (status, hold_until, earnings_held) = self.apply_action(&creator, &warning, now).await?;

        info!(
            creator_id = owner_id,
            warning_id = %warning.id,
            reason = %reason,
            strike_level = level,
            action = %action,
            status = %status,
            "strike issued"
        );

        Ok(IssuedWarning {
            warning,
            status,
            hold_until,
            earnings_held,
        })
    }

    async fn apply_action(
        &self,
        creator: &Creator,
        warning: &WarningRecord,
        now: u64,
    ) -> EngineResult<(AccountStatus, Option<u64>, usize)> {
        let store = &self.ctx.store;
        let guard = &self.ctx.guard;

        // Status is written before holds are extended; the earnings
        // processor relies on this order when it reconciles after a commit.
        match warning.action {
            StrikeAction::LogOnly => Ok((creator.status, None, 0)),
            StrikeAction::Notify => {
                if let Err(e) = self.ctx.notifier.notify_warning(warning).await {
                    warn!(creator_id = %creator.id, error = %e, "warning notification failed");
                }
                Ok((creator.status, None, 0))
            }
            StrikeAction::HoldEarnings { probation_days } => {
                let until = now.saturating_add(days(u64::from(probation_days)));
                let status = if creator.status == AccountStatus::Suspended {
                    AccountStatus::Suspended
                } else {
                    let probation_until = creator.probation_until.map_or(until, |p| p.max(until));
                    closed(
                        guard
                            .call(
                                "set_account_status",
                                store.set_account_status(
                                    &creator.id,
                                    AccountStatus::Probation,
                                    Some(probation_until),
                                ),
                            )
                            .await,
                    )?;
                    AccountStatus::Probation
                };
                let held = closed(
                    guard
                        .call(
                            "extend_holds_for_owner",
                            store.extend_holds_for_owner(&creator.id, until, PROBATION_HOLD_REASON),
                        )
                        .await,
                )?;
                Ok((status, Some(until), held))
            }
            StrikeAction::Suspend { review_hold_days } => {
                let until = now.saturating_add(days(u64::from(review_hold_days)));
                closed(
                    guard
                        .call(
                            "set_account_status",
                            store.set_account_status(&creator.id, AccountStatus::Suspended, None),
                        )
                        .await,
                )?;
                let held = closed(
                    guard
                        .call(
                            "extend_holds_for_owner",
                            store.extend_holds_for_owner(&creator.id, until, SUSPENSION_HOLD_REASON),
                        )
                        .await,
                )?;
                if creator.status != AccountStatus::Suspended {
                    self.ctx.metrics.suspensions.inc();
                }
                warn!(creator_id = %creator.id, hold_until = until, earnings_held = held, "account suspended");
                Ok((AccountStatus::Suspended, Some(until), held))
            }
        }
    }

    /// Admin clear. Raises the owner's trust score on the first clear.
    /// Returns `false` if the warning was already cleared.
    pub async fn clear_warning(&self, warning_id: &str, admin_id: &str, now: u64) -> EngineResult<bool> {
        let store = &self.ctx.store;
        let guard = &self.ctx.guard;

        let warning = closed(guard.call("get_warning", store.get_warning(warning_id)).await)?
            .ok_or_else(|| EngineError::not_found("warning", warning_id))?;
        let cleared = closed(
            guard
                .call("clear_warning", store.clear_warning(warning_id, admin_id, now))
                .await,
        )?;
        if !cleared {
            return Ok(false);
        }

        let trust = guard
            .call(
                "adjust_trust_score",
                store.adjust_trust_score(&warning.owner_id, CLEAR_WARNING_TRUST_DELTA),
            )
            .await;
        match trust {
            Ok(score) => info!(
                warning_id,
                creator_id = %warning.owner_id,
                admin_id,
                trust_score = score,
                "warning cleared"
            ),
            // the warning may outlive its owner record
            Err(e) => warn!(warning_id, creator_id = %warning.owner_id, error = %e, "warning cleared, trust not adjusted"),
        }
        Ok(true)
    }

    /// Clears expired warnings and restores lapsed probations. Safe to
    /// re-run.
    pub async fn expire_warnings(&self, now: u64) -> EngineResult<SweepReport> {
        let store = &self.ctx.store;
        let guard = &self.ctx.guard;

        let cleared = closed(
            guard
                .call("clear_expired_warnings", store.clear_expired_warnings(now))
                .await,
        )?;
        let restored = closed(
            guard
                .call("restore_lapsed_probations", store.restore_lapsed_probations(now))
                .await,
        )?;

        let report = SweepReport {
            warnings_cleared: cleared.len(),
            probations_restored: restored.len(),
        };
        if report != SweepReport::default() {
            info!(
                cleared_by = EXPIRY_SWEEP_ACTOR,
                warnings_cleared = report.warnings_cleared,
                probations_restored = report.probations_restored,
                "expiry sweep"
            );
        } else {
            debug!("expiry sweep: nothing to do");
        }
        Ok(report)
    }

    /// Current standing, derived fresh from the store.
    pub async fn creator_status(
        &self,
        creator_id: &str,
        now: u64,
        snapshot: &ModeSnapshot,
    ) -> EngineResult<CreatorStatus> {
        let store = &self.ctx.store;
        let guard = &self.ctx.guard;
        let t = &snapshot.thresholds.strikes;

        let creator = closed(guard.call("get_creator", store.get_creator(creator_id)).await)?
            .ok_or_else(|| EngineError::not_found("creator", creator_id))?;
        let window_start = now.saturating_sub(days(u64::from(t.window_days)));
        let active = closed(
            guard
                .call(
                    "count_active_warnings",
                    store.count_active_warnings(creator_id, window_start),
                )
                .await,
        )?;

        Ok(CreatorStatus {
            creator_id: creator.id.clone(),
            status: creator.status,
            can_earn: creator.can_earn(now),
            active_strikes: active,
            probation_until: creator.probation_until,
            next_strike_action: action_for_level(strike_level(active), t),
            trust_score: creator.trust_score,
        })
    }
}
