//! # Earnings Processor
//!
//! Orchestrates one earnings computation for a post.
//!
//! ## Pipeline
//!
//! ```text
//! verify ─► raw earnings ─► per-post cap ─► diversity ─► delta ─► daily cap ─► holds ─► commit ─► reconcile
//! ```
//!
//! Earnings are credited incrementally: the post's lifetime target is
//! `round(capped × diversity score)` and only the difference against what
//! the post was already credited is written. A second call with no new
//! engagement credits nothing.
//!
//! ## Mode Gating
//!
//! | Check | BETA | NATURAL |
//! |-------|------|---------|
//! | per-post cap | clip or block | report only |
//! | daily cap | block unless in grace | report only |
//! | diversity | penalty multiplier | warning only |
//!
//! ## Failure
//!
//! Verification, cap and daily-cap outcomes are returned as results with
//! `success = false`. Missing post or creator is an error. Ledger reads and
//! the commit fail closed; diversity fails open.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use earnguard_common::time::{day_start, days};
use earnguard_common::{
    round_amount, AccountStatus, CapFailureAction, CapThresholds, Creator, EarningRecord,
    FlagReason, Mode, ModeSnapshot, ModeThresholds, Post, UserId, WarningReason,
};
use earnguard_store::{CommitOutcome, DailyCapGuard, FlagUpsert};

use crate::context::EngineContext;
use crate::diversity::{DiversityAction, DiversityMonitor, DiversityResult};
use crate::error::{EngineError, EngineResult};
use crate::identity::{verification_message, VerificationFactor};
use crate::policy::{closed, FailPolicy};
use crate::quality::{calculate_raw_earnings, EarningsBreakdown, QualityInputs};
use crate::strikes::StrikeLadder;
use crate::velocity::POST_VELOCITY_HOLD_REASON;

/// Amounts closer than this are treated as equal.
const AMOUNT_EPSILON: f64 = 1e-9;

// ════════════════════════════════════════════════════════════════════════════════
// PER-POST CAP
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PerPostCapCheck {
    pub raw_earnings: f64,
    pub cap: f64,
    pub exceeded: bool,
    /// Amount carried forward; 0 when blocked.
    pub capped_earnings: f64,
    /// Amount removed by clipping.
    pub capped_amount: f64,
    pub blocked: bool,
}

/// Applies the per-post cap. NATURAL only reports the excess.
#[must_use]
pub fn apply_per_post_cap(raw_earnings: f64, mode: Mode, caps: &CapThresholds) -> PerPostCapCheck {
    let cap = caps.per_post_cap;
    let exceeded = raw_earnings > cap + AMOUNT_EPSILON;
    let unchanged = PerPostCapCheck {
        raw_earnings,
        cap,
        exceeded,
        capped_earnings: raw_earnings,
        capped_amount: 0.0,
        blocked: false,
    };
    if !exceeded || mode == Mode::Natural {
        return unchanged;
    }
    match caps.cap_failure_action {
        CapFailureAction::Clip => PerPostCapCheck {
            capped_earnings: cap,
            capped_amount: round_amount(raw_earnings - cap),
            ..unchanged
        },
        CapFailureAction::Block => PerPostCapCheck {
            capped_earnings: 0.0,
            blocked: true,
            ..unchanged
        },
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// DAILY CAP
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DailyCapCheck {
    pub allowed: bool,
    pub grace_period_active: bool,
    pub current_total: f64,
    pub projected_total: f64,
    pub daily_limit: f64,
    pub remaining: f64,
    pub exceeded: bool,
}

/// Whether a BETA account is still inside its grace period.
#[must_use]
pub fn grace_period_active(mode: Mode, account_age_days: u64, t: &ModeThresholds) -> bool {
    mode == Mode::Beta && account_age_days < u64::from(t.grace_period_days)
}

/// Evaluates adding `amount` to today's `current_total`.
#[must_use]
pub fn evaluate_daily_cap(
    mode: Mode,
    current_total: f64,
    amount: f64,
    account_age_days: u64,
    t: &ModeThresholds,
) -> DailyCapCheck {
    let daily_limit = t.caps.daily_cap;
    let projected_total = round_amount(current_total + amount);
    let exceeded = projected_total > daily_limit + AMOUNT_EPSILON;
    let grace = grace_period_active(mode, account_age_days, t);
    DailyCapCheck {
        allowed: !exceeded || mode == Mode::Natural || grace,
        grace_period_active: grace,
        current_total,
        projected_total,
        daily_limit,
        remaining: round_amount((daily_limit - current_total).max(0.0)),
        exceeded,
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// RESULT
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProcessingDetails {
    pub per_post_cap_exceeded: bool,
    pub daily_cap_exceeded: bool,
    pub account_age_days: u64,
    pub grace_period_active: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub verification_missing: Vec<VerificationFactor>,
    pub diversity_score: f64,
    pub diversity_action: Option<DiversityAction>,
    /// Lifetime amount the post was credited before this call.
    pub already_credited: f64,
    pub daily_total: f64,
    pub daily_limit: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub breakdown: Option<EarningsBreakdown>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessedEarningsResult {
    pub success: bool,
    pub raw_earnings: f64,
    pub final_earnings: f64,
    pub capped_amount: f64,
    pub mode: Mode,
    pub blocked: bool,
    pub warned: bool,
    pub message: String,
    pub hold_until: Option<u64>,
    pub earning_id: Option<String>,
    pub details: ProcessingDetails,
}

impl ProcessedEarningsResult {
    fn blocked(mode: Mode, raw_earnings: f64, message: String, details: ProcessingDetails) -> Self {
        Self {
            success: false,
            raw_earnings,
            final_earnings: 0.0,
            capped_amount: 0.0,
            mode,
            blocked: true,
            warned: false,
            message,
            hold_until: None,
            earning_id: None,
            details,
        }
    }
}

/// Ledger view of one creator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EarningsSummary {
    pub creator_id: UserId,
    pub total: f64,
    pub today: f64,
    /// Unpaid and not held.
    pub pending: f64,
    /// Unpaid and held at `now`.
    pub held: f64,
    pub daily_limit: f64,
    pub daily_remaining: f64,
    pub grace_period_active: bool,
    pub mode: Mode,
}

// ════════════════════════════════════════════════════════════════════════════════
// PROCESSOR
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub struct EarningsProcessor {
    ctx: Arc<EngineContext>,
    diversity: DiversityMonitor,
    strikes: StrikeLadder,
}

impl EarningsProcessor {
    pub fn new(ctx: Arc<EngineContext>) -> Self {
        Self {
            diversity: DiversityMonitor::new(ctx.clone()),
            strikes: StrikeLadder::new(ctx.clone()),
            ctx,
        }
    }

    /// Computes and credits the post's new earnings.
    pub async fn process_earnings(
        &self,
        post_id: &str,
        creator_id: &str,
        now: u64,
        snapshot: &ModeSnapshot,
    ) -> EngineResult<ProcessedEarningsResult> {
        let _ledger = self.ctx.locks.lock(&EngineContext::ledger_key(creator_id)).await;

        let store = &self.ctx.store;
        let guard = &self.ctx.guard;
        let metrics = &self.ctx.metrics;
        let mode = snapshot.mode;
        let t = &snapshot.thresholds;

        // ── Step 1: load ──
        let post = closed(guard.call("get_post", store.get_post(post_id)).await)?
            .ok_or_else(|| EngineError::not_found("post", post_id))?;
        let creator = closed(guard.call("get_creator", store.get_creator(creator_id)).await)?
            .ok_or_else(|| EngineError::not_found("creator", creator_id))?;
        if post.author_id != creator.id {
            return Err(EngineError::InvalidInput(format!(
                "post {} is not authored by {}",
                post.id, creator.id
            )));
        }

        let account_age_days = creator.account_age_days(now);
        let mut details = ProcessingDetails {
            account_age_days,
            grace_period_active: grace_period_active(mode, account_age_days, t),
            diversity_score: 1.0,
            already_credited: post.total_earnings,
            daily_limit: t.caps.daily_cap,
            ..ProcessingDetails::default()
        };

        // ── Step 2: verification gate ──
        let missing = self.ctx.identity.missing_factors(&creator).await?;
        if !missing.is_empty() {
            metrics.verification_failures.inc();
            let message = verification_message(&missing);
            info!(creator_id, post_id, missing = ?missing, "earnings rejected: verification required");
            details.verification_missing = missing;
            return Ok(ProcessedEarningsResult::blocked(mode, 0.0, message, details));
        }

        // ── Step 3: raw earnings ──
        let lengths = closed(guard.call("comment_lengths", store.comment_lengths(post_id)).await)?;
        let inputs = QualityInputs::from_post(&post, &creator, lengths);
        let breakdown = calculate_raw_earnings(&inputs, &self.ctx.params);
        let raw = breakdown.raw_earnings;
        details.breakdown = Some(breakdown);

        // ── Step 4: per-post cap ──
        let cap = apply_per_post_cap(raw, mode, &t.caps);
        details.per_post_cap_exceeded = cap.exceeded;
        if cap.blocked {
            metrics.earnings_blocked.inc();
            info!(post_id, raw, cap = cap.cap, "earnings blocked: per-post cap exceeded");
            let message = format!(
                "per-post cap exceeded: {:.2} above the {:.2} limit",
                raw - cap.cap,
                cap.cap
            );
            return Ok(ProcessedEarningsResult::blocked(mode, raw, message, details));
        }
        if cap.capped_amount > 0.0 {
            metrics.earnings_clipped.inc();
            debug!(post_id, raw, cap = cap.cap, "earnings clipped to per-post cap");
        }

        // ── Step 5: diversity ──
        let mut warned = cap.exceeded && mode == Mode::Natural;
        let diversity = self.diversity.check_post(post_id, snapshot).await?;
        details.diversity_score = diversity.score;
        details.diversity_action = Some(diversity.action);
        if diversity.action != DiversityAction::None {
            warned |= diversity.action == DiversityAction::Warn;
            self.on_low_diversity(&post, &diversity, now, snapshot).await?;
        }

        // ── Step 6: delta against what is already credited ──
        let target = round_amount(cap.capped_earnings * diversity.score);
        let delta = round_amount(target - post.total_earnings);
        if delta <= AMOUNT_EPSILON {
            debug!(post_id, target, credited = post.total_earnings, "nothing new to credit");
            return Ok(ProcessedEarningsResult {
                success: true,
                raw_earnings: raw,
                final_earnings: 0.0,
                capped_amount: cap.capped_amount,
                mode,
                blocked: false,
                warned,
                message: "no new earnings to credit".to_string(),
                hold_until: None,
                earning_id: None,
                details,
            });
        }

        // ── Step 7: daily cap ──
        let today = day_start(now);
        let current = closed(
            guard
                .call("sum_earnings_since", store.sum_earnings_since(creator_id, today))
                .await,
        )?;
        let daily = evaluate_daily_cap(mode, current, delta, account_age_days, t);
        details.daily_total = current;
        details.daily_cap_exceeded = daily.exceeded;
        if !daily.allowed {
            return Ok(self.daily_cap_blocked(mode, raw, current, details));
        }
        warned |= daily.exceeded;
        let cap_guard = (mode == Mode::Beta && !daily.grace_period_active).then_some(DailyCapGuard {
            day_start: today,
            cap: t.caps.daily_cap,
        });

        // ── Step 8: inherited holds ──
        let (hold_until, hold_reason) = self.inherited_hold(&creator, post_id, now, t).await?;

        // ── Step 9: commit ──
        let record = EarningRecord {
            id: Uuid::new_v4().to_string(),
            owner_id: creator.id.clone(),
            post_id: post.id.clone(),
            amount: delta,
            created_at: now,
            paid: false,
            held_until: hold_until,
            hold_reason,
        };
        let earning_id = record.id.clone();
        let outcome = closed(
            guard
                .call("commit_earning", store.commit_earning(record, cap_guard))
                .await,
        )?;
        let day_total = match outcome {
            CommitOutcome::Committed { day_total } => day_total,
            CommitOutcome::CapExceeded { day_total, .. } => {
                details.daily_cap_exceeded = true;
                return Ok(self.daily_cap_blocked(mode, raw, day_total, details));
            }
        };
        details.daily_total = day_total;
        metrics.earnings_processed.inc();

        // ── Step 10: reconcile holds ──
        let hold_until = self.reconcile_hold(creator_id, post_id, hold_until, now, t).await;

        info!(
            creator_id,
            post_id,
            mode = ?mode,
            raw,
            credited = delta,
            diversity_score = diversity.score,
            hold_until = ?hold_until,
            "earnings credited"
        );

        let message = match hold_until {
            Some(until) => format!("credited {:.2}, held until {}", delta, until),
            None if cap.capped_amount > 0.0 => {
                format!("credited {:.2} (clipped to the per-post cap)", delta)
            }
            None => format!("credited {:.2}", delta),
        };

        Ok(ProcessedEarningsResult {
            success: true,
            raw_earnings: raw,
            final_earnings: delta,
            capped_amount: cap.capped_amount,
            mode,
            blocked: false,
            warned,
            message,
            hold_until,
            earning_id: Some(earning_id),
            details,
        })
    }

    fn daily_cap_blocked(
        &self,
        mode: Mode,
        raw: f64,
        day_total: f64,
        details: ProcessingDetails,
    ) -> ProcessedEarningsResult {
        self.ctx.metrics.earnings_blocked.inc();
        info!(day_total, limit = details.daily_limit, "earnings blocked: daily cap exceeded");
        let message = format!(
            "daily earnings cap of {:.2} reached ({:.2} earned today); try again tomorrow",
            details.daily_limit, day_total
        );
        ProcessedEarningsResult::blocked(mode, raw, message, details)
    }

    /// Flags the post and, in NATURAL, warns its author on first detection.
    async fn on_low_diversity(
        &self,
        post: &Post,
        diversity: &DiversityResult,
        now: u64,
        snapshot: &ModeSnapshot,
    ) -> EngineResult<()> {
        if diversity.action == DiversityAction::ApplyPenalty {
            self.ctx.metrics.diversity_penalties.inc();
            info!(
                post_id = %post.id,
                top10 = diversity.stats.top10_share_pct,
                score = diversity.score,
                "diversity penalty applied"
            );
        }
        let upsert = self.diversity.flag_post(post, diversity, now).await?;
        if diversity.action == DiversityAction::Warn && matches!(upsert, Some(FlagUpsert::Inserted(_))) {
            let issued = self
                .strikes
                .issue_warning(
                    &post.author_id,
                    WarningReason::LowEngagementDiversity,
                    diversity.details(),
                    now,
                    snapshot,
                )
                .await;
            FailPolicy::Open.resolve_engine("issue_warning", issued, &self.ctx.metrics)?;
        }
        Ok(())
    }

    /// Hold a new record starts with: suspension, active probation, or an
    /// open velocity flag on the post. The latest applies.
    async fn inherited_hold(
        &self,
        creator: &Creator,
        post_id: &str,
        now: u64,
        t: &ModeThresholds,
    ) -> EngineResult<(Option<u64>, Option<String>)> {
        let mut hold: Option<(u64, &'static str)> = None;
        let mut consider = |until: u64, reason: &'static str| {
            if until > now && hold.map_or(true, |(h, _)| until > h) {
                hold = Some((until, reason));
            }
        };

        match creator.status {
            AccountStatus::Suspended => consider(
                now.saturating_add(days(u64::from(t.strikes.manual_review_hold_days))),
                crate::strikes::SUSPENSION_HOLD_REASON,
            ),
            AccountStatus::Probation => {
                if let Some(until) = creator.probation_until {
                    consider(until, crate::strikes::PROBATION_HOLD_REASON);
                }
            }
            AccountStatus::Active => {}
        }

        let flags = self
            .ctx
            .guard
            .call("unresolved_flags_for", self.ctx.store.unresolved_flags_for(post_id))
            .await;
        match FailPolicy::Open.resolve("unresolved_flags_for", flags, &self.ctx.metrics)? {
            Some(flags) => {
                for flag in flags.iter().filter(|f| f.reason == FlagReason::VelocitySpike) {
                    if let Some(until) = flag.hold_until {
                        consider(until, POST_VELOCITY_HOLD_REASON);
                    }
                }
            }
            None => warn!(post_id, "velocity flags unreadable; no flag hold inherited"),
        }

        Ok(match hold {
            Some((until, reason)) => (Some(until), Some(reason.to_string())),
            None => (None, None),
        })
    }

    /// Re-reads the creator and the post's flags after the commit.
    ///
    /// Strikes and velocity spikes do not take the ledger lock, so one can
    /// land between Step 8 and the commit and extend holds before the new
    /// record exists. Both write status or flag before extending holds, so
    /// the re-read sees whatever the commit missed. The record is already
    /// durable; failures here are logged, never returned.
    async fn reconcile_hold(
        &self,
        creator_id: &str,
        post_id: &str,
        current: Option<u64>,
        now: u64,
        t: &ModeThresholds,
    ) -> Option<u64> {
        let store = &self.ctx.store;
        let guard = &self.ctx.guard;

        let creator = match guard.call("get_creator", store.get_creator(creator_id)).await {
            Ok(Some(creator)) => creator,
            Ok(None) => return current,
            Err(e) => {
                error!(creator_id, error = %e, "hold reconcile skipped: creator unreadable");
                return current;
            }
        };
        let (until, reason) = match self.inherited_hold(&creator, post_id, now, t).await {
            Ok((Some(until), Some(reason))) => (until, reason),
            Ok(_) => return current,
            Err(e) => {
                error!(creator_id, post_id, error = %e, "hold reconcile skipped");
                return current;
            }
        };
        if current.map_or(false, |held| held >= until) {
            return current;
        }

        let extended = if reason == POST_VELOCITY_HOLD_REASON {
            guard
                .call("extend_holds_for_post", store.extend_holds_for_post(post_id, until, &reason))
                .await
        } else {
            guard
                .call(
                    "extend_holds_for_owner",
                    store.extend_holds_for_owner(creator_id, until, &reason),
                )
                .await
        };
        match extended {
            Ok(changed) => {
                warn!(
                    creator_id,
                    post_id,
                    hold_until = until,
                    reason = %reason,
                    changed,
                    "hold landed during commit; extended"
                );
                Some(until)
            }
            Err(e) => {
                error!(creator_id, post_id, error = %e, "hold reconcile failed; record left unheld");
                current
            }
        }
    }

    /// Totals from the creator's ledger.
    pub async fn earnings_summary(
        &self,
        creator_id: &str,
        now: u64,
        snapshot: &ModeSnapshot,
    ) -> EngineResult<EarningsSummary> {
        let store = &self.ctx.store;
        let guard = &self.ctx.guard;
        let t = &snapshot.thresholds;

        let creator = closed(guard.call("get_creator", store.get_creator(creator_id)).await)?
            .ok_or_else(|| EngineError::not_found("creator", creator_id))?;
        let records = closed(
            guard
                .call("earnings_for_owner", store.earnings_for_owner(creator_id))
                .await,
        )?;

        let today_start = day_start(now);
        let (mut total, mut today, mut pending, mut held) = (0.0, 0.0, 0.0, 0.0);
        for r in &records {
            total += r.amount;
            if r.created_at >= today_start {
                today += r.amount;
            }
            if !r.paid {
                if r.is_held(now) {
                    held += r.amount;
                } else {
                    pending += r.amount;
                }
            }
        }

        let today = round_amount(today);
        Ok(EarningsSummary {
            creator_id: creator.id.clone(),
            total: round_amount(total),
            today,
            pending: round_amount(pending),
            held: round_amount(held),
            daily_limit: t.caps.daily_cap,
            daily_remaining: round_amount((t.caps.daily_cap - today).max(0.0)),
            grace_period_active: grace_period_active(snapshot.mode, creator.account_age_days(now), t),
            mode: snapshot.mode,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_beta_clip() {
        let caps = ModeThresholds::beta_default().caps;
        let c = apply_per_post_cap(80.0, Mode::Beta, &caps);
        assert!(c.exceeded && !c.blocked);
        assert_eq!(c.capped_earnings, 50.0);
        assert_eq!(c.capped_amount, 30.0);
    }

    #[test]
    fn test_beta_block() {
        let mut caps = ModeThresholds::beta_default().caps;
        caps.cap_failure_action = CapFailureAction::Block;
        let c = apply_per_post_cap(80.0, Mode::Beta, &caps);
        assert!(c.blocked);
        assert_eq!(c.capped_earnings, 0.0);
    }

    #[test]
    fn test_natural_reports_only() {
        let mut caps = ModeThresholds::natural_default().caps;
        caps.per_post_cap = 10.0;
        let c = apply_per_post_cap(80.0, Mode::Natural, &caps);
        assert!(c.exceeded && !c.blocked);
        assert_eq!(c.capped_earnings, 80.0);
        assert_eq!(c.capped_amount, 0.0);
    }

    #[test]
    fn test_cap_is_idempotent() {
        let caps = ModeThresholds::beta_default().caps;
        assert_eq!(
            apply_per_post_cap(73.25, Mode::Beta, &caps),
            apply_per_post_cap(73.25, Mode::Beta, &caps)
        );
    }

    #[test]
    fn test_grace_period_allows_any_amount() {
        let t = ModeThresholds::beta_default();
        let d = evaluate_daily_cap(Mode::Beta, 90.0, 10_000.0, 0, &t);
        assert!(d.grace_period_active);
        assert!(d.allowed);
        assert!(d.exceeded);
    }

    #[test]
    fn test_beta_blocks_after_grace() {
        let t = ModeThresholds::beta_default();
        let d = evaluate_daily_cap(Mode::Beta, 90.0, 20.0, 7, &t);
        assert!(!d.grace_period_active);
        assert!(!d.allowed);
        assert_eq!(d.remaining, 10.0);

        let d = evaluate_daily_cap(Mode::Beta, 90.0, 10.0, 30, &t);
        assert!(d.allowed && !d.exceeded);
    }

    #[test]
    fn test_natural_never_blocks() {
        let t = ModeThresholds::natural_default();
        let d = evaluate_daily_cap(Mode::Natural, 999.0, 500.0, 0, &t);
        assert!(d.allowed);
        assert!(d.exceeded);
        assert!(!d.grace_period_active);
    }
}
