//! # Mode Policy
//!
//! The engine runs under one of two global policies:
//!
//! | Mode | Caps | Velocity | Diversity |
//! |------|------|----------|-----------|
//! | `BETA` | enforced (after grace period) | `> base` holds / blocks | penalty multiplier + flag |
//! | `NATURAL` | reported only | `> extreme` holds, `> base` warns | warning only above `extreme_pct` |
//!
//! ## Snapshots
//!
//! A [`ModeSnapshot`] bundles the active mode with its thresholds. Callers
//! take one snapshot per operation and pass it down; the provider swaps in a
//! fresh `Arc` on change, so a calculation in flight keeps the thresholds it
//! started with.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::info;

// ════════════════════════════════════════════════════════════════════════════════
// MODE
// ════════════════════════════════════════════════════════════════════════════════

/// Global policy state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Mode {
    /// Strict: caps, penalties and immediate holds.
    Beta,
    /// Trusting: monitors and warns, never blocks earnings.
    Natural,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Beta => f.write_str("BETA"),
            Mode::Natural => f.write_str("NATURAL"),
        }
    }
}

impl std::str::FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BETA" => Ok(Mode::Beta),
            "NATURAL" => Ok(Mode::Natural),
            other => Err(format!("unknown mode: {}", other)),
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// THRESHOLDS
// ════════════════════════════════════════════════════════════════════════════════

/// Event-count thresholds inside one velocity window.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VelocityLimit {
    pub base: u64,
    pub extreme: u64,
}

impl VelocityLimit {
    pub const fn new(base: u64, extreme: u64) -> Self {
        Self { base, extreme }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VelocityThresholds {
    /// Width of the trailing window in seconds.
    pub window_secs: u64,
    pub likes: VelocityLimit,
    pub comments: VelocityLimit,
    pub shares: VelocityLimit,
    /// Engagements given by one actor across all posts.
    pub creator_activity: VelocityLimit,
    /// How far a velocity hold pushes `held_until`.
    pub hold_secs: u64,
}

impl VelocityThresholds {
    #[must_use]
    pub fn limit_for(&self, kind: crate::types::EngagementKind) -> VelocityLimit {
        use crate::types::EngagementKind;
        match kind {
            EngagementKind::Like => self.likes,
            EngagementKind::Comment => self.comments,
            EngagementKind::Share => self.shares,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DiversityThresholds {
    /// Top-10 share (percent) above which BETA applies the penalty.
    pub threshold_pct: f64,
    /// Top-10 share (percent) above which NATURAL issues a warning.
    pub extreme_pct: f64,
    /// Earnings multiplier applied by the BETA penalty, in (0, 1].
    pub penalty_multiplier: f64,
    /// Posts with fewer engagements are treated as neutral.
    pub min_engagements: u64,
}

/// What happens when raw earnings exceed the per-post cap.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CapFailureAction {
    Clip,
    Block,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CapThresholds {
    /// Lifetime earnings ceiling per post.
    pub per_post_cap: f64,
    /// Earnings ceiling per creator per UTC day.
    pub daily_cap: f64,
    pub cap_failure_action: CapFailureAction,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrikeThresholds {
    /// Rolling window over which strikes count.
    pub window_days: u32,
    /// Probation length at strike level 3.
    pub probation_days: u32,
    /// Hold length at strike level 4 (manual review date).
    pub manual_review_hold_days: u32,
}

/// All thresholds of one mode.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModeThresholds {
    /// Accounts younger than this are exempt from the BETA daily cap.
    pub grace_period_days: u64,
    pub velocity: VelocityThresholds,
    pub diversity: DiversityThresholds,
    pub caps: CapThresholds,
    pub strikes: StrikeThresholds,
}

impl ModeThresholds {
    /// Strict launch-phase defaults.
    pub fn beta_default() -> Self {
        Self {
            grace_period_days: 7,
            velocity: VelocityThresholds {
                window_secs: 300,
                likes: VelocityLimit::new(50, 100),
                comments: VelocityLimit::new(20, 50),
                shares: VelocityLimit::new(10, 25),
                creator_activity: VelocityLimit::new(100, 250),
                hold_secs: 86_400,
            },
            diversity: DiversityThresholds {
                threshold_pct: 50.0,
                extreme_pct: 80.0,
                penalty_multiplier: 0.5,
                min_engagements: 10,
            },
            caps: CapThresholds {
                per_post_cap: 50.0,
                daily_cap: 100.0,
                cap_failure_action: CapFailureAction::Clip,
            },
            strikes: StrikeThresholds::default(),
        }
    }

    /// Organic-growth defaults.
    pub fn natural_default() -> Self {
        Self {
            grace_period_days: 0,
            velocity: VelocityThresholds {
                window_secs: 300,
                likes: VelocityLimit::new(200, 500),
                comments: VelocityLimit::new(80, 200),
                shares: VelocityLimit::new(40, 100),
                creator_activity: VelocityLimit::new(300, 600),
                hold_secs: 43_200,
            },
            diversity: DiversityThresholds {
                threshold_pct: 80.0,
                extreme_pct: 95.0,
                penalty_multiplier: 1.0,
                min_engagements: 10,
            },
            caps: CapThresholds {
                per_post_cap: 500.0,
                daily_cap: 1_000.0,
                cap_failure_action: CapFailureAction::Clip,
            },
            strikes: StrikeThresholds::default(),
        }
    }

    /// Checks internal consistency.
    pub fn validate(&self) -> Result<(), String> {
        let v = &self.velocity;
        if v.window_secs == 0 {
            return Err("velocity window_secs must be > 0".to_string());
        }
        for (name, limit) in [
            ("likes", v.likes),
            ("comments", v.comments),
            ("shares", v.shares),
            ("creator_activity", v.creator_activity),
        ] {
            if limit.extreme < limit.base {
                return Err(format!(
                    "velocity {}: extreme ({}) below base ({})",
                    name, limit.extreme, limit.base
                ));
            }
        }

        let d = &self.diversity;
        if !(d.penalty_multiplier > 0.0 && d.penalty_multiplier <= 1.0) {
            return Err(format!(
                "diversity penalty_multiplier must be in (0, 1], got {}",
                d.penalty_multiplier
            ));
        }
        if !(0.0..=100.0).contains(&d.threshold_pct) || !(0.0..=100.0).contains(&d.extreme_pct) {
            return Err("diversity thresholds must be percentages".to_string());
        }
        if d.extreme_pct < d.threshold_pct {
            return Err("diversity extreme_pct below threshold_pct".to_string());
        }

        let c = &self.caps;
        if !(c.per_post_cap >= 0.0) || !(c.daily_cap >= 0.0) {
            return Err("caps must be non-negative".to_string());
        }

        if self.strikes.window_days == 0 {
            return Err("strike window_days must be > 0".to_string());
        }
        Ok(())
    }
}

impl Default for StrikeThresholds {
    fn default() -> Self {
        Self {
            window_days: 30,
            probation_days: 7,
            manual_review_hold_days: 3_650,
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// SNAPSHOT + PROVIDER
// ════════════════════════════════════════════════════════════════════════════════

/// Immutable view of the active policy.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ModeSnapshot {
    pub mode: Mode,
    pub thresholds: ModeThresholds,
    /// Bumped on every swap.
    pub version: u64,
}

impl ModeSnapshot {
    pub fn new(mode: Mode, thresholds: ModeThresholds) -> Self {
        Self {
            mode,
            thresholds,
            version: 0,
        }
    }

    #[must_use]
    pub fn is_beta(&self) -> bool {
        self.mode == Mode::Beta
    }
}

/// Supplies the active policy. Read-only to the engine.
pub trait ModeProvider: Send + Sync {
    fn snapshot(&self) -> Arc<ModeSnapshot>;
}

/// Provider backed by a swappable `Arc`.
///
/// Holds the thresholds of both modes so a mode flip picks up the right set.
#[derive(Debug)]
pub struct SwappableModeProvider {
    current: RwLock<Arc<ModeSnapshot>>,
    beta: RwLock<ModeThresholds>,
    natural: RwLock<ModeThresholds>,
}

impl SwappableModeProvider {
    pub fn new(mode: Mode, beta: ModeThresholds, natural: ModeThresholds) -> Self {
        let active = match mode {
            Mode::Beta => beta.clone(),
            Mode::Natural => natural.clone(),
        };
        Self {
            current: RwLock::new(Arc::new(ModeSnapshot::new(mode, active))),
            beta: RwLock::new(beta),
            natural: RwLock::new(natural),
        }
    }

    /// Provider with compiled-in defaults.
    pub fn with_defaults(mode: Mode) -> Self {
        Self::new(
            mode,
            ModeThresholds::beta_default(),
            ModeThresholds::natural_default(),
        )
    }

    /// Switches the active mode.
    pub fn set_mode(&self, mode: Mode) -> Arc<ModeSnapshot> {
        let thresholds = match mode {
            Mode::Beta => self.beta.read().clone(),
            Mode::Natural => self.natural.read().clone(),
        };
        self.swap(mode, thresholds)
    }

    /// Replaces the thresholds of `mode`. If `mode` is active, the new
    /// thresholds take effect for the next snapshot.
    pub fn replace_thresholds(
        &self,
        mode: Mode,
        thresholds: ModeThresholds,
    ) -> Result<Arc<ModeSnapshot>, String> {
        thresholds.validate()?;
        match mode {
            Mode::Beta => *self.beta.write() = thresholds.clone(),
            Mode::Natural => *self.natural.write() = thresholds.clone(),
        }
        let active = self.current.read().mode;
        if active == mode {
            Ok(self.swap(mode, thresholds))
        } else {
            Ok(self.snapshot())
        }
    }

    fn swap(&self, mode: Mode, thresholds: ModeThresholds) -> Arc<ModeSnapshot> {
        let mut guard = self.current.write();
        let next = Arc::new(ModeSnapshot {
            mode,
            thresholds,
            version: guard.version.saturating_add(1),
        });
        info!(mode = %mode, version = next.version, "mode snapshot swapped");
        *guard = Arc::clone(&next);
        next
    }
}

impl ModeProvider for SwappableModeProvider {
    fn snapshot(&self) -> Arc<ModeSnapshot> {
        Arc::clone(&self.current.read())
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// TESTS
// ════════════════════════════════════════════════════════════════════════════════
