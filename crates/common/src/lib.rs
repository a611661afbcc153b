//! # Earnguard Common Crate
//!
//! Shared vocabulary for the earnings integrity engine.
//!
//! ## Modules
//! - `types`: Posts, engagement events, creators, earning/warning/flag records
//! - `mode`: BETA / NATURAL policy, per-mode thresholds, hot-swappable snapshots
//! - `config`: Engine configuration (TOML file + environment overlay)
//! - `time`: Day boundaries and duration constants (caller-supplied timestamps only)
//!
//! ## Data Flow
//! ```text
//! engagement ──► velocity / diversity (advisory)
//!                     │
//!                     ▼
//!               strike ladder ──► holds / probation / suspension
//!                     │
//!                     ▼
//!            earnings processor ──► ledger
//! ```
//!
//! Every crate in the workspace reads the mode through a [`ModeSnapshot`]
//! handed out by a [`ModeProvider`]. A snapshot is immutable: a mode switch
//! never changes the thresholds of a calculation that is already running.

pub mod config;
pub mod mode;
pub mod time;
pub mod types;

pub use config::{ConfigError, EarningsParams, EngineConfig, JobsConfig};
pub use mode::{
    CapFailureAction, CapThresholds, DiversityThresholds, Mode, ModeProvider, ModeSnapshot,
    ModeThresholds, StrikeThresholds, SwappableModeProvider, VelocityLimit, VelocityThresholds,
};
pub use types::{
    round_amount, AccountStatus, ConsumptionMetrics, ContentMetadata, ContentType, Creator,
    CreatorTier, EarningRecord, EngagementEvent, EngagementKind, FlagReason, FlaggedContent,
    Post, PostId, ReviewDecision, StrikeAction, UserId, WarningReason, WarningRecord,
};
