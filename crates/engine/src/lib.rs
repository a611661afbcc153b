//! # Earnguard Engine Crate
//!
//! Turns engagement into earnings while throttling manipulation.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────────┐
//! │                         IntegrityEngine                            │
//! │                (one ModeSnapshot per operation)                    │
//! │                                                                    │
//! │  EngagementRecorder ──► VelocityMonitor ──┐                        │
//! │                                           ├──► StrikeLadder        │
//! │  EarningsProcessor ───► DiversityMonitor ─┘        │               │
//! │        │                                           ▼               │
//! │        │ quality ─► caps ─► holds          probation / suspension  │
//! │        ▼                                                           │
//! │   Store::commit_earning  (atomic daily-cap check + insert)         │
//! │                                                                    │
//! │  AdminService: flag review, warning clear, pods, trends            │
//! │  ContentScanner / StrikeLadder::expire_warnings: batch jobs        │
//! └────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//! - `quality`: pure quality score and raw-earnings calculator
//! - `velocity`: trailing-window rate checks for posts and actors
//! - `diversity`: top-10 share and HHI, gaming pods, trends
//! - `strikes`: progressive warning ladder and expiry sweep
//! - `processor`: the earnings pipeline, caps and summaries
//! - `engagement`: recording likes, comments and shares
//! - `admin`, `jobs`: moderation and periodic work
//! - `policy`: store timeouts and fail-open / fail-closed handling
//! - `metrics`: counters rendered as Prometheus text
//!
//! ## Concurrency
//!
//! Per-key async locks serialize the read-compare-write sequences:
//! `ledger:<creator>` for earnings, `actor:<actor>` for actor velocity,
//! `strikes:<creator>` for strike levels. Ledger and actor locks are taken
//! before the strike lock. The daily cap is additionally enforced inside
//! the store's atomic commit.

pub mod admin;
pub mod context;
pub mod diversity;
pub mod engagement;
pub mod engine;
pub mod error;
pub mod identity;
pub mod jobs;
pub mod locks;
pub mod metrics;
pub mod notify;
pub mod policy;
pub mod processor;
pub mod quality;
pub mod strikes;
pub mod velocity;

pub use admin::ReviewOutcome;
pub use diversity::{DiversityAction, DiversityResult, DiversityStats, DiversityTrend, GamingPod};
pub use engagement::{EngagementOutcome, EngagementRequest, EngagementWarning};
pub use engine::{IntegrityEngine, IntegrityEngineBuilder, DEFAULT_STORE_TIMEOUT_MS};
pub use error::{EngineError, EngineResult};
pub use identity::{IdentityVerifier, ProfileFlagsVerifier, VerificationFactor};
pub use jobs::ScanReport;
pub use metrics::EngineMetrics;
pub use notify::{Notifier, TracingNotifier};
pub use policy::FailPolicy;
pub use processor::{EarningsSummary, ProcessedEarningsResult, ProcessingDetails};
pub use quality::{calculate_raw_earnings, EarningsBreakdown, QualityInputs};
pub use strikes::{CreatorStatus, IssuedWarning, StrikeOutcome, SweepReport};
pub use velocity::{VelocityAction, VelocityCheck};
