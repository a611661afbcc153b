//! # Integrity Engine
//!
//! Entry point for hosts. Every operation takes a fresh [`ModeSnapshot`]
//! from the mode provider, so a mode swap never changes the policy of a
//! call already in flight.
//!
//! ```rust,ignore
//! let engine = IntegrityEngineBuilder::new(store)
//!     .with_config(&config)
//!     .with_mode_provider(modes)
//!     .build()?;
//! let result = engine.process_earnings("post-1", "creator-1", now).await?;
//! ```

use std::sync::Arc;

use earnguard_common::{
    EarningsParams, EngineConfig, FlaggedContent, Mode, ModeProvider, ModeSnapshot,
    ReviewDecision, SwappableModeProvider, WarningReason,
};
use earnguard_store::Store;

use crate::admin::{AdminService, ReviewOutcome};
use crate::context::EngineContext;
use crate::diversity::{DiversityTrend, GamingPod};
use crate::engagement::{EngagementOutcome, EngagementRecorder, EngagementRequest};
use crate::error::{EngineError, EngineResult};
use crate::identity::{IdentityVerifier, ProfileFlagsVerifier};
use crate::jobs::{ContentScanner, ScanReport};
use crate::locks::KeyedLocks;
use crate::metrics::EngineMetrics;
use crate::notify::{Notifier, TracingNotifier};
use crate::policy::StoreGuard;
use crate::processor::{EarningsProcessor, EarningsSummary, ProcessedEarningsResult};
use crate::strikes::{CreatorStatus, IssuedWarning, StrikeLadder, SweepReport};

/// Default store call timeout.
pub const DEFAULT_STORE_TIMEOUT_MS: u64 = 500;

// ════════════════════════════════════════════════════════════════════════════════
// BUILDER
// ════════════════════════════════════════════════════════════════════════════════

pub struct IntegrityEngineBuilder {
    store: Arc<dyn Store>,
    modes: Option<Arc<dyn ModeProvider>>,
    identity: Arc<dyn IdentityVerifier>,
    notifier: Arc<dyn Notifier>,
    metrics: Option<Arc<EngineMetrics>>,
    store_timeout_ms: u64,
    params: EarningsParams,
}

impl IntegrityEngineBuilder {
    /// Starts from compiled-in defaults: BETA thresholds, profile-flag
    /// verification, tracing notifications.
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            modes: None,
            identity: Arc::new(ProfileFlagsVerifier),
            notifier: Arc::new(TracingNotifier),
            metrics: None,
            store_timeout_ms: DEFAULT_STORE_TIMEOUT_MS,
            params: EarningsParams::default(),
        }
    }

    /// Takes timeout and earnings parameters from the config. Does not set
    /// the mode provider.
    #[must_use]
    pub fn with_config(mut self, config: &EngineConfig) -> Self {
        self.store_timeout_ms = config.store_timeout_ms;
        self.params = config.earnings.clone();
        self
    }

    #[must_use]
    pub fn with_mode_provider(mut self, modes: Arc<dyn ModeProvider>) -> Self {
        self.modes = Some(modes);
        self
    }

    #[must_use]
    pub fn with_identity(mut self, identity: Arc<dyn IdentityVerifier>) -> Self {
        self.identity = identity;
        self
    }

    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Shares a metrics registry with the host.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<EngineMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    #[must_use]
    pub fn with_store_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.store_timeout_ms = timeout_ms;
        self
    }

    #[must_use]
    pub fn with_earnings_params(mut self, params: EarningsParams) -> Self {
        self.params = params;
        self
    }

    pub fn build(self) -> EngineResult<IntegrityEngine> {
        if self.store_timeout_ms == 0 || self.store_timeout_ms >= 1_000 {
            return Err(EngineError::InvalidInput(format!(
                "store timeout must be between 1 and 999 ms, got {}",
                self.store_timeout_ms
            )));
        }
        if !(self.params.rate_per_point > 0.0 && self.params.baseline_share > 0.0) {
            return Err(EngineError::InvalidInput(
                "earnings rate and baseline share must be positive".to_string(),
            ));
        }

        let modes = self
            .modes
            .unwrap_or_else(|| Arc::new(SwappableModeProvider::with_defaults(Mode::Beta)));
        let ctx = Arc::new(EngineContext {
            store: self.store,
            guard: StoreGuard::new(self.store_timeout_ms),
            metrics: self.metrics.unwrap_or_default(),
            identity: self.identity,
            notifier: self.notifier,
            params: self.params,
            locks: KeyedLocks::new(),
        });

        Ok(IntegrityEngine {
            processor: EarningsProcessor::new(ctx.clone()),
            recorder: EngagementRecorder::new(ctx.clone()),
            strikes: StrikeLadder::new(ctx.clone()),
            admin: AdminService::new(ctx.clone()),
            scanner: ContentScanner::new(ctx.clone()),
            modes,
            ctx,
        })
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// ENGINE
// ════════════════════════════════════════════════════════════════════════════════

pub struct IntegrityEngine {
    ctx: Arc<EngineContext>,
    modes: Arc<dyn ModeProvider>,
    processor: EarningsProcessor,
    recorder: EngagementRecorder,
    strikes: StrikeLadder,
    admin: AdminService,
    scanner: ContentScanner,
}

impl std::fmt::Debug for IntegrityEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntegrityEngine")
            .field("ctx", &self.ctx)
            .field("mode", &self.modes.snapshot().mode)
            .finish()
    }
}

impl IntegrityEngine {
    /// Policy for one call.
    pub fn snapshot(&self) -> Arc<ModeSnapshot> {
        let snapshot = self.modes.snapshot();
        self.ctx.metrics.mode_version.set(snapshot.version);
        snapshot
    }

    pub fn metrics(&self) -> &Arc<EngineMetrics> {
        &self.ctx.metrics
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.ctx.store
    }

    // ── request path ───────────────────────────────────────────────────────

    pub async fn record_engagement(
        &self,
        request: EngagementRequest,
        now: u64,
    ) -> EngineResult<EngagementOutcome> {
        let snapshot = self.snapshot();
        self.recorder.record_engagement(request, now, &snapshot).await
    }

    pub async fn process_earnings(
        &self,
        post_id: &str,
        creator_id: &str,
        now: u64,
    ) -> EngineResult<ProcessedEarningsResult> {
        let snapshot = self.snapshot();
        self.processor
            .process_earnings(post_id, creator_id, now, &snapshot)
            .await
    }

    pub async fn earnings_summary(&self, creator_id: &str, now: u64) -> EngineResult<EarningsSummary> {
        let snapshot = self.snapshot();
        self.processor.earnings_summary(creator_id, now, &snapshot).await
    }

    pub async fn creator_status(&self, creator_id: &str, now: u64) -> EngineResult<CreatorStatus> {
        let snapshot = self.snapshot();
        self.strikes.creator_status(creator_id, now, &snapshot).await
    }

    /// Issues a strike directly, without cooldown.
    pub async fn issue_warning(
        &self,
        owner_id: &str,
        reason: WarningReason,
        details: serde_json::Value,
        now: u64,
    ) -> EngineResult<IssuedWarning> {
        let snapshot = self.snapshot();
        self.strikes
            .issue_warning(owner_id, reason, details, now, &snapshot)
            .await
    }

    // ── admin ──────────────────────────────────────────────────────────────

    pub async fn pending_flagged_posts(&self) -> EngineResult<Vec<FlaggedContent>> {
        self.admin.pending_flagged_posts().await
    }

    pub async fn review_flagged_post(
        &self,
        post_id: &str,
        reviewer_id: &str,
        decision: ReviewDecision,
        notes: Option<String>,
        now: u64,
    ) -> EngineResult<ReviewOutcome> {
        self.admin
            .review_flagged_post(post_id, reviewer_id, decision, notes, now)
            .await
    }

    pub async fn clear_warning(&self, warning_id: &str, admin_id: &str, now: u64) -> EngineResult<bool> {
        self.admin.clear_warning(warning_id, admin_id, now).await
    }

    pub async fn identify_gaming_pods(&self, now: u64) -> EngineResult<Vec<GamingPod>> {
        self.admin.identify_gaming_pods(now).await
    }

    pub async fn track_diversity_trends(&self, now: u64) -> EngineResult<Vec<DiversityTrend>> {
        let snapshot = self.snapshot();
        self.admin.track_diversity_trends(now, &snapshot).await
    }

    // ── batch jobs ─────────────────────────────────────────────────────────

    pub async fn expire_warnings(&self, now: u64) -> EngineResult<SweepReport> {
        self.strikes.expire_warnings(now).await
    }

    pub async fn scan_suspicious_content(&self, now: u64) -> EngineResult<ScanReport> {
        let snapshot = self.snapshot();
        self.scanner.scan_suspicious_content(now, &snapshot).await
    }
}
