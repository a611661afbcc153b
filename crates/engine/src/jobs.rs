//! # Batch Jobs
//!
//! The suspicious-content scan re-runs post velocity and diversity over
//! recently engaged posts and refreshes flags. It issues no strikes, and
//! re-running it updates existing flags instead of adding new ones.
//!
//! The warning-expiry sweep lives on [`crate::strikes::StrikeLadder`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use earnguard_common::time::SECS_PER_HOUR;
use earnguard_common::{EngagementKind, ModeSnapshot};

use crate::context::EngineContext;
use crate::diversity::{DiversityAction, DiversityMonitor};
use crate::error::EngineResult;
use crate::policy::closed;
use crate::velocity::{VelocityAction, VelocityMonitor};

/// Posts engaged within this many seconds are scanned.
pub const SCAN_LOOKBACK_SECS: u64 = SECS_PER_HOUR;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanReport {
    pub posts_scanned: usize,
    /// Velocity holds placed (new or refreshed flags).
    pub velocity_flags: usize,
    pub diversity_flags: usize,
}

#[derive(Debug, Clone)]
pub struct ContentScanner {
    ctx: Arc<EngineContext>,
    velocity: VelocityMonitor,
    diversity: DiversityMonitor,
}

impl ContentScanner {
    pub fn new(ctx: Arc<EngineContext>) -> Self {
        Self {
            velocity: VelocityMonitor::new(ctx.clone()),
            diversity: DiversityMonitor::new(ctx.clone()),
            ctx,
        }
    }

    pub async fn scan_suspicious_content(
        &self,
        now: u64,
        snapshot: &ModeSnapshot,
    ) -> EngineResult<ScanReport> {
        let since = now.saturating_sub(SCAN_LOOKBACK_SECS);
        let posts = closed(
            self.ctx
                .guard
                .call("posts_engaged_since", self.ctx.store.posts_engaged_since(since))
                .await,
        )?;

        let mut report = ScanReport {
            posts_scanned: posts.len(),
            ..ScanReport::default()
        };

        for post in &posts {
            for kind in EngagementKind::ALL {
                let check = self.velocity.check_post(&post.id, kind, now, snapshot).await?;
                if check.action == VelocityAction::Hold {
                    let hold = self.velocity.apply_post_hold(post, &check, now, snapshot).await?;
                    if hold.flag_id.is_some() {
                        report.velocity_flags += 1;
                    }
                }
            }

            let diversity = self.diversity.check_post(&post.id, snapshot).await?;
            if diversity.action != DiversityAction::None
                && self.diversity.flag_post(post, &diversity, now).await?.is_some()
            {
                report.diversity_flags += 1;
            }
        }

        if report.velocity_flags + report.diversity_flags > 0 {
            info!(
                posts_scanned = report.posts_scanned,
                velocity_flags = report.velocity_flags,
                diversity_flags = report.diversity_flags,
                "suspicious content scan"
            );
        } else {
            debug!(posts_scanned = report.posts_scanned, "suspicious content scan: clean");
        }
        Ok(report)
    }
}
