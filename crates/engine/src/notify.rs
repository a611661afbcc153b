//! Creator notification collaborator (strike level 2 and above).

use async_trait::async_trait;
use tracing::info;

use earnguard_common::WarningRecord;

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Delivers a warning to its owner. Failures are logged by the caller
    /// and never undo the warning.
    async fn notify_warning(&self, warning: &WarningRecord) -> Result<(), String>;
}

/// Logs notifications instead of sending them.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify_warning(&self, warning: &WarningRecord) -> Result<(), String> {
        info!(
            creator_id = %warning.owner_id,
            warning_id = %warning.id,
            reason = %warning.reason,
            strike_level = warning.strike_level,
            "creator notified: {}",
            warning.message
        );
        Ok(())
    }
}
