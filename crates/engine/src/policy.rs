//! # Failure Policy
//!
//! Every store call made by the engine goes through [`StoreGuard`], which
//! bounds it with the configured timeout. What happens when a call fails is
//! decided per check by a [`FailPolicy`]:
//!
//! | Policy | Used by | On outage / timeout |
//! |--------|---------|---------------------|
//! | `Open` | velocity, diversity, flags, advisory strikes | allow, result marked `monitored` |
//! | `Closed` | lookups, engagement insert, ledger writes | abort the operation |
//!
//! Non-transient store errors (`NotFound`, `Conflict`) are never swallowed.

use std::future::Future;
use std::time::Duration;

use earnguard_store::{StoreError, StoreResult};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{EngineError, EngineResult};
use crate::metrics::EngineMetrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailPolicy {
    /// Allow and mark the result as monitored.
    Open,
    /// Fail the whole operation.
    Closed,
}

impl FailPolicy {
    /// Applies the policy to a store result. `Ok(None)` means the call
    /// failed and the check was skipped.
    pub fn resolve<T>(
        self,
        op: &'static str,
        result: StoreResult<T>,
        metrics: &EngineMetrics,
    ) -> EngineResult<Option<T>> {
        match result {
            Ok(v) => Ok(Some(v)),
            Err(e) if self == FailPolicy::Open && e.is_transient() => {
                warn!(op, error = %e, "store failure on advisory check, failing open");
                metrics.fail_open_events.inc();
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Same as [`FailPolicy::resolve`] for engine-level results.
    pub fn resolve_engine<T>(
        self,
        op: &'static str,
        result: EngineResult<T>,
        metrics: &EngineMetrics,
    ) -> EngineResult<Option<T>> {
        match result {
            Ok(v) => Ok(Some(v)),
            Err(e) if self == FailPolicy::Open && e.is_transient() => {
                warn!(op, error = %e, "advisory step failed, failing open");
                metrics.fail_open_events.inc();
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

/// Bounds store calls with a timeout.
#[derive(Debug, Clone, Copy)]
pub struct StoreGuard {
    timeout: Duration,
}

impl StoreGuard {
    pub fn new(timeout_ms: u64) -> Self {
        Self {
            timeout: Duration::from_millis(timeout_ms),
        }
    }

    pub fn timeout_ms(&self) -> u64 {
        self.timeout.as_millis() as u64
    }

    /// Awaits `fut`, turning an elapsed timeout into [`StoreError::Timeout`].
    pub async fn call<T, F>(&self, op: &'static str, fut: F) -> StoreResult<T>
    where
        F: Future<Output = StoreResult<T>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout {
                op,
                timeout_ms: self.timeout_ms(),
            }),
        }
    }
}

/// Flattens a fail-closed store result.
pub fn closed<T>(result: StoreResult<T>) -> EngineResult<T> {
    result.map_err(EngineError::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_swallows_transient() {
        let m = EngineMetrics::new();
        let r: StoreResult<u64> = Err(StoreError::Unavailable("down".into()));
        let out = FailPolicy::Open.resolve("count", r, &m).expect("open");
        assert!(out.is_none());
        assert_eq!(m.fail_open_events.get(), 1);
    }

    #[test]
    fn test_open_propagates_not_found() {
        let m = EngineMetrics::new();
        let r: StoreResult<u64> = Err(StoreError::not_found("post", "p"));
        let err = FailPolicy::Open.resolve("count", r, &m).unwrap_err();
        assert!(matches!(err, EngineError::NotFound { .. }));
        assert_eq!(m.fail_open_events.get(), 0);
    }

    #[test]
    fn test_closed_propagates_transient() {
        let m = EngineMetrics::new();
        let r: StoreResult<u64> = Err(StoreError::Unavailable("down".into()));
        let err = FailPolicy::Closed.resolve("commit", r, &m).unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_guard_times_out() {
        let guard = StoreGuard::new(10);
        let slow = async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok::<u64, StoreError>(1)
        };
        let err = guard.call("slow_op", slow).await.unwrap_err();
        assert_eq!(
            err,
            StoreError::Timeout {
                op: "slow_op",
                timeout_ms: 10
            }
        );
    }

    #[tokio::test]
    async fn test_guard_passes_fast_result() {
        let guard = StoreGuard::new(100);
        let v = guard
            .call("fast", async { Ok::<u64, StoreError>(7) })
            .await
            .expect("fast");
        assert_eq!(v, 7);
    }
}
