//! Shared collaborators handed to every engine component.

use std::sync::Arc;

use earnguard_common::EarningsParams;
use earnguard_store::Store;

use crate::identity::IdentityVerifier;
use crate::locks::KeyedLocks;
use crate::metrics::EngineMetrics;
use crate::notify::Notifier;
use crate::policy::StoreGuard;

pub struct EngineContext {
    pub store: Arc<dyn Store>,
    pub guard: StoreGuard,
    pub metrics: Arc<EngineMetrics>,
    pub identity: Arc<dyn IdentityVerifier>,
    pub notifier: Arc<dyn Notifier>,
    pub params: EarningsParams,
    /// See [`EngineContext::ledger_key`] and friends. Lock order is
    /// `actor` or `ledger` first, then `strikes`; never the reverse.
    pub locks: KeyedLocks,
}

impl EngineContext {
    /// Serializes earnings processing for one creator.
    pub fn ledger_key(creator_id: &str) -> String {
        format!("ledger:{}", creator_id)
    }

    /// Serializes strike issuance for one creator.
    pub fn strike_key(creator_id: &str) -> String {
        format!("strikes:{}", creator_id)
    }

    /// Serializes the velocity check and insert of one engaging actor.
    pub fn actor_key(actor_id: &str) -> String {
        format!("actor:{}", actor_id)
    }
}

impl std::fmt::Debug for EngineContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineContext")
            .field("store_timeout_ms", &self.guard.timeout_ms())
            .field("params", &self.params)
            .field("locks", &self.locks.len())
            .finish()
    }
}
