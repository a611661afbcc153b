//! # Earnguard Store Crate
//!
//! Persistence contract for the earnings integrity engine.
//!
//! ## Modules
//! - `store`: the async [`Store`] trait and its atomic-commit result types
//! - `memory`: [`MemoryStore`], a lock-protected in-memory implementation
//!   with JSON snapshot persistence and fault injection
//! - `error`: [`StoreError`]
//!
//! The engine holds a `Arc<dyn Store>`; any backend that honours the
//! atomicity rules documented on [`Store`] can replace [`MemoryStore`].

pub mod error;
pub mod memory;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use memory::{MemoryStore, StoreStats};
pub use store::{CommitOutcome, DailyCapGuard, FlagUpsert, Store, EXPIRY_SWEEP_ACTOR};
