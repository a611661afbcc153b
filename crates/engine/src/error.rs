use earnguard_common::ConfigError;
use earnguard_store::StoreError;
use thiserror::Error;

/// Errors that abort an engine operation.
///
/// Business outcomes (verification required, cap exceeded, rate limited,
/// duplicate engagement) are never errors; they are returned as results.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A referenced post, creator, warning or flag does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Infrastructure failure on a fail-closed path.
    #[error("store error: {0}")]
    Store(StoreError),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl EngineError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        EngineError::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Store outage or timeout.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, EngineError::Store(e) if e.is_transient())
    }
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound { entity, id } => EngineError::NotFound { entity, id },
            other => EngineError::Store(other),
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_not_found_maps_to_not_found() {
        let e: EngineError = StoreError::not_found("post", "p1").into();
        assert!(matches!(e, EngineError::NotFound { entity: "post", ref id } if id == "p1"));
        assert!(!e.is_transient());
    }

    #[test]
    fn test_timeout_is_transient() {
        let e: EngineError = StoreError::Timeout {
            op: "get_post",
            timeout_ms: 500,
        }
        .into();
        assert!(e.is_transient());
        assert_eq!(
            e.to_string(),
            "store error: store operation get_post timed out after 500ms"
        );
    }
}
