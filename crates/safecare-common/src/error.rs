//! Error types for the entitlement engine

use thiserror::Error;

/// Entitlement engine error type
///
/// The first three variants are configuration or caller programming errors:
/// they are never retried and never silently defaulted. `PersistenceUnavailable`
/// is a retryable infrastructure failure; the engine guarantees no visible
/// state change was applied when it is returned.
#[derive(Error, Debug, Clone)]
pub enum EngineError {
    /// Tier id is not part of the plan catalog
    #[error("unknown tier: {0}")]
    UnknownTier(String),

    /// Feature key is not part of the closed feature-key set
    #[error("unknown feature key: {0}")]
    UnknownFeatureKey(String),

    /// Resource kind is not part of the closed countable-resource set
    #[error("unknown resource kind: {0}")]
    UnknownResourceKind(String),

    /// The durable medium rejected a write; prior state is left intact
    #[error("persistence unavailable: {0}")]
    PersistenceUnavailable(String),
}

/// Result type for the entitlement engine
pub type EngineResult<T> = Result<T, EngineError>;
