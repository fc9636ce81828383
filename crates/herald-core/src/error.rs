//! Herald error taxonomy.
//!
//! Validation errors surface to the caller at scheduling time; delivery
//! errors are recovered by release-and-retry and never escalate past the
//! dispatcher; store errors indicate a broken persistence layer.

use thiserror::Error;

/// All errors produced by Herald crates.
#[derive(Debug, Error)]
pub enum HeraldError {
    /// Malformed event rejected at scheduling time. No partial state written.
    #[error("invalid event: {0}")]
    Validation(String),

    /// Persistence layer failure (open, migrate, query).
    #[error("store error: {0}")]
    Store(String),

    /// Outbound delivery failure (network, non-2xx, timeout). Retryable.
    #[error("delivery failed: {0}")]
    Delivery(String),

    /// Configuration load/parse/save failure.
    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, HeraldError>;
