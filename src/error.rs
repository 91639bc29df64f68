//! Error types for the strategy and reconciliation engine.

use thiserror::Error;

/// Engine error taxonomy.
///
/// Capacity outcomes (volume cap reached, order below the venue minimum) are
/// not errors; they surface as dropped, shrunk or deleted operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Invalid construction-time configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Malformed numeric value received from a venue.
    #[error("Could not parse {field} '{value}': {reason}")]
    Parse {
        field: &'static str,
        value: String,
        reason: String,
    },

    /// The venue rejected or could not accept a submission.
    #[error("Submission failed: {0}")]
    Submission(String),

    /// Internal state moved in a way the engine refuses to paper over.
    #[error("Invariant violated: {0}")]
    InvariantViolation(String),

    /// Failure reported by an external collaborator (feed, store, venue).
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl EngineError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
