//! Error types for the events crate.

use thiserror::Error;

/// Result type alias for event and persistence operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Event and persistence error types.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// Emitting an event failed.
    #[error("failed to emit event '{event_type}': {reason}")]
    EmitFailed { event_type: String, reason: String },

    /// A state store operation failed.
    #[error("state store operation '{operation}' failed for '{owner_id}': {reason}")]
    StoreFailed {
        operation: String,
        owner_id: String,
        reason: String,
    },

    /// Subscription channel closed or lagged past the retained window.
    #[error("subscription channel closed")]
    ChannelClosed,
}

impl Error {
    /// Create an emit failed error.
    pub fn emit_failed(event_type: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::EmitFailed {
            event_type: event_type.into(),
            reason: reason.into(),
        }
    }

    /// Create a store failed error.
    pub fn store_failed(
        operation: impl Into<String>,
        owner_id: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::StoreFailed {
            operation: operation.into(),
            owner_id: owner_id.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::store_failed("update", "actor-1", "disk full");
        assert!(err.to_string().contains("update"));
        assert!(err.to_string().contains("actor-1"));
        assert!(err.to_string().contains("disk full"));
    }
}
