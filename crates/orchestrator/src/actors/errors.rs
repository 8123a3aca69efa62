//! Actor-specific error types.
//!
//! `ActorError` is what callers of the runtime see: lookups, spawns, asks.
//! `BehaviorError` is what a behavior returns when it cannot handle a
//! message; the hosting actor then fails and its supervisor takes over.

use std::time::Duration;
use thiserror::Error;

/// Errors returned to callers of the actor runtime.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActorError {
    /// An actor or supervisor with this id already exists.
    #[error("Actor already exists: {0}")]
    DuplicateActor(String),

    /// No actor is registered under this id.
    #[error("Actor not found: {0}")]
    ActorNotFound(String),

    /// No supervisor is registered under this id.
    #[error("Supervisor not found: {0}")]
    SupervisorNotFound(String),

    /// The ask deadline passed before a reply arrived.
    #[error("Ask timed out after {0:?}")]
    Timeout(Duration),

    /// The actor went away while handling an ask.
    #[error("Actor {0} dropped the reply")]
    NoReply(String),

    /// The actor is not available (stopped or not started).
    #[error("Actor not available: {0}")]
    ActorUnavailable(String),

    /// Failed to spawn an actor or supervisor.
    #[error("Spawn failed: {0}")]
    SpawnFailed(String),

    /// The behavior failed while handling the message.
    #[error("Behavior of {actor} failed: {reason}")]
    BehaviorFailed { actor: String, reason: String },

    /// The runtime has shut down.
    #[error("Actor system is shut down")]
    Shutdown,
}

impl ActorError {
    /// Create a duplicate actor error.
    pub fn duplicate_actor(id: impl Into<String>) -> Self {
        Self::DuplicateActor(id.into())
    }

    /// Create an actor not found error.
    pub fn actor_not_found(id: impl Into<String>) -> Self {
        Self::ActorNotFound(id.into())
    }

    /// Create a supervisor not found error.
    pub fn supervisor_not_found(id: impl Into<String>) -> Self {
        Self::SupervisorNotFound(id.into())
    }

    /// Create an ask timeout error.
    #[must_use]
    pub const fn timeout(duration: Duration) -> Self {
        Self::Timeout(duration)
    }

    /// Create an actor unavailable error.
    pub fn actor_unavailable(id: impl Into<String>) -> Self {
        Self::ActorUnavailable(id.into())
    }

    /// Create a spawn failure.
    pub fn spawn_failed(reason: impl Into<String>) -> Self {
        Self::SpawnFailed(reason.into())
    }

    /// Create a behavior failure.
    pub fn behavior_failed(actor: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::BehaviorFailed {
            actor: actor.into(),
            reason: reason.into(),
        }
    }

    /// Whether this is an ask deadline expiry.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

/// Errors raised by a behavior. Returning one crashes the actor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BehaviorError {
    /// The behavior does not understand this message type.
    #[error("unknown message type '{0}'")]
    UnknownMessage(String),

    /// The payload or actor state has the wrong shape.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Any other failure.
    #[error("{0}")]
    Failed(String),
}

impl BehaviorError {
    /// Create an unknown message error.
    pub fn unknown_message(message_type: impl Into<String>) -> Self {
        Self::UnknownMessage(message_type.into())
    }

    /// Create a generic failure.
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed(reason.into())
    }
}

impl From<braid_core::Error> for BehaviorError {
    fn from(e: braid_core::Error) -> Self {
        Self::InvalidData(e.to_string())
    }
}

impl From<serde_json::Error> for BehaviorError {
    fn from(e: serde_json::Error) -> Self {
        Self::InvalidData(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_create_actor_not_found_error() {
        let err = ActorError::actor_not_found("worker-1");
        assert!(matches!(err, ActorError::ActorNotFound(_)));
        assert!(err.to_string().contains("worker-1"));
    }

    #[test]
    fn should_create_timeout_error() {
        let err = ActorError::timeout(Duration::from_secs(5));
        assert!(err.is_timeout());
        assert!(err.to_string().contains("5s"));
    }

    #[test]
    fn should_name_actor_in_behavior_failure() {
        let err = ActorError::behavior_failed("counter", "overflow");
        assert!(err.to_string().contains("counter"));
        assert!(err.to_string().contains("overflow"));
    }

    #[test]
    fn should_convert_state_errors_into_invalid_data() {
        let err: BehaviorError = braid_core::Error::state_type("n", "i64", "string").into();
        assert!(matches!(err, BehaviorError::InvalidData(_)));
    }
}
