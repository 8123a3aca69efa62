//! Orchestrator error types.

use braid_workflow::{ExecutionError, GraphError};
use thiserror::Error;

/// Result type alias for orchestrator operations.
pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// Errors returned by the [`Orchestrator`](crate::Orchestrator).
#[derive(Debug, Clone, Error)]
pub enum OrchestratorError {
    #[error("workflow not found: {0}")]
    WorkflowNotFound(String),

    /// The text is not a ULID.
    #[error("invalid workflow id '{id}': {reason}")]
    InvalidWorkflowId { id: String, reason: String },

    /// The workflow is executing; it cannot be started, edited or removed.
    #[error("workflow {0} is already running")]
    AlreadyRunning(String),

    #[error("invalid trigger condition '{pattern}': {reason}")]
    InvalidTrigger { pattern: String, reason: String },

    /// Structural error in the workflow graph.
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// Every attempt failed; `last` is the final attempt's error.
    #[error("workflow {workflow} failed after {attempts} attempt(s): {last}")]
    ExecutionFailed {
        workflow: String,
        attempts: u32,
        #[source]
        last: ExecutionError,
    },

    #[error("context monitoring is already running")]
    MonitoringAlreadyStarted,

    /// The context buffer is full; the update was not accepted.
    #[error("context buffer full ({capacity} pending updates)")]
    ContextBufferFull { capacity: usize },
}

impl OrchestratorError {
    pub fn workflow_not_found(id: impl ToString) -> Self {
        Self::WorkflowNotFound(id.to_string())
    }

    pub fn invalid_workflow_id(id: impl Into<String>, reason: impl ToString) -> Self {
        Self::InvalidWorkflowId {
            id: id.into(),
            reason: reason.to_string(),
        }
    }

    pub fn already_running(id: impl ToString) -> Self {
        Self::AlreadyRunning(id.to_string())
    }

    pub fn invalid_trigger(pattern: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidTrigger {
            pattern: pattern.into(),
            reason: reason.into(),
        }
    }

    /// The last execution error, if this is an exhausted run.
    #[must_use]
    pub const fn execution_error(&self) -> Option<&ExecutionError> {
        match self {
            Self::ExecutionFailed { last, .. } => Some(last),
            _ => None,
        }
    }
}
