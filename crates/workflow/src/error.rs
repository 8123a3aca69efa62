//! Error types for the graph engine.
//!
//! Structural errors are raised while a graph is being built or compiled and
//! are never retried. Execution errors abort one run; whether to try again is
//! the caller's decision (see [`ExecutionError::is_retryable`]).

use std::time::Duration;

use thiserror::Error;

use crate::node::NodeError;

/// Result type alias for graph construction.
pub type Result<T> = std::result::Result<T, GraphError>;

/// Structural errors from building, compiling, or loading a graph.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    /// A node with this ID was already added.
    #[error("node '{0}' already exists")]
    DuplicateNode(String),

    /// A referenced node does not exist.
    #[error("node '{0}' does not exist")]
    UnknownNode(String),

    /// `compile` was called without an entry point.
    #[error("graph '{0}' has no entry point")]
    MissingEntryPoint(String),

    /// The graph has no nodes.
    #[error("graph '{0}' has no nodes")]
    Empty(String),

    /// The graph was already compiled and can no longer change.
    #[error("graph '{0}' is compiled and immutable")]
    AlreadyCompiled(String),

    /// The graph must be compiled before it can execute.
    #[error("graph '{0}' has not been compiled")]
    NotCompiled(String),

    /// A definition named a node handler nobody registered.
    #[error("no node handler registered as '{handler}' (node '{node}')")]
    UnknownHandler { node: String, handler: String },

    /// A definition named a condition nobody registered.
    #[error("no condition registered as '{0}'")]
    UnknownCondition(String),

    /// A node descriptor could not be turned into a handler.
    #[error("invalid descriptor for node '{node}': {reason}")]
    InvalidDescriptor { node: String, reason: String },

    /// A graph definition document could not be parsed.
    #[error("invalid graph definition: {0}")]
    InvalidDefinition(String),
}

impl GraphError {
    /// Create a duplicate node error.
    pub fn duplicate_node(id: impl Into<String>) -> Self {
        Self::DuplicateNode(id.into())
    }

    /// Create an unknown node error.
    pub fn unknown_node(id: impl Into<String>) -> Self {
        Self::UnknownNode(id.into())
    }

    /// Create an already compiled error.
    pub fn already_compiled(graph: impl Into<String>) -> Self {
        Self::AlreadyCompiled(graph.into())
    }

    /// Create an unknown handler error.
    pub fn unknown_handler(node: impl Into<String>, handler: impl Into<String>) -> Self {
        Self::UnknownHandler {
            node: node.into(),
            handler: handler.into(),
        }
    }

    /// Create an invalid descriptor error.
    pub fn invalid_descriptor(node: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidDescriptor {
            node: node.into(),
            reason: reason.into(),
        }
    }
}

/// Errors that abort a single graph run.
#[derive(Debug, Clone, Error)]
pub enum ExecutionError {
    /// A node function returned an error.
    #[error("node '{node}' failed at step {step}: {source}")]
    NodeFailed {
        node: String,
        step: usize,
        #[source]
        source: NodeError,
    },

    /// The run deadline expired before the run halted.
    #[error("run timed out after {timeout:?} before node '{node}'")]
    Timeout { node: String, timeout: Duration },

    /// The run was cancelled by its caller.
    #[error("run cancelled before node '{node}'")]
    Cancelled { node: String },

    /// The graph was never compiled.
    #[error(transparent)]
    Structural(#[from] GraphError),
}

impl ExecutionError {
    /// Whether a retry policy may try this run again.
    ///
    /// Only node failures are retryable. Timeouts, cancellation and
    /// structural errors are surfaced on the first attempt.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::NodeFailed { .. })
    }

    /// Whether this is a deadline expiry.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}
