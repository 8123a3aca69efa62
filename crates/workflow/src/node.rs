//! Node handler trait and implementations.
//!
//! A node is a function from the current [`State`] to a [`StateUpdate`].
//! Everything a node needs beyond the state arrives explicitly, either
//! captured at construction (e.g. an actor system handle) or through the
//! per-invocation [`NodeContext`], so any node can be run in isolation.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use braid_core::State;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use ulid::Ulid;

/// Node identifier.
pub type NodeId = String;

/// Error returned by a node function.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NodeError {
    /// Generic failure raised by node logic.
    #[error("{0}")]
    Failed(String),

    /// A required state field is missing or has the wrong shape.
    #[error("invalid state field '{key}': {reason}")]
    InvalidState { key: String, reason: String },

    /// Dispatching work outside the node (e.g. to an actor) failed.
    #[error("dispatch failed: {0}")]
    Dispatch(String),
}

impl NodeError {
    /// Create a generic failure.
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed(reason.into())
    }

    /// Create an invalid state error.
    pub fn invalid_state(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidState {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Create a dispatch error.
    pub fn dispatch(reason: impl Into<String>) -> Self {
        Self::Dispatch(reason.into())
    }
}

impl From<braid_core::Error> for NodeError {
    fn from(e: braid_core::Error) -> Self {
        match e {
            braid_core::Error::StateType { key, reason, .. } => Self::InvalidState { key, reason },
            other => Self::Failed(other.to_string()),
        }
    }
}

/// What a node does to the state it was given.
#[derive(Debug, Clone, PartialEq)]
pub enum StateUpdate {
    /// Keep the state as it is.
    Unchanged,
    /// Replace the whole state.
    Replace(State),
    /// Merge these fields into the state; new values win.
    Merge(State),
}

impl StateUpdate {
    /// Apply the update to `current`.
    #[must_use]
    pub fn apply(self, mut current: State) -> State {
        match self {
            Self::Unchanged => current,
            Self::Replace(next) => next,
            Self::Merge(fields) => {
                current.merge(fields);
                current
            }
        }
    }
}

/// Unique identifier for one graph run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(Ulid);

impl RunId {
    /// Create a new random run ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-invocation context handed to a node.
#[derive(Debug, Clone)]
pub struct NodeContext {
    /// The run this invocation belongs to.
    pub run_id: RunId,
    /// The graph being executed.
    pub graph_id: String,
    /// The node being invoked.
    pub node_id: NodeId,
    /// Transitions taken so far in this run.
    pub step: usize,
    /// Cancellation signal of the run.
    pub cancel: CancellationToken,
}

impl NodeContext {
    /// Create a context for invoking a node outside of a run, e.g. in tests.
    pub fn detached(node_id: impl Into<NodeId>) -> Self {
        Self {
            run_id: RunId::new(),
            graph_id: String::new(),
            node_id: node_id.into(),
            step: 0,
            cancel: CancellationToken::new(),
        }
    }
}

/// Descriptive metadata attached to a node; never read by the engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeMetadata {
    /// Optional description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Free-form attributes for tooling.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, Value>,
}

impl NodeMetadata {
    /// Metadata with a description.
    pub fn described(description: impl Into<String>) -> Self {
        Self {
            description: Some(description.into()),
            attributes: BTreeMap::new(),
        }
    }

    /// Add an attribute.
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }
}

/// Trait for node functions.
///
/// The state is borrowed immutably; a node describes its effect by
/// returning a [`StateUpdate`] rather than mutating shared data.
#[async_trait]
pub trait NodeHandler: Send + Sync {
    /// Run the node against the current state.
    async fn run(&self, state: &State, ctx: &NodeContext) -> Result<StateUpdate, NodeError>;
}

/// A node backed by a synchronous closure.
pub struct FnNode<F>
where
    F: Fn(&State) -> Result<StateUpdate, NodeError> + Send + Sync,
{
    func: F,
}

impl<F> FnNode<F>
where
    F: Fn(&State) -> Result<StateUpdate, NodeError> + Send + Sync,
{
    /// Create a new function node.
    pub const fn new(func: F) -> Self {
        Self { func }
    }
}

#[async_trait]
impl<F> NodeHandler for FnNode<F>
where
    F: Fn(&State) -> Result<StateUpdate, NodeError> + Send + Sync,
{
    async fn run(&self, state: &State, _ctx: &NodeContext) -> Result<StateUpdate, NodeError> {
        (self.func)(state)
    }
}

/// A node backed by an async function.
pub struct AsyncFnNode<F, Fut>
where
    F: Fn(State, NodeContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<StateUpdate, NodeError>> + Send,
{
    func: F,
}

impl<F, Fut> AsyncFnNode<F, Fut>
where
    F: Fn(State, NodeContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<StateUpdate, NodeError>> + Send,
{
    /// Create a new async function node.
    pub const fn new(func: F) -> Self {
        Self { func }
    }
}

#[async_trait]
impl<F, Fut> NodeHandler for AsyncFnNode<F, Fut>
where
    F: Fn(State, NodeContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<StateUpdate, NodeError>> + Send,
{
    async fn run(&self, state: &State, ctx: &NodeContext) -> Result<StateUpdate, NodeError> {
        (self.func)(state.clone(), ctx.clone()).await
    }
}

/// Wrap a synchronous closure as a shareable node handler.
pub fn node_fn<F>(func: F) -> Arc<dyn NodeHandler>
where
    F: Fn(&State) -> Result<StateUpdate, NodeError> + Send + Sync + 'static,
{
    Arc::new(FnNode::new(func))
}

/// Wrap an async function as a shareable node handler.
pub fn async_node_fn<F, Fut>(func: F) -> Arc<dyn NodeHandler>
where
    F: Fn(State, NodeContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<StateUpdate, NodeError>> + Send + 'static,
{
    Arc::new(AsyncFnNode::new(func))
}

/// A node that leaves the state untouched.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpNode;

#[async_trait]
impl NodeHandler for NoOpNode {
    async fn run(&self, _state: &State, _ctx: &NodeContext) -> Result<StateUpdate, NodeError> {
        Ok(StateUpdate::Unchanged)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn should_apply_each_update_kind() {
        let base = State::new().with("a", 1).with("b", 2);

        assert_eq!(StateUpdate::Unchanged.apply(base.clone()), base);

        let replaced = StateUpdate::Replace(State::new().with("z", 9)).apply(base.clone());
        assert!(!replaced.contains_key("a"));
        assert!(replaced.contains_key("z"));

        let merged = StateUpdate::Merge(State::new().with("b", 20)).apply(base);
        assert_eq!(merged.get_as::<i64>("a").unwrap(), Some(1));
        assert_eq!(merged.get_as::<i64>("b").unwrap(), Some(20));
    }

    #[tokio::test]
    async fn test_fn_node() {
        let node = node_fn(|state| {
            let n = state.get_as::<i64>("n")?.unwrap_or(0);
            Ok(StateUpdate::Merge(State::new().with("n", n + 1)))
        });

        let out = node
            .run(&State::new().with("n", 41), &NodeContext::detached("inc"))
            .await
            .unwrap();
        assert_eq!(out, StateUpdate::Merge(State::new().with("n", 42)));
    }

    #[tokio::test]
    async fn test_fn_node_surfaces_state_type_errors() {
        let node = node_fn(|state| {
            let _n = state.get_as::<i64>("n")?;
            Ok(StateUpdate::Unchanged)
        });

        let err = node
            .run(&State::new().with("n", "nope"), &NodeContext::detached("inc"))
            .await
            .unwrap_err();
        assert!(matches!(err, NodeError::InvalidState { ref key, .. } if key == "n"));
    }

    #[tokio::test]
    async fn test_async_fn_node_sees_context() {
        let node = async_node_fn(|_state, ctx| async move {
            Ok::<_, NodeError>(StateUpdate::Merge(State::new().with("visited", ctx.node_id)))
        });

        let out = node
            .run(&State::new(), &NodeContext::detached("probe"))
            .await
            .unwrap();
        assert_eq!(
            out,
            StateUpdate::Merge(State::new().with("visited", "probe"))
        );
    }

    #[tokio::test]
    async fn test_noop_node() {
        let out = NoOpNode
            .run(&State::new(), &NodeContext::detached("noop"))
            .await
            .unwrap();
        assert_eq!(out, StateUpdate::Unchanged);
    }
}
