//! State persistence service: `get(owner) -> state`, `update(owner, state)`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use braid_core::State;
use tokio::sync::RwLock;

use crate::error::Result;

/// Checkpoint store for actor and workflow state kept outside the process.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Load the last state stored for an owner.
    async fn get(&self, owner_id: &str) -> Result<Option<State>>;

    /// Replace the stored state for an owner.
    async fn update(&self, owner_id: &str, state: State) -> Result<()>;
}

/// In-memory state store.
#[derive(Default)]
pub struct InMemoryStateStore {
    states: RwLock<HashMap<String, State>>,
}

impl InMemoryStateStore {
    /// Create a new in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new in-memory store wrapped in an Arc.
    #[must_use]
    pub fn new_arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Number of owners with stored state.
    pub async fn len(&self) -> usize {
        self.states.read().await.len()
    }

    /// Whether nothing has been stored.
    pub async fn is_empty(&self) -> bool {
        self.states.read().await.is_empty()
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn get(&self, owner_id: &str) -> Result<Option<State>> {
        Ok(self.states.read().await.get(owner_id).cloned())
    }

    async fn update(&self, owner_id: &str, state: State) -> Result<()> {
        self.states.write().await.insert(owner_id.to_string(), state);
        Ok(())
    }
}

/// State store wrapper that traces every operation.
pub struct TracingStateStore<S: StateStore> {
    inner: S,
}

impl<S: StateStore> TracingStateStore<S> {
    /// Wrap a store.
    pub const fn new(inner: S) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<S: StateStore> StateStore for TracingStateStore<S> {
    async fn get(&self, owner_id: &str) -> Result<Option<State>> {
        tracing::debug!(owner_id, "Loading state");
        self.inner.get(owner_id).await
    }

    async fn update(&self, owner_id: &str, state: State) -> Result<()> {
        tracing::debug!(owner_id, fields = state.len(), "Storing state");
        let result = self.inner.update(owner_id, state).await;
        if let Err(e) = &result {
            tracing::warn!(owner_id, error = %e, "State update failed");
        }
        result
    }
}
