//! Name registry for running actors and supervisors.
//!
//! Ids are unique across the whole runtime, actors and supervisors alike.
//! A restarted actor keeps its id; the registry entry is swapped to the new
//! instance. Removal is guarded by the ractor [`ActorId`] so a late cleanup
//! from a dead instance never evicts its replacement.

use std::collections::HashMap;
use std::sync::Arc;

use braid_events::{Event, EventSink, StateStore};
use itertools::Itertools;
use ractor::{ActorId, ActorRef};
use tokio::sync::RwLock;
use tracing::warn;

use super::messages::ActorMessage;
use super::supervisor::SupervisorMessage;

/// A registered actor.
#[derive(Debug, Clone)]
pub struct ActorEntry {
    pub actor: ActorRef<ActorMessage>,
    /// Id of the owning supervisor.
    pub supervisor: String,
}

/// A registered supervisor.
#[derive(Debug, Clone)]
pub struct SupervisorEntry {
    pub supervisor: ActorRef<SupervisorMessage>,
    /// Id of the parent supervisor; `None` for the root.
    pub parent: Option<String>,
}

#[derive(Debug, Default)]
struct Tables {
    actors: HashMap<String, ActorEntry>,
    supervisors: HashMap<String, SupervisorEntry>,
}

impl Tables {
    fn contains(&self, id: &str) -> bool {
        self.actors.contains_key(id) || self.supervisors.contains_key(id)
    }
}

/// Runtime-wide id lookup.
#[derive(Debug, Default)]
pub struct Registry {
    tables: RwLock<Tables>,
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether any actor or supervisor uses `id`.
    pub async fn contains(&self, id: &str) -> bool {
        self.tables.read().await.contains(id)
    }

    /// Register or replace an actor.
    pub async fn put_actor(&self, id: &str, actor: ActorRef<ActorMessage>, supervisor: &str) {
        self.tables.write().await.actors.insert(
            id.to_string(),
            ActorEntry {
                actor,
                supervisor: supervisor.to_string(),
            },
        );
    }

    /// Register or replace a supervisor.
    pub async fn put_supervisor(
        &self,
        id: &str,
        supervisor: ActorRef<SupervisorMessage>,
        parent: Option<&str>,
    ) {
        self.tables.write().await.supervisors.insert(
            id.to_string(),
            SupervisorEntry {
                supervisor,
                parent: parent.map(str::to_string),
            },
        );
    }

    /// Remove an actor if `instance` is still the registered one.
    pub async fn remove_actor_if(&self, id: &str, instance: ActorId) -> bool {
        let mut tables = self.tables.write().await;
        let current = tables.actors.get(id).map(|e| e.actor.get_id());
        if current == Some(instance) {
            tables.actors.remove(id);
            true
        } else {
            false
        }
    }

    /// Remove a supervisor if `instance` is still the registered one.
    pub async fn remove_supervisor_if(&self, id: &str, instance: ActorId) -> bool {
        let mut tables = self.tables.write().await;
        let current = tables.supervisors.get(id).map(|e| e.supervisor.get_id());
        if current == Some(instance) {
            tables.supervisors.remove(id);
            true
        } else {
            false
        }
    }

    pub async fn actor(&self, id: &str) -> Option<ActorEntry> {
        self.tables.read().await.actors.get(id).cloned()
    }

    pub async fn supervisor(&self, id: &str) -> Option<SupervisorEntry> {
        self.tables.read().await.supervisors.get(id).cloned()
    }

    /// Registered actor ids, sorted.
    pub async fn actor_ids(&self) -> Vec<String> {
        self.tables.read().await.actors.keys().cloned().sorted().collect()
    }

    /// Registered supervisor ids, sorted.
    pub async fn supervisor_ids(&self) -> Vec<String> {
        self.tables.read().await.supervisors.keys().cloned().sorted().collect()
    }
}

/// Collaborators shared by every actor in one runtime.
#[derive(Clone)]
pub struct Services {
    pub registry: Arc<Registry>,
    pub events: Arc<dyn EventSink>,
    pub store: Arc<dyn StateStore>,
}

impl Services {
    pub fn new(events: Arc<dyn EventSink>, store: Arc<dyn StateStore>) -> Self {
        Self {
            registry: Arc::new(Registry::new()),
            events,
            store,
        }
    }

    /// Emit an event, logging instead of failing when the sink refuses it.
    pub async fn emit(&self, event: Event) {
        let event_type = event.event_type.clone();
        if let Err(e) = self.events.emit(event).await {
            warn!(event_type = %event_type, error = %e, "Failed to emit event");
        }
    }
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Services")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}
