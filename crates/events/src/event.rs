//! Observability events emitted by the runtime and the orchestrator.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use ulid::Ulid;

/// Unique identifier for an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(Ulid);

impl EventId {
    /// Create a new random event ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Well-known event type names.
pub mod types {
    pub const WORKFLOW_CREATED: &str = "workflow.created";
    pub const WORKFLOW_STARTED: &str = "workflow.started";
    pub const WORKFLOW_RETRYING: &str = "workflow.retrying";
    pub const WORKFLOW_COMPLETED: &str = "workflow.completed";
    pub const WORKFLOW_FAILED: &str = "workflow.failed";
    pub const WORKFLOW_TRIGGERED: &str = "workflow.triggered";
    pub const ACTOR_SPAWNED: &str = "actor.spawned";
    pub const ACTOR_RESTARTED: &str = "actor.restarted";
    pub const ACTOR_STOPPED: &str = "actor.stopped";
    pub const SUPERVISOR_ESCALATED: &str = "supervisor.escalated";
}

/// An event as accepted by an [`EventSink`](crate::EventSink):
/// `(type, source, payload, metadata)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Unique event ID.
    pub id: EventId,
    /// Event type, e.g. `workflow.completed`.
    pub event_type: String,
    /// Emitting component, e.g. a workflow or supervisor ID.
    pub source: String,
    /// Event payload.
    pub payload: Value,
    /// Free-form string metadata.
    pub metadata: BTreeMap<String, String>,
    /// Emission time.
    pub timestamp: DateTime<Utc>,
}

impl Event {
    /// Create a new event with an empty payload.
    pub fn new(event_type: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            id: EventId::new(),
            event_type: event_type.into(),
            source: source.into(),
            payload: Value::Null,
            metadata: BTreeMap::new(),
            timestamp: Utc::now(),
        }
    }

    /// Set the payload.
    #[must_use]
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    /// Add a metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}
