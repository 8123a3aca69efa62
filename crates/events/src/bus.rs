//! Event bus for pub/sub of runtime events.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use tokio::sync::{RwLock, broadcast};
use tracing::debug;

use crate::error::{Error, Result};
use crate::event::Event;
use crate::sink::EventSink;

/// Default broadcast channel capacity.
const DEFAULT_CAPACITY: usize = 1000;

/// Subscription handle for receiving events.
pub struct EventSubscription {
    receiver: broadcast::Receiver<Event>,
}

impl EventSubscription {
    /// Receive the next event.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ChannelClosed`] once the bus is dropped or the
    /// subscriber fell behind the channel capacity.
    pub async fn recv(&mut self) -> Result<Event> {
        self.receiver.recv().await.map_err(|_| Error::ChannelClosed)
    }

    /// Try to receive an event without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ChannelClosed`] when nothing is ready.
    pub fn try_recv(&mut self) -> Result<Event> {
        self.receiver.try_recv().map_err(|_| Error::ChannelClosed)
    }
}

/// Pattern for filtering events.
#[derive(Debug, Clone)]
pub enum EventPattern {
    /// Match all events.
    All,
    /// Match events by type.
    ByType(String),
    /// Match events by type prefix, e.g. `workflow.`.
    ByPrefix(String),
    /// Match events by source.
    BySource(String),
}

impl EventPattern {
    /// Check if an event matches this pattern.
    #[must_use]
    pub fn matches(&self, event: &Event) -> bool {
        match self {
            Self::All => true,
            Self::ByType(t) => event.event_type == *t,
            Self::ByPrefix(p) => event.event_type.starts_with(p.as_str()),
            Self::BySource(s) => event.source == *s,
        }
    }
}

struct Subscriber {
    sender: broadcast::Sender<Event>,
    pattern: EventPattern,
}

/// In-process event bus.
///
/// Every emitted event is broadcast to global subscribers, to pattern
/// subscribers whose pattern matches, and kept in a bounded history.
pub struct EventBus {
    broadcast: broadcast::Sender<Event>,
    subscribers: RwLock<HashMap<String, Subscriber>>,
    next_id: RwLock<u64>,
    history: RwLock<VecDeque<Event>>,
    history_limit: usize,
}

impl EventBus {
    /// Create a new event bus with default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a new event bus; `capacity` bounds both the broadcast channel
    /// and the retained history.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (broadcast, _) = broadcast::channel(capacity);
        Self {
            broadcast,
            subscribers: RwLock::new(HashMap::new()),
            next_id: RwLock::new(0),
            history: RwLock::new(VecDeque::with_capacity(capacity)),
            history_limit: capacity,
        }
    }

    /// Publish an event.
    pub async fn publish(&self, event: Event) {
        debug!(
            event_id = %event.id,
            event_type = %event.event_type,
            source = %event.source,
            "Publishing event"
        );

        {
            let mut history = self.history.write().await;
            if history.len() >= self.history_limit {
                history.pop_front();
            }
            history.push_back(event.clone());
        }

        // No receivers is not an error
        let _ = self.broadcast.send(event.clone());

        let subscribers = self.subscribers.read().await;
        for sub in subscribers.values().filter(|s| s.pattern.matches(&event)) {
            let _ = sub.sender.send(event.clone());
        }
    }

    /// Subscribe to all events.
    #[must_use]
    pub fn subscribe(&self) -> EventSubscription {
        EventSubscription {
            receiver: self.broadcast.subscribe(),
        }
    }

    /// Subscribe to events matching a pattern.
    pub async fn subscribe_with_pattern(
        &self,
        pattern: EventPattern,
    ) -> (String, EventSubscription) {
        let (sender, receiver) = broadcast::channel(self.history_limit);

        let mut next_id = self.next_id.write().await;
        let id = format!("sub_{}", *next_id);
        *next_id = next_id.saturating_add(1);

        self.subscribers
            .write()
            .await
            .insert(id.clone(), Subscriber { sender, pattern });

        (id, EventSubscription { receiver })
    }

    /// Unsubscribe a pattern-based subscriber.
    pub async fn unsubscribe(&self, subscriber_id: &str) {
        self.subscribers.write().await.remove(subscriber_id);
    }

    /// Retained events matching a pattern, oldest first.
    pub async fn history(&self, pattern: &EventPattern) -> Vec<Event> {
        self.history
            .read()
            .await
            .iter()
            .filter(|e| pattern.matches(e))
            .cloned()
            .collect()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventSink for EventBus {
    async fn emit(&self, event: Event) -> Result<()> {
        self.publish(event).await;
        Ok(())
    }
}
