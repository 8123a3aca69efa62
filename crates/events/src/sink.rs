//! Event emission sink.

use async_trait::async_trait;

use crate::error::Result;
use crate::event::Event;

/// Destination for observability events.
///
/// Emission is best-effort from the caller's point of view: callers log a
/// failed emit and carry on, they never fail a run or an actor because of it.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Emit an event.
    async fn emit(&self, event: Event) -> Result<()>;
}

/// Sink that discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

#[async_trait]
impl EventSink for NoopSink {
    async fn emit(&self, _event: Event) -> Result<()> {
        Ok(())
    }
}

/// Sink that forwards events to `tracing` at info level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

#[async_trait]
impl EventSink for TracingSink {
    async fn emit(&self, event: Event) -> Result<()> {
        tracing::info!(
            event_id = %event.id,
            event_type = %event.event_type,
            source = %event.source,
            payload = %event.payload,
            metadata = ?event.metadata,
            "event"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_sink_accepts_events() {
        assert!(NoopSink.emit(Event::new("x", "y")).await.is_ok());
    }

    #[tokio::test]
    async fn tracing_sink_accepts_events() {
        assert!(TracingSink.emit(Event::new("x", "y")).await.is_ok());
    }
}
