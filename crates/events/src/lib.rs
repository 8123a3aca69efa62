//! Collaborator interfaces consumed by the Braid runtime.
//!
//! - **Event emission**: [`EventSink`] accepts `(type, source, payload,
//!   metadata)` events. [`EventBus`] fans them out to subscribers,
//!   [`TracingSink`] writes them to the log.
//! - **State persistence**: [`StateStore`] exposes `get(owner)` /
//!   `update(owner, state)` for checkpointing actor or workflow state.
//!
//! # Example
//!
//! ```ignore
//! use braid_events::{Event, EventBus, EventSink};
//!
//! let bus = EventBus::new();
//! let mut sub = bus.subscribe();
//! bus.emit(Event::new("workflow.started", "wf-1")).await?;
//! let event = sub.recv().await?;
//! ```

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod bus;
pub mod error;
pub mod event;
pub mod sink;
pub mod store;

pub use bus::{EventBus, EventPattern, EventSubscription};
pub use error::{Error, Result};
pub use event::{Event, EventId, types};
pub use sink::{EventSink, NoopSink, TracingSink};
pub use store::{InMemoryStateStore, StateStore, TracingStateStore};
