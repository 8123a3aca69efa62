//! # Orchestrator
//!
//! Supervised actor runtime and context-triggered workflow execution for
//! Braid.
//!
//! - [`actors`]: actors with private state and FIFO mailboxes, organised
//!   into supervision trees (`one_for_one`, `one_for_all`, `rest_for_one`)
//! - [`Orchestrator`]: owns workflows, runs them with retry, timeout and
//!   iteration limits, and starts them when observed context matches their
//!   trigger conditions
//! - [`ActorNode`]: a graph node that asks an actor to do its work

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::panic)]
#![deny(clippy::expect_used)]

pub mod actors;
pub mod dispatch;
pub mod error;
pub mod monitor;
pub mod trigger;
pub mod workflow;

pub use dispatch::{ActorNode, DEFAULT_ASK_TIMEOUT};
pub use error::{OrchestratorError, Result};
pub use monitor::{MonitorStats, Orchestrator, OrchestratorConfig};
pub use trigger::{ContextUpdate, TriggerCondition, TriggerType};
pub use workflow::{RunSummary, WorkflowConfig, WorkflowId, WorkflowSnapshot, WorkflowStatus};
