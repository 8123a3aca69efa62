//! Supervised actor runtime.
//!
//! The actor system follows Erlang-inspired patterns:
//! - **Message passing**: actors own their state and only see it through
//!   their mailbox, one message at a time
//! - **Supervision**: every actor lives under a supervisor that restarts
//!   it with a fresh instance when it fails
//! - **Escalation**: a supervisor whose restart budget is spent fails
//!   itself, handing the problem to its parent
//!
//! Actors are ractor actors hosting a [`Behavior`]. Supervisors are ractor
//! actors too; children are spawned linked to them and failures arrive as
//! supervision events.
//!
//! # Example
//!
//! ```ignore
//! use orchestrator::actors::{ActorSpec, ActorSystem, EchoBehavior, SupervisorConfig, SupervisorSpec};
//!
//! let root = SupervisorSpec::new("root", SupervisorConfig::default())
//!     .with_actor(ActorSpec::from_behavior("echo", EchoBehavior));
//! let system = ActorSystem::start(root).await?;
//!
//! let reply = system
//!     .send_and_wait("echo", "ping", json!({"n": 1}), Duration::from_secs(1))
//!     .await?;
//! assert_eq!(reply, json!({"n": 1}));
//!
//! system.shutdown().await;
//! ```

pub mod behavior;
pub mod errors;
pub mod host;
pub mod messages;
pub mod registry;
pub mod supervisor;
pub mod system;

pub use behavior::{ActorContext, Behavior, BehaviorFactory, EchoBehavior, FnBehavior, behavior_fn};
pub use errors::{ActorError, BehaviorError};
pub use messages::{ActorMessage, Message};
pub use registry::Registry;
pub use supervisor::{
    ActorSpec, ChildKind, ChildSpec, ChildStatus, SupervisionStrategy, SupervisorConfig,
    SupervisorSpec, SupervisorStatus,
};
pub use system::ActorSystem;
