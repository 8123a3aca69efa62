//! Supervision tree specifications.
//!
//! A tree is declared bottom-up: actor specs first, then the supervisors
//! that own them, then their parents. The running tree is started from the
//! root [`SupervisorSpec`].
//!
//! ```
//! use orchestrator::actors::{ActorSpec, EchoBehavior, SupervisorConfig, SupervisorSpec};
//! use orchestrator::actors::supervisor::SupervisionStrategy;
//!
//! let workers = SupervisorSpec::new("workers", SupervisorConfig::default())
//!     .with_actor(ActorSpec::from_behavior("echo-1", EchoBehavior))
//!     .with_actor(ActorSpec::from_behavior("echo-2", EchoBehavior));
//!
//! let root = SupervisorSpec::new(
//!     "root",
//!     SupervisorConfig::default().with_strategy(SupervisionStrategy::OneForAll),
//! )
//! .with_supervisor(workers);
//!
//! assert_eq!(root.child_ids(), vec!["workers".to_string()]);
//! ```

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use braid_core::State;
use serde::{Deserialize, Serialize};

use super::strategy::{OneForAll, OneForOne, RestForOne, RestartStrategy};
use crate::actors::behavior::{Behavior, BehaviorFactory};

/// Restart strategy selector used in configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SupervisionStrategy {
    #[default]
    OneForOne,
    OneForAll,
    RestForOne,
}

impl SupervisionStrategy {
    /// Build the strategy implementation.
    #[must_use]
    pub fn build(self) -> Box<dyn RestartStrategy> {
        match self {
            Self::OneForOne => Box::new(OneForOne::new()),
            Self::OneForAll => Box::new(OneForAll::new()),
            Self::RestForOne => Box::new(RestForOne::new()),
        }
    }
}

/// Configuration for one supervisor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    pub strategy: SupervisionStrategy,
    /// Restarts allowed per child inside one window.
    pub max_restarts: u32,
    /// Length of the restart window.
    #[serde(with = "braid_core::duration::millis")]
    pub within: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            strategy: SupervisionStrategy::OneForOne,
            max_restarts: 3,
            within: Duration::from_secs(60),
        }
    }
}

impl SupervisorConfig {
    #[must_use]
    pub const fn with_strategy(mut self, strategy: SupervisionStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    #[must_use]
    pub const fn with_max_restarts(mut self, max_restarts: u32, within: Duration) -> Self {
        self.max_restarts = max_restarts;
        self.within = within;
        self
    }
}

/// How to (re)start one actor.
#[derive(Clone)]
pub struct ActorSpec {
    pub id: String,
    pub behavior: BehaviorFactory,
    /// State a fresh instance starts with.
    pub initial_state: State,
    /// Persist state through the runtime's store after every message and
    /// restore it on restart.
    pub checkpoint: bool,
}

impl ActorSpec {
    /// Spec with a behavior factory.
    pub fn new(id: impl Into<String>, behavior: BehaviorFactory) -> Self {
        Self {
            id: id.into(),
            behavior,
            initial_state: State::new(),
            checkpoint: false,
        }
    }

    /// Spec from a cloneable behavior value.
    pub fn from_behavior<B>(id: impl Into<String>, behavior: B) -> Self
    where
        B: Behavior + Clone + 'static,
    {
        Self::new(
            id,
            Arc::new(move || Box::new(behavior.clone()) as Box<dyn Behavior>),
        )
    }

    #[must_use]
    pub fn with_state(mut self, state: State) -> Self {
        self.initial_state = state;
        self
    }

    #[must_use]
    pub const fn with_checkpoint(mut self) -> Self {
        self.checkpoint = true;
        self
    }
}

impl std::fmt::Debug for ActorSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActorSpec")
            .field("id", &self.id)
            .field("initial_state", &self.initial_state)
            .field("checkpoint", &self.checkpoint)
            .finish_non_exhaustive()
    }
}

/// A child of a supervisor.
#[derive(Debug, Clone)]
pub enum ChildSpec {
    Actor(ActorSpec),
    Supervisor(SupervisorSpec),
}

impl ChildSpec {
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Actor(spec) => &spec.id,
            Self::Supervisor(spec) => &spec.id,
        }
    }
}

/// How to (re)start one supervisor and its children.
///
/// Clones share the child list, so children added to a running supervisor
/// are part of its spec when its parent restarts it.
#[derive(Debug, Clone)]
pub struct SupervisorSpec {
    pub id: String,
    pub config: SupervisorConfig,
    children: Arc<Mutex<Vec<ChildSpec>>>,
}

impl SupervisorSpec {
    pub fn new(id: impl Into<String>, config: SupervisorConfig) -> Self {
        Self {
            id: id.into(),
            config,
            children: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<ChildSpec>> {
        self.children
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Add an actor child.
    #[must_use]
    pub fn with_actor(self, spec: ActorSpec) -> Self {
        self.push_child(ChildSpec::Actor(spec));
        self
    }

    /// Add a supervisor child.
    #[must_use]
    pub fn with_supervisor(self, spec: Self) -> Self {
        self.push_child(ChildSpec::Supervisor(spec));
        self
    }

    /// Snapshot of the children in spawn order.
    #[must_use]
    pub fn children(&self) -> Vec<ChildSpec> {
        self.lock().clone()
    }

    /// Child ids in spawn order.
    #[must_use]
    pub fn child_ids(&self) -> Vec<String> {
        self.lock().iter().map(|c| c.id().to_string()).collect()
    }

    pub(crate) fn push_child(&self, child: ChildSpec) {
        self.lock().push(child);
    }

    pub(crate) fn remove_child(&self, id: &str) -> Option<ChildSpec> {
        let mut children = self.lock();
        let index = children.iter().position(|c| c.id() == id)?;
        Some(children.remove(index))
    }
}
