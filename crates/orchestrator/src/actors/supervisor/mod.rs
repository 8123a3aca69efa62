//! Supervision: restart strategies, restart budgets, tree specs and the
//! supervisor actor itself.

pub mod restart;
pub mod spec;
pub mod strategy;
mod supervisor_actor;

pub use restart::{RestartTracker, RestartVerdict};
pub use spec::{ActorSpec, ChildSpec, SupervisionStrategy, SupervisorConfig, SupervisorSpec};
pub use strategy::{OneForAll, OneForOne, RestForOne, RestartContext, RestartDecision, RestartStrategy};
pub use supervisor_actor::{
    ChildKind, ChildStatus, SupervisorActor, SupervisorArguments, SupervisorMessage,
    SupervisorStatus,
};
