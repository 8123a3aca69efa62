//! Supervisor actor.
//!
//! Children are spawned linked to the supervisor, so ractor delivers their
//! failures as supervision events. On a failure the per-child
//! [`RestartTracker`] decides whether the restart budget allows another
//! attempt and the configured [`RestartStrategy`] picks which children to
//! restart. Restarts are immediate and use fresh instances built from each
//! child's spec; the dead instance's mailbox is dropped.
//!
//! When the budget is spent the supervisor stops all children and fails
//! itself, which hands the problem to its own supervisor. A failing root
//! terminates the tree.

use braid_events::{Event, types};
use ractor::{Actor, ActorCell, ActorId, ActorProcessingErr, ActorRef, RpcReplyPort, SupervisionEvent};
use serde::Serialize;
use serde_json::json;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::restart::{RestartTracker, RestartVerdict};
use super::spec::{ActorSpec, ChildSpec, SupervisorSpec};
use super::strategy::{RestartContext, RestartDecision, RestartStrategy};
use crate::actors::errors::ActorError;
use crate::actors::host::{BehaviorActor, HostArguments};
use crate::actors::registry::Services;

/// Messages for supervisor communication.
pub enum SupervisorMessage {
    /// Spawn and supervise a new actor.
    SpawnActor {
        spec: ActorSpec,
        reply: RpcReplyPort<Result<(), ActorError>>,
    },
    /// Spawn and supervise a nested supervisor.
    SpawnSupervisor {
        spec: SupervisorSpec,
        reply: RpcReplyPort<Result<(), ActorError>>,
    },
    /// Stop a child and forget it.
    StopChild {
        id: String,
        reply: RpcReplyPort<Result<(), ActorError>>,
    },
    /// Request supervisor status.
    GetStatus { reply: RpcReplyPort<SupervisorStatus> },
}

impl std::fmt::Debug for SupervisorMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SpawnActor { spec, .. } => f
                .debug_struct("SpawnActor")
                .field("id", &spec.id)
                .finish_non_exhaustive(),
            Self::SpawnSupervisor { spec, .. } => f
                .debug_struct("SpawnSupervisor")
                .field("id", &spec.id)
                .finish_non_exhaustive(),
            Self::StopChild { id, .. } => f
                .debug_struct("StopChild")
                .field("id", id)
                .finish_non_exhaustive(),
            Self::GetStatus { .. } => f.debug_struct("GetStatus").finish_non_exhaustive(),
        }
    }
}

/// Kind of a supervised child.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChildKind {
    Actor,
    Supervisor,
}

/// Status of one child.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChildStatus {
    pub id: String,
    pub kind: ChildKind,
    /// Restarts counted in the current window.
    pub restarts_in_window: u32,
    /// Restarts since the child was first spawned.
    pub total_restarts: u64,
}

/// Status response from supervisor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SupervisorStatus {
    pub id: String,
    pub strategy: &'static str,
    /// Children in spawn order.
    pub children: Vec<ChildStatus>,
    /// Restarts performed by this supervisor, counting every restarted
    /// sibling.
    pub total_restarts: u64,
}

/// Information about a supervised child.
struct ChildEntry {
    spec: ChildSpec,
    cell: ActorCell,
    tracker: RestartTracker,
}

impl ChildEntry {
    fn instance(&self) -> ActorId {
        self.cell.get_id()
    }

    fn status(&self, now: Instant) -> ChildStatus {
        ChildStatus {
            id: self.spec.id().to_string(),
            kind: match self.spec {
                ChildSpec::Actor(_) => ChildKind::Actor,
                ChildSpec::Supervisor(_) => ChildKind::Supervisor,
            },
            restarts_in_window: self.tracker.restarts_in_window(now),
            total_restarts: self.tracker.total_restarts(),
        }
    }
}

/// Definition for the supervisor actor.
#[derive(Debug, Clone, Copy, Default)]
pub struct SupervisorActor;

/// Arguments for the supervisor actor.
#[derive(Debug, Clone)]
pub struct SupervisorArguments {
    pub spec: SupervisorSpec,
    /// Id of the parent supervisor; `None` for the root.
    pub parent: Option<String>,
    pub services: Services,
}

/// State for the supervisor actor.
pub struct SupervisorActorState {
    spec: SupervisorSpec,
    parent: Option<String>,
    services: Services,
    strategy: Box<dyn RestartStrategy>,
    children: Vec<ChildEntry>,
    total_restarts: u64,
}

impl SupervisorActorState {
    fn id(&self) -> &str {
        &self.spec.id
    }

    fn position_of_instance(&self, instance: ActorId) -> Option<usize> {
        self.children.iter().position(|c| c.instance() == instance)
    }

    fn position_of(&self, id: &str) -> Option<usize> {
        self.children.iter().position(|c| c.spec.id() == id)
    }

    fn child_ids(&self) -> Vec<String> {
        self.children
            .iter()
            .map(|c| c.spec.id().to_string())
            .collect()
    }

    fn tracker(&self) -> RestartTracker {
        RestartTracker::new(self.spec.config.max_restarts, self.spec.config.within)
    }

    fn status(&self) -> SupervisorStatus {
        let now = Instant::now();
        SupervisorStatus {
            id: self.spec.id.clone(),
            strategy: self.strategy.name(),
            children: self.children.iter().map(|c| c.status(now)).collect(),
            total_restarts: self.total_restarts,
        }
    }
}

impl std::fmt::Debug for SupervisorActorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupervisorActorState")
            .field("id", &self.spec.id)
            .field("parent", &self.parent)
            .field("children", &self.child_ids())
            .field("total_restarts", &self.total_restarts)
            .field("restart_strategy", &self.strategy.name())
            .finish_non_exhaustive()
    }
}

impl Actor for SupervisorActor {
    type Msg = SupervisorMessage;
    type State = SupervisorActorState;
    type Arguments = SupervisorArguments;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        let SupervisorArguments {
            spec,
            parent,
            services,
        } = args;

        info!(
            supervisor = %spec.id,
            strategy = ?spec.config.strategy,
            "Supervisor starting"
        );

        services
            .registry
            .put_supervisor(&spec.id, myself.clone(), parent.as_deref())
            .await;

        let mut state = SupervisorActorState {
            strategy: spec.config.strategy.build(),
            spec,
            parent,
            services,
            children: Vec::new(),
            total_restarts: 0,
        };

        for child in state.spec.children() {
            match Self::spawn_child(&myself, &state, &child).await {
                Ok(cell) => {
                    let tracker = state.tracker();
                    state.children.push(ChildEntry {
                        spec: child,
                        cell,
                        tracker,
                    });
                }
                Err(e) => {
                    error!(supervisor = %state.id(), child = %child.id(), error = %e, "Initial spawn failed");
                    Self::stop_children(&mut state).await;
                    state
                        .services
                        .registry
                        .remove_supervisor_if(&state.spec.id, myself.get_id())
                        .await;
                    return Err(Box::new(e));
                }
            }
        }

        Ok(state)
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            SupervisorMessage::SpawnActor { spec, reply } => {
                let result = Self::add_child(&myself, state, ChildSpec::Actor(spec)).await;
                let _ = reply.send(result);
            }

            SupervisorMessage::SpawnSupervisor { spec, reply } => {
                let result = Self::add_child(&myself, state, ChildSpec::Supervisor(spec)).await;
                let _ = reply.send(result);
            }

            SupervisorMessage::StopChild { id, reply } => {
                let result = Self::stop_child(state, &id).await;
                let _ = reply.send(result);
            }

            SupervisorMessage::GetStatus { reply } => {
                let _ = reply.send(state.status());
            }
        }

        Ok(())
    }

    async fn handle_supervisor_evt(
        &self,
        myself: ActorRef<Self::Msg>,
        event: SupervisionEvent,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match event {
            SupervisionEvent::ActorFailed(cell, reason) => {
                Self::on_child_failed(&myself, state, cell.get_id(), reason.to_string()).await
            }
            SupervisionEvent::ActorTerminated(cell, _, reason) => {
                Self::on_child_terminated(state, cell.get_id(), reason).await;
                Ok(())
            }
            _ => Ok(()),
        }
    }

    async fn post_stop(
        &self,
        myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        Self::stop_children(state).await;
        state
            .services
            .registry
            .remove_supervisor_if(&state.spec.id, myself.get_id())
            .await;
        info!(
            supervisor = %state.id(),
            total_restarts = state.total_restarts,
            "Supervisor stopped"
        );
        Ok(())
    }
}

impl SupervisorActor {
    /// Spawn one child linked to `myself` and register it.
    async fn spawn_child(
        myself: &ActorRef<SupervisorMessage>,
        state: &SupervisorActorState,
        child: &ChildSpec,
    ) -> Result<ActorCell, ActorError> {
        match child {
            ChildSpec::Actor(spec) => {
                let (actor, _handle) = Actor::spawn_linked(
                    None,
                    BehaviorActor,
                    HostArguments {
                        spec: spec.clone(),
                        services: state.services.clone(),
                    },
                    myself.get_cell(),
                )
                .await
                .map_err(|e| {
                    ActorError::spawn_failed(format!("actor '{}': {e}", spec.id))
                })?;
                state
                    .services
                    .registry
                    .put_actor(&spec.id, actor.clone(), state.id())
                    .await;
                Ok(actor.get_cell())
            }
            ChildSpec::Supervisor(spec) => {
                // The child registers itself in `pre_start`. Boxed because
                // a supervisor's `pre_start` spawns its own children.
                let (supervisor, _handle) = Box::pin(Actor::spawn_linked(
                    None,
                    Self,
                    SupervisorArguments {
                        spec: spec.clone(),
                        parent: Some(state.spec.id.clone()),
                        services: state.services.clone(),
                    },
                    myself.get_cell(),
                ))
                .await
                .map_err(|e| {
                    ActorError::spawn_failed(format!("supervisor '{}': {e}", spec.id))
                })?;
                Ok(supervisor.get_cell())
            }
        }
    }

    /// Spawn a child requested at runtime and add it to the spec.
    async fn add_child(
        myself: &ActorRef<SupervisorMessage>,
        state: &mut SupervisorActorState,
        child: ChildSpec,
    ) -> Result<(), ActorError> {
        let id = child.id().to_string();
        if state.services.registry.contains(&id).await || state.position_of(&id).is_some() {
            return Err(ActorError::duplicate_actor(id));
        }

        let cell = Self::spawn_child(myself, state, &child).await?;
        let tracker = state.tracker();
        state.spec.push_child(child.clone());
        state.children.push(ChildEntry {
            spec: child,
            cell,
            tracker,
        });

        debug!(supervisor = %state.id(), child = %id, "Child spawned");
        state
            .services
            .emit(
                Event::new(types::ACTOR_SPAWNED, state.id())
                    .with_payload(json!({ "actor": id, "supervisor": state.id() })),
            )
            .await;
        Ok(())
    }

    /// Stop a child on request; it is not restarted.
    async fn stop_child(state: &mut SupervisorActorState, id: &str) -> Result<(), ActorError> {
        let index = state
            .position_of(id)
            .ok_or_else(|| ActorError::actor_not_found(id))?;
        let entry = state.children.remove(index);
        state.spec.remove_child(id);

        if let Err(e) = entry
            .cell
            .stop_and_wait(Some("stopped by request".to_string()), None)
            .await
        {
            warn!(supervisor = %state.id(), child = %id, error = %e, "Stop did not complete cleanly");
        }
        Self::unregister(state, &entry).await;

        debug!(supervisor = %state.id(), child = %id, "Child stopped");
        state
            .services
            .emit(
                Event::new(types::ACTOR_STOPPED, state.id())
                    .with_payload(json!({ "actor": id, "supervisor": state.id() })),
            )
            .await;
        Ok(())
    }

    async fn unregister(state: &SupervisorActorState, entry: &ChildEntry) {
        let registry = &state.services.registry;
        match entry.spec {
            ChildSpec::Actor(_) => {
                registry
                    .remove_actor_if(entry.spec.id(), entry.instance())
                    .await;
            }
            ChildSpec::Supervisor(_) => {
                registry
                    .remove_supervisor_if(entry.spec.id(), entry.instance())
                    .await;
            }
        }
    }

    /// Stop every child, youngest first.
    async fn stop_children(state: &mut SupervisorActorState) {
        let children = std::mem::take(&mut state.children);
        for entry in children.iter().rev() {
            if let Err(e) = entry
                .cell
                .stop_and_wait(Some("supervisor stopping".to_string()), None)
                .await
            {
                debug!(child = %entry.spec.id(), error = %e, "Child already gone");
            }
            Self::unregister(state, entry).await;
        }
    }

    async fn on_child_failed(
        myself: &ActorRef<SupervisorMessage>,
        state: &mut SupervisorActorState,
        instance: ActorId,
        reason: String,
    ) -> Result<(), ActorProcessingErr> {
        let Some(index) = state.position_of_instance(instance) else {
            debug!(supervisor = %state.id(), %instance, "Failure from a retired instance ignored");
            return Ok(());
        };

        let verdict = match state.children.get_mut(index) {
            Some(entry) => entry.tracker.record_failure(Instant::now()),
            None => return Ok(()),
        };
        let children = state.child_ids();
        let failed = children.get(index).cloned().unwrap_or_default();

        warn!(
            supervisor = %state.id(),
            child = %failed,
            reason = %reason,
            verdict = ?verdict,
            "Child failed"
        );

        let ctx = RestartContext::new(failed.as_str(), reason.as_str(), &children)
            .exhausted(matches!(verdict, RestartVerdict::Escalate { .. }));

        match state.strategy.on_child_failure(&ctx) {
            RestartDecision::Restart { child_names } => {
                let attempt = match verdict {
                    RestartVerdict::Restart { attempt } => attempt,
                    RestartVerdict::Escalate { failures } => failures,
                };
                // Stop affected siblings youngest first, then start in spawn order.
                for name in child_names.iter().rev() {
                    Self::stop_sibling(state, name, instance, &failed).await;
                }
                for name in &child_names {
                    if let Err(e) = Self::respawn_child(myself, state, name, &failed, attempt).await
                    {
                        error!(supervisor = %state.id(), child = %name, error = %e, "Restart failed");
                        return Self::escalate(myself, state, name, &e.to_string()).await;
                    }
                }
                Ok(())
            }
            RestartDecision::Escalate => Self::escalate(myself, state, &failed, &reason).await,
        }
    }

    /// Stop a live sibling that is about to be restarted.
    async fn stop_sibling(
        state: &SupervisorActorState,
        name: &str,
        failed_instance: ActorId,
        failed: &str,
    ) {
        let Some(entry) = state.position_of(name).and_then(|i| state.children.get(i)) else {
            return;
        };
        if entry.instance() == failed_instance {
            return;
        }
        if let Err(e) = entry
            .cell
            .stop_and_wait(Some(format!("restarting after '{failed}' failed")), None)
            .await
        {
            debug!(child = %name, error = %e, "Sibling already gone");
        }
    }

    /// Replace one child with a fresh instance built from its spec.
    async fn respawn_child(
        myself: &ActorRef<SupervisorMessage>,
        state: &mut SupervisorActorState,
        name: &str,
        failed: &str,
        attempt: u32,
    ) -> Result<(), ActorError> {
        let Some(index) = state.position_of(name) else {
            return Ok(());
        };
        let Some(spec) = state.children.get(index).map(|e| e.spec.clone()) else {
            return Ok(());
        };

        let cell = Self::spawn_child(myself, state, &spec).await?;
        if let Some(entry) = state.children.get_mut(index) {
            entry.cell = cell;
        }
        state.total_restarts = state.total_restarts.saturating_add(1);

        info!(
            supervisor = %state.id(),
            child = %name,
            attempt,
            strategy = state.strategy.name(),
            "Child restarted"
        );
        state
            .services
            .emit(
                Event::new(types::ACTOR_RESTARTED, state.id()).with_payload(json!({
                    "actor": name,
                    "supervisor": state.id(),
                    "failed": failed,
                    "attempt": attempt,
                    "strategy": state.strategy.name(),
                })),
            )
            .await;
        Ok(())
    }

    /// Give up: stop every child and fail so the parent takes over.
    async fn escalate(
        myself: &ActorRef<SupervisorMessage>,
        state: &mut SupervisorActorState,
        child: &str,
        reason: &str,
    ) -> Result<(), ActorProcessingErr> {
        error!(
            supervisor = %state.id(),
            child = %child,
            parent = ?state.parent,
            "Restart budget spent, escalating"
        );
        state
            .services
            .emit(
                Event::new(types::SUPERVISOR_ESCALATED, state.id()).with_payload(json!({
                    "supervisor": state.id(),
                    "child": child,
                    "reason": reason,
                    "parent": state.parent,
                })),
            )
            .await;

        Self::stop_children(state).await;
        state
            .services
            .registry
            .remove_supervisor_if(&state.spec.id, myself.get_id())
            .await;

        Err(format!(
            "supervisor '{}' escalated after child '{child}' failed: {reason}",
            state.spec.id
        )
        .into())
    }

    /// A child stopped without failing. Only current instances count.
    async fn on_child_terminated(
        state: &mut SupervisorActorState,
        instance: ActorId,
        reason: Option<String>,
    ) {
        let Some(index) = state.position_of_instance(instance) else {
            return;
        };
        let entry = state.children.remove(index);
        state.spec.remove_child(entry.spec.id());
        Self::unregister(state, &entry).await;

        debug!(
            supervisor = %state.id(),
            child = %entry.spec.id(),
            reason = ?reason,
            "Child terminated"
        );
        state
            .services
            .emit(
                Event::new(types::ACTOR_STOPPED, state.id())
                    .with_payload(json!({ "actor": entry.spec.id(), "supervisor": state.id() })),
            )
            .await;
    }
}
