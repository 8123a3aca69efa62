//! The actor runtime facade.
//!
//! [`ActorSystem`] owns the root supervisor and routes by actor id through
//! the runtime [`Registry`](super::registry::Registry). Lookups happen on
//! every call, so a restarted actor is reachable under the same id.

use std::sync::Arc;
use std::time::Duration;

use braid_events::{EventSink, InMemoryStateStore, StateStore, TracingSink};
use ractor::concurrency::JoinHandle;
use ractor::rpc::CallResult;
use ractor::{Actor, ActorRef, MessagingErr, RpcReplyPort};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::errors::ActorError;
use super::messages::{ActorMessage, Message};
use super::registry::Services;
use super::supervisor::{
    ActorSpec, SupervisorActor, SupervisorArguments, SupervisorMessage, SupervisorSpec,
    SupervisorStatus,
};

/// A running supervision tree.
pub struct ActorSystem {
    root_id: String,
    root: ActorRef<SupervisorMessage>,
    handle: Mutex<Option<JoinHandle<()>>>,
    services: Services,
}

impl std::fmt::Debug for ActorSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActorSystem")
            .field("root_id", &self.root_id)
            .finish_non_exhaustive()
    }
}

/// Map a ractor call outcome onto the runtime error type.
fn map_call<T, M>(
    id: &str,
    timeout: Option<Duration>,
    result: Result<CallResult<T>, MessagingErr<M>>,
) -> Result<T, ActorError> {
    match result {
        Ok(CallResult::Success(value)) => Ok(value),
        Ok(CallResult::Timeout) => Err(ActorError::timeout(timeout.unwrap_or_default())),
        Ok(CallResult::SenderError) => Err(ActorError::NoReply(id.to_string())),
        Err(_) => Err(ActorError::actor_unavailable(id)),
    }
}

impl ActorSystem {
    /// Start a tree that logs its events and keeps checkpoints in memory.
    ///
    /// # Errors
    ///
    /// Returns [`ActorError::SpawnFailed`] when any initial child fails to
    /// start.
    pub async fn start(root: SupervisorSpec) -> Result<Self, ActorError> {
        Self::start_with(
            root,
            Arc::new(TracingSink),
            Arc::new(InMemoryStateStore::new()),
        )
        .await
    }

    /// Start a tree with explicit collaborators.
    ///
    /// # Errors
    ///
    /// Returns [`ActorError::SpawnFailed`] when any initial child fails to
    /// start.
    pub async fn start_with(
        root: SupervisorSpec,
        events: Arc<dyn EventSink>,
        store: Arc<dyn StateStore>,
    ) -> Result<Self, ActorError> {
        let services = Services::new(events, store);
        let root_id = root.id.clone();

        let (root_ref, handle) = Actor::spawn(
            None,
            SupervisorActor,
            SupervisorArguments {
                spec: root,
                parent: None,
                services: services.clone(),
            },
        )
        .await
        .map_err(|e| ActorError::spawn_failed(format!("root supervisor '{root_id}': {e}")))?;

        info!(root = %root_id, "Actor system started");
        Ok(Self {
            root_id,
            root: root_ref,
            handle: Mutex::new(Some(handle)),
            services,
        })
    }

    /// Id of the root supervisor.
    #[must_use]
    pub fn root_id(&self) -> &str {
        &self.root_id
    }

    async fn supervisor_ref(&self, id: &str) -> Result<ActorRef<SupervisorMessage>, ActorError> {
        self.services
            .registry
            .supervisor(id)
            .await
            .map(|entry| entry.supervisor)
            .ok_or_else(|| ActorError::supervisor_not_found(id))
    }

    async fn actor_ref(&self, id: &str) -> Result<ActorRef<ActorMessage>, ActorError> {
        self.services
            .registry
            .actor(id)
            .await
            .map(|entry| entry.actor)
            .ok_or_else(|| ActorError::actor_not_found(id))
    }

    async fn call_supervisor<T, F>(&self, id: &str, build: F) -> Result<T, ActorError>
    where
        T: Send + 'static,
        F: FnOnce(RpcReplyPort<T>) -> SupervisorMessage + Send,
    {
        let supervisor = self.supervisor_ref(id).await?;
        map_call(id, None, supervisor.call(build, None).await)
    }

    /// Spawn an actor under `supervisor_id`.
    ///
    /// # Errors
    ///
    /// - [`ActorError::SupervisorNotFound`] for an unknown supervisor
    /// - [`ActorError::DuplicateActor`] when the id is taken
    /// - [`ActorError::SpawnFailed`] when the actor cannot start
    pub async fn spawn_actor(&self, supervisor_id: &str, spec: ActorSpec) -> Result<(), ActorError> {
        debug!(supervisor = %supervisor_id, actor = %spec.id, "Spawning actor");
        self.call_supervisor(supervisor_id, |reply| SupervisorMessage::SpawnActor {
            spec,
            reply,
        })
        .await?
    }

    /// Spawn a nested supervisor under `parent_id`.
    ///
    /// # Errors
    ///
    /// Same as [`spawn_actor`](Self::spawn_actor).
    pub async fn spawn_supervisor(
        &self,
        parent_id: &str,
        spec: SupervisorSpec,
    ) -> Result<(), ActorError> {
        debug!(parent = %parent_id, supervisor = %spec.id, "Spawning supervisor");
        self.call_supervisor(parent_id, |reply| SupervisorMessage::SpawnSupervisor {
            spec,
            reply,
        })
        .await?
    }

    /// Stop an actor or a nested supervisor for good.
    ///
    /// # Errors
    ///
    /// Returns [`ActorError::ActorNotFound`] for an unknown id or the root.
    pub async fn stop_actor(&self, id: &str) -> Result<(), ActorError> {
        let owner = match self.services.registry.actor(id).await {
            Some(entry) => entry.supervisor,
            None => self
                .services
                .registry
                .supervisor(id)
                .await
                .and_then(|entry| entry.parent)
                .ok_or_else(|| ActorError::actor_not_found(id))?,
        };
        let child = id.to_string();
        self.call_supervisor(&owner, |reply| SupervisorMessage::StopChild { id: child, reply })
            .await?
    }

    /// Asynchronous send. Returns once the message is in the mailbox.
    ///
    /// # Errors
    ///
    /// - [`ActorError::ActorNotFound`] for an unknown id
    /// - [`ActorError::ActorUnavailable`] when the instance is gone
    pub async fn send(
        &self,
        id: &str,
        message_type: &str,
        payload: Value,
    ) -> Result<(), ActorError> {
        let actor = self.actor_ref(id).await?;
        actor
            .send_message(ActorMessage::Tell(Message::new(message_type, payload)))
            .map_err(|_| ActorError::actor_unavailable(id))
    }

    /// Synchronous ask with a deadline.
    ///
    /// # Errors
    ///
    /// - [`ActorError::Timeout`] when no reply arrives within `timeout`
    /// - [`ActorError::BehaviorFailed`] when the behavior fails on this message
    /// - [`ActorError::NoReply`] when the instance dies before replying
    /// - [`ActorError::ActorNotFound`] / [`ActorError::ActorUnavailable`] as for
    ///   [`send`](Self::send)
    pub async fn send_and_wait(
        &self,
        id: &str,
        message_type: &str,
        payload: Value,
        timeout: Duration,
    ) -> Result<Value, ActorError> {
        let actor = self.actor_ref(id).await?;
        let message = Message::new(message_type, payload);
        let result = actor
            .call(
                |reply| ActorMessage::Ask { message, reply },
                Some(timeout),
            )
            .await;
        map_call(id, Some(timeout), result)?
    }

    /// Status of one supervisor.
    ///
    /// # Errors
    ///
    /// Returns [`ActorError::SupervisorNotFound`] for an unknown id.
    pub async fn supervisor_status(&self, id: &str) -> Result<SupervisorStatus, ActorError> {
        self.call_supervisor(id, |reply| SupervisorMessage::GetStatus { reply })
            .await
    }

    /// Ids of the running actors.
    pub async fn actor_ids(&self) -> Vec<String> {
        self.services.registry.actor_ids().await
    }

    /// Ids of the running supervisors, root included.
    pub async fn supervisor_ids(&self) -> Vec<String> {
        self.services.registry.supervisor_ids().await
    }

    /// Whether the root supervisor has exited.
    pub async fn is_terminated(&self) -> bool {
        self.handle
            .lock()
            .await
            .as_ref()
            .is_none_or(JoinHandle::is_finished)
    }

    /// Wait for the root supervisor to exit.
    pub async fn wait(&self) {
        let handle = self.handle.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                debug!(error = %e, "Root supervisor task ended abnormally");
            }
        }
    }

    /// Stop the whole tree and wait for it.
    pub async fn shutdown(&self) {
        info!(root = %self.root_id, "Actor system shutting down");
        self.root.stop(Some("shutdown".to_string()));
        self.wait().await;
    }
}
