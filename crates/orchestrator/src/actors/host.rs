//! Ractor host for a [`Behavior`].
//!
//! One instance of [`BehaviorActor`] per running actor. The mailbox is the
//! ractor mailbox, so messages are processed one at a time in arrival order.
//! A behavior error fails the instance; an ask in flight receives
//! [`ActorError::BehaviorFailed`] before the failure reaches the supervisor.

use braid_core::State;
use ractor::{Actor, ActorProcessingErr, ActorRef};
use tracing::{debug, warn};

use super::behavior::{ActorContext, Behavior};
use super::errors::ActorError;
use super::messages::ActorMessage;
use super::registry::Services;
use super::supervisor::ActorSpec;

/// Actor definition hosting a behavior.
#[derive(Debug, Clone, Copy, Default)]
pub struct BehaviorActor;

/// Arguments for one instance.
#[derive(Debug, Clone)]
pub struct HostArguments {
    pub spec: ActorSpec,
    pub services: Services,
}

/// Per-instance state.
pub struct HostState {
    id: String,
    behavior: Box<dyn Behavior>,
    state: State,
    checkpoint: bool,
    services: Services,
}

impl std::fmt::Debug for HostState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostState")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("checkpoint", &self.checkpoint)
            .finish_non_exhaustive()
    }
}

impl Actor for BehaviorActor {
    type Msg = ActorMessage;
    type State = HostState;
    type Arguments = HostArguments;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        let HostArguments { spec, services } = args;

        let state = if spec.checkpoint {
            services
                .store
                .get(&spec.id)
                .await?
                .unwrap_or_else(|| spec.initial_state.clone())
        } else {
            spec.initial_state.clone()
        };

        debug!(actor = %spec.id, restored = spec.checkpoint, "Actor starting");

        Ok(HostState {
            behavior: (spec.behavior)(),
            id: spec.id,
            state,
            checkpoint: spec.checkpoint,
            services,
        })
    }

    async fn handle(
        &self,
        _myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        let (message, reply) = match message {
            ActorMessage::Tell(message) => (message, None),
            ActorMessage::Ask { message, reply } => (message, Some(reply)),
        };
        let message_type = message.message_type.clone();

        let mut ctx = ActorContext::new(state.id.clone(), std::mem::take(&mut state.state));
        let result = state.behavior.receive(&mut ctx, message).await;
        let (next_state, next_behavior) = ctx.into_parts();
        state.state = next_state;

        match result {
            Ok(value) => {
                if let Some(behavior) = next_behavior {
                    debug!(actor = %state.id, "Behavior replaced");
                    state.behavior = behavior;
                }
                // Persist before replying so an answered ask is durable.
                if state.checkpoint {
                    if let Err(e) = state
                        .services
                        .store
                        .update(&state.id, state.state.clone())
                        .await
                    {
                        if let Some(reply) = reply {
                            let _ = reply.send(Err(ActorError::behavior_failed(
                                state.id.clone(),
                                e.to_string(),
                            )));
                        }
                        return Err(Box::new(e));
                    }
                }
                if let Some(reply) = reply {
                    if reply.send(Ok(value)).is_err() {
                        debug!(actor = %state.id, "Asker went away before the reply");
                    }
                }
                Ok(())
            }
            Err(e) => {
                warn!(
                    actor = %state.id,
                    message_type = %message_type,
                    error = %e,
                    "Behavior failed"
                );
                if let Some(reply) = reply {
                    // The asker may already have timed out.
                    let _ = reply.send(Err(ActorError::behavior_failed(
                        state.id.clone(),
                        e.to_string(),
                    )));
                }
                Err(Box::new(e))
            }
        }
    }

    async fn post_stop(
        &self,
        myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        state
            .services
            .registry
            .remove_actor_if(&state.id, myself.get_id())
            .await;
        debug!(actor = %state.id, "Actor stopped");
        Ok(())
    }
}

