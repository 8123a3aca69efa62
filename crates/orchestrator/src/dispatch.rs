//! Graph nodes that hand their work to an actor.
//!
//! [`ActorNode`] asks an actor with the current run state as payload and
//! merges the reply back. The ask is a suspension point of the run; the
//! actor keeps draining its mailbox meanwhile.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use braid_core::State;
use braid_workflow::{NodeContext, NodeError, NodeHandler, StateUpdate};
use serde_json::Value;
use tracing::debug;

use crate::actors::ActorSystem;

/// Default deadline for the ask issued by an [`ActorNode`].
pub const DEFAULT_ASK_TIMEOUT: Duration = Duration::from_secs(30);

/// Node handler dispatching the state to an actor.
///
/// An object reply is merged into the state, `null` leaves it unchanged,
/// and any other value is stored under the result key (the actor id unless
/// set with [`with_result_key`](Self::with_result_key)).
#[derive(Debug, Clone)]
pub struct ActorNode {
    system: Arc<ActorSystem>,
    actor_id: String,
    message_type: String,
    timeout: Duration,
    result_key: Option<String>,
}

impl ActorNode {
    pub fn new(
        system: Arc<ActorSystem>,
        actor_id: impl Into<String>,
        message_type: impl Into<String>,
    ) -> Self {
        Self {
            system,
            actor_id: actor_id.into(),
            message_type: message_type.into(),
            timeout: DEFAULT_ASK_TIMEOUT,
            result_key: None,
        }
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_result_key(mut self, key: impl Into<String>) -> Self {
        self.result_key = Some(key.into());
        self
    }

    fn into_update(&self, reply: Value) -> StateUpdate {
        match reply {
            Value::Null => StateUpdate::Unchanged,
            Value::Object(map) => StateUpdate::Merge(State::from(map)),
            other => {
                let key = self.result_key.as_deref().unwrap_or(&self.actor_id);
                StateUpdate::Merge(State::new().with(key, other))
            }
        }
    }
}

#[async_trait]
impl NodeHandler for ActorNode {
    async fn run(&self, state: &State, ctx: &NodeContext) -> Result<StateUpdate, NodeError> {
        debug!(
            node = %ctx.node_id,
            actor = %self.actor_id,
            message_type = %self.message_type,
            "Dispatching node to actor"
        );
        let reply = self
            .system
            .send_and_wait(
                &self.actor_id,
                &self.message_type,
                state.clone().into_value(),
                self.timeout,
            )
            .await
            .map_err(|e| NodeError::dispatch(format!("actor '{}': {e}", self.actor_id)))?;
        Ok(self.into_update(reply))
    }
}
