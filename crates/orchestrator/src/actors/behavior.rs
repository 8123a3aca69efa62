//! Actor behaviors.
//!
//! A behavior handles one message at a time against the actor's private
//! [`State`]. It may replace itself for subsequent messages with
//! [`ActorContext::become_behavior`].

use std::sync::Arc;

use async_trait::async_trait;
use braid_core::State;
use serde_json::Value;

use super::errors::BehaviorError;
use super::messages::Message;

/// Per-message view of the hosting actor.
pub struct ActorContext {
    actor_id: String,
    /// The actor's private state. Only this actor's loop ever touches it.
    pub state: State,
    next: Option<Box<dyn Behavior>>,
}

impl ActorContext {
    pub(crate) fn new(actor_id: String, state: State) -> Self {
        Self {
            actor_id,
            state,
            next: None,
        }
    }

    /// Id of the actor handling the message.
    #[must_use]
    pub fn actor_id(&self) -> &str {
        &self.actor_id
    }

    /// Install `behavior` for every following message.
    pub fn become_behavior(&mut self, behavior: impl Behavior + 'static) {
        self.next = Some(Box::new(behavior));
    }

    pub(crate) fn into_parts(self) -> (State, Option<Box<dyn Behavior>>) {
        (self.state, self.next)
    }
}

impl std::fmt::Debug for ActorContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActorContext")
            .field("actor_id", &self.actor_id)
            .field("state", &self.state)
            .field("become", &self.next.is_some())
            .finish()
    }
}

/// Message handler of an actor.
///
/// The returned value is the reply to an ask and is dropped for a tell.
/// Returning an error crashes the actor; its supervisor decides what
/// happens next.
#[async_trait]
pub trait Behavior: Send + Sync {
    async fn receive(
        &self,
        ctx: &mut ActorContext,
        message: Message,
    ) -> Result<Value, BehaviorError>;
}

/// Builds a fresh behavior each time an actor (re)starts.
pub type BehaviorFactory = Arc<dyn Fn() -> Box<dyn Behavior> + Send + Sync>;

/// A behavior backed by a synchronous closure.
pub struct FnBehavior<F>
where
    F: Fn(&mut ActorContext, Message) -> Result<Value, BehaviorError> + Send + Sync,
{
    func: F,
}

impl<F> FnBehavior<F>
where
    F: Fn(&mut ActorContext, Message) -> Result<Value, BehaviorError> + Send + Sync,
{
    pub const fn new(func: F) -> Self {
        Self { func }
    }
}

#[async_trait]
impl<F> Behavior for FnBehavior<F>
where
    F: Fn(&mut ActorContext, Message) -> Result<Value, BehaviorError> + Send + Sync,
{
    async fn receive(
        &self,
        ctx: &mut ActorContext,
        message: Message,
    ) -> Result<Value, BehaviorError> {
        (self.func)(ctx, message)
    }
}

/// Factory producing a closure-backed behavior on every (re)start.
pub fn behavior_fn<F>(func: F) -> BehaviorFactory
where
    F: Fn(&mut ActorContext, Message) -> Result<Value, BehaviorError>
        + Send
        + Sync
        + Clone
        + 'static,
{
    Arc::new(move || Box::new(FnBehavior::new(func.clone())) as Box<dyn Behavior>)
}

/// Replies with the message payload unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct EchoBehavior;

#[async_trait]
impl Behavior for EchoBehavior {
    async fn receive(
        &self,
        _ctx: &mut ActorContext,
        message: Message,
    ) -> Result<Value, BehaviorError> {
        Ok(message.payload)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn counter() -> BehaviorFactory {
        behavior_fn(|ctx: &mut ActorContext, msg: Message| match msg.message_type.as_str() {
            "add" => {
                let by = msg.payload_as::<i64>()?;
                let n = ctx.state.get_as::<i64>("n")?.unwrap_or(0) + by;
                ctx.state.insert("n", n);
                Ok(json!(n))
            }
            "freeze" => {
                ctx.become_behavior(FnBehavior::new(|ctx: &mut ActorContext, _msg| {
                    Ok(ctx.state.get("n").cloned().unwrap_or(Value::Null))
                }));
                Ok(Value::Null)
            }
            other => Err(BehaviorError::unknown_message(other)),
        })
    }

    #[tokio::test]
    async fn should_mutate_private_state() {
        let behavior = counter()();
        let mut ctx = ActorContext::new("c".into(), State::new());

        behavior
            .receive(&mut ctx, Message::new("add", json!(2)))
            .await
            .unwrap();
        let reply = behavior
            .receive(&mut ctx, Message::new("add", json!(3)))
            .await
            .unwrap();

        assert_eq!(reply, json!(5));
        assert_eq!(ctx.state.get_as::<i64>("n").unwrap(), Some(5));
    }

    #[tokio::test]
    async fn should_report_unknown_messages() {
        let behavior = counter()();
        let mut ctx = ActorContext::new("c".into(), State::new());
        let err = behavior
            .receive(&mut ctx, Message::signal("explode"))
            .await
            .unwrap_err();
        assert_eq!(err, BehaviorError::UnknownMessage("explode".into()));
    }

    #[tokio::test]
    async fn should_capture_become() {
        let behavior = counter()();
        let mut ctx = ActorContext::new("c".into(), State::new());
        behavior
            .receive(&mut ctx, Message::signal("freeze"))
            .await
            .unwrap();
        let (_, next) = ctx.into_parts();
        assert!(next.is_some());
    }

    #[tokio::test]
    async fn should_echo_payload() {
        let mut ctx = ActorContext::new("e".into(), State::new());
        let reply = EchoBehavior
            .receive(&mut ctx, Message::new("x", json!({"k": 1})))
            .await
            .unwrap();
        assert_eq!(reply, json!({"k": 1}));
    }
}
