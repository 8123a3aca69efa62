//! Messages delivered to hosted actors.
//!
//! Design principles:
//! - Tells are fire-and-forget (`send_message`)
//! - Asks carry a one-shot reply port (`call`)
//! - A behavior failure crashes the actor; an ask in flight gets an error
//!   reply first

use ractor::RpcReplyPort;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::errors::ActorError;

/// Message envelope: a type tag plus an opaque payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "type")]
    pub message_type: String,
    #[serde(default)]
    pub payload: Value,
}

impl Message {
    /// Create a message.
    pub fn new(message_type: impl Into<String>, payload: Value) -> Self {
        Self {
            message_type: message_type.into(),
            payload,
        }
    }

    /// Create a message without payload.
    pub fn signal(message_type: impl Into<String>) -> Self {
        Self::new(message_type, Value::Null)
    }

    /// Decode the payload.
    ///
    /// # Errors
    ///
    /// Returns the decode error when the payload does not match `T`.
    pub fn payload_as<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }
}

/// What an actor's mailbox holds.
#[derive(Debug)]
pub enum ActorMessage {
    /// Asynchronous send; no reply.
    Tell(Message),
    /// Synchronous ask; the reply goes to `reply`.
    Ask {
        message: Message,
        reply: RpcReplyPort<Result<Value, ActorError>>,
    },
}

impl ActorMessage {
    /// The envelope being delivered.
    #[must_use]
    pub const fn message(&self) -> &Message {
        match self {
            Self::Tell(message) | Self::Ask { message, .. } => message,
        }
    }
}
