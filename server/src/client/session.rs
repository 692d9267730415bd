use std::collections::BTreeSet;

use prost::Message as ProstMessage;

use crate::chat::model::{Message, UserId};
use crate::client::consumer::{ChatConsumer, Outcome, ServerEvent};
use crate::proto::ws::{envelope::Payload, Envelope};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("failed to decode frame: {0}")]
    Decode(#[from] prost::DecodeError),
    #[error("server error {code}: {message}")]
    Server { code: u32, message: String },
    #[error("delivered message has an invalid timestamp")]
    InvalidMessage,
}

/// Proof of the one active listener. Not `Clone`: detaching consumes it.
#[derive(Debug)]
pub struct Subscription {
    token: u64,
}

/// One authenticated client session.
///
/// At most one listener is attached at a time, so every server event is
/// applied to the consumer exactly once. Events arriving while unsubscribed
/// are dropped.
#[derive(Debug)]
pub struct ClientSession {
    consumer: ChatConsumer,
    active: Option<u64>,
    next_token: u64,
}

impl ClientSession {
    pub fn new(me: impl Into<UserId>) -> Self {
        Self {
            consumer: ChatConsumer::new(me),
            active: None,
            next_token: 0,
        }
    }

    /// Attach the listener. `None` if one is already attached.
    pub fn subscribe(&mut self) -> Option<Subscription> {
        if self.active.is_some() {
            return None;
        }
        self.next_token += 1;
        self.active = Some(self.next_token);
        Some(Subscription {
            token: self.next_token,
        })
    }

    /// Detach the listener. Returns false for a subscription that is no
    /// longer the active one.
    pub fn unsubscribe(&mut self, subscription: Subscription) -> bool {
        if self.active == Some(subscription.token) {
            self.active = None;
            true
        } else {
            false
        }
    }

    pub fn is_subscribed(&self) -> bool {
        self.active.is_some()
    }

    /// Detach and forget everything the session knew. Outstanding
    /// subscriptions become stale.
    pub fn logout(&mut self) {
        self.active = None;
        self.consumer = ChatConsumer::new(self.consumer.me().to_string());
    }

    pub fn dispatch(&mut self, event: ServerEvent) -> Option<Outcome> {
        if !self.is_subscribed() {
            return None;
        }
        Some(self.consumer.apply(event))
    }

    /// Decode one binary WebSocket frame and dispatch it.
    /// Replies that are not pushes (mark-read acknowledgements) yield `Ok(None)`.
    pub fn dispatch_frame(&mut self, frame: &[u8]) -> Result<Option<Outcome>, ClientError> {
        if !self.is_subscribed() {
            return Ok(None);
        }

        let envelope = Envelope::decode(frame)?;
        let event = match envelope.payload {
            Some(Payload::PresenceEvent(ev)) => {
                ServerEvent::Presence(ev.online_user_ids.into_iter().collect::<BTreeSet<_>>())
            }
            Some(Payload::MessageDeliveredEvent(ev)) => {
                let Some(proto) = ev.message else {
                    return Ok(None);
                };
                ServerEvent::MessageDelivered(
                    Message::from_proto(proto).ok_or(ClientError::InvalidMessage)?,
                )
            }
            Some(Payload::Error(err)) => {
                return Err(ClientError::Server {
                    code: err.code,
                    message: err.message,
                })
            }
            _ => return Ok(None),
        };

        Ok(self.dispatch(event))
    }

    pub fn state(&self) -> &ChatConsumer {
        &self.consumer
    }

    /// For view actions: opening conversations, loading contacts and badges.
    pub fn state_mut(&mut self) -> &mut ChatConsumer {
        &mut self.consumer
    }
}
