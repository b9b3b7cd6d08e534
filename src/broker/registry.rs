//! Connection registry
//!
//! One `ConnectionState` per live connection: the sending side of the
//! connection's outbound channel, its subscription (if it completed the
//! subscribe handshake) and the ids pushed to it that it has not acked yet.
//!
//! Concurrency note: the registry is owned by the `Broker` and must only be
//! touched under the broker lock, together with the message store.

use std::collections::{HashMap, HashSet};
use std::fmt;

use tokio::sync::mpsc::UnboundedSender;
use tracing::warn;
use uuid::Uuid;

use crate::broker::message::{MessageId, Record, Subscription};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

#[derive(Debug)]
pub struct ConnectionState {
    pub sender: UnboundedSender<String>,
    pub subscription: Option<Subscription>,
    pub pending: HashSet<MessageId>,
}

#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: HashMap<ConnectionId, ConnectionState>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection with no subscription.
    pub fn register(&mut self, id: ConnectionId, sender: UnboundedSender<String>) {
        self.connections.insert(
            id,
            ConnectionState {
                sender,
                subscription: None,
                pending: HashSet::new(),
            },
        );
    }

    /// Attach (or replace) the connection's subscription. Returns false if
    /// the connection is unknown.
    pub fn subscribe(&mut self, id: &ConnectionId, subscription: Subscription) -> bool {
        match self.connections.get_mut(id) {
            Some(state) => {
                state.subscription = Some(subscription);
                true
            }
            None => false,
        }
    }

    /// Every subscribed connection whose subscription matches `record`.
    pub fn matching_subscribers(&self, record: &Record) -> Vec<ConnectionId> {
        self.connections
            .iter()
            .filter(|(_, state)| {
                state
                    .subscription
                    .as_ref()
                    .is_some_and(|sub| sub.matches(record))
            })
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn mark_pending(&mut self, id: &ConnectionId, msg_id: MessageId) {
        if let Some(state) = self.connections.get_mut(id) {
            state.pending.insert(msg_id);
        }
    }

    /// Returns true only if `msg_id` was pending toward this connection.
    pub fn clear_pending(&mut self, id: &ConnectionId, msg_id: MessageId) -> bool {
        self.connections
            .get_mut(id)
            .is_some_and(|state| state.pending.remove(&msg_id))
    }

    /// Remove the connection and hand back its state. The message store is
    /// left alone; the caller decides what happens to the pending ids.
    pub fn unregister(&mut self, id: &ConnectionId) -> Option<ConnectionState> {
        self.connections.remove(id)
    }

    /// Queue a frame on the connection's outbound channel.
    pub fn send(&self, id: &ConnectionId, frame: String) -> bool {
        match self.connections.get(id) {
            Some(state) => match state.sender.send(frame) {
                Ok(()) => true,
                Err(_) => {
                    warn!("Outbound channel closed for {id}");
                    false
                }
            },
            None => {
                warn!("No connection registered with id: {id}");
                false
            }
        }
    }

    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.connections.contains_key(id)
    }

    pub fn subscription(&self, id: &ConnectionId) -> Option<&Subscription> {
        self.connections.get(id)?.subscription.as_ref()
    }

    pub fn pending(&self, id: &ConnectionId) -> Option<&HashSet<MessageId>> {
        self.connections.get(id).map(|state| &state.pending)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
