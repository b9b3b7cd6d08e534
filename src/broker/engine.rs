//! Broker engine
//!
//! The broker is the single decision point for every inbound record:
//! - `Subscribe`: attach the connection's subscription and answer with a
//!   handshake ack
//! - `Ack`: clear the pending mark and count the delivery; the message is
//!   evicted once every matched subscriber has acked
//! - `Publish`: match subscribers, admit the message, push it to each match,
//!   append it to the durable log, then ack the producer
//!
//! Concurrency and usage notes:
//! - The API is synchronous and meant to sit behind one lock
//!   (`Arc<Mutex<Broker>>`). A whole record is handled under that lock, so
//!   the match → admit → mark-pending sequence can never interleave with a
//!   concurrent subscribe or disconnect.
//! - Pushes only enqueue on each connection's unbounded channel; socket I/O
//!   happens in the per-connection writer tasks, outside the lock.
//! - The durable log append is synchronous and happens before the producer
//!   ack is queued. If it fails, no ack is sent.

use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use crate::broker::message::{Record, RecordKind, Subscription};
use crate::broker::registry::{ConnectionId, ConnectionRegistry};
use crate::broker::store::MessageStore;
use crate::config::{BrokerSettings, DisconnectPolicy};
use crate::persistence::{AppendLog, DurableLog};
use crate::transport::codec;
use crate::utils::{BrokerError, PersistenceError};

#[derive(Debug)]
pub struct Broker {
    pub registry: ConnectionRegistry,
    pub store: MessageStore,
    log: Box<dyn DurableLog>,
    disconnect_policy: DisconnectPolicy,
}

impl Broker {
    pub fn new(log: Box<dyn DurableLog>, disconnect_policy: DisconnectPolicy) -> Self {
        Self {
            registry: ConnectionRegistry::new(),
            store: MessageStore::new(),
            log,
            disconnect_policy,
        }
    }

    /// Open the durable log described by `settings` and build a broker on it.
    pub fn open(settings: &BrokerSettings) -> Result<Self, PersistenceError> {
        let log = AppendLog::open(&settings.log_dir, &settings.log_file)?;
        Ok(Self::new(Box::new(log), settings.disconnect_policy))
    }

    pub fn register_connection(&mut self, id: ConnectionId, sender: UnboundedSender<String>) {
        self.registry.register(id, sender);
        debug!("Registered {id}");
    }

    /// Apply one inbound record from connection `from`. An error means the
    /// connection must be closed; state already applied stays consistent.
    pub fn handle_record(&mut self, from: &ConnectionId, record: Record) -> Result<(), BrokerError> {
        match record.kind {
            RecordKind::Subscribe => self.handle_subscribe(from, record),
            RecordKind::Ack => self.handle_ack(from, record),
            RecordKind::Publish => self.handle_publish(from, record),
        }
    }

    fn handle_subscribe(&mut self, from: &ConnectionId, record: Record) -> Result<(), BrokerError> {
        if record.topic.is_empty() {
            return Err(BrokerError::protocol("subscribe without topic"));
        }

        let subscription = Subscription::from_record(&record);
        info!(
            "{from} subscribed to {} with filter {:?}",
            subscription.topic, subscription.filter
        );
        self.registry.subscribe(from, subscription);

        let handshake = codec::encode(&Record::ack(None))?;
        self.registry.send(from, handshake);
        Ok(())
    }

    fn handle_ack(&mut self, from: &ConnectionId, record: Record) -> Result<(), BrokerError> {
        let Some(msg_id) = record.msg_id else {
            return Err(BrokerError::protocol("ack without msgId"));
        };

        // only the subscriber the message was pushed to can count toward it,
        // and only once
        if !self.registry.clear_pending(from, msg_id) {
            debug!("Ignoring stale ack for {msg_id} from {from}");
            return Ok(());
        }

        if self.store.acknowledge(msg_id) {
            debug!("Message {msg_id} fully delivered");
        }
        Ok(())
    }

    fn handle_publish(&mut self, from: &ConnectionId, mut record: Record) -> Result<(), BrokerError> {
        if record.topic.is_empty() {
            return Err(BrokerError::protocol("publish without topic"));
        }

        let correlation = record.correlation_id.take();
        let matches = self.registry.matching_subscribers(&record);
        let msg_id = self.store.admit(&mut record, matches.len());
        let frame = codec::encode(&record)?;

        // a push that cannot be queued will never be acked, so it stops
        // counting toward the message instead of being marked pending
        let mut delivered = 0;
        for subscriber in &matches {
            if self.registry.send(subscriber, frame.clone()) {
                self.registry.mark_pending(subscriber, msg_id);
                delivered += 1;
            } else {
                self.store.release(msg_id);
            }
        }

        self.log.append(frame.as_bytes())?;

        let ack = codec::encode(&Record::ack(Some(msg_id)).with_correlation(correlation))?;
        self.registry.send(from, ack);

        debug!(
            "{from} published {msg_id} to {} ({delivered} of {} subscribers)",
            record.topic,
            matches.len()
        );
        Ok(())
    }

    /// Drop a departed connection and settle what was pending toward it
    /// according to the disconnect policy.
    pub fn cleanup_connection(&mut self, id: &ConnectionId) {
        let Some(state) = self.registry.unregister(id) else {
            return;
        };

        if state.pending.is_empty() {
            info!("Cleaned up {id}");
            return;
        }

        match self.disconnect_policy {
            DisconnectPolicy::Release => {
                let completed = state
                    .pending
                    .iter()
                    .filter(|msg_id| self.store.release(**msg_id))
                    .count();
                info!(
                    "Cleaned up {id}; released {} pending messages ({completed} completed)",
                    state.pending.len()
                );
            }
            DisconnectPolicy::Retain => {
                warn!(
                    "Cleaned up {id}; {} pending messages stay in flight",
                    state.pending.len()
                );
            }
        }
    }

    pub fn disconnect_policy(&self) -> DisconnectPolicy {
        self.disconnect_policy
    }
}
