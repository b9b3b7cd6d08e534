//! In-flight message store
//!
//! Maps each admitted message id to its record and a delivery counter. A
//! message lives here only while `acknowledged < expected`; the record and
//! its counter leave together the moment the two meet.

use std::collections::HashMap;

use tracing::debug;

use crate::broker::message::{MessageId, Record};

/// Expected deliveries (subscribers matched at publish time) versus
/// acknowledgements received so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryCounter {
    pub expected: usize,
    pub acknowledged: usize,
}

impl DeliveryCounter {
    pub fn is_complete(&self) -> bool {
        self.acknowledged >= self.expected
    }
}

#[derive(Debug)]
struct InFlight {
    record: Record,
    counter: DeliveryCounter,
}

#[derive(Debug)]
pub struct MessageStore {
    next_id: u64,
    in_flight: HashMap<MessageId, InFlight>,
}

impl Default for MessageStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageStore {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            in_flight: HashMap::new(),
        }
    }

    /// Assign the next id to `record` and track it against `expected`
    /// deliveries. With no subscribers the message is complete on arrival
    /// and is never stored.
    pub fn admit(&mut self, record: &mut Record, expected: usize) -> MessageId {
        let id = MessageId::new(self.next_id);
        self.next_id += 1;
        record.msg_id = Some(id);

        if expected == 0 {
            debug!("Message {id} matched no subscribers; complete on admission");
            return id;
        }

        self.in_flight.insert(
            id,
            InFlight {
                record: record.clone(),
                counter: DeliveryCounter {
                    expected,
                    acknowledged: 0,
                },
            },
        );
        id
    }

    /// Count one acknowledgement. Returns true if this completed the message,
    /// which is then evicted. Unknown ids are ignored.
    pub fn acknowledge(&mut self, id: MessageId) -> bool {
        let Some(entry) = self.in_flight.get_mut(&id) else {
            debug!("Ignoring ack for unknown message {id}");
            return false;
        };
        entry.counter.acknowledged += 1;
        self.evict_if_complete(id)
    }

    /// Drop one expected delivery, for a subscriber that went away before
    /// acking. Returns true if this completed the message.
    pub fn release(&mut self, id: MessageId) -> bool {
        let Some(entry) = self.in_flight.get_mut(&id) else {
            return false;
        };
        entry.counter.expected = entry.counter.expected.saturating_sub(1);
        self.evict_if_complete(id)
    }

    fn evict_if_complete(&mut self, id: MessageId) -> bool {
        let complete = self
            .in_flight
            .get(&id)
            .is_some_and(|entry| entry.counter.is_complete());
        if complete {
            self.in_flight.remove(&id);
            debug!("Message {id} fully delivered; {} in flight", self.in_flight.len());
        }
        complete
    }

    pub fn get(&self, id: MessageId) -> Option<&Record> {
        self.in_flight.get(&id).map(|entry| &entry.record)
    }

    pub fn counter(&self, id: MessageId) -> Option<DeliveryCounter> {
        self.in_flight.get(&id).map(|entry| entry.counter)
    }

    pub fn size(&self) -> usize {
        self.in_flight.len()
    }
}
