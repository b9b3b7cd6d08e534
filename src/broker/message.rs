//! Record definitions shared by the broker and the clients.
//!
//! `Record` is the one unit that travels on the wire: publications,
//! acknowledgements and subscribe handshakes all use it, told apart by the
//! explicit `kind` tag. The payload never doubles as a control signal.
//!
//! Notes on fields:
//! - `msg_id`: assigned by the broker when it accepts a publication; empty on
//!   the wire until then
//! - `properties`: exact-match routing attributes
//! - `born_time`: milliseconds since UNIX epoch, set by the producer
//! - `correlation_id`: producer-local token echoed on the producer's ack

use std::collections::BTreeMap;
use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::utils::ClientError;

pub type Properties = BTreeMap<String, String>;

/// Broker-assigned message identifier, monotonically increasing per broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(u64);

impl MessageId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MessageId {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(Self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Publish,
    Ack,
    Subscribe,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    #[serde(default, with = "msg_id_text")]
    pub msg_id: Option<MessageId>,
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub body: Vec<u8>,
    #[serde(default)]
    pub properties: Properties,
    #[serde(default)]
    pub born_time: i64,
    pub kind: RecordKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<u64>,
}

impl Record {
    /// A producer publication, stamped with the current time.
    pub fn publish(topic: impl Into<String>, body: impl Into<Vec<u8>>, properties: Properties) -> Self {
        Self {
            msg_id: None,
            topic: topic.into(),
            body: body.into(),
            properties,
            born_time: chrono::Utc::now().timestamp_millis(),
            kind: RecordKind::Publish,
            correlation_id: None,
        }
    }

    /// An acknowledgement. `None` is the subscribe handshake ack.
    pub fn ack(msg_id: Option<MessageId>) -> Self {
        Self {
            msg_id,
            topic: String::new(),
            body: Vec::new(),
            properties: Properties::new(),
            born_time: chrono::Utc::now().timestamp_millis(),
            kind: RecordKind::Ack,
            correlation_id: None,
        }
    }

    pub fn subscribe(subscription: &Subscription) -> Self {
        Self {
            msg_id: None,
            topic: subscription.topic.clone(),
            body: Vec::new(),
            properties: subscription.filter.clone(),
            born_time: chrono::Utc::now().timestamp_millis(),
            kind: RecordKind::Subscribe,
            correlation_id: None,
        }
    }

    pub fn with_correlation(mut self, token: Option<u64>) -> Self {
        self.correlation_id = token;
        self
    }
}

/// A topic plus an exact-match property filter. An empty filter matches
/// every record on the topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub topic: String,
    pub filter: Properties,
}

impl Subscription {
    pub fn new(topic: impl Into<String>, filter: Properties) -> Self {
        Self {
            topic: topic.into(),
            filter,
        }
    }

    /// Build a subscription from a `"k=v"` expression; `""` means match-all
    /// and several pairs may be separated by commas.
    pub fn parse(topic: impl Into<String>, expression: &str) -> Result<Self, ClientError> {
        let mut filter = Properties::new();
        for pair in expression.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            match pair.split_once('=') {
                Some((key, value)) if !key.trim().is_empty() => {
                    filter.insert(key.trim().to_string(), value.trim().to_string());
                }
                _ => return Err(ClientError::InvalidFilter(expression.to_string())),
            }
        }
        Ok(Self::new(topic, filter))
    }

    /// Read the subscription carried by an inbound Subscribe record.
    pub fn from_record(record: &Record) -> Self {
        Self::new(record.topic.clone(), record.properties.clone())
    }

    pub fn matches(&self, record: &Record) -> bool {
        self.topic == record.topic && (self.filter.is_empty() || self.filter == record.properties)
    }
}

/// `msgId` travels as a decimal string, empty until the broker assigns it.
mod msg_id_text {
    use super::MessageId;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(id: &Option<MessageId>, s: S) -> Result<S::Ok, S::Error> {
        match id {
            Some(id) => s.collect_str(id),
            None => s.serialize_str(""),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<MessageId>, D::Error> {
        let raw = String::deserialize(d)?;
        if raw.is_empty() {
            return Ok(None);
        }
        raw.parse().map(Some).map_err(serde::de::Error::custom)
    }
}
