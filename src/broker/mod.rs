//! The `broker` module holds the broker's state and its record handling:
//! the connection registry, the in-flight message store and the engine that
//! routes every inbound record through them.

pub mod engine;
pub mod message;
pub mod registry;
pub mod store;

pub use engine::Broker;
pub use message::{MessageId, Properties, Record, RecordKind, Subscription};
pub use registry::{ConnectionId, ConnectionRegistry};
pub use store::{DeliveryCounter, MessageStore};
