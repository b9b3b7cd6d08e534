//! The `client` module provides the two thin clients that speak to the
//! broker: a `Producer` that publishes and waits for acks, and a `Consumer`
//! that subscribes, acks each push and hands it to a listener.

mod connection;
pub mod consumer;
pub mod producer;

pub use consumer::{Consumer, MessageListener};
pub use producer::{Producer, SendResult, SendStatus};

#[cfg(test)]
mod tests;
