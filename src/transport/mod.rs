//! The `transport` module is responsible for network communication with
//! producers and consumers over TCP.
//!
//! It defines the line-delimited wire codec shared by the broker and the
//! clients, and implements the broker's server loop: accepting connections,
//! decoding frames and forwarding records to the broker.

pub mod codec;
pub mod server;

pub use codec::RecordCodec;
pub use server::{ConnectionLimits, serve, start_server};
