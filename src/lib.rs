//! # mom
//!
//! `mom` is a minimal message-oriented middleware: a broker that accepts
//! publications from producers, fans them out to every consumer whose
//! topic and property filter match, tracks per-message delivery through
//! acknowledgements, and appends every accepted publication to a durable log.
//! Producers and consumers speak a line-delimited JSON protocol over TCP.
//!
//! ## Core Modules
//!
//! - `broker`: connection registry, in-flight message store and the engine
//!   that routes subscribe, ack and publish records.
//! - `client`: the `Producer` and `Consumer` clients.
//! - `config`: layered configuration loading.
//! - `persistence`: the append-only durable log.
//! - `transport`: the wire codec and the broker's TCP server.
//! - `utils`: error types and tracing setup.

pub mod broker;
pub mod client;
pub mod config;
pub mod persistence;
pub mod transport;
pub mod utils;
