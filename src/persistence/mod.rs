//! The `persistence` module provides the broker's durable log.
//!
//! Each accepted publication is appended verbatim to a single file and
//! synced before the producer is acknowledged. Replay on restart is not
//! supported; the log is write-only from the broker's point of view.

pub mod append_log;

pub use append_log::{AppendLog, DurableLog};

#[cfg(test)]
mod tests;
