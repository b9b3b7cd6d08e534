//! The `utils` module holds the pieces shared by the broker and the clients:
//! the error types and the tracing setup.

pub mod error;
pub mod logging;

pub use error::{BrokerError, ClientError, CodecError, PersistenceError};
