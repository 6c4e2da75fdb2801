//! Bounded-wait scatter/gather for the Composable Information Machine
//!
//! Fan a request out to many peers, then proceed as soon as enough timely,
//! valid replies are in. The crate is built from three pieces:
//!
//! - [`eventual`] - single-assignment values produced by asynchronous workers
//! - [`gather`] - waits for the first `n` accepted values or a deadline
//! - [`request`] - wraps one remote call over a [`transport`] in an `Eventual`
//!
//! [`weather`] puts them together for a fleet of weather stations.

pub mod config;
pub mod errors;
pub mod eventual;
pub mod gather;
pub mod request;
pub mod transport;
pub mod weather;

// Re-export commonly used types
pub use config::{GatherConfig, NatsConfig, TransportConfig};
pub use errors::{QuorumError, QuorumResult};
pub use eventual::{Completer, Eventual, Outcome};
pub use gather::{wait, Deadline, Exit, Gather, Gathered};
pub use request::fetch;
pub use transport::{RequestHandler, Transport};
