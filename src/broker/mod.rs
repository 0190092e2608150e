//! # Broker Module
//!
//! The relay core: envelope construction, topic routing, the ingest multiplexer, the
//! heartbeat timer, and the `Relay` reactor that composes them. Everything here runs on a
//! single task; sockets live behind the queues in [`crate::transport`].

pub mod heartbeat;
pub mod ingest;
pub mod message;
pub mod relay;
pub mod topic;

pub use heartbeat::Heartbeat;
pub use ingest::{Channel, Delivery, Multiplexer, Outcome, Sequence};
pub use message::{make_envelope, Envelope, Kind};
pub use relay::Relay;
pub use topic::{route_topic, PayloadExt, Topic};
