//! # Transport Module
//!
//! Address negotiation and the ZeroMQ socket plumbing around the relay. Sockets never
//! reach the reactor directly: the broadcast socket sits behind a bounded [`Outbox`] and
//! each ingest socket behind a pump task feeding a bounded queue. Ingest sockets that dial
//! their upstream are connected, and reconnected, by their pump.

pub mod attach;
pub mod endpoints;
pub mod outbox;
pub mod pump;

use bytes::Bytes;

pub use attach::{bind_first, dial, dial_plan};
pub use endpoints::{Direction, EndpointPlan, EndpointResolver, Role};
pub use outbox::Outbox;
pub use pump::{spawn_dialled_pump, spawn_pump, Inbound};

/// Frames of one multipart message.
pub type Frames = Vec<Bytes>;
