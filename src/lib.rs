pub mod broker;
pub mod config;
pub mod error;
pub mod transport;

pub use broker::Relay;
pub use config::RelayConfig;
pub use error::RelayError;
