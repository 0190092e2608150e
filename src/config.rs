//! # Configuration
//!
//! Every knob is a long flag that falls back to an environment variable and then to a
//! default, so the relay can be driven entirely from its service environment.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, ValueEnum};

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PUB_PORT: u16 = 5556;
pub const DEFAULT_PULL_PORT: u16 = 6000;
pub const DEFAULT_IPC_DIR: &str = "/tmp/cubesat-zmq";
pub const DEFAULT_HWM: usize = 1000;
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 1000;

/// Which address families the endpoint resolver offers.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum TransportMode {
  Tcp,
  Ipc,
  /// TCP first, IPC as fallback.
  Auto,
}

/// Which upstream channels the relay reads from.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum IngestMode {
  Pull,
  Sub,
  /// Both channels, PULL attached first.
  Auto,
}

impl IngestMode {
  pub fn wants_pull(self) -> bool {
    matches!(self, IngestMode::Pull | IngestMode::Auto)
  }

  pub fn wants_sub(self) -> bool {
    matches!(self, IngestMode::Sub | IngestMode::Auto)
  }
}

/// Address inputs shared by the relay and its companion tools.
#[derive(Args, Clone, Debug, PartialEq)]
pub struct EndpointConfig {
  #[arg(long, env = "ZMQ_TRANSPORT", value_enum, ignore_case = true, default_value = "auto")]
  pub transport: TransportMode,

  #[arg(long, env = "ZMQ_HOST", default_value = DEFAULT_HOST)]
  pub host: String,

  /// Port of the downstream broadcast (PUB) socket.
  #[arg(long, env = "ZMQ_PUB_PORT", default_value_t = DEFAULT_PUB_PORT)]
  pub pub_port: u16,

  /// Port of the upstream ingest (PULL/SUB) sockets.
  #[arg(long, env = "ZMQ_PULL_PORT", default_value_t = DEFAULT_PULL_PORT)]
  pub pull_port: u16,

  #[arg(long, env = "ZMQ_IPC_DIR", default_value = DEFAULT_IPC_DIR)]
  pub ipc_dir: PathBuf,
}

impl Default for EndpointConfig {
  fn default() -> Self {
    Self {
      transport: TransportMode::Auto,
      host: DEFAULT_HOST.to_string(),
      pub_port: DEFAULT_PUB_PORT,
      pull_port: DEFAULT_PULL_PORT,
      ipc_dir: PathBuf::from(DEFAULT_IPC_DIR),
    }
  }
}

#[derive(Parser, Clone, Debug, PartialEq)]
#[command(name = "telemetry-relay")]
#[command(about = "Relay decoder output onto versioned telemetry topics")]
pub struct RelayConfig {
  #[command(flatten)]
  pub endpoints: EndpointConfig,

  /// Send-side high-water-mark of the broadcast socket; excess messages are dropped.
  #[arg(long, env = "ZMQ_SNDHWM", default_value_t = DEFAULT_HWM)]
  pub sndhwm: usize,

  /// Receive-side high-water-mark of each ingest socket.
  #[arg(long, env = "ZMQ_RCVHWM", default_value_t = DEFAULT_HWM)]
  pub rcvhwm: usize,

  #[arg(long, env = "UPSTREAM_MODE", value_enum, ignore_case = true, default_value = "auto")]
  pub upstream_mode: IngestMode,

  /// Listen for the decoder's PUSH socket instead of dialing it.
  #[arg(long, env = "UPSTREAM_PULL_BIND")]
  pub pull_bind: bool,

  /// Listen for the decoder's PUB socket instead of dialing it.
  #[arg(long, env = "UPSTREAM_SUB_BIND")]
  pub sub_bind: bool,

  /// Topic prefix filter for the SUB ingest channel; empty receives everything.
  #[arg(long, env = "UPSTREAM_SUB_PREFIX", default_value = "")]
  pub sub_prefix: String,

  #[arg(long, env = "RELAY_CONNECT_TIMEOUT_MS", default_value_t = DEFAULT_CONNECT_TIMEOUT_MS)]
  pub connect_timeout_ms: u64,
}

impl RelayConfig {
  /// Upper bound for one dial attempt.
  pub fn connect_timeout(&self) -> Duration {
    Duration::from_millis(self.connect_timeout_ms)
  }
}

impl Default for RelayConfig {
  fn default() -> Self {
    Self {
      endpoints: EndpointConfig::default(),
      sndhwm: DEFAULT_HWM,
      rcvhwm: DEFAULT_HWM,
      upstream_mode: IngestMode::Auto,
      pull_bind: false,
      sub_bind: false,
      sub_prefix: String::new(),
      connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn flags_override_defaults() {
    let config = RelayConfig::parse_from([
      "telemetry-relay",
      "--transport",
      "IPC",
      "--pub-port",
      "7000",
      "--upstream-mode",
      "sub",
      "--sub-bind",
      "--sub-prefix",
      "telem",
    ]);
    assert_eq!(config.endpoints.transport, TransportMode::Ipc);
    assert_eq!(config.endpoints.pub_port, 7000);
    assert_eq!(config.upstream_mode, IngestMode::Sub);
    assert!(config.sub_bind);
    assert!(!config.pull_bind);
    assert_eq!(config.sub_prefix, "telem");
  }

  #[test]
  fn ingest_mode_selects_channels() {
    assert!(IngestMode::Auto.wants_pull() && IngestMode::Auto.wants_sub());
    assert!(IngestMode::Pull.wants_pull() && !IngestMode::Pull.wants_sub());
    assert!(!IngestMode::Sub.wants_pull() && IngestMode::Sub.wants_sub());
  }

  #[test]
  fn defaults_match_documented_values() {
    let config = RelayConfig::default();
    assert_eq!(config.endpoints.transport, TransportMode::Auto);
    assert_eq!(config.endpoints.host, "127.0.0.1");
    assert_eq!(config.endpoints.pub_port, 5556);
    assert_eq!(config.endpoints.pull_port, 6000);
    assert_eq!(config.sndhwm, 1000);
    assert_eq!(config.rcvhwm, 1000);
    assert_eq!(config.connect_timeout(), Duration::from_secs(1));
  }
}
