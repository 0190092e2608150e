use std::fmt;
use std::path::{Path, PathBuf};

use crate::config::{EndpointConfig, TransportMode};
use crate::error::RelayError;

const BROADCAST_SOCKET: &str = "pub.sock";
const INGEST_SOCKET: &str = "pull.sock";

/// Which side of the relay an address belongs to.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Role {
  /// Downstream PUB socket.
  Broadcast,
  /// Upstream PULL/SUB sockets.
  Ingest,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Direction {
  Bind,
  Connect,
}

impl fmt::Display for Direction {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Direction::Bind => f.write_str("bind"),
      Direction::Connect => f.write_str("connect"),
    }
  }
}

/// Computes candidate addresses from the configured transport mode.
///
/// No sockets are touched here. The only side effect is creating the IPC directory the
/// first time an IPC address is produced.
#[derive(Clone, Debug)]
pub struct EndpointResolver {
  transport: TransportMode,
  host: String,
  pub_port: u16,
  pull_port: u16,
  ipc_dir: PathBuf,
}

/// Candidate lists for every (role, direction) pair, in preference order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EndpointPlan {
  pub broadcast_bind: Vec<String>,
  pub broadcast_connect: Vec<String>,
  pub ingest_connect: Vec<String>,
  pub ingest_bind: Vec<String>,
}

impl EndpointPlan {
  /// Candidate list for one (role, direction) pair.
  pub fn get(&self, role: Role, direction: Direction) -> &[String] {
    match (role, direction) {
      (Role::Broadcast, Direction::Bind) => &self.broadcast_bind,
      (Role::Broadcast, Direction::Connect) => &self.broadcast_connect,
      (Role::Ingest, Direction::Connect) => &self.ingest_connect,
      (Role::Ingest, Direction::Bind) => &self.ingest_bind,
    }
  }
}

impl EndpointResolver {
  /// Captures the endpoint settings. Nothing touches the filesystem until resolution.
  pub fn new(config: &EndpointConfig) -> Self {
    Self {
      transport: config.transport,
      host: config.host.clone(),
      pub_port: config.pub_port,
      pull_port: config.pull_port,
      ipc_dir: config.ipc_dir.clone(),
    }
  }

  /// Resolves all four candidate lists at once.
  pub fn resolve(&self) -> Result<EndpointPlan, RelayError> {
    Ok(EndpointPlan {
      broadcast_bind: self.candidates(Role::Broadcast, Direction::Bind)?,
      broadcast_connect: self.candidates(Role::Broadcast, Direction::Connect)?,
      ingest_connect: self.candidates(Role::Ingest, Direction::Connect)?,
      ingest_bind: self.candidates(Role::Ingest, Direction::Bind)?,
    })
  }

  /// Candidates for one (role, direction) pair. In `auto` mode the TCP address always
  /// precedes the IPC address.
  pub fn candidates(&self, role: Role, direction: Direction) -> Result<Vec<String>, RelayError> {
    let candidates = match self.transport {
      TransportMode::Tcp => vec![self.tcp(role, direction)],
      TransportMode::Ipc => vec![self.ipc(role)?],
      TransportMode::Auto => vec![self.tcp(role, direction), self.ipc(role)?],
    };
    Ok(candidates)
  }

  fn tcp(&self, role: Role, direction: Direction) -> String {
    let port = match role {
      Role::Broadcast => self.pub_port,
      Role::Ingest => self.pull_port,
    };
    match direction {
      // Listeners accept on every interface.
      Direction::Bind => format!("tcp://0.0.0.0:{port}"),
      Direction::Connect => format!("tcp://{}:{port}", self.host),
    }
  }

  fn ipc(&self, role: Role) -> Result<String, RelayError> {
    ensure_dir(&self.ipc_dir)?;
    let file = match role {
      Role::Broadcast => BROADCAST_SOCKET,
      Role::Ingest => INGEST_SOCKET,
    };
    Ok(format!("ipc://{}", self.ipc_dir.join(file).display()))
  }
}

fn ensure_dir(dir: &Path) -> Result<(), RelayError> {
  std::fs::create_dir_all(dir).map_err(|source| RelayError::IpcDir {
    path: dir.to_path_buf(),
    source,
  })
}
