use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::transport::endpoints::Direction;

#[derive(Error, Debug)]
pub enum RelayError {
  #[error("failed to {direction} {label} on any candidate endpoint: {attempts}")]
  NoEndpoint {
    label: String,
    direction: Direction,
    attempts: Attempts,
  },
  #[error("failed to create ipc directory {}: {source}", .path.display())]
  IpcDir {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
}

/// Error forwarded by an inbound pump when its socket fails to receive.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{0}")]
pub struct TransportError(pub String);

/// One failed bind/connect attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct Attempt {
  pub endpoint: String,
  pub error: String,
}

/// Ordered record of every candidate tried before giving up.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Attempts(pub Vec<Attempt>);

impl Attempts {
  pub fn record(&mut self, endpoint: &str, error: impl fmt::Display) {
    self.0.push(Attempt {
      endpoint: endpoint.to_string(),
      error: error.to_string(),
    });
  }

  pub fn endpoints(&self) -> Vec<&str> {
    self.0.iter().map(|a| a.endpoint.as_str()).collect()
  }
}

impl fmt::Display for Attempts {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if self.0.is_empty() {
      return f.write_str("no candidates configured");
    }
    for (i, attempt) in self.0.iter().enumerate() {
      if i > 0 {
        f.write_str("; ")?;
      }
      write!(f, "{} ({})", attempt.endpoint, attempt.error)?;
    }
    Ok(())
  }
}
