use std::str::FromStr;
use std::time::Duration;

use tracing::{debug, info};
use zeromq::{Endpoint, Socket};

use crate::error::{Attempts, RelayError};
use crate::transport::endpoints::Direction;

/// Pause between two full rounds of dial attempts.
pub const REDIAL_INTERVAL: Duration = Duration::from_millis(250);

/// Binds `socket` to the first candidate that accepts it.
///
/// Candidates are tried in order and the first success wins. When every candidate fails the
/// error lists each attempted address together with the reason it failed.
///
/// # Arguments
///
/// * `socket` - The socket to bind.
/// * `label` - Short socket name used in logs and errors (`PUB`, `PULL`, ...).
/// * `candidates` - Addresses in preference order.
pub async fn bind_first<S: Socket>(
  socket: &mut S,
  label: &str,
  candidates: &[String],
) -> Result<String, RelayError> {
  let mut attempts = Attempts::default();

  for endpoint in candidates {
    match socket.bind(endpoint).await {
      Ok(bound) => {
        info!(socket = label, %endpoint, %bound, "bound");
        return Ok(endpoint.clone());
      }
      Err(error) => {
        debug!(socket = label, %endpoint, %error, "candidate rejected");
        attempts.record(endpoint, error);
      }
    }
  }

  Err(RelayError::NoEndpoint {
    label: label.to_string(),
    direction: Direction::Bind,
    attempts,
  })
}

/// Keeps the candidates a socket could ever dial, in preference order.
///
/// Dialling does not need the peer to be up, so only addresses that cannot be dialled at all
/// (malformed, unknown transport) are rejected here. Fails when nothing is left.
///
/// # Arguments
///
/// * `label` - Short socket name used in errors.
/// * `candidates` - Addresses in preference order.
pub fn dial_plan(label: &str, candidates: &[String]) -> Result<Vec<String>, RelayError> {
  let mut attempts = Attempts::default();
  let mut dialable = Vec::with_capacity(candidates.len());

  for endpoint in candidates {
    match Endpoint::from_str(endpoint) {
      Ok(_) => dialable.push(endpoint.clone()),
      Err(error) => attempts.record(endpoint, error),
    }
  }

  if dialable.is_empty() {
    return Err(RelayError::NoEndpoint {
      label: label.to_string(),
      direction: Direction::Connect,
      attempts,
    });
  }
  Ok(dialable)
}

/// Dials the candidates in order, round after round, until one peer completes the handshake.
///
/// A candidate nobody listens on, or whose peer is an incompatible socket type, is skipped
/// for this round. Returns the address that answered.
///
/// # Arguments
///
/// * `socket` - The socket to connect.
/// * `label` - Short socket name used in logs.
/// * `candidates` - Dialable addresses, see [`dial_plan`].
/// * `connect_timeout` - Upper bound for each attempt; refused TCP dials are retried inside
///   the socket until it expires.
pub async fn dial<S: Socket>(
  socket: &mut S,
  label: &str,
  candidates: &[String],
  connect_timeout: Duration,
) -> String {
  let mut waiting_logged = false;
  loop {
    for endpoint in candidates {
      match tokio::time::timeout(connect_timeout, socket.connect(endpoint)).await {
        Ok(Ok(())) => {
          info!(socket = label, %endpoint, "connected");
          return endpoint.clone();
        }
        Ok(Err(error)) => debug!(socket = label, %endpoint, %error, "candidate rejected"),
        Err(_) => debug!(socket = label, %endpoint, ?connect_timeout, "candidate timed out"),
      }
    }
    if !waiting_logged {
      info!(socket = label, ?candidates, "no upstream peer yet, still dialling");
      waiting_logged = true;
    }
    tokio::time::sleep(REDIAL_INTERVAL).await;
  }
}
