use std::time::Duration;

use futures_util::stream::{Stream, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};
use zeromq::{Socket, SocketEvent, SocketRecv, ZmqMessage, ZmqResult};

use crate::error::TransportError;
use crate::transport::attach::dial;
use crate::transport::Frames;

/// One received multipart message, or the receive error that replaced it.
pub type Inbound = Result<Frames, TransportError>;

/// Moves a bound `socket` into a task that forwards every received message into a bounded
/// queue.
///
/// The task waits while the queue holds `hwm` messages, which stops reading from the socket
/// and pushes backpressure onto the upstream sender. It exits once the receiver is dropped.
pub fn spawn_pump<S>(mut socket: S, label: &'static str, hwm: usize) -> mpsc::Receiver<Inbound>
where
  S: SocketRecv + Send + 'static,
{
  let (tx, rx) = mpsc::channel(hwm.max(1));
  tokio::spawn(async move {
    loop {
      if !forward(socket.recv().await, &tx).await {
        debug!(socket = label, "ingest queue closed, pump stopping");
        break;
      }
    }
  });
  rx
}

/// Like [`spawn_pump`], for a socket that dials its upstream.
///
/// The task dials `candidates` itself, so the relay starts whether or not the upstream is
/// listening yet. When the peer goes away the same candidates are dialled again. Options set
/// on `socket` beforehand, such as subscriptions, carry over to every new peer.
///
/// # Arguments
///
/// * `socket` - The unconnected ingest socket.
/// * `label` - Short socket name used in logs.
/// * `candidates` - Dialable addresses in preference order.
/// * `connect_timeout` - Upper bound for each dial attempt.
/// * `hwm` - Capacity of the ingest queue.
pub fn spawn_dialled_pump<S>(
  mut socket: S,
  label: &'static str,
  candidates: Vec<String>,
  connect_timeout: Duration,
  hwm: usize,
) -> mpsc::Receiver<Inbound>
where
  S: Socket + SocketRecv + Send + 'static,
{
  let (tx, rx) = mpsc::channel(hwm.max(1));
  let mut events = Some(socket.monitor());
  tokio::spawn(async move {
    loop {
      let endpoint = dial(&mut socket, label, &candidates, connect_timeout).await;

      // Events queued while dialling belong to rejected candidates, except the handshake
      // that just succeeded.
      let mut peer = None;
      if let Some(monitor) = events.as_mut() {
        while let Ok(Some(event)) = monitor.try_next() {
          if let SocketEvent::Connected(_, id) = event {
            peer = Some(id);
          }
        }
      }

      loop {
        tokio::select! {
          received = socket.recv() => {
            if !forward(received, &tx).await {
              debug!(socket = label, "ingest queue closed, pump stopping");
              return;
            }
          }
          event = next_event(&mut events) => match event {
            Some(SocketEvent::Connected(_, id)) => peer = Some(id),
            Some(SocketEvent::Disconnected(id)) if peer.as_ref().map_or(true, |p| *p == id) => {
              warn!(socket = label, %endpoint, "upstream peer lost, redialling");
              break;
            }
            Some(_) => {}
            None => {
              warn!(socket = label, "socket monitor closed, peer loss will go unnoticed");
              events = None;
            }
          }
        }
      }
    }
  });
  rx
}

async fn next_event<M>(events: &mut Option<M>) -> Option<M::Item>
where
  M: Stream + Unpin,
{
  match events {
    Some(events) => events.next().await,
    None => std::future::pending().await,
  }
}

async fn forward(received: ZmqResult<ZmqMessage>, tx: &mpsc::Sender<Inbound>) -> bool {
  let item = match received {
    Ok(message) => Ok(message.into_vec()),
    Err(error) => Err(TransportError(error.to_string())),
  };
  tx.send(item).await.is_ok()
}
