use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};
use zeromq::{PubSocket, SocketSend, ZmqMessage};

use crate::transport::Frames;

/// Bounded send queue in front of the broadcast socket.
///
/// Publishing never waits. Once `hwm` messages are queued, new ones are dropped so that
/// subscribers keep seeing fresh telemetry rather than a growing backlog.
pub struct Outbox {
  tx: mpsc::Sender<Frames>,
  dropped: u64,
}

impl Outbox {
  /// Creates an outbox whose queue is drained by the caller.
  pub fn channel(hwm: usize) -> (Self, mpsc::Receiver<Frames>) {
    let (tx, rx) = mpsc::channel(hwm.max(1));
    (Self { tx, dropped: 0 }, rx)
  }

  /// Creates an outbox drained into `socket` by a background task.
  pub fn spawn(socket: PubSocket, hwm: usize) -> Self {
    let (outbox, rx) = Self::channel(hwm);
    tokio::spawn(drain(socket, rx));
    outbox
  }

  /// Queues a `[topic, body]` message. Returns `false` if it was dropped.
  pub fn publish(&mut self, topic: &'static str, body: Bytes) -> bool {
    match self.tx.try_send(vec![Bytes::from_static(topic.as_bytes()), body]) {
      Ok(()) => true,
      Err(TrySendError::Full(_)) => {
        self.dropped += 1;
        debug!(topic, dropped = self.dropped, "send high-water-mark reached, dropping");
        false
      }
      Err(TrySendError::Closed(_)) => {
        warn!(topic, "broadcast writer is gone, dropping");
        false
      }
    }
  }

  /// Messages dropped because the queue was full.
  pub fn dropped(&self) -> u64 {
    self.dropped
  }
}

async fn drain(mut socket: PubSocket, mut rx: mpsc::Receiver<Frames>) {
  while let Some(frames) = rx.recv().await {
    let message = match ZmqMessage::try_from(frames) {
      Ok(message) => message,
      Err(error) => {
        warn!(%error, "skipping unsendable message");
        continue;
      }
    };
    if let Err(error) = socket.send(message).await {
      warn!(%error, "broadcast send failed");
    }
  }
  debug!("broadcast writer stopped");
}
