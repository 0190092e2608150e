use std::time::Duration;

use bytes::Bytes;
use serde_json::{json, Value};
use tokio::sync::mpsc::Receiver;
use tracing::{trace, warn};

use crate::broker::message::{make_envelope, Envelope, Kind};
use crate::broker::topic::{route_topic, Topic};
use crate::transport::{Frames, Inbound, Outbox};

/// Upper bound on one poll, short enough that the heartbeat is never starved.
pub const POLL_TIMEOUT: Duration = Duration::from_millis(50);

/// Inbound messaging pattern a delivery arrived on.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Channel {
  /// Point-to-point: every message is addressed to this relay.
  Pull,
  /// Broadcast subscription: may carry binary frames that are not JSON.
  Sub,
}

impl Channel {
  /// Socket name used in logs (`PULL`, `SUB`).
  pub fn label(self) -> &'static str {
    match self {
      Channel::Pull => "PULL",
      Channel::Sub => "SUB",
    }
  }

  fn recv_error_status(self) -> &'static str {
    match self {
      Channel::Pull => "pull_recv_error",
      Channel::Sub => "sub_recv_error",
    }
  }
}

/// One item taken off an ingest queue, tagged with the channel it came from.
#[derive(Debug)]
pub struct Delivery {
  pub channel: Channel,
  pub inbound: Inbound,
}

/// What the relay did with one delivery.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
  /// An application envelope was handed to the outbox.
  Forwarded { topic: Topic, seq: u64 },
  /// The delivery could not be taken in and a status event was emitted instead.
  Reported,
}

/// Process-lifetime counter of forwarded application messages.
#[derive(Debug, Default)]
pub struct Sequence(u64);

impl Sequence {
  /// Bumps the counter and returns the new value; the first message is numbered 1.
  pub fn advance(&mut self) -> u64 {
    self.0 += 1;
    self.0
  }

  /// Last number handed out, 0 before the first message.
  pub fn current(&self) -> u64 {
    self.0
  }
}

/// A broadcast frame that did not decode, kept verbatim instead of discarded.
#[derive(Clone, Debug, PartialEq)]
pub struct RawFrame {
  pub upstream_topic: Bytes,
  pub body: Bytes,
}

impl RawFrame {
  /// Envelope payload for the frame.
  ///
  /// The body travels hex-encoded under `bytes_b64`, the key downstream consumers
  /// already read.
  pub fn payload(&self) -> Value {
    json!({
      "upstream_topic": String::from_utf8_lossy(&self.upstream_topic),
      "bytes_b64": hex::encode(&self.body),
    })
  }
}

/// Fair poller over the PULL and SUB ingest queues.
pub struct Multiplexer {
  pull: Option<Receiver<Inbound>>,
  sub: Option<Receiver<Inbound>>,
}

impl Multiplexer {
  /// Creates a multiplexer over the ingest queues that are configured.
  ///
  /// # Arguments
  ///
  /// * `pull` - Queue fed by the PULL socket, if any.
  /// * `sub` - Queue fed by the SUB socket, if any.
  pub fn new(pull: Option<Receiver<Inbound>>, sub: Option<Receiver<Inbound>>) -> Self {
    Self { pull, sub }
  }

  /// True when no ingest channel is open.
  pub fn is_idle(&self) -> bool {
    self.pull.is_none() && self.sub.is_none()
  }

  /// Waits up to `timeout` for the next delivery from either channel.
  ///
  /// When both channels are ready the pick is randomized, so neither can starve the other.
  /// Order within a single channel is preserved.
  pub async fn poll(&mut self, timeout: Duration) -> Option<Delivery> {
    tokio::time::timeout(timeout, self.next()).await.ok()
  }

  async fn next(&mut self) -> Delivery {
    loop {
      let (channel, item) = tokio::select! {
        item = recv(&mut self.pull) => (Channel::Pull, item),
        item = recv(&mut self.sub) => (Channel::Sub, item),
      };
      match item {
        Some(inbound) => return Delivery { channel, inbound },
        None => {
          warn!(channel = channel.label(), "ingest channel closed");
          match channel {
            Channel::Pull => self.pull = None,
            Channel::Sub => self.sub = None,
          }
        }
      }
    }
  }

  /// Polls once and dispatches whatever arrived.
  ///
  /// # Arguments
  ///
  /// * `timeout` - Upper bound on the wait.
  /// * `seq` - Counter numbering forwarded messages.
  /// * `outbox` - Where envelopes are queued.
  ///
  /// # Returns
  ///
  /// `None` when nothing arrived in time.
  pub async fn service(
    &mut self,
    timeout: Duration,
    seq: &mut Sequence,
    outbox: &mut Outbox,
  ) -> Option<Outcome> {
    let delivery = self.poll(timeout).await?;
    Some(dispatch(delivery, seq, outbox))
  }
}

async fn recv(rx: &mut Option<Receiver<Inbound>>) -> Option<Inbound> {
  match rx {
    Some(rx) => rx.recv().await,
    None => std::future::pending().await,
  }
}

/// Decodes, classifies and forwards one delivery.
///
/// A PULL body that is not JSON becomes a status event. A SUB body that is not JSON becomes a
/// raw-frame envelope carrying the original bytes. Neither path is fatal.
///
/// # Arguments
///
/// * `delivery` - The received frames, or the receive error.
/// * `seq` - Advanced once for every forwarded application message.
/// * `outbox` - Where the resulting envelope is queued.
pub fn dispatch(delivery: Delivery, seq: &mut Sequence, outbox: &mut Outbox) -> Outcome {
  let Delivery { channel, inbound } = delivery;
  let frames = match inbound {
    Ok(frames) => frames,
    Err(error) => {
      warn!(channel = channel.label(), %error, "receive failed");
      return report(outbox, channel.recv_error_status(), &error.to_string());
    }
  };

  match channel {
    Channel::Pull => match decode_point_to_point(&frames) {
      Ok(payload) => forward(payload, seq, outbox),
      Err(error) => {
        warn!(channel = channel.label(), %error, "undecodable message");
        report(outbox, channel.recv_error_status(), &error.to_string())
      }
    },
    Channel::Sub => match decode_broadcast(frames) {
      Ok(payload) => forward(payload, seq, outbox),
      Err(raw) => {
        let seq = seq.advance();
        let envelope = make_envelope(Kind::RawFrame, raw.payload(), Some(seq), None);
        envelope.publish(outbox);
        trace!(seq, bytes = raw.body.len(), "forwarded opaque frame");
        Outcome::Forwarded {
          topic: Topic::RawFrame,
          seq,
        }
      }
    },
  }
}

fn forward(payload: Value, seq: &mut Sequence, outbox: &mut Outbox) -> Outcome {
  let (topic, kind) = route_topic(&payload);
  let seq = seq.advance();
  make_envelope(kind, payload, Some(seq), None).publish(outbox);
  trace!(seq, topic = topic.as_str(), "forwarded");
  Outcome::Forwarded { topic, seq }
}

fn report(outbox: &mut Outbox, status: &str, error: &str) -> Outcome {
  Envelope::recv_error(status, error).publish(outbox);
  Outcome::Reported
}

/// A point-to-point message is its last frame.
fn decode_point_to_point(frames: &[Bytes]) -> serde_json::Result<Value> {
  let body = frames.last().map_or(&[][..], |b| &b[..]);
  serde_json::from_slice(body)
}

/// A broadcast message is either `[body]` or `[upstream topic, body]`.
fn decode_broadcast(frames: Frames) -> Result<Value, RawFrame> {
  let (upstream_topic, body) = split_broadcast(frames);
  serde_json::from_slice(&body).map_err(|_| RawFrame {
    upstream_topic,
    body,
  })
}

fn split_broadcast(frames: Frames) -> (Bytes, Bytes) {
  let mut frames = frames.into_iter();
  match (frames.next(), frames.next(), frames.next()) {
    (Some(topic), Some(body), None) => (topic, body),
    (Some(body), _, _) => (Bytes::new(), body),
    (None, _, _) => (Bytes::new(), Bytes::new()),
  }
}
