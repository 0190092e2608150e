use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::warn;
use uuid::Uuid;

use crate::transport::Outbox;

/// Value of the `v` field.
pub const SCHEMA_VERSION: u32 = 1;

/// Upstream origin stamped on every envelope.
pub const SOURCE: &str = "gnuradio-decoder";

/// What an envelope carries. Serialized with the same dotted names as the topics.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Kind {
  #[serde(rename = "telem.decoded")]
  Telemetry,
  #[serde(rename = "rf.metrics")]
  RfMetrics,
  #[serde(rename = "raw.frame")]
  RawFrame,
  #[serde(rename = "event.heartbeat")]
  Heartbeat,
  #[serde(rename = "event.status")]
  Status,
}

/// The versioned wrapper placed on the broadcast socket around every payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
  pub v: u32,
  pub id: String,
  pub ts_ms: i64,
  pub source: String,
  /// Only forwarded application messages are numbered; `null` otherwise.
  pub seq: Option<u64>,
  pub kind: Kind,
  pub payload: Value,
  #[serde(default)]
  pub quality: Map<String, Value>,
}

/// Wraps `payload` with a fresh id and the current wall-clock time.
///
/// # Arguments
///
/// * `kind` - What the payload is; decides the topic.
/// * `payload` - The message body, passed through untouched.
/// * `seq` - Sequence number for forwarded application messages.
/// * `quality` - Optional link-quality annotations, empty when `None`.
pub fn make_envelope(
  kind: Kind,
  payload: Value,
  seq: Option<u64>,
  quality: Option<Map<String, Value>>,
) -> Envelope {
  Envelope {
    v: SCHEMA_VERSION,
    id: Uuid::new_v4().to_string(),
    ts_ms: chrono::Utc::now().timestamp_millis(),
    source: SOURCE.to_string(),
    seq,
    kind,
    payload,
    quality: quality.unwrap_or_default(),
  }
}

impl Envelope {
  /// Liveness event naming the broadcast address.
  pub fn heartbeat(endpoint: &str) -> Self {
    make_envelope(Kind::Heartbeat, json!({ "ok": true, "pub": endpoint }), None, None)
  }

  /// Startup status event naming the broadcast address.
  pub fn started(endpoint: &str) -> Self {
    make_envelope(
      Kind::Status,
      json!({ "status": "started", "pub": endpoint }),
      None,
      None,
    )
  }

  /// Status event describing a message that could not be taken in.
  pub fn recv_error(status: &str, error: &str) -> Self {
    make_envelope(
      Kind::Status,
      json!({ "status": status, "error": error }),
      None,
      None,
    )
  }

  /// Encodes the envelope as its JSON wire form.
  pub fn to_bytes(&self) -> serde_json::Result<Bytes> {
    serde_json::to_vec(self).map(Bytes::from)
  }

  /// Serializes and queues the envelope on the topic matching its kind.
  pub fn publish(&self, outbox: &mut Outbox) -> bool {
    match self.to_bytes() {
      Ok(body) => outbox.publish(self.kind.topic().as_str(), body),
      Err(error) => {
        warn!(%error, kind = ?self.kind, "envelope not encodable");
        false
      }
    }
  }

  /// Decodes an envelope from its JSON wire form.
  ///
  /// # Arguments
  ///
  /// * `bytes` - The body frame of a broadcast message.
  pub fn from_slice(bytes: &[u8]) -> serde_json::Result<Self> {
    serde_json::from_slice(bytes)
  }
}
