use serde_json::Value;

use crate::broker::message::Kind;

/// Top-level sections that only decoded satellite telemetry carries.
const TELEMETRY_SECTIONS: [&str; 3] = ["power", "orientation", "radio"];
const TELEMETRY_TAGS: [&str; 3] = ["TELEM", "TELEMETRY", "DECODED_TELEM"];
const RF_TAGS: [&str; 3] = ["RF", "LINK", "RF_METRICS"];

/// Fixed topics of the broadcast socket.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Topic {
  Telemetry,
  RfMetrics,
  RawFrame,
  Heartbeat,
  Status,
}

impl Topic {
  pub const ALL: [Topic; 5] = [
    Topic::Telemetry,
    Topic::RfMetrics,
    Topic::RawFrame,
    Topic::Heartbeat,
    Topic::Status,
  ];

  /// The wire identifier subscribers filter on.
  pub const fn as_str(self) -> &'static str {
    match self {
      Topic::Telemetry => "telem.decoded",
      Topic::RfMetrics => "rf.metrics",
      Topic::RawFrame => "raw.frame",
      Topic::Heartbeat => "event.heartbeat",
      Topic::Status => "event.status",
    }
  }

  /// Looks up a topic by its wire identifier.
  pub fn parse(name: &[u8]) -> Option<Topic> {
    Topic::ALL.into_iter().find(|t| t.as_str().as_bytes() == name)
  }
}

impl Kind {
  /// Topic envelopes of this kind are published on.
  pub const fn topic(self) -> Topic {
    match self {
      Kind::Telemetry => Topic::Telemetry,
      Kind::RfMetrics => Topic::RfMetrics,
      Kind::RawFrame => Topic::RawFrame,
      Kind::Heartbeat => Topic::Heartbeat,
      Kind::Status => Topic::Status,
    }
  }
}

/// Permissive accessors over loosely structured upstream payloads.
///
/// Every accessor answers `false`/`None` for shapes it does not understand instead of
/// failing, so classification never errors.
pub trait PayloadExt {
  fn has_key(&self, key: &str) -> bool;

  /// The field as a string, if it is a non-empty string.
  fn str_field(&self, key: &str) -> Option<&str>;
}

impl PayloadExt for Value {
  fn has_key(&self, key: &str) -> bool {
    self.as_object().is_some_and(|map| map.contains_key(key))
  }

  fn str_field(&self, key: &str) -> Option<&str> {
    self.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
  }
}

/// Classifies an upstream payload onto a topic.
///
/// Telemetry sections win over any explicit type tag, so telemetry still lands on the right
/// topic when the decoder omits or mislabels the tag. Anything unrecognized is a raw frame.
pub fn route_topic(payload: &Value) -> (Topic, Kind) {
  if TELEMETRY_SECTIONS.iter().any(|key| payload.has_key(key)) {
    return (Topic::Telemetry, Kind::Telemetry);
  }

  let tag = payload
    .str_field("type")
    .or_else(|| payload.str_field("kind"))
    .map(str::to_uppercase)
    .unwrap_or_default();

  if TELEMETRY_TAGS.contains(&tag.as_str()) {
    (Topic::Telemetry, Kind::Telemetry)
  } else if RF_TAGS.contains(&tag.as_str()) {
    (Topic::RfMetrics, Kind::RfMetrics)
  } else {
    (Topic::RawFrame, Kind::RawFrame)
  }
}
