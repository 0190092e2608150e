use std::time::Duration;

use tokio::time::Instant;

use crate::broker::message::Envelope;

pub const HEARTBEAT_PERIOD: Duration = Duration::from_secs(1);

/// Cooperative liveness timer, checked once per reactor turn.
///
/// The next deadline is measured from the previous emission, so each gap between heartbeats
/// lies between one period and one period plus the poll timeout.
#[derive(Debug)]
pub struct Heartbeat {
  period: Duration,
  last: Instant,
  endpoint: String,
}

impl Heartbeat {
  /// Starts the clock now, so the first heartbeat is due one `period` from here.
  ///
  /// # Arguments
  ///
  /// * `endpoint` - Broadcast address carried in every heartbeat.
  /// * `period` - Target gap between heartbeats.
  pub fn new(endpoint: impl Into<String>, period: Duration) -> Self {
    Self {
      period,
      last: Instant::now(),
      endpoint: endpoint.into(),
    }
  }

  /// Returns a heartbeat envelope when a full period has elapsed since the last one.
  pub fn tick(&mut self, now: Instant) -> Option<Envelope> {
    if now.duration_since(self.last) < self.period {
      return None;
    }
    self.last = now;
    Some(Envelope::heartbeat(&self.endpoint))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::broker::message::Kind;

  #[tokio::test(start_paused = true)]
  async fn fires_once_per_period() {
    let mut heartbeat = Heartbeat::new("ipc:///tmp/pub.sock", HEARTBEAT_PERIOD);
    assert!(heartbeat.tick(Instant::now()).is_none());

    tokio::time::advance(Duration::from_millis(999)).await;
    assert!(heartbeat.tick(Instant::now()).is_none());

    tokio::time::advance(Duration::from_millis(1)).await;
    let env = heartbeat.tick(Instant::now()).unwrap();
    assert_eq!(env.kind, Kind::Heartbeat);
    assert_eq!(env.seq, None);
    assert_eq!(env.payload["ok"], true);
    assert_eq!(env.payload["pub"], "ipc:///tmp/pub.sock");

    // Same instant again: already emitted.
    assert!(heartbeat.tick(Instant::now()).is_none());
  }

  #[tokio::test(start_paused = true)]
  async fn late_check_restarts_the_period() {
    let mut heartbeat = Heartbeat::new("tcp://0.0.0.0:5556", HEARTBEAT_PERIOD);
    tokio::time::advance(Duration::from_millis(1040)).await;
    assert!(heartbeat.tick(Instant::now()).is_some());

    tokio::time::advance(Duration::from_millis(960)).await;
    assert!(heartbeat.tick(Instant::now()).is_none());
    tokio::time::advance(Duration::from_millis(40)).await;
    assert!(heartbeat.tick(Instant::now()).is_some());
  }
}
