use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{info, warn};
use zeromq::{PubSocket, PullSocket, Socket, SocketRecv, SubSocket};

use crate::broker::heartbeat::{Heartbeat, HEARTBEAT_PERIOD};
use crate::broker::ingest::{Multiplexer, Outcome, Sequence, POLL_TIMEOUT};
use crate::broker::message::Envelope;
use crate::config::RelayConfig;
use crate::error::RelayError;
use crate::transport::{
  bind_first, dial_plan, spawn_dialled_pump, spawn_pump, Direction, EndpointPlan, EndpointResolver, Inbound,
  Outbox, Role,
};

/// Pause after the startup announcement so early subscribers finish connecting.
pub const SLOW_JOINER_DELAY: Duration = Duration::from_millis(250);

/// Reactor that moves decoder output onto the broadcast topics.
///
/// Owns the only mutable state that outlives a turn: the sequence counter and the
/// heartbeat clock.
pub struct Relay {
  outbox: Outbox,
  ingest: Multiplexer,
  heartbeat: Heartbeat,
  seq: Sequence,
  endpoint: String,
}

impl Relay {
  /// Assembles a relay around already opened queues.
  ///
  /// # Arguments
  ///
  /// * `outbox` - Queue in front of the broadcast socket.
  /// * `ingest` - The ingest channels to poll.
  /// * `endpoint` - Broadcast address reported in heartbeats and the startup event.
  pub fn new(outbox: Outbox, ingest: Multiplexer, endpoint: impl Into<String>) -> Self {
    let endpoint = endpoint.into();
    Self {
      outbox,
      ingest,
      heartbeat: Heartbeat::new(endpoint.clone(), HEARTBEAT_PERIOD),
      seq: Sequence::default(),
      endpoint,
    }
  }

  /// Binds the broadcast socket and opens every configured ingest socket.
  ///
  /// Bound sockets take the first candidate address that works, and startup fails if one runs
  /// out of candidates. Dialling ingest sockets only need one dialable candidate: their pump
  /// keeps dialling until the upstream answers, so the relay may start before the decoder.
  ///
  /// # Arguments
  ///
  /// * `config` - Endpoints, queue limits and ingest mode.
  pub async fn bind(config: &RelayConfig) -> Result<Self, RelayError> {
    let plan = EndpointResolver::new(&config.endpoints).resolve()?;

    let mut publisher = PubSocket::new();
    let endpoint = bind_first(&mut publisher, "PUB", &plan.broadcast_bind).await?;
    let outbox = Outbox::spawn(publisher, config.sndhwm);

    let pull = if config.upstream_mode.wants_pull() {
      Some(open_ingest(PullSocket::new(), "PULL", config.pull_bind, &plan, config).await?)
    } else {
      None
    };

    let sub = if config.upstream_mode.wants_sub() {
      // Subscriptions are replayed to every peer the socket gains later.
      let mut socket = SubSocket::new();
      subscribe(&mut socket, &config.sub_prefix).await;
      Some(open_ingest(socket, "SUB", config.sub_bind, &plan, config).await?)
    } else {
      None
    };

    Ok(Self::new(outbox, Multiplexer::new(pull, sub), endpoint))
  }

  /// Broadcast address actually bound.
  pub fn endpoint(&self) -> &str {
    &self.endpoint
  }

  /// Number of application messages forwarded so far.
  pub fn sequence(&self) -> u64 {
    self.seq.current()
  }

  /// Queue in front of the broadcast socket, mostly useful for its drop counter.
  pub fn outbox(&self) -> &Outbox {
    &self.outbox
  }

  /// Emits the startup status event naming the bound broadcast address.
  pub fn announce(&mut self) -> bool {
    Envelope::started(&self.endpoint).publish(&mut self.outbox)
  }

  /// One reactor iteration: heartbeat check, then a bounded poll of the ingest channels.
  pub async fn turn(&mut self) -> Option<Outcome> {
    if let Some(heartbeat) = self.heartbeat.tick(Instant::now()) {
      heartbeat.publish(&mut self.outbox);
    }
    self
      .ingest
      .service(POLL_TIMEOUT, &mut self.seq, &mut self.outbox)
      .await
  }

  /// Announces, waits out the slow-joiner window and runs the reactor forever.
  pub async fn run(mut self) {
    info!(endpoint = %self.endpoint, "publishing downstream");
    self.announce();
    tokio::time::sleep(SLOW_JOINER_DELAY).await;

    self.heartbeat = Heartbeat::new(self.endpoint.clone(), HEARTBEAT_PERIOD);
    if self.ingest.is_idle() {
      warn!("no ingest channel configured, relaying heartbeats only");
    }
    loop {
      self.turn().await;
    }
  }
}

/// Binds or dials one ingest socket and hands it to a pump.
async fn open_ingest<S>(
  mut socket: S,
  label: &'static str,
  bind: bool,
  plan: &EndpointPlan,
  config: &RelayConfig,
) -> Result<mpsc::Receiver<Inbound>, RelayError>
where
  S: Socket + SocketRecv + Send + 'static,
{
  if bind {
    bind_first(&mut socket, label, plan.get(Role::Ingest, Direction::Bind)).await?;
    return Ok(spawn_pump(socket, label, config.rcvhwm));
  }
  let candidates = dial_plan(label, plan.get(Role::Ingest, Direction::Connect))?;
  Ok(spawn_dialled_pump(
    socket,
    label,
    candidates,
    config.connect_timeout(),
    config.rcvhwm,
  ))
}

async fn subscribe(socket: &mut SubSocket, prefix: &str) {
  if let Err(error) = socket.subscribe(prefix).await {
    warn!(%error, prefix, "subscription failed, SUB ingest will stay silent");
  }
}

/// Ingest queue fed by hand instead of by a pump.
#[cfg(test)]
pub(crate) fn ingest_channel(hwm: usize) -> (mpsc::Sender<Inbound>, mpsc::Receiver<Inbound>) {
  mpsc::channel(hwm.max(1))
}
