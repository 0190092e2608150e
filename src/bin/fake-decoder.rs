//! Stand-in for the upstream decoder: pushes a random TELEM, RF or RAW payload every 500 ms.

use std::time::Duration;

use clap::Parser;
use rand::seq::SliceRandom;
use rand::Rng;
use serde_json::{json, Value};
use telemetry_relay::config::EndpointConfig;
use telemetry_relay::transport::{bind_first, Direction, EndpointResolver, Role};
use tracing_subscriber::EnvFilter;
use zeromq::{PushSocket, Socket, SocketSend, ZmqMessage};

#[derive(Parser, Debug)]
#[command(name = "fake-decoder")]
#[command(about = "Push synthetic decoder output to the telemetry relay")]
struct Cli {
  #[command(flatten)]
  endpoints: EndpointConfig,

  #[arg(long, default_value_t = 500)]
  interval_ms: u64,
}

fn fake_payload(seq: u64) -> Value {
  let mut rng = rand::thread_rng();
  match ["TELEM", "RF", "RAW"].choose(&mut rng).copied().unwrap_or("RAW") {
    "TELEM" => json!({
      "type": "TELEM",
      "seq": seq,
      "power": { "battery_voltage": (rng.gen_range(7.0..8.4_f64) * 100.0).round() / 100.0 },
      "orientation": { "roll_deg": (rng.gen_range(-10.0..10.0_f64) * 10.0).round() / 10.0 },
      "radio": { "rssi_dbm": rng.gen_range(-120..=-60) },
    }),
    "RF" => json!({
      "type": "RF",
      "seq": seq,
      "rssi": rng.gen_range(-120..=-60),
      "snr": (rng.gen_range(-5.0..15.0_f64) * 10.0).round() / 10.0,
    }),
    _ => json!({ "type": "RAW", "seq": seq, "bytes_hex": "deadbeef" }),
  }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
  tracing_subscriber::fmt().with_env_filter(filter).init();
  let cli = Cli::parse();

  let candidates = EndpointResolver::new(&cli.endpoints).candidates(Role::Ingest, Direction::Bind)?;
  let mut socket = PushSocket::new();
  let endpoint = bind_first(&mut socket, "PUSH", &candidates).await?;
  tracing::info!(%endpoint, "fake decoder pushing");

  let mut ticker = tokio::time::interval(Duration::from_millis(cli.interval_ms));
  let mut seq = 0;
  loop {
    ticker.tick().await;
    seq += 1;
    let body = serde_json::to_vec(&fake_payload(seq))?;
    // Sending fails until the relay has connected; keep ticking.
    if let Err(error) = socket.send(ZmqMessage::from(body)).await {
      tracing::debug!(seq, %error, "push not delivered");
    }
  }
}
