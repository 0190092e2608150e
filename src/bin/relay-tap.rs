//! Debug subscriber: prints `topic kind seq` for every envelope the relay broadcasts.

use clap::Parser;
use telemetry_relay::broker::{Envelope, Kind, Topic};
use telemetry_relay::config::{EndpointConfig, DEFAULT_CONNECT_TIMEOUT_MS};
use telemetry_relay::transport::{dial, dial_plan, Direction, EndpointResolver, Role};
use tracing_subscriber::EnvFilter;
use zeromq::{Socket, SocketRecv, SubSocket};

#[derive(Parser, Debug)]
#[command(name = "relay-tap")]
#[command(about = "Print every envelope published by the telemetry relay")]
struct Cli {
  #[command(flatten)]
  endpoints: EndpointConfig,

  /// Only show topics starting with this prefix.
  #[arg(long, default_value = "")]
  prefix: String,

  #[arg(long, default_value_t = DEFAULT_CONNECT_TIMEOUT_MS)]
  connect_timeout_ms: u64,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
  tracing_subscriber::fmt().with_env_filter(filter).init();
  let cli = Cli::parse();

  let resolver = EndpointResolver::new(&cli.endpoints);
  let candidates = dial_plan("SUB", &resolver.candidates(Role::Broadcast, Direction::Connect)?)?;
  let mut socket = SubSocket::new();
  socket.subscribe(&cli.prefix).await?;
  let endpoint = dial(
    &mut socket,
    "SUB",
    &candidates,
    std::time::Duration::from_millis(cli.connect_timeout_ms),
  )
  .await;
  println!("[relay-tap] connected to {endpoint}");

  loop {
    let message = socket.recv().await?.into_vec();
    let (topic, body) = match message.as_slice() {
      [topic, body] => (topic.clone(), body.clone()),
      _ => {
        tracing::warn!(frames = message.len(), "unexpected framing");
        continue;
      }
    };
    let topic_name = String::from_utf8_lossy(&topic);
    match Envelope::from_slice(&body) {
      Ok(env) => {
        if Topic::parse(&topic) != Some(env.kind.topic()) {
          tracing::warn!(topic = %topic_name, kind = ?env.kind, "envelope published on a foreign topic");
        }
        let seq = env.seq.map_or_else(|| "-".to_string(), |s| s.to_string());
        println!("{topic_name} {} {seq}", kind_name(env.kind));
      }
      Err(error) => tracing::warn!(topic = %topic_name, %error, "undecodable envelope"),
    }
  }
}

/// The `kind` field exactly as it appears on the wire.
fn kind_name(kind: Kind) -> String {
  match serde_json::to_value(kind) {
    Ok(serde_json::Value::String(name)) => name,
    _ => format!("{kind:?}"),
  }
}
