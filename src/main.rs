use clap::Parser;
use telemetry_relay::{Relay, RelayConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
  tracing_subscriber::fmt().with_env_filter(filter).init();
  let config = RelayConfig::parse();

  tracing::info!(
    transport = ?config.endpoints.transport,
    upstream_mode = ?config.upstream_mode,
    "starting telemetry relay"
  );
  let relay = Relay::bind(&config).await?;
  relay.run().await;
  Ok(())
}
