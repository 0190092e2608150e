use std::path::Path;
use std::time::Duration;

use bytes::Bytes;
use telemetry_relay::broker::{Envelope, Kind};
use telemetry_relay::config::{EndpointConfig, IngestMode, TransportMode};
use telemetry_relay::{Relay, RelayConfig};
use tokio::time::{timeout, Instant};
use zeromq::{PubSocket, PushSocket, Socket, SocketRecv, SocketSend, SubSocket, ZmqMessage};

const DEADLINE: Duration = Duration::from_secs(5);

fn ipc_config(dir: &Path, upstream_mode: IngestMode) -> RelayConfig {
  RelayConfig {
    endpoints: EndpointConfig {
      transport: TransportMode::Ipc,
      ipc_dir: dir.to_path_buf(),
      ..EndpointConfig::default()
    },
    upstream_mode,
    ..RelayConfig::default()
  }
}

fn ipc(dir: &Path, file: &str) -> String {
  format!("ipc://{}", dir.join(file).display())
}

async fn next_envelope(sub: &mut SubSocket) -> (String, Envelope) {
  let frames = timeout(DEADLINE, sub.recv())
    .await
    .expect("Timed out waiting for the relay")
    .expect("Failed to receive")
    .into_vec();
  assert_eq!(frames.len(), 2, "relay publishes [topic, body]");
  let topic = String::from_utf8(frames[0].to_vec()).unwrap();
  (topic, Envelope::from_slice(&frames[1]).expect("Relay published a bad envelope"))
}

/// Receives until an envelope of `kind` shows up.
async fn wait_for(sub: &mut SubSocket, kind: Kind) -> (String, Envelope) {
  let started = Instant::now();
  loop {
    assert!(started.elapsed() < DEADLINE, "never saw {kind:?}");
    let (topic, env) = next_envelope(sub).await;
    if env.kind == kind {
      return (topic, env);
    }
  }
}

fn free_port() -> u16 {
  let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
  listener.local_addr().unwrap().port()
}

/// Sends once the relay has dialled in; a PUSH without peers refuses the message.
async fn push_when_connected(push: &mut PushSocket, body: &str) {
  let started = Instant::now();
  while push.send(ZmqMessage::from(body.to_string())).await.is_err() {
    assert!(started.elapsed() < DEADLINE, "relay never dialled the upstream");
    tokio::time::sleep(Duration::from_millis(20)).await;
  }
}

async fn downstream(dir: &Path) -> SubSocket {
  subscribe_to(&ipc(dir, "pub.sock")).await
}

async fn subscribe_to(endpoint: &str) -> SubSocket {
  let mut sub = SubSocket::new();
  sub
    .connect(endpoint)
    .await
    .expect("Failed to connect downstream");
  sub.subscribe("").await.expect("Failed to subscribe");
  // A heartbeat proves the subscription reached the relay.
  wait_for(&mut sub, Kind::Heartbeat).await;
  sub
}

#[tokio::test]
async fn pull_ingest_reaches_downstream_subscribers() {
  let dir = tempfile::tempdir().unwrap();
  let mut config = ipc_config(dir.path(), IngestMode::Pull);
  config.pull_bind = true;

  let relay = Relay::bind(&config).await.expect("Failed to start relay");
  assert_eq!(relay.endpoint(), ipc(dir.path(), "pub.sock"));
  tokio::spawn(relay.run());

  let mut sub = downstream(dir.path()).await;

  let mut push = PushSocket::new();
  push
    .connect(&ipc(dir.path(), "pull.sock"))
    .await
    .expect("Failed to connect upstream");
  push
    .send(ZmqMessage::from(r#"{"power":{"battery_voltage":7.9}}"#.to_string()))
    .await
    .expect("Failed to push");

  let (topic, env) = wait_for(&mut sub, Kind::Telemetry).await;
  assert_eq!(topic, "telem.decoded");
  assert_eq!(env.seq, Some(1));
  assert_eq!(env.payload["power"]["battery_voltage"], 7.9);

  push
    .send(ZmqMessage::from("definitely { not json".to_string()))
    .await
    .expect("Failed to push");
  let (topic, env) = wait_for(&mut sub, Kind::Status).await;
  assert_eq!(topic, "event.status");
  assert_eq!(env.payload["status"], "pull_recv_error");

  // Still running after the bad message.
  push
    .send(ZmqMessage::from(r#"{"type":"RF"}"#.to_string()))
    .await
    .expect("Failed to push");
  let (topic, env) = wait_for(&mut sub, Kind::RfMetrics).await;
  assert_eq!(topic, "rf.metrics");
  assert_eq!(env.seq, Some(2));
}

#[tokio::test]
async fn sub_ingest_keeps_binary_frames() {
  let dir = tempfile::tempdir().unwrap();
  let config = ipc_config(dir.path(), IngestMode::Sub);

  // The upstream publisher listens; the relay dials it.
  let mut upstream = PubSocket::new();
  upstream
    .bind(&ipc(dir.path(), "pull.sock"))
    .await
    .expect("Failed to bind upstream");

  let relay = Relay::bind(&config).await.expect("Failed to start relay");
  tokio::spawn(relay.run());
  let mut sub = downstream(dir.path()).await;

  // The relay's own subscription may still be propagating; repeat until one lands.
  let started = Instant::now();
  let env = loop {
    assert!(started.elapsed() < DEADLINE, "raw frame never relayed");
    let mut message = ZmqMessage::from(Bytes::from_static(b"iq"));
    message.push_back(Bytes::from_static(b"\xde\xad\xbe\xef"));
    upstream.send(message).await.expect("Failed to publish upstream");

    if let Ok((_, env)) = timeout(Duration::from_millis(200), next_envelope(&mut sub)).await {
      if env.kind == Kind::RawFrame {
        break env;
      }
    }
  };

  assert_eq!(env.payload["upstream_topic"], "iq");
  assert_eq!(env.payload["bytes_b64"], "deadbeef");
  assert!(env.seq.is_some());
}

#[tokio::test]
async fn default_modes_serve_a_push_upstream_and_a_pub_upstream() {
  let dir = tempfile::tempdir().unwrap();
  let pub_port = free_port();
  let pull_port = free_port();
  let config = RelayConfig {
    endpoints: EndpointConfig {
      transport: TransportMode::Auto,
      pub_port,
      pull_port,
      ipc_dir: dir.path().to_path_buf(),
      ..EndpointConfig::default()
    },
    upstream_mode: IngestMode::Auto,
    ..RelayConfig::default()
  };

  // Nothing upstream is listening yet.
  let relay = Relay::bind(&config).await.expect("Failed to start relay");
  assert_eq!(relay.endpoint(), format!("tcp://0.0.0.0:{pub_port}"));
  tokio::spawn(relay.run());

  // PULL takes the tcp candidate. SUB is refused there by the PUSH and lands on ipc.
  let mut push = PushSocket::new();
  push
    .bind(&format!("tcp://127.0.0.1:{pull_port}"))
    .await
    .expect("Failed to bind PUSH upstream");
  let mut upstream = PubSocket::new();
  upstream
    .bind(&ipc(dir.path(), "pull.sock"))
    .await
    .expect("Failed to bind PUB upstream");

  let mut sub = subscribe_to(&format!("tcp://127.0.0.1:{pub_port}")).await;

  push_when_connected(&mut push, r#"{"power":{"battery_voltage":7.9}}"#).await;
  let (topic, env) = wait_for(&mut sub, Kind::Telemetry).await;
  assert_eq!(topic, "telem.decoded");
  assert_eq!(env.seq, Some(1));
  assert_eq!(env.payload, serde_json::json!({"power": {"battery_voltage": 7.9}}));

  let started = Instant::now();
  let env = loop {
    assert!(started.elapsed() < DEADLINE, "raw frame never relayed");
    upstream
      .send(ZmqMessage::from(Bytes::from_static(b"\xde\xad")))
      .await
      .expect("Failed to publish upstream");
    if let Ok((_, env)) = timeout(Duration::from_millis(200), next_envelope(&mut sub)).await {
      if env.kind == Kind::RawFrame {
        break env;
      }
    }
  };
  assert_eq!(env.seq, Some(2));
  assert_eq!(env.payload["bytes_b64"], "dead");
}

#[tokio::test]
async fn relay_redials_a_restarted_upstream() {
  let dir = tempfile::tempdir().unwrap();
  let config = ipc_config(dir.path(), IngestMode::Pull);
  let upstream_ep = ipc(dir.path(), "pull.sock");

  let relay = Relay::bind(&config).await.expect("Failed to start relay");
  tokio::spawn(relay.run());
  let mut sub = downstream(dir.path()).await;

  let mut push = PushSocket::new();
  push.bind(&upstream_ep).await.expect("Failed to bind upstream");
  push_when_connected(&mut push, r#"{"type":"TELEM"}"#).await;
  let (_, env) = wait_for(&mut sub, Kind::Telemetry).await;
  assert_eq!(env.seq, Some(1));

  // Decoder restart: same address, new process.
  drop(push);
  tokio::time::sleep(Duration::from_millis(100)).await;
  let _ = std::fs::remove_file(dir.path().join("pull.sock"));
  let mut push = PushSocket::new();
  push.bind(&upstream_ep).await.expect("Failed to rebind upstream");

  push_when_connected(&mut push, r#"{"type":"RF"}"#).await;
  let (topic, env) = wait_for(&mut sub, Kind::RfMetrics).await;
  assert_eq!(topic, "rf.metrics");
  assert_eq!(env.seq, Some(2));
}

#[tokio::test]
async fn startup_fails_on_an_undialable_upstream() {
  let dir = tempfile::tempdir().unwrap();
  let mut config = ipc_config(dir.path(), IngestMode::Pull);
  config.endpoints.transport = TransportMode::Tcp;
  config.endpoints.host = String::new();
  config.endpoints.pub_port = free_port();

  let err = match Relay::bind(&config).await {
    Ok(_) => panic!("the ingest address cannot be dialled"),
    Err(err) => err,
  };
  let text = err.to_string();
  assert!(text.contains("connect PULL"), "{text}");
  assert!(text.contains(&format!("tcp://:{}", config.endpoints.pull_port)), "{text}");
}
