use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio_tungstenite::tungstenite::Message;

use hoard::client::Connection;
use hoard::server::{MessageHandler, WebSocketServer};
use hoard::store::{CacheStore, MemoryStore, StoreStats};
use hoard::types::{CacheKey, CacheValue, ClientMessage, ServerMessage};
use hoard::CacheError;

/// MemoryStore wrapper that counts calls and can slow fetches down, to make
/// request collapsing observable.
struct CountingStore {
  inner: MemoryStore,
  gets: AtomicU64,
  warms: AtomicU64,
  get_delay: Duration,
}

impl CountingStore {
  fn new(get_delay: Duration) -> Self {
    Self {
      inner: MemoryStore::new(),
      gets: AtomicU64::new(0),
      warms: AtomicU64::new(0),
      get_delay,
    }
  }
}

#[async_trait]
impl CacheStore for CountingStore {
  async fn add(&self, key: CacheKey, value: CacheValue) -> Result<bool, anyhow::Error> {
    self.inner.add(key, value).await
  }

  async fn get(&self, key: &CacheKey) -> Result<Option<CacheValue>, anyhow::Error> {
    self.gets.fetch_add(1, Ordering::SeqCst);
    tokio::time::sleep(self.get_delay).await;
    self.inner.get(key).await
  }

  async fn remove(&self, key: &CacheKey) -> Result<bool, anyhow::Error> {
    self.inner.remove(key).await
  }

  async fn clear(&self) -> Result<bool, anyhow::Error> {
    self.inner.clear().await
  }

  async fn warm_up(&self, key: &CacheKey) {
    self.warms.fetch_add(1, Ordering::SeqCst);
    self.inner.warm_up(key).await;
  }

  async fn stats(&self) -> StoreStats {
    self.inner.stats().await
  }
}

async fn spawn_server(store: Arc<dyn CacheStore>) -> String {
  spawn_server_with_remote(store, None).await
}

async fn spawn_server_with_remote(
  store: Arc<dyn CacheStore>,
  remote: Option<Arc<Connection>>,
) -> String {
  let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
  // keep the sender alive for the whole test process
  std::mem::forget(shutdown_tx);
  let handler = Arc::new(MessageHandler::new(store, remote, "test-server".into()));
  let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
  let addr = listener.local_addr().unwrap().to_string();
  tokio::spawn(WebSocketServer::new(handler, shutdown_rx).serve(listener));
  addr
}

fn value_of(name: &str, bytes: &[u8]) -> CacheValue {
  let mut value = CacheValue::new();
  value.add_buffer(name, bytes.to_vec()).unwrap();
  value
}

#[tokio::test]
async fn test_add_then_get_returns_identical_bytes() {
  let addr = spawn_server(Arc::new(MemoryStore::new())).await;
  let conn = Connection::connect(&addr).await.unwrap();

  let key = CacheKey::from_data(b"texture.pvr + args");
  let value = value_of("a.png", &[0xAA; 512]);

  assert!(conn.add(key, value.clone()).await.unwrap());
  let got = conn.get(key).await.unwrap().unwrap();
  assert_eq!(got.buffers()[0].name, "a.png");
  assert_eq!(got.buffers()[0].data, value.buffers()[0].data);
}

#[tokio::test]
async fn test_miss_is_not_found_not_empty_data() {
  let addr = spawn_server(Arc::new(MemoryStore::new())).await;
  let conn = Connection::connect(&addr).await.unwrap();

  let key = CacheKey::from_data(b"never added");
  assert!(conn.get(key).await.unwrap().is_none());

  // an explicitly added empty value, by contrast, is a hit
  let empty = CacheValue::new();
  conn.add(key, empty).await.unwrap();
  let got = conn.get(key).await.unwrap().unwrap();
  assert!(got.is_empty());
}

#[tokio::test]
async fn test_remove_is_idempotent() {
  let addr = spawn_server(Arc::new(MemoryStore::new())).await;
  let conn = Connection::connect(&addr).await.unwrap();

  let key = CacheKey::from_data(b"removable");
  assert!(!conn.remove(key).await.unwrap());

  conn.add(key, value_of("f", b"x")).await.unwrap();
  assert!(conn.remove(key).await.unwrap());
  assert!(!conn.remove(key).await.unwrap());
}

#[tokio::test]
async fn test_clear_and_status() {
  let addr = spawn_server(Arc::new(MemoryStore::new())).await;
  let conn = Connection::connect(&addr).await.unwrap();

  for i in 0..3u8 {
    conn
      .add(CacheKey::from_data(&[i]), value_of("f", &[i; 16]))
      .await
      .unwrap();
  }

  let status = conn.status().await.unwrap();
  assert_eq!(status.name, "test-server");
  assert_eq!(status.keys, 3);
  assert_eq!(status.total_size, 48);

  assert!(conn.clear().await.unwrap());
  assert_eq!(conn.status().await.unwrap().keys, 0);
}

#[tokio::test]
async fn test_warm_up_reaches_store() {
  let store = Arc::new(CountingStore::new(Duration::ZERO));
  let addr = spawn_server(store.clone()).await;
  let conn = Connection::connect(&addr).await.unwrap();

  conn.warm_up(CacheKey::from_data(b"keep me")).unwrap();
  // ordered channel: the status round-trip proves the warmup was processed
  conn.status().await.unwrap();
  assert_eq!(store.warms.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_concurrent_gets_collapse_to_one_fetch() {
  let store = Arc::new(CountingStore::new(Duration::from_millis(200)));
  let addr = spawn_server(store.clone()).await;

  let conn_a = Connection::connect(&addr).await.unwrap();
  let conn_b = Connection::connect(&addr).await.unwrap();

  let key = CacheKey::from_data(b"contested");
  let (a, b) = tokio::join!(conn_a.get(key), conn_b.get(key));
  assert!(a.unwrap().is_none());
  assert!(b.unwrap().is_none());
  assert_eq!(store.gets.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_same_kind_responses_keep_request_order() {
  let addr = spawn_server(Arc::new(MemoryStore::new())).await;
  let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{}", addr))
    .await
    .unwrap();
  let (mut sink, mut stream) = ws.split();

  let key = CacheKey::from_data(b"ordered");
  for id in [1u64, 2, 3] {
    let frame = ClientMessage::RequestFromCache { id, key }.encode();
    sink.send(Message::Binary(frame.into())).await.unwrap();
  }

  let mut seen = Vec::new();
  while seen.len() < 3 {
    if let Some(Ok(Message::Binary(bytes))) = stream.next().await {
      seen.push(ServerMessage::decode(&bytes).unwrap().id());
    }
  }
  assert_eq!(seen, vec![1, 2, 3]);
}

#[tokio::test]
async fn test_malformed_frame_is_dropped_channel_survives() {
  let addr = spawn_server(Arc::new(MemoryStore::new())).await;
  let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{}", addr))
    .await
    .unwrap();
  let (mut sink, mut stream) = ws.split();

  // truncated garbage, then a well-formed request on the same channel
  sink
    .send(Message::Binary(vec![0xde, 0xad, 0xbe].into()))
    .await
    .unwrap();
  sink
    .send(Message::Binary(
      ClientMessage::StatusRequest { id: 42 }.encode().into(),
    ))
    .await
    .unwrap();

  loop {
    match stream.next().await {
      Some(Ok(Message::Binary(bytes))) => {
        let msg = ServerMessage::decode(&bytes).unwrap();
        assert_eq!(msg.id(), 42);
        assert!(matches!(msg, ServerMessage::Status { .. }));
        break;
      }
      Some(Ok(_)) => continue,
      other => panic!("channel died after malformed frame: {:?}", other),
    }
  }
}

#[tokio::test]
async fn test_timeout_against_mute_server() {
  // a server that completes the handshake and then ignores every frame
  let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
  let addr = listener.local_addr().unwrap().to_string();
  tokio::spawn(async move {
    while let Ok((stream, _)) = listener.accept().await {
      tokio::spawn(async move {
        if let Ok(ws) = tokio_tungstenite::accept_async(stream).await {
          let (_sink, mut stream) = ws.split();
          while let Some(Ok(_)) = stream.next().await {}
        }
      });
    }
  });

  let conn = Connection::connect_with_timeout(&addr, Duration::from_millis(50))
    .await
    .unwrap();

  let started = Instant::now();
  let err = conn.status().await.unwrap_err();
  assert!(matches!(err, CacheError::Timeout));
  let elapsed = started.elapsed();
  assert!(elapsed >= Duration::from_millis(50) && elapsed < Duration::from_millis(500));

  // the connection stays open and usable: a later call also times out
  // instead of failing as disconnected
  assert!(matches!(
    conn.status().await.unwrap_err(),
    CacheError::Timeout
  ));
}

#[tokio::test]
async fn test_disconnect_fails_outstanding_call() {
  // a server that closes every channel right after the handshake
  let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
  let addr = listener.local_addr().unwrap().to_string();
  tokio::spawn(async move {
    while let Ok((stream, _)) = listener.accept().await {
      if let Ok(ws) = tokio_tungstenite::accept_async(stream).await {
        drop(ws);
      }
    }
  });

  let conn = Connection::connect(&addr).await.unwrap();
  assert!(matches!(
    conn.status().await.unwrap_err(),
    CacheError::Disconnected
  ));
}

#[tokio::test]
async fn test_calls_after_close_fail_with_send_failed() {
  let addr = spawn_server(Arc::new(MemoryStore::new())).await;
  let conn = Connection::connect(&addr).await.unwrap();
  conn.status().await.unwrap();

  conn.close();
  // let the aborted writer drop its end of the request queue
  tokio::time::sleep(Duration::from_millis(50)).await;

  assert!(matches!(
    conn.status().await.unwrap_err(),
    CacheError::SendFailed
  ));
  assert!(matches!(
    conn.warm_up(CacheKey::from_data(b"late")).unwrap_err(),
    CacheError::SendFailed
  ));
}

#[tokio::test]
async fn test_local_miss_falls_through_to_upstream() {
  // upstream holds the artifact
  let upstream_store = Arc::new(MemoryStore::new());
  let key = CacheKey::from_data(b"shared artifact");
  upstream_store
    .add(key, value_of("packed.bin", &[7u8; 64]))
    .await
    .unwrap();
  let upstream_addr = spawn_server(upstream_store).await;

  let remote = Arc::new(Connection::connect(&upstream_addr).await.unwrap());
  let local_store = Arc::new(MemoryStore::new());
  let local_addr = spawn_server_with_remote(local_store.clone(), Some(remote)).await;

  let conn = Connection::connect(&local_addr).await.unwrap();
  let got = conn.get(key).await.unwrap().unwrap();
  assert_eq!(got.buffers()[0].data, vec![7u8; 64]);

  // the upstream hit was stored locally on the way back
  assert!(local_store.get(&key).await.unwrap().is_some());
}
