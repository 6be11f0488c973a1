use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

use crate::error::CacheError;
use crate::types::{CacheKey, CacheValue, ClientMessage, ServerMessage, ServerStatus};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<ServerMessage>>>>;

/// One multiplexed connection to a cache server.
///
/// Requests carry a monotonically increasing id; a pending map routes each
/// response to its waiter, so any number of calls may be in flight at once.
/// A call that hits its deadline is abandoned: the pending entry is removed
/// first, so a late response is discarded instead of waking a stale waiter.
/// When the socket closes, outstanding and subsequent calls fail with
/// `Disconnected`; reconnecting is the caller's decision.
pub struct Connection {
  req_tx: mpsc::UnboundedSender<ClientMessage>,
  pending: Pending,
  next_id: AtomicU64,
  timeout: Duration,
  writer: JoinHandle<()>,
  reader: JoinHandle<()>,
}

impl Connection {
  pub async fn connect(host: &str) -> Result<Self, CacheError> {
    Self::connect_with_timeout(host, DEFAULT_TIMEOUT).await
  }

  pub async fn connect_with_timeout(
    host: &str,
    timeout: Duration,
  ) -> Result<Self, CacheError> {
    let ws_url = if host.starts_with("ws://") {
      host.into()
    } else {
      format!("ws://{}", host)
    };
    let (ws, _) = tokio_tungstenite::connect_async(&ws_url)
      .await
      .map_err(|e| CacheError::Connect(e.to_string()))?;
    let (mut sink, mut stream) = ws.split();

    let (req_tx, mut req_rx) = mpsc::unbounded_channel::<ClientMessage>();
    let pending: Pending = Arc::new(Mutex::new(HashMap::new()));

    let writer = tokio::spawn(async move {
      while let Some(msg) = req_rx.recv().await {
        if sink.send(Message::Binary(msg.encode().into())).await.is_err() {
          break;
        }
      }
    });

    let pending2 = pending.clone();
    let reader = tokio::spawn(async move {
      while let Some(frame) = stream.next().await {
        let bytes = match frame {
          Ok(Message::Binary(bytes)) => bytes,
          Ok(Message::Close(_)) | Err(_) => break,
          Ok(_) => continue,
        };
        match ServerMessage::decode(&bytes) {
          Ok(msg) => {
            let id = msg.id();
            match pending2.lock().remove(&id) {
              Some(tx) => {
                let _ = tx.send(msg);
              }
              None => tracing::debug!("Discarding late response for request {}", id),
            }
          }
          Err(e) => tracing::warn!("Dropping malformed server frame: {}", e),
        }
      }
      // socket is gone; wake every outstanding call with Disconnected
      pending2.lock().clear();
    });

    Ok(Self {
      req_tx,
      pending,
      next_id: AtomicU64::new(1),
      timeout,
      writer,
      reader,
    })
  }

  /// Sends one request and awaits its correlated response or the deadline.
  async fn request(
    &self,
    make: impl FnOnce(u64) -> ClientMessage,
  ) -> Result<ServerMessage, CacheError> {
    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
    let (tx, rx) = oneshot::channel();
    self.pending.lock().insert(id, tx);

    // a rejected write surfaces as SendFailed on this call only; whether the
    // socket is actually gone is reported by the waiters, not here
    if self.req_tx.send(make(id)).is_err() {
      self.pending.lock().remove(&id);
      return Err(CacheError::SendFailed);
    }

    match tokio::time::timeout(self.timeout, rx).await {
      Ok(Ok(resp)) => Ok(resp),
      Ok(Err(_)) => Err(CacheError::Disconnected),
      Err(_) => {
        self.pending.lock().remove(&id);
        Err(CacheError::Timeout)
      }
    }
  }

  pub async fn add(&self, key: CacheKey, value: CacheValue) -> Result<bool, CacheError> {
    match self
      .request(|id| ClientMessage::AddToCache { id, key, value })
      .await?
    {
      ServerMessage::Added { added, .. } => Ok(added),
      other => Err(unexpected(&other)),
    }
  }

  pub async fn get(&self, key: CacheKey) -> Result<Option<CacheValue>, CacheError> {
    match self
      .request(|id| ClientMessage::RequestFromCache { id, key })
      .await?
    {
      ServerMessage::Data { value, .. } => Ok(Some(value)),
      ServerMessage::NotFound { .. } => Ok(None),
      other => Err(unexpected(&other)),
    }
  }

  pub async fn remove(&self, key: CacheKey) -> Result<bool, CacheError> {
    match self
      .request(|id| ClientMessage::RemoveFromCache { id, key })
      .await?
    {
      ServerMessage::Removed { removed, .. } => Ok(removed),
      other => Err(unexpected(&other)),
    }
  }

  pub async fn clear(&self) -> Result<bool, CacheError> {
    match self.request(|id| ClientMessage::ClearCache { id }).await? {
      ServerMessage::Cleared { cleared, .. } => Ok(cleared),
      other => Err(unexpected(&other)),
    }
  }

  /// Fire-and-forget hint; no response is produced.
  pub fn warm_up(&self, key: CacheKey) -> Result<(), CacheError> {
    self
      .req_tx
      .send(ClientMessage::WarmUp { key })
      .map_err(|_| CacheError::SendFailed)
  }

  pub async fn status(&self) -> Result<ServerStatus, CacheError> {
    match self.request(|id| ClientMessage::StatusRequest { id }).await? {
      ServerMessage::Status { status, .. } => Ok(status),
      other => Err(unexpected(&other)),
    }
  }

  /// Tears the connection down. Outstanding calls complete with
  /// `Disconnected`. Dropping the `Connection` has the same effect.
  pub fn close(&self) {
    self.writer.abort();
    self.reader.abort();
    self.pending.lock().clear();
  }
}

impl Drop for Connection {
  fn drop(&mut self) {
    self.close();
  }
}

fn unexpected(msg: &ServerMessage) -> CacheError {
  CacheError::CorruptValue(format!("response kind does not match request {}", msg.id()))
}
