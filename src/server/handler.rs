use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::OnceCell;
use uuid::Uuid;

use crate::client::Connection;
use crate::store::CacheStore;
use crate::types::{CacheKey, CacheValue, ClientMessage, ServerMessage, ServerStatus};

/// Server-side dispatcher: one decoded request in, at most one response out.
///
/// Discipline: at most one cache operation runs per key at a time. Writers
/// take a per-key async lock; concurrent fetches for the same key collapse
/// onto one in-flight lookup and all waiters share its result. The maps below
/// are guarded by plain mutexes held only to check/insert/remove entries,
/// never across store I/O.
pub struct MessageHandler {
  store: Arc<dyn CacheStore>,
  /// Upstream cache; local misses fall through to it.
  remote: Option<Arc<Connection>>,
  name: String,
  locks: Mutex<HashMap<CacheKey, Arc<tokio::sync::Mutex<()>>>>,
  inflight: Mutex<HashMap<CacheKey, Arc<OnceCell<Option<CacheValue>>>>>,
}

impl MessageHandler {
  pub fn new(store: Arc<dyn CacheStore>, remote: Option<Arc<Connection>>, name: String) -> Self {
    Self {
      store,
      remote,
      name,
      locks: Mutex::new(HashMap::new()),
      inflight: Mutex::new(HashMap::new()),
    }
  }

  pub async fn handle(&self, client_id: Uuid, msg: ClientMessage) -> Option<ServerMessage> {
    match msg {
      ClientMessage::AddToCache { id, key, value } => {
        let guard = self.lock_key(&key).await;
        let added = match self.store.add(key, value).await {
          Ok(added) => added,
          Err(e) => {
            tracing::error!("Store add failed for {}: {}", key, e);
            false
          }
        };
        drop(guard);
        self.release_key(&key);
        self.invalidate_inflight(&key);
        tracing::debug!("{} add {} -> {}", client_id, key, added);
        Some(ServerMessage::added(id, key, added))
      }
      ClientMessage::RequestFromCache { id, key } => {
        let response = match self.fetch_collapsed(key).await {
          Some(value) => ServerMessage::data(id, key, value),
          None => ServerMessage::not_found(id, key),
        };
        tracing::debug!("{} get {}", client_id, key);
        Some(response)
      }
      ClientMessage::RemoveFromCache { id, key } => {
        let guard = self.lock_key(&key).await;
        let removed = match self.store.remove(&key).await {
          Ok(removed) => removed,
          Err(e) => {
            tracing::error!("Store remove failed for {}: {}", key, e);
            false
          }
        };
        drop(guard);
        self.release_key(&key);
        self.invalidate_inflight(&key);
        Some(ServerMessage::removed(id, key, removed))
      }
      ClientMessage::ClearCache { id } => {
        let cleared = match self.store.clear().await {
          Ok(cleared) => cleared,
          Err(e) => {
            tracing::error!("Store clear failed: {}", e);
            false
          }
        };
        self.inflight.lock().clear();
        Some(ServerMessage::Cleared { id, cleared })
      }
      ClientMessage::WarmUp { key } => {
        let guard = self.lock_key(&key).await;
        self.store.warm_up(&key).await;
        drop(guard);
        self.release_key(&key);
        None
      }
      ClientMessage::StatusRequest { id } => {
        let stats = self.store.stats().await;
        Some(ServerMessage::Status {
          id,
          status: ServerStatus {
            name: self.name.clone(),
            version: env!("CARGO_PKG_VERSION").into(),
            keys: stats.keys,
            total_size: stats.total_size,
            hits: stats.hits,
            misses: stats.misses,
          },
        })
      }
    }
  }

  /// Fetches a key, collapsing concurrent requests onto one lookup: the
  /// first caller runs [`Self::fetch`], later callers await the shared cell.
  /// The cell is dropped afterwards so a later request sees fresh state.
  async fn fetch_collapsed(&self, key: CacheKey) -> Option<CacheValue> {
    let cell = {
      let mut inflight = self.inflight.lock();
      inflight
        .entry(key)
        .or_insert_with(|| Arc::new(OnceCell::new()))
        .clone()
    };

    let value = cell.get_or_init(|| self.fetch(key)).await.clone();

    let mut inflight = self.inflight.lock();
    if inflight.get(&key).is_some_and(|c| Arc::ptr_eq(c, &cell)) {
      inflight.remove(&key);
    }
    value
  }

  async fn fetch(&self, key: CacheKey) -> Option<CacheValue> {
    let guard = self.lock_key(&key).await;
    let local = match self.store.get(&key).await {
      Ok(found) => found,
      Err(e) => {
        tracing::error!("Store get failed for {}: {}", key, e);
        None
      }
    };
    let value = match local {
      Some(value) => Some(value),
      None => self.fetch_remote(key).await,
    };
    drop(guard);
    self.release_key(&key);
    value
  }

  /// Upstream fallback. Failures degrade to a local miss, never an error.
  async fn fetch_remote(&self, key: CacheKey) -> Option<CacheValue> {
    let remote = self.remote.as_ref()?;
    match remote.get(key).await {
      Ok(Some(value)) => {
        tracing::info!("Fetched {} from upstream ({} bytes)", key, value.size());
        if let Err(e) = self.store.add(key, value.clone()).await {
          tracing::warn!("Could not store upstream hit {}: {}", key, e);
        }
        Some(value)
      }
      Ok(None) => None,
      Err(e) => {
        tracing::warn!("Upstream fetch for {} failed: {}", key, e);
        None
      }
    }
  }

  /// A mutation makes any completed in-flight cell stale; drop it so the
  /// next fetch reads the store instead of a pre-mutation result.
  fn invalidate_inflight(&self, key: &CacheKey) {
    self.inflight.lock().remove(key);
  }

  async fn lock_key(&self, key: &CacheKey) -> tokio::sync::OwnedMutexGuard<()> {
    let lock = {
      let mut locks = self.locks.lock();
      locks
        .entry(*key)
        .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
        .clone()
    };
    lock.lock_owned().await
  }

  /// Drops the lock entry once nobody else holds a handle to it.
  fn release_key(&self, key: &CacheKey) {
    let mut locks = self.locks.lock();
    if locks.get(key).is_some_and(|l| Arc::strong_count(l) == 1) {
      locks.remove(key);
    }
  }
}
