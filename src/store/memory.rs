use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use super::{CacheStore, StoreStats};
use crate::types::{CacheKey, CacheValue};

/// Unbounded in-memory store. The default backend for tests and for hosts
/// where artifacts are small enough to keep resident.
pub struct MemoryStore {
  data: RwLock<HashMap<CacheKey, CacheValue>>,
  hits: AtomicU64,
  misses: AtomicU64,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self {
      data: RwLock::new(HashMap::new()),
      hits: AtomicU64::new(0),
      misses: AtomicU64::new(0),
    }
  }
}

impl Default for MemoryStore {
  fn default() -> Self {
    Self::new()
  }
}

#[async_trait]
impl CacheStore for MemoryStore {
  async fn add(&self, key: CacheKey, value: CacheValue) -> Result<bool, anyhow::Error> {
    self.data.write().insert(key, value);
    Ok(true)
  }

  async fn get(&self, key: &CacheKey) -> Result<Option<CacheValue>, anyhow::Error> {
    let found = self.data.read().get(key).cloned();
    match found {
      Some(value) => {
        self.hits.fetch_add(1, Ordering::Relaxed);
        Ok(Some(value))
      }
      None => {
        self.misses.fetch_add(1, Ordering::Relaxed);
        Ok(None)
      }
    }
  }

  async fn remove(&self, key: &CacheKey) -> Result<bool, anyhow::Error> {
    Ok(self.data.write().remove(key).is_some())
  }

  async fn clear(&self) -> Result<bool, anyhow::Error> {
    self.data.write().clear();
    Ok(true)
  }

  async fn warm_up(&self, _key: &CacheKey) {
    // nothing evicts from this store
  }

  async fn stats(&self) -> StoreStats {
    let data = self.data.read();
    StoreStats {
      keys: data.len() as u64,
      total_size: data.values().map(|v| v.size()).sum(),
      hits: self.hits.load(Ordering::Relaxed),
      misses: self.misses.load(Ordering::Relaxed),
    }
  }
}
