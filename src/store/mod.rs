mod disk;
mod memory;

pub use disk::DiskStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::{CacheKey, CacheValue};

/// Store occupancy counters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreStats {
  pub keys: u64,
  pub total_size: u64,
  pub hits: u64,
  pub misses: u64,
}

/// Pluggable storage backend shared by all channels on the server.
///
/// The dispatcher guarantees per-key mutual exclusion on top of this trait;
/// implementations only need to be internally consistent under concurrent
/// calls for distinct keys.
#[async_trait]
pub trait CacheStore: Send + Sync {
  /// Stores a value. Returns `false` when the backend rejects the value
  /// (e.g. it alone exceeds the configured size cap), `true` otherwise.
  /// Re-adding an existing key overwrites it and reports success.
  async fn add(&self, key: CacheKey, value: CacheValue) -> Result<bool, anyhow::Error>;

  /// Fetches a fresh copy of the value, or `None` for an unknown key.
  async fn get(&self, key: &CacheKey) -> Result<Option<CacheValue>, anyhow::Error>;

  /// Removes an entry. Unknown keys are a no-op reported as `false`.
  async fn remove(&self, key: &CacheKey) -> Result<bool, anyhow::Error>;

  /// Drops every entry.
  async fn clear(&self) -> Result<bool, anyhow::Error>;

  /// Advisory: refresh the entry's recency so it survives eviction.
  async fn warm_up(&self, key: &CacheKey);

  async fn stats(&self) -> StoreStats;
}
