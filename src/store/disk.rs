use async_trait::async_trait;
use lru::LruCache;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;

use super::{CacheStore, StoreStats};
use crate::types::{CacheKey, CacheValue};

/// Disk-backed store. Blobs live under `<root>/aa/bb/<hexkey>.val` (two-level
/// hex sharding); an in-memory LRU index caps total size at `max_size` bytes
/// and evicts least-recently-used entries past it.
pub struct DiskStore {
  root: PathBuf,
  max_size: u64,
  /// key -> blob size on disk. The lock is held only to touch the index,
  /// never across file I/O.
  index: Mutex<LruCache<CacheKey, u64>>,
  total: AtomicU64,
  hits: AtomicU64,
  misses: AtomicU64,
}

impl DiskStore {
  /// Opens the store, creating `root` if needed and rebuilding the index
  /// from blobs already on disk. Pre-existing entries enter the index in
  /// directory order; their recency resets on first access.
  pub async fn open(root: impl AsRef<Path>, max_size: u64) -> Result<Self, anyhow::Error> {
    let root = root.as_ref().to_path_buf();
    fs::create_dir_all(&root).await?;

    let mut index = LruCache::unbounded();
    let mut total = 0u64;

    let mut shards = fs::read_dir(&root).await?;
    while let Some(shard) = shards.next_entry().await? {
      if !shard.file_type().await?.is_dir() {
        continue;
      }
      let mut subshards = fs::read_dir(shard.path()).await?;
      while let Some(subshard) = subshards.next_entry().await? {
        if !subshard.file_type().await?.is_dir() {
          continue;
        }
        let mut blobs = fs::read_dir(subshard.path()).await?;
        while let Some(blob) = blobs.next_entry().await? {
          let name = blob.file_name();
          let Some(stem) = name.to_str().and_then(|n| n.strip_suffix(".val")) else {
            continue;
          };
          let Ok(key) = stem.parse::<CacheKey>() else {
            tracing::warn!("Skipping foreign file in cache folder: {:?}", blob.path());
            continue;
          };
          let size = blob.metadata().await?.len();
          index.put(key, size);
          total += size;
        }
      }
    }

    tracing::info!(
      "Disk store opened at {:?}: {} entries, {} bytes",
      root,
      index.len(),
      total
    );

    Ok(Self {
      root,
      max_size,
      index: Mutex::new(index),
      total: AtomicU64::new(total),
      hits: AtomicU64::new(0),
      misses: AtomicU64::new(0),
    })
  }

  fn blob_path(&self, key: &CacheKey) -> PathBuf {
    let hex = key.to_string();
    self
      .root
      .join(&hex[0..2])
      .join(&hex[2..4])
      .join(format!("{}.val", hex))
  }

  /// Pops LRU victims until the tracked total fits the cap, then deletes
  /// their files outside the index lock.
  async fn evict_to_fit(&self) {
    let victims: Vec<(CacheKey, u64)> = {
      let mut index = self.index.lock();
      let mut victims = Vec::new();
      while self.total.load(Ordering::Relaxed) > self.max_size {
        match index.pop_lru() {
          Some((key, size)) => {
            self.total.fetch_sub(size, Ordering::Relaxed);
            victims.push((key, size));
          }
          None => break,
        }
      }
      victims
    };

    for (key, size) in victims {
      tracing::debug!("Evicting {} ({} bytes)", key, size);
      if let Err(e) = fs::remove_file(self.blob_path(&key)).await {
        tracing::warn!("Failed to delete evicted blob {}: {}", key, e);
      }
    }
  }
}

#[async_trait]
impl CacheStore for DiskStore {
  async fn add(&self, key: CacheKey, value: CacheValue) -> Result<bool, anyhow::Error> {
    let blob = value.to_bytes();
    let size = blob.len() as u64;
    if size > self.max_size {
      tracing::warn!("Rejecting {}: {} bytes exceeds cache size cap", key, size);
      return Ok(false);
    }

    let path = self.blob_path(&key);
    if let Some(parent) = path.parent() {
      fs::create_dir_all(parent).await?;
    }
    fs::write(&path, &blob).await?;

    {
      let mut index = self.index.lock();
      if let Some(old) = index.put(key, size) {
        self.total.fetch_sub(old, Ordering::Relaxed);
      }
      self.total.fetch_add(size, Ordering::Relaxed);
    }
    self.evict_to_fit().await;
    Ok(true)
  }

  async fn get(&self, key: &CacheKey) -> Result<Option<CacheValue>, anyhow::Error> {
    // get() promotes, so a served entry becomes the freshest
    let known = self.index.lock().get(key).is_some();
    if !known {
      self.misses.fetch_add(1, Ordering::Relaxed);
      return Ok(None);
    }

    let path = self.blob_path(key);
    let blob = match fs::read(&path).await {
      Ok(blob) => blob,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
        // index said yes but the file is gone; drop the stale entry
        if let Some(size) = self.index.lock().pop(key) {
          self.total.fetch_sub(size, Ordering::Relaxed);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        return Ok(None);
      }
      Err(e) => return Err(e.into()),
    };

    match CacheValue::from_bytes(&blob) {
      Ok(value) => {
        self.hits.fetch_add(1, Ordering::Relaxed);
        Ok(Some(value))
      }
      Err(e) => {
        tracing::warn!("Corrupt blob for {}: {}; dropping entry", key, e);
        if let Some(size) = self.index.lock().pop(key) {
          self.total.fetch_sub(size, Ordering::Relaxed);
        }
        let _ = fs::remove_file(&path).await;
        self.misses.fetch_add(1, Ordering::Relaxed);
        Ok(None)
      }
    }
  }

  async fn remove(&self, key: &CacheKey) -> Result<bool, anyhow::Error> {
    let removed = {
      let mut index = self.index.lock();
      match index.pop(key) {
        Some(size) => {
          self.total.fetch_sub(size, Ordering::Relaxed);
          true
        }
        None => false,
      }
    };
    if removed {
      // the index entry is authoritative; a blob already gone out-of-band
      // still counts as removed
      match fs::remove_file(self.blob_path(key)).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
      }
    }
    Ok(removed)
  }

  async fn clear(&self) -> Result<bool, anyhow::Error> {
    self.index.lock().clear();
    self.total.store(0, Ordering::Relaxed);
    fs::remove_dir_all(&self.root).await?;
    fs::create_dir_all(&self.root).await?;
    Ok(true)
  }

  async fn warm_up(&self, key: &CacheKey) {
    self.index.lock().promote(key);
  }

  async fn stats(&self) -> StoreStats {
    StoreStats {
      keys: self.index.lock().len() as u64,
      total_size: self.total.load(Ordering::Relaxed),
      hits: self.hits.load(Ordering::Relaxed),
      misses: self.misses.load(Ordering::Relaxed),
    }
  }
}
