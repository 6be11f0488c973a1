use hoard::store::{CacheStore, DiskStore, MemoryStore};
use hoard::types::{CacheKey, CacheValue};

fn value_of(bytes: &[u8]) -> CacheValue {
  let mut value = CacheValue::new();
  value.add_buffer("data.bin", bytes.to_vec()).unwrap();
  value
}

#[tokio::test]
async fn test_memory_add_get_remove() {
  let store = MemoryStore::new();
  let key = CacheKey::from_data(b"one");

  assert!(store.get(&key).await.unwrap().is_none());
  assert!(store.add(key, value_of(b"payload")).await.unwrap());

  let got = store.get(&key).await.unwrap().unwrap();
  assert_eq!(got.buffers()[0].data, b"payload");

  // remove is idempotent: true, then false, never an error
  assert!(store.remove(&key).await.unwrap());
  assert!(!store.remove(&key).await.unwrap());
}

#[tokio::test]
async fn test_memory_stats() {
  let store = MemoryStore::new();
  let key = CacheKey::from_data(b"counted");
  store.add(key, value_of(&[0u8; 100])).await.unwrap();

  store.get(&key).await.unwrap();
  store.get(&CacheKey::from_data(b"absent")).await.unwrap();

  let stats = store.stats().await;
  assert_eq!(stats.keys, 1);
  assert_eq!(stats.total_size, 100);
  assert_eq!(stats.hits, 1);
  assert_eq!(stats.misses, 1);

  assert!(store.clear().await.unwrap());
  assert_eq!(store.stats().await.keys, 0);
}

#[tokio::test]
async fn test_disk_roundtrip_and_reopen() {
  let dir = tempfile::tempdir().unwrap();
  let key = CacheKey::from_data(b"persistent");

  {
    let store = DiskStore::open(dir.path(), 1 << 20).await.unwrap();
    assert!(store.add(key, value_of(b"on disk")).await.unwrap());
    assert_eq!(
      store.get(&key).await.unwrap().unwrap().buffers()[0].data,
      b"on disk"
    );
  }

  // a fresh instance rebuilds its index from the blobs on disk
  let store = DiskStore::open(dir.path(), 1 << 20).await.unwrap();
  assert_eq!(store.stats().await.keys, 1);
  assert_eq!(
    store.get(&key).await.unwrap().unwrap().buffers()[0].data,
    b"on disk"
  );
}

#[tokio::test]
async fn test_disk_remove_unknown_is_noop() {
  let dir = tempfile::tempdir().unwrap();
  let store = DiskStore::open(dir.path(), 1 << 20).await.unwrap();
  assert!(!store.remove(&CacheKey::from_data(b"nope")).await.unwrap());
}

#[tokio::test]
async fn test_disk_remove_survives_missing_blob() {
  let dir = tempfile::tempdir().unwrap();
  let store = DiskStore::open(dir.path(), 1 << 20).await.unwrap();
  let key = CacheKey::from_data(b"vanishing");
  assert!(store.add(key, value_of(b"here")).await.unwrap());

  // delete the blob out-of-band; the index entry still counts as removed
  let hex = key.to_string();
  let blob = dir
    .path()
    .join(&hex[0..2])
    .join(&hex[2..4])
    .join(format!("{}.val", hex));
  std::fs::remove_file(&blob).unwrap();

  assert!(store.remove(&key).await.unwrap());
  assert!(!store.remove(&key).await.unwrap());
}

#[tokio::test]
async fn test_disk_eviction_is_lru() {
  let dir = tempfile::tempdir().unwrap();
  // each serialized value lands between ~250 and ~320 bytes, so the cap
  // holds two of the three but never all three
  let store = DiskStore::open(dir.path(), 700).await.unwrap();

  let a = CacheKey::from_data(b"a");
  let b = CacheKey::from_data(b"b");
  let c = CacheKey::from_data(b"c");

  store.add(a, value_of(&[1u8; 200])).await.unwrap();
  store.add(b, value_of(&[2u8; 200])).await.unwrap();

  // touch `a` so `b` is the eviction victim
  assert!(store.get(&a).await.unwrap().is_some());

  store.add(c, value_of(&[3u8; 200])).await.unwrap();

  assert!(store.get(&b).await.unwrap().is_none());
  assert!(store.get(&a).await.unwrap().is_some());
  assert!(store.get(&c).await.unwrap().is_some());
  assert!(store.stats().await.total_size <= 700);
}

#[tokio::test]
async fn test_disk_warm_up_protects_entry() {
  let dir = tempfile::tempdir().unwrap();
  let store = DiskStore::open(dir.path(), 700).await.unwrap();

  let a = CacheKey::from_data(b"warm");
  let b = CacheKey::from_data(b"cold");
  store.add(a, value_of(&[1u8; 200])).await.unwrap();
  store.add(b, value_of(&[2u8; 200])).await.unwrap();

  store.warm_up(&a).await;
  store
    .add(CacheKey::from_data(b"new"), value_of(&[3u8; 200]))
    .await
    .unwrap();

  assert!(store.get(&a).await.unwrap().is_some());
  assert!(store.get(&b).await.unwrap().is_none());
}

#[tokio::test]
async fn test_disk_oversized_value_rejected() {
  let dir = tempfile::tempdir().unwrap();
  let store = DiskStore::open(dir.path(), 64).await.unwrap();
  let key = CacheKey::from_data(b"huge");
  assert!(!store.add(key, value_of(&[0u8; 4096])).await.unwrap());
  assert!(store.get(&key).await.unwrap().is_none());
}

#[tokio::test]
async fn test_disk_clear() {
  let dir = tempfile::tempdir().unwrap();
  let store = DiskStore::open(dir.path(), 1 << 20).await.unwrap();
  for i in 0..5u8 {
    store
      .add(CacheKey::from_data(&[i]), value_of(&[i; 10]))
      .await
      .unwrap();
  }
  assert!(store.clear().await.unwrap());
  let stats = store.stats().await;
  assert_eq!(stats.keys, 0);
  assert_eq!(stats.total_size, 0);
}
