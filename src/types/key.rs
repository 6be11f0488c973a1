use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::CacheError;

/// Size of a content address in bytes.
pub const HASH_SIZE: usize = 16;

/// Fixed-size content address of a cached artifact.
///
/// Two keys are equal iff their byte sequences are bit-identical. The text
/// form is lower-case hex of exactly `2 * HASH_SIZE` characters and
/// round-trips exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct CacheKey([u8; HASH_SIZE]);

impl CacheKey {
  /// Digest of caller-supplied identifying data (file contents plus
  /// conversion parameters). Identical input always yields the same key.
  pub fn from_data(data: &[u8]) -> Self {
    CacheKey(md5::compute(data).0)
  }

  pub fn from_bytes(bytes: [u8; HASH_SIZE]) -> Self {
    CacheKey(bytes)
  }

  pub fn as_bytes(&self) -> &[u8; HASH_SIZE] {
    &self.0
  }
}

impl fmt::Display for CacheKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&hex::encode(self.0))
  }
}

impl FromStr for CacheKey {
  type Err = CacheError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    if s.len() != 2 * HASH_SIZE {
      return Err(CacheError::MalformedKey(format!(
        "expected {} hex characters, got {}",
        2 * HASH_SIZE,
        s.len()
      )));
    }
    let bytes = hex::decode(s).map_err(|e| CacheError::MalformedKey(e.to_string()))?;
    let mut key = [0u8; HASH_SIZE];
    key.copy_from_slice(&bytes);
    Ok(CacheKey(key))
  }
}

impl Serialize for CacheKey {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&self.to_string())
  }
}

impl<'de> Deserialize<'de> for CacheKey {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    let s = String::deserialize(deserializer)?;
    s.parse().map_err(serde::de::Error::custom)
  }
}
