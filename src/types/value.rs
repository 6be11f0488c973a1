use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CacheError;

/// One named byte buffer inside a cached artifact, usually a produced file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedBuffer {
  pub name: String,
  pub data: Vec<u8>,
}

/// In-memory representation of one cached artifact: an ordered collection of
/// named byte buffers plus metadata.
///
/// A value with zero buffers is *empty* and is a valid negative cache result,
/// distinct from "key not found". The store owns the authoritative copy; what
/// crosses the wire is always a fresh serialized copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheValue {
  buffers: Vec<NamedBuffer>,
  created_at: DateTime<Utc>,
  /// Free-form producer note (client id, operation name).
  description: Option<String>,
}

impl CacheValue {
  pub fn new() -> Self {
    Self {
      buffers: Vec::new(),
      created_at: Utc::now(),
      description: None,
    }
  }

  pub fn with_description(description: impl Into<String>) -> Self {
    Self {
      description: Some(description.into()),
      ..Self::new()
    }
  }

  /// Appends a named buffer, preserving insertion order.
  pub fn add_buffer(
    &mut self,
    name: impl Into<String>,
    data: Vec<u8>,
  ) -> Result<(), CacheError> {
    let name = name.into();
    if self.buffers.iter().any(|b| b.name == name) {
      return Err(CacheError::DuplicateBuffer(name));
    }
    self.buffers.push(NamedBuffer { name, data });
    Ok(())
  }

  pub fn buffers(&self) -> &[NamedBuffer] {
    &self.buffers
  }

  /// Sum of buffer lengths in bytes.
  pub fn size(&self) -> u64 {
    self.buffers.iter().map(|b| b.data.len() as u64).sum()
  }

  pub fn is_empty(&self) -> bool {
    self.buffers.is_empty()
  }

  pub fn description(&self) -> Option<&str> {
    self.description.as_deref()
  }

  pub fn created_at(&self) -> DateTime<Utc> {
    self.created_at
  }

  /// Serializes to a standalone blob, suitable for a disk store or the wire.
  pub fn to_bytes(&self) -> Vec<u8> {
    // serializing an owned, well-formed value cannot fail
    rmp_serde::to_vec_named(self).unwrap_or_default()
  }

  /// Decodes a blob produced by [`CacheValue::to_bytes`]. Truncated or
  /// malformed input fails with `CorruptValue`.
  pub fn from_bytes(bytes: &[u8]) -> Result<Self, CacheError> {
    rmp_serde::from_slice(bytes).map_err(|e| CacheError::CorruptValue(e.to_string()))
  }
}

impl Default for CacheValue {
  fn default() -> Self {
    Self::new()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn blob_roundtrip() {
    let mut value = CacheValue::with_description("exporter@buildhost");
    value.add_buffer("a.png", vec![1, 2, 3]).unwrap();
    value.add_buffer("a.png.meta", vec![0xff; 64]).unwrap();

    let decoded = CacheValue::from_bytes(&value.to_bytes()).unwrap();
    assert_eq!(decoded, value);
    assert_eq!(decoded.buffers()[0].name, "a.png");
    assert_eq!(decoded.size(), 67);
  }

  #[test]
  fn duplicate_name_rejected() {
    let mut value = CacheValue::new();
    value.add_buffer("x", vec![]).unwrap();
    assert!(matches!(
      value.add_buffer("x", vec![1]),
      Err(CacheError::DuplicateBuffer(_))
    ));
    assert_eq!(value.buffers().len(), 1);
  }

  #[test]
  fn truncated_blob_is_corrupt() {
    let mut value = CacheValue::new();
    value.add_buffer("big", vec![7; 256]).unwrap();
    let blob = value.to_bytes();
    assert!(matches!(
      CacheValue::from_bytes(&blob[..blob.len() / 2]),
      Err(CacheError::CorruptValue(_))
    ));
  }

  #[test]
  fn empty_value_is_valid() {
    let value = CacheValue::new();
    assert!(value.is_empty());
    assert_eq!(value.size(), 0);
    let decoded = CacheValue::from_bytes(&value.to_bytes()).unwrap();
    assert!(decoded.is_empty());
  }
}
