use serde::{Deserialize, Serialize};

use super::{CacheKey, CacheValue};
use crate::error::CacheError;

/// Requests a client sends to the cache server.
///
/// Every request that expects a response carries an explicit, monotonically
/// increasing `id`; the matching response echoes it. `WarmUp` is advisory and
/// produces no response, so it carries none.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ClientMessage {
  AddToCache {
    id: u64,
    key: CacheKey,
    value: CacheValue,
  },
  RequestFromCache {
    id: u64,
    key: CacheKey,
  },
  RemoveFromCache {
    id: u64,
    key: CacheKey,
  },
  ClearCache {
    id: u64,
  },
  WarmUp {
    key: CacheKey,
  },
  StatusRequest {
    id: u64,
  },
}

impl ClientMessage {
  /// Request id, if this message expects a response.
  pub fn id(&self) -> Option<u64> {
    match self {
      Self::AddToCache { id, .. }
      | Self::RequestFromCache { id, .. }
      | Self::RemoveFromCache { id, .. }
      | Self::ClearCache { id }
      | Self::StatusRequest { id } => Some(*id),
      Self::WarmUp { .. } => None,
    }
  }

  pub fn encode(&self) -> Vec<u8> {
    rmp_serde::to_vec_named(self).unwrap_or_default()
  }

  pub fn decode(bytes: &[u8]) -> Result<Self, CacheError> {
    rmp_serde::from_slice(bytes).map_err(|e| CacheError::CorruptValue(e.to_string()))
  }
}

/// Server replies. Success and failure are always explicit (`added`,
/// `removed`, `cleared`, `NotFound`), never signaled by omission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ServerMessage {
  Added {
    id: u64,
    key: CacheKey,
    added: bool,
  },
  Data {
    id: u64,
    key: CacheKey,
    value: CacheValue,
  },
  NotFound {
    id: u64,
    key: CacheKey,
  },
  Removed {
    id: u64,
    key: CacheKey,
    removed: bool,
  },
  Cleared {
    id: u64,
    cleared: bool,
  },
  Status {
    id: u64,
    status: ServerStatus,
  },
}

impl ServerMessage {
  pub fn id(&self) -> u64 {
    match self {
      Self::Added { id, .. }
      | Self::Data { id, .. }
      | Self::NotFound { id, .. }
      | Self::Removed { id, .. }
      | Self::Cleared { id, .. }
      | Self::Status { id, .. } => *id,
    }
  }

  pub fn added(id: u64, key: CacheKey, added: bool) -> Self {
    Self::Added { id, key, added }
  }

  pub fn data(id: u64, key: CacheKey, value: CacheValue) -> Self {
    Self::Data { id, key, value }
  }

  pub fn not_found(id: u64, key: CacheKey) -> Self {
    Self::NotFound { id, key }
  }

  pub fn removed(id: u64, key: CacheKey, removed: bool) -> Self {
    Self::Removed { id, key, removed }
  }

  pub fn encode(&self) -> Vec<u8> {
    rmp_serde::to_vec_named(self).unwrap_or_default()
  }

  pub fn decode(bytes: &[u8]) -> Result<Self, CacheError> {
    rmp_serde::from_slice(bytes).map_err(|e| CacheError::CorruptValue(e.to_string()))
  }
}

/// Snapshot of server identity and store occupancy, returned for
/// `StatusRequest`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerStatus {
  pub name: String,
  pub version: String,
  pub keys: u64,
  pub total_size: u64,
  pub hits: u64,
  pub misses: u64,
}
