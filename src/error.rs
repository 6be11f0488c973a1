use thiserror::Error;

/// Error taxonomy of the cache layer.
///
/// Transport- and decode-level failures on the server are logged and
/// recovered locally; everything here is what a caller of the client API or
/// the CLI can observe.
#[derive(Debug, Error)]
pub enum CacheError {
  /// Could not establish or bind the connection. Retryable by reopening.
  #[error("connection failed: {0}")]
  Connect(String),

  /// The transport rejected a send. The connection itself may still be
  /// usable for later calls.
  #[error("send failed")]
  SendFailed,

  /// A hex key string had the wrong length or non-hex characters.
  #[error("malformed cache key: {0}")]
  MalformedKey(String),

  /// A buffer with the same name was already added to the value.
  #[error("duplicate buffer name: {0}")]
  DuplicateBuffer(String),

  /// A serialized value or wire message could not be decoded.
  #[error("corrupt value: {0}")]
  CorruptValue(String),

  /// A call did not complete within its deadline. The call is abandoned;
  /// a late response is discarded, the connection stays usable.
  #[error("request timed out")]
  Timeout,

  /// The channel closed while a call was outstanding.
  #[error("disconnected")]
  Disconnected,

  #[error(transparent)]
  Io(#[from] std::io::Error),
}

impl CacheError {
  /// Stable process exit code for the CLI, one per error kind. Code 1 means
  /// the operation itself reported failure, code 2 is clap's usage error.
  pub fn exit_code(&self) -> i32 {
    match self {
      CacheError::Connect(_) => 3,
      CacheError::Timeout => 4,
      CacheError::SendFailed | CacheError::Disconnected => 5,
      CacheError::MalformedKey(_) => 6,
      CacheError::DuplicateBuffer(_) | CacheError::CorruptValue(_) => 7,
      CacheError::Io(_) => 8,
    }
  }
}
