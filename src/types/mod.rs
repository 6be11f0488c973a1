mod key;
mod protocol;
mod value;

pub use key::{CacheKey, HASH_SIZE};
pub use protocol::{ClientMessage, ServerMessage, ServerStatus};
pub use value::{CacheValue, NamedBuffer};
