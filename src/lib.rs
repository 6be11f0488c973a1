pub mod client;
pub mod error;
pub mod server;
pub mod store;
pub mod types;

pub use error::CacheError;
