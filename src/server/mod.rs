mod config;
mod daemon;
mod handler;
mod websocket;

pub use config::{parse_memory_size, ServerConfig, StoreBackend};
pub use daemon::Daemon;
pub use handler::MessageHandler;
pub use websocket::WebSocketServer;
