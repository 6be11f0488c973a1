use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

use super::{MessageHandler, ServerConfig, WebSocketServer};
use crate::client::Connection;
use crate::store::CacheStore;

pub struct Daemon {
  config: ServerConfig,
  store: Arc<dyn CacheStore>,
  shutdown_tx: broadcast::Sender<()>,
}

impl Daemon {
  pub fn new(config: ServerConfig, store: Arc<dyn CacheStore>) -> Self {
    let (shutdown_tx, _) = broadcast::channel(1);
    Self {
      config,
      store,
      shutdown_tx,
    }
  }

  /// Trigger graceful shutdown of the accept loop.
  pub fn shutdown(&self) {
    tracing::info!("Initiating graceful shutdown...");
    let _ = self.shutdown_tx.send(());
  }

  pub async fn run(&self) -> Result<(), anyhow::Error> {
    let remote = self.connect_remote().await;
    let handler = Arc::new(MessageHandler::new(
      self.store.clone(),
      remote,
      self.config.server.name.clone(),
    ));

    let server = WebSocketServer::new(handler, self.shutdown_tx.subscribe());
    server.run(&self.config.address()).await
  }

  /// Opens the upstream connection if one is configured. An unreachable
  /// upstream downgrades the server to standalone instead of failing it.
  async fn connect_remote(&self) -> Option<Arc<Connection>> {
    let host = self.config.remote.host.as_deref()?;
    let timeout = Duration::from_millis(self.config.remote.timeout_ms);
    match Connection::connect_with_timeout(host, timeout).await {
      Ok(conn) => {
        tracing::info!("Connected to upstream cache at {}", host);
        Some(Arc::new(conn))
      }
      Err(e) => {
        tracing::warn!("Upstream cache {} unavailable, running standalone: {}", host, e);
        None
      }
    }
  }
}
