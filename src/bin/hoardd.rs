use clap::Parser;
use hoard::server::{Daemon, ServerConfig, StoreBackend};
use hoard::store::{CacheStore, DiskStore, MemoryStore};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser)]
#[command(name = "hoardd", about = "Asset cache server", version)]
struct Args {
  #[arg(long)]
  host: Option<String>,
  #[arg(short, long)]
  port: Option<u16>,
  /// Use the disk store rooted at this folder
  #[arg(long, env = "HOARD_STORE_PATH")]
  store_path: Option<String>,
  /// Size cap for the disk store, e.g. "8gb"
  #[arg(long)]
  max_size: Option<String>,
  /// Upstream cache server, host:port
  #[arg(long, env = "HOARD_REMOTE")]
  remote: Option<String>,
  #[arg(short, long)]
  config: Option<String>,
  #[arg(long)]
  log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
  let args = Args::parse();

  // Load config: explicit path > auto-detect > defaults
  let mut config = if let Some(path) = &args.config {
    ServerConfig::from_file(path)?
  } else {
    ServerConfig::find_and_load()?.unwrap_or_default()
  };

  // CLI args override config file
  if let Some(host) = args.host {
    config.server.host = host;
  }
  if let Some(port) = args.port {
    config.server.port = port;
  }
  if let Some(path) = args.store_path {
    config.store.path = path;
    config.store.backend = StoreBackend::Disk;
  }
  if let Some(max) = args.max_size {
    config.store.max_size = max;
  }
  if let Some(remote) = args.remote {
    config.remote.host = Some(remote);
  }
  if let Some(level) = args.log_level {
    config.logging.level = level;
  }

  tracing_subscriber::registry()
    .with(
      tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.logging.level.clone().into()),
    )
    .with(tracing_subscriber::fmt::layer())
    .init();

  let store: Arc<dyn CacheStore> = match config.store.backend {
    StoreBackend::Memory => Arc::new(MemoryStore::new()),
    StoreBackend::Disk => {
      Arc::new(DiskStore::open(&config.store.path, config.max_store_size()?).await?)
    }
  };

  let daemon = Arc::new(Daemon::new(config, store));
  let daemon_clone = daemon.clone();

  // Handle shutdown signals (SIGINT, SIGTERM)
  tokio::spawn(async move {
    shutdown_signal().await;
    daemon_clone.shutdown();

    // Give the accept loop time to drain connections
    tokio::time::sleep(Duration::from_secs(2)).await;
    tracing::info!("Shutdown complete");
    std::process::exit(0);
  });

  daemon.run().await
}

async fn shutdown_signal() {
  let ctrl_c = async {
    tokio::signal::ctrl_c()
      .await
      .expect("Failed to install Ctrl+C handler");
  };

  #[cfg(unix)]
  let terminate = async {
    tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
      .expect("Failed to install SIGTERM handler")
      .recv()
      .await;
  };

  #[cfg(not(unix))]
  let terminate = std::future::pending::<()>();

  tokio::select! {
    _ = ctrl_c => tracing::info!("Received SIGINT"),
    _ = terminate => tracing::info!("Received SIGTERM"),
  }
}
