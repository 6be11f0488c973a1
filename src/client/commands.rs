use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use super::Connection;
use crate::error::CacheError;
use crate::types::{CacheKey, CacheValue};

pub const DEFAULT_PORT: u16 = 44234;

#[derive(Parser)]
#[command(name = "hoard", about = "Asset cache client", version)]
pub struct ClientArgs {
  /// Cache server host
  #[arg(long = "ip", default_value = "localhost", env = "HOARD_HOST")]
  pub host: String,
  /// Cache server port
  #[arg(short, long, default_value_t = DEFAULT_PORT, env = "HOARD_PORT")]
  pub port: u16,
  /// Per-request timeout in milliseconds
  #[arg(short, long = "timeout-ms", default_value_t = 60_000)]
  pub timeout_ms: u64,
  #[command(subcommand)]
  pub command: Commands,
}

impl ClientArgs {
  pub fn address(&self) -> String {
    format!("{}:{}", self.host, self.port)
  }
}

#[derive(Subcommand)]
pub enum Commands {
  /// Add files to the cache under a key
  Add {
    /// Content address, hex
    #[arg(short, long)]
    key: String,
    /// Files to pack into the cached value
    #[arg(short, long, num_args = 1.., required = true)]
    files: Vec<PathBuf>,
    /// Free-form note stored with the value
    #[arg(short, long)]
    descr: Option<String>,
  },
  /// Fetch a cached value and write its files to a directory
  Get {
    #[arg(short, long)]
    key: String,
    /// Output directory
    #[arg(short, long, default_value = ".")]
    out_dir: PathBuf,
  },
  /// Remove one entry
  Remove {
    #[arg(short, long)]
    key: String,
  },
  /// Drop every entry on the server
  Clear,
  /// Ask the server to keep an entry warm
  Warmup {
    #[arg(short, long)]
    key: String,
  },
  /// Print server status
  Status,
}

/// Runs one subcommand against the server. `Ok(true)` means the operation
/// reported success; `Ok(false)` is a clean "it said no" (entry missing,
/// nothing removed).
pub async fn run_command(args: &ClientArgs) -> Result<bool, CacheError> {
  let conn =
    Connection::connect_with_timeout(&args.address(), Duration::from_millis(args.timeout_ms))
      .await?;

  match &args.command {
    Commands::Add { key, files, descr } => {
      let key: CacheKey = key.parse()?;
      let mut value = match descr {
        Some(d) => CacheValue::with_description(d.clone()),
        None => CacheValue::new(),
      };
      for path in files {
        let name = path
          .file_name()
          .map(|n| n.to_string_lossy().into_owned())
          .unwrap_or_else(|| path.display().to_string());
        value.add_buffer(name, std::fs::read(path)?)?;
      }
      let added = conn.add(key, value).await?;
      if added {
        println!("added {}", key);
      } else {
        eprintln!("server rejected {}", key);
      }
      Ok(added)
    }
    Commands::Get { key, out_dir } => {
      let key: CacheKey = key.parse()?;
      match conn.get(key).await? {
        Some(value) => {
          std::fs::create_dir_all(out_dir)?;
          for buffer in value.buffers() {
            let path = out_dir.join(&buffer.name);
            std::fs::write(&path, &buffer.data)?;
            println!("{}", path.display());
          }
          Ok(true)
        }
        None => {
          eprintln!("{} not found", key);
          Ok(false)
        }
      }
    }
    Commands::Remove { key } => {
      let key: CacheKey = key.parse()?;
      let removed = conn.remove(key).await?;
      println!("{}", if removed { "removed" } else { "no such entry" });
      Ok(removed)
    }
    Commands::Clear => {
      let cleared = conn.clear().await?;
      println!("{}", if cleared { "cleared" } else { "clear failed" });
      Ok(cleared)
    }
    Commands::Warmup { key } => {
      let key: CacheKey = key.parse()?;
      conn.warm_up(key)?;
      // a status round-trip flushes the advisory frame before we exit
      conn.status().await?;
      Ok(true)
    }
    Commands::Status => {
      let status = conn.status().await?;
      println!("{}", serde_json::to_string_pretty(&status).unwrap_or_default());
      Ok(true)
    }
  }
}
