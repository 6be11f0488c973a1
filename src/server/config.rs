use serde::{Deserialize, Serialize};
use std::path::Path;

/// Expand `${VAR_NAME}` references against the process environment. Unset
/// variables expand to the empty string.
fn expand_env_vars(input: &str) -> String {
  let mut result = input.to_string();
  while let Some(start) = result.find("${") {
    if let Some(end) = result[start..].find('}') {
      let var_name = &result[start + 2..start + end];
      let value = std::env::var(var_name).unwrap_or_default();
      result = format!(
        "{}{}{}",
        &result[..start],
        value,
        &result[start + end + 1..]
      );
    } else {
      break;
    }
  }
  result
}

/// Parse a human-readable size such as "8gb", "512 MB", "1024" (bytes).
pub fn parse_memory_size(s: &str) -> Option<u64> {
  let s = s.trim().to_lowercase().replace(' ', "");
  let (digits, unit): (String, String) = s.chars().partition(|c| c.is_ascii_digit());
  let n: u64 = digits.parse().ok()?;
  match unit.as_str() {
    "" | "b" => Some(n),
    "kb" => Some(n * 1024),
    "mb" => Some(n * 1024 * 1024),
    "gb" => Some(n * 1024 * 1024 * 1024),
    _ => None,
  }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
  #[default]
  Memory,
  Disk,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
  #[serde(default)]
  pub server: ServerSection,
  #[serde(default)]
  pub store: StoreSection,
  #[serde(default)]
  pub remote: RemoteSection,
  #[serde(default)]
  pub logging: LoggingSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
  #[serde(default = "default_host")]
  pub host: String,
  #[serde(default = "default_port")]
  pub port: u16,
  /// Name reported in status responses.
  #[serde(default = "default_name")]
  pub name: String,
}

fn default_host() -> String {
  "0.0.0.0".into()
}

fn default_port() -> u16 {
  crate::client::DEFAULT_PORT
}

fn default_name() -> String {
  std::env::var("HOSTNAME").unwrap_or_else(|_| "hoard".into())
}

impl Default for ServerSection {
  fn default() -> Self {
    Self {
      host: default_host(),
      port: default_port(),
      name: default_name(),
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSection {
  #[serde(default)]
  pub backend: StoreBackend,
  /// Root folder for the disk backend.
  #[serde(default = "default_store_path")]
  pub path: String,
  /// Size cap for the disk backend, e.g. "8gb".
  #[serde(default = "default_max_size")]
  pub max_size: String,
}

fn default_store_path() -> String {
  "./hoard-cache".into()
}

fn default_max_size() -> String {
  "8gb".into()
}

impl Default for StoreSection {
  fn default() -> Self {
    Self {
      backend: StoreBackend::default(),
      path: default_store_path(),
      max_size: default_max_size(),
    }
  }
}

/// Optional upstream cache server; local misses fall through to it and a hit
/// is stored locally on the way back.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemoteSection {
  #[serde(default)]
  pub host: Option<String>,
  #[serde(default = "default_remote_timeout_ms")]
  pub timeout_ms: u64,
}

fn default_remote_timeout_ms() -> u64 {
  10_000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSection {
  #[serde(default = "default_log_level")]
  pub level: String,
}

fn default_log_level() -> String {
  "info".into()
}

impl Default for LoggingSection {
  fn default() -> Self {
    Self {
      level: default_log_level(),
    }
  }
}

impl ServerConfig {
  pub fn from_file(path: impl AsRef<Path>) -> Result<Self, anyhow::Error> {
    let content = std::fs::read_to_string(&path)?;
    let expanded = expand_env_vars(&content);
    Ok(serde_yaml::from_str(&expanded)?)
  }

  pub fn find_and_load() -> Result<Option<Self>, anyhow::Error> {
    for p in ["hoard.yaml", "hoard.yml"] {
      if Path::new(p).exists() {
        tracing::info!("Loading config from {}", p);
        return Ok(Some(Self::from_file(p)?));
      }
    }
    Ok(None)
  }

  pub fn address(&self) -> String {
    format!("{}:{}", self.server.host, self.server.port)
  }

  pub fn max_store_size(&self) -> Result<u64, anyhow::Error> {
    parse_memory_size(&self.store.max_size)
      .ok_or_else(|| anyhow::anyhow!("Invalid store.max_size: {}", self.store.max_size))
  }
}
