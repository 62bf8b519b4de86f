//! Gateway configuration file: `hadoop.hdfs`, bridge and message settings.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use hdfsgate_core::HadoopConfig;
use serde::{Deserialize, Serialize};

use crate::error::{Result, ServerError};

/// Bridge listener settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Address the JSON-lines listener binds to
    pub bind_addr: SocketAddr,
    /// Longest accepted request line, in bytes
    pub max_frame_bytes: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 10870)),
            max_frame_bytes: 64 * 1024 * 1024,
        }
    }
}

/// Localized message settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessagesConfig {
    /// Locale used when a request carries none
    pub default_locale: String,
    /// Directory of `messages_<locale>.properties` overrides
    pub bundle_dir: Option<PathBuf>,
}

impl Default for MessagesConfig {
    fn default() -> Self {
        Self {
            default_locale: "en".to_string(),
            bundle_dir: None,
        }
    }
}

/// Root of the gateway configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// `hadoop.hdfs.*` settings
    pub hadoop: HadoopConfig,
    /// Listener settings
    pub bridge: BridgeConfig,
    /// Message bundle settings
    pub messages: MessagesConfig,
    /// Log filter used when `RUST_LOG` is unset
    pub log_level: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            hadoop: HadoopConfig::default(),
            bridge: BridgeConfig::default(),
            messages: MessagesConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

impl GatewayConfig {
    /// Parses a `.toml` or `.json` file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();

        match ext.to_lowercase().as_str() {
            "toml" => toml::from_str(&contents)
                .map_err(|e| ServerError::Config(format!("{}: {e}", path.display()))),
            "json" => serde_json::from_str(&contents)
                .map_err(|e| ServerError::Config(format!("{}: {e}", path.display()))),
            _ => Err(ServerError::Config(format!(
                "unsupported config file extension: {ext}"
            ))),
        }
    }

    /// Reads `path` when it exists (defaults otherwise), then applies
    /// `HADOOP_HDFS_*` variables from `vars`.
    pub fn load<I>(path: &Path, vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut config = if path.exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("Config file not found, using defaults: {}", path.display());
            Self::default()
        };
        config.hadoop.hdfs.apply_env_overrides(vars)?;
        Ok(config)
    }
}
