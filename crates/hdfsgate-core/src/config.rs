//! Static HDFS configuration record (`hadoop.hdfs.*`)

use serde::{Deserialize, Serialize};

use crate::error::{HdfsError, Result};

/// Prefix of environment variables that override `hadoop.hdfs` keys.
pub const ENV_PREFIX: &str = "HADOOP_HDFS_";

/// How the cluster-client configuration is sourced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigMode {
    /// Load `core-site.xml` and `hdfs-site.xml` from disk
    XmlResources,
    /// Build an HA nameservice from the `hosts` list
    HighAvailability,
}

/// Process-wide HDFS settings, loaded once at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HdfsConfig {
    /// Identity under which all cluster operations run
    pub username: String,
    /// Skip binding entirely; every operation then fails with `NotBound`
    pub disable: bool,
    /// Replication factor handed to the cluster client
    pub replication_factor: u8,
    /// Reach datanodes by hostname instead of IP
    pub force_use_data_node_hostname: bool,
    /// Mode A (XML site files) when true, mode B (HA host list) otherwise
    pub use_xml_resources: bool,
    /// Path to `core-site.xml` (mode A)
    pub core_site_path: Option<String>,
    /// Path to `hdfs-site.xml` (mode A)
    pub hdfs_site_path: Option<String>,
    /// Comma-separated `host:port` name-node addresses (mode B)
    pub hosts: Option<String>,
    /// Use the WebHDFS scheme as the default filesystem
    pub use_web_hdfs: bool,
    /// Authenticate with a keytab
    pub use_kerberos: bool,
    /// Keytab file used when `use_kerberos` is set
    pub user_key_tab_path: Option<String>,
}

impl Default for HdfsConfig {
    fn default() -> Self {
        Self {
            username: "hdfs".to_string(),
            disable: false,
            replication_factor: 1,
            // disabling this has produced spurious "block missing" errors
            force_use_data_node_hostname: true,
            use_xml_resources: false,
            core_site_path: None,
            hdfs_site_path: None,
            hosts: None,
            use_web_hdfs: false,
            use_kerberos: false,
            user_key_tab_path: None,
        }
    }
}

impl HdfsConfig {
    /// Returns the configuration mode selected by `use_xml_resources`.
    pub fn mode(&self) -> ConfigMode {
        if self.use_xml_resources {
            ConfigMode::XmlResources
        } else {
            ConfigMode::HighAvailability
        }
    }

    /// Checks the mode-specific requirements. A disabled config is always valid.
    pub fn validate(&self) -> Result<()> {
        if self.disable {
            return Ok(());
        }

        if self.username.trim().is_empty() {
            return Err(HdfsError::config("hadoop.hdfs.username cannot be empty"));
        }

        if self.replication_factor == 0 {
            return Err(HdfsError::config(
                "hadoop.hdfs.replicationFactor must be at least 1",
            ));
        }

        match self.mode() {
            ConfigMode::XmlResources => {
                if is_blank(&self.core_site_path) {
                    return Err(HdfsError::config(
                        "hadoop.hdfs.coreSitePath is required when useXmlResources is set",
                    ));
                }
                if is_blank(&self.hdfs_site_path) {
                    return Err(HdfsError::config(
                        "hadoop.hdfs.hdfsSitePath is required when useXmlResources is set",
                    ));
                }
            }
            ConfigMode::HighAvailability => {
                if is_blank(&self.hosts) {
                    return Err(HdfsError::config(
                        "hadoop.hdfs.hosts is required when useXmlResources is not set",
                    ));
                }
            }
        }

        if self.use_kerberos && is_blank(&self.user_key_tab_path) {
            return Err(HdfsError::config(
                "hadoop.hdfs.userKeyTabPath is required when useKerberos is set",
            ));
        }

        Ok(())
    }

    /// Applies `HADOOP_HDFS_<FIELD>` overrides from the given variables.
    pub fn apply_env_overrides<I>(&mut self, vars: I) -> Result<()>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            let Some(field) = key.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            match field {
                "USERNAME" => self.username = value,
                "DISABLE" => self.disable = parse_bool(&key, &value)?,
                "REPLICATION_FACTOR" => {
                    self.replication_factor = value.trim().parse().map_err(|_| {
                        HdfsError::config(format!("{key} must be a small integer, got '{value}'"))
                    })?
                }
                "FORCE_USE_DATA_NODE_HOSTNAME" => {
                    self.force_use_data_node_hostname = parse_bool(&key, &value)?
                }
                "USE_XML_RESOURCES" => self.use_xml_resources = parse_bool(&key, &value)?,
                "CORE_SITE_PATH" => self.core_site_path = Some(value),
                "HDFS_SITE_PATH" => self.hdfs_site_path = Some(value),
                "HOSTS" => self.hosts = Some(value),
                "USE_WEB_HDFS" => self.use_web_hdfs = parse_bool(&key, &value)?,
                "USE_KERBEROS" => self.use_kerberos = parse_bool(&key, &value)?,
                "USER_KEY_TAB_PATH" => self.user_key_tab_path = Some(value),
                _ => tracing::warn!(variable = %key, "ignoring unknown hadoop.hdfs override"),
            }
        }
        Ok(())
    }
}

/// The `hadoop` namespace; holds the `hdfs` table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HadoopConfig {
    /// `hadoop.hdfs.*` keys
    pub hdfs: HdfsConfig,
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map(str::trim).unwrap_or_default().is_empty()
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(HdfsError::config(format!(
            "{key} must be a boolean, got '{value}'"
        ))),
    }
}
