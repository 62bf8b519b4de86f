//! Builds the cluster-client [`Configuration`] from an [`HdfsConfig`].
//!
//! Two sourcing modes are supported: XML site files (mode A) and a
//! programmatic HA nameservice built from a host list (mode B). Both then
//! receive the common scheme bindings, datanode hostname policy and, when
//! enabled, Kerberos authentication.

use crate::config::{ConfigMode, HdfsConfig};
use crate::configuration::Configuration;
use crate::error::{HdfsError, Result};

/// Logical nameservice used by mode B.
pub const CLUSTER_NAME: &str = "NameNodeCluster";

/// Default filesystem URI key.
pub const FS_DEFAULT_FS: &str = "fs.defaultFS";
/// Legacy default filesystem key mirrored from `fs.defaultFS`.
pub const FS_DEFAULT_NAME: &str = "fs.default.name";
/// Implementation bound to the `hdfs` scheme.
pub const FS_HDFS_IMPL: &str = "fs.hdfs.impl";
/// Implementation bound to the `file` scheme.
pub const FS_FILE_IMPL: &str = "fs.file.impl";
/// Implementation bound to the `webhdfs` scheme.
pub const FS_WEBHDFS_IMPL: &str = "fs.webhdfs.impl";
/// Nameservice list key.
pub const DFS_NAMESERVICES: &str = "dfs.nameservices";
/// Prefix of the per-nameservice name-node id list.
pub const DFS_HA_NAMENODES_PREFIX: &str = "dfs.ha.namenodes.";
/// Prefix of the per-name-node RPC address.
pub const DFS_NAMENODE_RPC_ADDRESS_PREFIX: &str = "dfs.namenode.rpc-address.";
/// Prefix of the per-name-node HTTP address.
pub const DFS_NAMENODE_HTTP_ADDRESS_PREFIX: &str = "dfs.namenode.http-address.";
/// Prefix of the per-nameservice failover proxy provider.
pub const DFS_CLIENT_FAILOVER_PROXY_PROVIDER_PREFIX: &str = "dfs.client.failover.proxy.provider.";
/// Replication factor key.
pub const DFS_REPLICATION: &str = "dfs.replication";
/// Datanode hostname policy key.
pub const DFS_CLIENT_USE_DATANODE_HOSTNAME: &str = "dfs.client.use.datanode.hostname";
/// Security authentication method key.
pub const HADOOP_SECURITY_AUTHENTICATION: &str = "hadoop.security.authentication";

/// Backend identifier for the distributed filesystem.
pub const DISTRIBUTED_FILE_SYSTEM: &str = "DistributedFileSystem";
/// Backend identifier for the local filesystem.
pub const LOCAL_FILE_SYSTEM: &str = "LocalFileSystem";
/// Backend identifier for the WebHDFS filesystem.
pub const WEBHDFS_FILE_SYSTEM: &str = "WebHdfsFileSystem";
/// Failover provider that walks the configured name-nodes in order.
pub const CONFIGURED_FAILOVER_PROXY_PROVIDER: &str = "ConfiguredFailoverProxyProvider";

/// Stateless builder of cluster-client configurations.
pub struct ConfigurationAssembler;

impl ConfigurationAssembler {
    /// Builds the configuration for whichever mode `config` selects.
    pub fn assemble(config: &HdfsConfig) -> Result<Configuration> {
        config.validate()?;

        let mut conf = match config.mode() {
            ConfigMode::XmlResources => Self::xml_resources_configuration(config)?,
            ConfigMode::HighAvailability => Self::ha_configuration(config)?,
        };

        if config.use_kerberos {
            conf.set(HADOOP_SECURITY_AUTHENTICATION, "kerberos");
        }
        conf.set(
            DFS_CLIENT_USE_DATANODE_HOSTNAME,
            config.force_use_data_node_hostname.to_string(),
        );

        tracing::debug!(
            mode = ?config.mode(),
            default_fs = %conf.get(FS_DEFAULT_FS).unwrap_or_default(),
            keys = conf.len(),
            "cluster configuration assembled"
        );
        Ok(conf)
    }

    /// Mode A: loads `core-site` and `hdfs-site` and mirrors `fs.defaultFS`.
    pub fn xml_resources_configuration(config: &HdfsConfig) -> Result<Configuration> {
        let core_site = required(&config.core_site_path, "coreSitePath")?;
        let hdfs_site = required(&config.hdfs_site_path, "hdfsSitePath")?;

        let mut conf = Configuration::new();
        conf.add_resource(core_site)?;
        conf.add_resource(hdfs_site)?;
        bind_schemes(&mut conf);

        let mut default_fs = conf.get(FS_DEFAULT_FS).ok_or_else(|| {
            HdfsError::config(format!(
                "{FS_DEFAULT_FS} is not defined by {core_site} or {hdfs_site}"
            ))
        })?;

        if config.use_web_hdfs {
            if let Some(authority) = default_fs.strip_prefix("hdfs://") {
                default_fs = format!("webhdfs://{authority}");
                conf.set(FS_DEFAULT_FS, default_fs.clone());
            } else {
                tracing::warn!(
                    default_fs = %default_fs,
                    "useWebHdfs set but default filesystem is not hdfs; leaving it unchanged"
                );
            }
        }

        conf.set(FS_DEFAULT_NAME, default_fs);
        Ok(conf)
    }

    /// Mode B: builds an HA nameservice over the comma-separated `hosts`.
    pub fn ha_configuration(config: &HdfsConfig) -> Result<Configuration> {
        let hosts = parse_hosts(required(&config.hosts, "hosts")?)?;

        let mut conf = Configuration::new();
        bind_schemes(&mut conf);

        let scheme = if config.use_web_hdfs { "webhdfs" } else { "hdfs" };
        let default_fs = format!("{scheme}://{CLUSTER_NAME}");
        conf.set(FS_DEFAULT_FS, default_fs.clone());
        conf.set(FS_DEFAULT_NAME, default_fs);
        conf.set(DFS_NAMESERVICES, CLUSTER_NAME);

        let ids: Vec<String> = (0..hosts.len()).map(|i| format!("nn{i}")).collect();
        conf.set(format!("{DFS_HA_NAMENODES_PREFIX}{CLUSTER_NAME}"), ids.join(","));

        for (id, host) in ids.iter().zip(&hosts) {
            conf.set(
                format!("{DFS_NAMENODE_RPC_ADDRESS_PREFIX}{CLUSTER_NAME}.{id}"),
                host.clone(),
            );
            if config.use_web_hdfs {
                conf.set(
                    format!("{DFS_NAMENODE_HTTP_ADDRESS_PREFIX}{CLUSTER_NAME}.{id}"),
                    host.clone(),
                );
            }
        }

        conf.set(
            format!("{DFS_CLIENT_FAILOVER_PROXY_PROVIDER_PREFIX}{CLUSTER_NAME}"),
            CONFIGURED_FAILOVER_PROXY_PROVIDER,
        );
        conf.set(DFS_REPLICATION, config.replication_factor.to_string());

        Ok(conf)
    }
}

fn bind_schemes(conf: &mut Configuration) {
    conf.set(FS_HDFS_IMPL, DISTRIBUTED_FILE_SYSTEM);
    conf.set(FS_FILE_IMPL, LOCAL_FILE_SYSTEM);
    conf.set(FS_WEBHDFS_IMPL, WEBHDFS_FILE_SYSTEM);
}

fn required<'a>(value: &'a Option<String>, key: &str) -> Result<&'a str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| HdfsError::config(format!("hadoop.hdfs.{key} is required")))
}

/// Splits the host list on literal commas, preserving order.
pub fn parse_hosts(hosts: &str) -> Result<Vec<String>> {
    hosts
        .split(',')
        .map(|h| {
            let h = h.trim();
            if h.is_empty() {
                Err(HdfsError::config(format!(
                    "hadoop.hdfs.hosts contains an empty entry: '{hosts}'"
                )))
            } else {
                Ok(h.to_string())
            }
        })
        .collect()
}
