//! Turns an assembled configuration into the process-wide filesystem handle.
//!
//! The binder authenticates (keytab or trusted remote user), resolves the
//! default filesystem's scheme to a connector through `fs.<scheme>.impl`
//! and connects under the resulting identity. It runs once per process.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use crate::assembler::{
    ConfigurationAssembler, DISTRIBUTED_FILE_SYSTEM, FS_DEFAULT_FS, LOCAL_FILE_SYSTEM,
    WEBHDFS_FILE_SYSTEM,
};
use crate::config::HdfsConfig;
use crate::configuration::Configuration;
use crate::error::{HdfsError, Result};
use crate::fs::local::LocalFileSystem;
use crate::fs::memory::MemoryFileSystem;
use crate::fs::path::split_uri;
use crate::fs::webhdfs::WebHdfsFileSystem;
use crate::fs::ClusterFileSystem;
use crate::identity::{IdentityService, KerberosIdentityService, UserContext};

/// Backend identifier for the in-memory filesystem.
pub const MEMORY_FILE_SYSTEM: &str = "MemoryFileSystem";

/// Creates a filesystem for a default-filesystem URI.
#[async_trait]
pub trait FileSystemConnector: Send + Sync {
    /// Connects to `uri` as `user`.
    async fn connect(
        &self,
        conf: &Configuration,
        uri: &str,
        user: &UserContext,
    ) -> Result<Arc<dyn ClusterFileSystem>>;
}

struct WebHdfsConnector;

#[async_trait]
impl FileSystemConnector for WebHdfsConnector {
    async fn connect(
        &self,
        conf: &Configuration,
        uri: &str,
        user: &UserContext,
    ) -> Result<Arc<dyn ClusterFileSystem>> {
        Ok(Arc::new(WebHdfsFileSystem::from_configuration(conf, uri, user)?))
    }
}

struct LocalConnector;

#[async_trait]
impl FileSystemConnector for LocalConnector {
    async fn connect(
        &self,
        _conf: &Configuration,
        _uri: &str,
        _user: &UserContext,
    ) -> Result<Arc<dyn ClusterFileSystem>> {
        Ok(Arc::new(LocalFileSystem::new()))
    }
}

/// Hands out one shared in-memory namespace.
pub struct MemoryConnector(pub Arc<MemoryFileSystem>);

#[async_trait]
impl FileSystemConnector for MemoryConnector {
    async fn connect(
        &self,
        _conf: &Configuration,
        _uri: &str,
        _user: &UserContext,
    ) -> Result<Arc<dyn ClusterFileSystem>> {
        Ok(self.0.clone())
    }
}

/// Maps backend identifiers (the values of `fs.<scheme>.impl`) to connectors.
#[derive(Clone, Default)]
pub struct FileSystemRegistry {
    connectors: HashMap<String, Arc<dyn FileSystemConnector>>,
}

impl fmt::Debug for FileSystemRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.connectors.keys().collect();
        names.sort();
        f.debug_struct("FileSystemRegistry")
            .field("connectors", &names)
            .finish()
    }
}

impl FileSystemRegistry {
    /// Registry knowing the distributed, WebHDFS and local backends.
    pub fn with_defaults() -> Self {
        let mut registry = Self::default();
        registry.register(DISTRIBUTED_FILE_SYSTEM, Arc::new(WebHdfsConnector));
        registry.register(WEBHDFS_FILE_SYSTEM, Arc::new(WebHdfsConnector));
        registry.register(LOCAL_FILE_SYSTEM, Arc::new(LocalConnector));
        registry
    }

    /// Registers `connector` under the backend identifier `name`, replacing any previous one.
    pub fn register(&mut self, name: &str, connector: Arc<dyn FileSystemConnector>) {
        self.connectors.insert(name.to_string(), connector);
    }

    /// Registers `fs` under [`MEMORY_FILE_SYSTEM`].
    pub fn register_memory(&mut self, fs: Arc<MemoryFileSystem>) {
        self.register(MEMORY_FILE_SYSTEM, Arc::new(MemoryConnector(fs)));
    }

    /// Connector registered under `name`.
    pub fn get(&self, name: &str) -> Option<Arc<dyn FileSystemConnector>> {
        self.connectors.get(name).cloned()
    }

    /// Resolves the connector bound to `scheme` by the configuration.
    pub fn for_scheme(
        &self,
        conf: &Configuration,
        scheme: &str,
    ) -> Result<Arc<dyn FileSystemConnector>> {
        let key = format!("fs.{scheme}.impl");
        let name = conf
            .get(&key)
            .ok_or_else(|| HdfsError::config(format!("no filesystem for scheme '{scheme}' ({key} unset)")))?;
        self.get(&name).ok_or_else(|| {
            HdfsError::config(format!("unknown filesystem implementation '{name}' for scheme '{scheme}'"))
        })
    }
}

/// A bound filesystem and the identity it was acquired under.
#[derive(Debug, Clone)]
pub struct Handle {
    /// The connected filesystem
    pub fs: Arc<dyn ClusterFileSystem>,
    /// Identity the filesystem was acquired under
    pub user: UserContext,
}

impl Handle {
    /// Pairs a filesystem with its identity.
    pub fn new(fs: Arc<dyn ClusterFileSystem>, user: UserContext) -> Self {
        Self { fs, user }
    }
}

/// Binder lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinderState {
    /// No bind attempted yet
    Unbound,
    /// Login and connection in progress
    Binding,
    /// A handle was produced
    Bound,
    /// Binding failed; the process must not serve
    Failed,
}

/// Single-shot producer of the filesystem [`Handle`].
pub struct FilesystemBinder {
    registry: FileSystemRegistry,
    identity: Box<dyn IdentityService>,
    state: BinderState,
}

impl FilesystemBinder {
    /// Binder over `registry`, logging in through `identity`.
    pub fn new(registry: FileSystemRegistry, identity: Box<dyn IdentityService>) -> Self {
        Self {
            registry,
            identity,
            state: BinderState::Unbound,
        }
    }

    /// Binder with the default registry and Kerberos identity service.
    pub fn with_defaults() -> Self {
        Self::new(
            FileSystemRegistry::with_defaults(),
            Box::new(KerberosIdentityService::new()),
        )
    }

    /// Current lifecycle state.
    pub fn state(&self) -> BinderState {
        self.state
    }

    /// Assembles the configuration and binds, unless the gateway is disabled.
    pub async fn bootstrap(&mut self, config: &HdfsConfig) -> Result<Option<Handle>> {
        if config.disable {
            tracing::info!("hdfs integration disabled; operations will report NotBound");
            return Ok(None);
        }
        let conf = match ConfigurationAssembler::assemble(config) {
            Ok(conf) => conf,
            Err(e) => {
                self.state = BinderState::Failed;
                tracing::error!(error = %e, "cluster configuration rejected");
                return Err(e);
            }
        };
        self.bind(config, &conf).await.map(Some)
    }

    /// Authenticates and connects the default filesystem of `conf`.
    pub async fn bind(&mut self, config: &HdfsConfig, conf: &Configuration) -> Result<Handle> {
        if self.state != BinderState::Unbound {
            return Err(HdfsError::config(format!(
                "filesystem binder already ran (state {:?})",
                self.state
            )));
        }
        self.state = BinderState::Binding;

        match self.connect(config, conf).await {
            Ok(handle) => {
                self.state = BinderState::Bound;
                tracing::info!(
                    uri = handle.fs.uri(),
                    canonical_service_name = ?handle.fs.canonical_service_name(),
                    user = handle.user.user_name(),
                    "filesystem bound"
                );
                Ok(handle)
            }
            Err(e) => {
                self.state = BinderState::Failed;
                tracing::error!(error = %e, "filesystem binding failed");
                Err(e)
            }
        }
    }

    async fn connect(&mut self, config: &HdfsConfig, conf: &Configuration) -> Result<Handle> {
        let user = if config.use_kerberos {
            let keytab = config
                .user_key_tab_path
                .as_deref()
                .ok_or_else(|| HdfsError::config("hadoop.hdfs.userKeyTabPath is required"))?;
            self.identity.set_configuration(conf);
            self.identity
                .login_from_keytab(&config.username, Path::new(keytab))
                .await?
        } else {
            self.identity.create_remote_user(&config.username)
        };

        let default_fs = conf
            .get(FS_DEFAULT_FS)
            .ok_or_else(|| HdfsError::config(format!("{FS_DEFAULT_FS} is not set")))?;
        let (scheme, _, _) = split_uri(&default_fs);
        if scheme.is_empty() {
            return Err(HdfsError::config(format!(
                "{FS_DEFAULT_FS} has no scheme: {default_fs}"
            )));
        }
        let connector = self.registry.for_scheme(conf, scheme)?;

        let fs = user
            .do_as(|u| async move { connector.connect(conf, &default_fs, &u).await })
            .await?;
        Ok(Handle::new(fs, user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::FS_HDFS_IMPL;

    fn memory_registry() -> (Arc<MemoryFileSystem>, FileSystemRegistry) {
        let fs = Arc::new(MemoryFileSystem::new("hdfs://NameNodeCluster"));
        let mut registry = FileSystemRegistry::with_defaults();
        registry.register_memory(fs.clone());
        (fs, registry)
    }

    fn ha_config() -> HdfsConfig {
        HdfsConfig {
            hosts: Some("nn-a:8020,nn-b:8020".to_string()),
            ..HdfsConfig::default()
        }
    }

    struct FixedIdentity;

    #[async_trait]
    impl IdentityService for FixedIdentity {
        fn set_configuration(&mut self, _conf: &Configuration) {}

        async fn login_from_keytab(&self, principal: &str, keytab: &Path) -> Result<UserContext> {
            Ok(UserContext::kerberos(principal, keytab, None))
        }
    }

    #[tokio::test]
    async fn test_bind_memory_backend() {
        let (_fs, registry) = memory_registry();
        let mut binder = FilesystemBinder::new(registry, Box::new(KerberosIdentityService::new()));
        let mut conf = ConfigurationAssembler::assemble(&ha_config()).unwrap();
        conf.set(FS_HDFS_IMPL, MEMORY_FILE_SYSTEM);

        assert_eq!(binder.state(), BinderState::Unbound);
        let handle = binder.bind(&ha_config(), &conf).await.unwrap();
        assert_eq!(binder.state(), BinderState::Bound);
        assert_eq!(handle.fs.uri(), "hdfs://NameNodeCluster");
        assert_eq!(handle.user.user_name(), "hdfs");
        assert!(!handle.user.is_kerberos());
    }

    #[tokio::test]
    async fn test_bind_runs_once() {
        let (_fs, registry) = memory_registry();
        let mut binder = FilesystemBinder::new(registry, Box::new(KerberosIdentityService::new()));
        let mut conf = ConfigurationAssembler::assemble(&ha_config()).unwrap();
        conf.set(FS_HDFS_IMPL, MEMORY_FILE_SYSTEM);

        binder.bind(&ha_config(), &conf).await.unwrap();
        let err = binder.bind(&ha_config(), &conf).await.unwrap_err();
        assert_eq!(err.kind(), "ConfigInvalid");
        assert_eq!(binder.state(), BinderState::Bound);
    }

    #[tokio::test]
    async fn test_unknown_scheme_fails_binding() {
        let mut binder = FilesystemBinder::with_defaults();
        let mut conf = Configuration::new();
        conf.set(FS_DEFAULT_FS, "s3a://bucket");
        let err = binder.bind(&ha_config(), &conf).await.unwrap_err();
        assert_eq!(err.kind(), "ConfigInvalid");
        assert_eq!(binder.state(), BinderState::Failed);
    }

    #[test]
    fn test_unknown_implementation_is_config_error() {
        let registry = FileSystemRegistry::with_defaults();
        let mut conf = Configuration::new();
        conf.set("fs.memory.impl", MEMORY_FILE_SYSTEM);
        assert!(registry.for_scheme(&conf, "memory").is_err());
        assert!(registry.for_scheme(&conf, "hdfs").is_err());
    }

    #[tokio::test]
    async fn test_bootstrap_disabled_yields_no_handle() {
        let mut binder = FilesystemBinder::with_defaults();
        let config = HdfsConfig {
            disable: true,
            ..HdfsConfig::default()
        };
        assert!(binder.bootstrap(&config).await.unwrap().is_none());
        assert_eq!(binder.state(), BinderState::Unbound);
    }

    #[tokio::test]
    async fn test_bootstrap_ha_binds_webhdfs_client() {
        let mut binder = FilesystemBinder::with_defaults();
        let handle = binder.bootstrap(&ha_config()).await.unwrap().unwrap();
        assert_eq!(handle.fs.uri(), "hdfs://NameNodeCluster");
        assert_eq!(
            handle.fs.canonical_service_name().as_deref(),
            Some("nn-a:9870")
        );
    }

    #[tokio::test]
    async fn test_kerberos_binding_logs_in_from_keytab() {
        let (_fs, registry) = memory_registry();
        let mut binder = FilesystemBinder::new(registry, Box::new(FixedIdentity));
        let config = HdfsConfig {
            use_kerberos: true,
            user_key_tab_path: Some("/etc/hdfs.keytab".to_string()),
            ..ha_config()
        };
        let mut conf = ConfigurationAssembler::assemble(&config).unwrap();
        conf.set(FS_HDFS_IMPL, MEMORY_FILE_SYSTEM);

        let handle = binder.bind(&config, &conf).await.unwrap();
        assert!(handle.user.is_kerberos());
    }

    #[tokio::test]
    async fn test_kerberos_over_webhdfs_needs_token() {
        let mut binder =
            FilesystemBinder::new(FileSystemRegistry::with_defaults(), Box::new(FixedIdentity));
        let config = HdfsConfig {
            use_kerberos: true,
            user_key_tab_path: Some("/etc/hdfs.keytab".to_string()),
            ..ha_config()
        };
        let err = binder.bootstrap(&config).await.unwrap_err();
        assert_eq!(err.kind(), "ConfigInvalid");
        assert_eq!(binder.state(), BinderState::Failed);
    }
}
