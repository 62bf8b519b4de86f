//! Identity contexts the cluster handle is acquired under.
//!
//! A [`UserContext`] is either a trusted remote user (simple auth) or a
//! Kerberos principal whose tickets were obtained from a keytab. Work that
//! must run "as" the identity goes through [`UserContext::do_as`].

use std::future::Future;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::Instrument;

use crate::assembler::HADOOP_SECURITY_AUTHENTICATION;
use crate::configuration::Configuration;
use crate::error::{HdfsError, Result};

/// How a user context was authenticated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthMethod {
    /// Name asserted by the caller, not verified.
    Simple,
    /// Tickets obtained from a keytab.
    Kerberos {
        /// Principal the tickets belong to
        principal: String,
        /// Keytab the principal logged in from
        keytab: PathBuf,
        /// Credential cache holding the tickets, when private to this process
        ticket_cache: Option<PathBuf>,
    },
}

/// An authenticated (or asserted) cluster user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserContext {
    user: String,
    auth: AuthMethod,
}

impl UserContext {
    /// Remote user with simple authentication.
    pub fn simple(user: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            auth: AuthMethod::Simple,
        }
    }

    /// Kerberos user backed by `keytab`.
    pub fn kerberos(
        principal: impl Into<String>,
        keytab: impl Into<PathBuf>,
        ticket_cache: Option<PathBuf>,
    ) -> Self {
        let principal = principal.into();
        Self {
            user: principal.clone(),
            auth: AuthMethod::Kerberos {
                principal,
                keytab: keytab.into(),
                ticket_cache,
            },
        }
    }

    /// Full user name, including any realm.
    pub fn user_name(&self) -> &str {
        &self.user
    }

    /// User name with the Kerberos instance and realm removed.
    pub fn short_user_name(&self) -> &str {
        let end = self
            .user
            .find(['/', '@'])
            .unwrap_or(self.user.len());
        &self.user[..end]
    }

    /// How this user was authenticated.
    pub fn auth(&self) -> &AuthMethod {
        &self.auth
    }

    /// True when tickets back this user.
    pub fn is_kerberos(&self) -> bool {
        matches!(self.auth, AuthMethod::Kerberos { .. })
    }

    /// Runs `f` as this user.
    pub async fn do_as<F, Fut, T>(&self, f: F) -> T
    where
        F: FnOnce(UserContext) -> Fut,
        Fut: Future<Output = T>,
    {
        let span = tracing::debug_span!("do_as", user = %self.user, kerberos = self.is_kerberos());
        f(self.clone()).instrument(span).await
    }
}

/// Produces user contexts for the binder.
#[async_trait]
pub trait IdentityService: Send + Sync {
    /// Applies the security settings of the cluster configuration.
    fn set_configuration(&mut self, conf: &Configuration);

    /// Context for a caller-asserted user name.
    fn create_remote_user(&self, name: &str) -> UserContext {
        UserContext::simple(name)
    }

    /// Logs `principal` in from `keytab`.
    async fn login_from_keytab(&self, principal: &str, keytab: &Path) -> Result<UserContext>;
}

/// Obtains Kerberos tickets by running `kinit` against a keytab.
#[derive(Debug, Clone)]
pub struct KerberosIdentityService {
    kinit: PathBuf,
    cache_dir: PathBuf,
    security_enabled: bool,
}

impl Default for KerberosIdentityService {
    fn default() -> Self {
        Self::new()
    }
}

impl KerberosIdentityService {
    /// Service using `kinit` from `PATH` and the system temp directory.
    pub fn new() -> Self {
        Self {
            kinit: PathBuf::from("kinit"),
            cache_dir: std::env::temp_dir(),
            security_enabled: false,
        }
    }

    /// Uses a specific `kinit` binary.
    pub fn with_kinit(mut self, kinit: impl Into<PathBuf>) -> Self {
        self.kinit = kinit.into();
        self
    }

    /// Directory the private credential cache is created in.
    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = dir.into();
        self
    }

    /// True once the configuration selected Kerberos authentication.
    pub fn security_enabled(&self) -> bool {
        self.security_enabled
    }

    fn ticket_cache(&self) -> PathBuf {
        self.cache_dir
            .join(format!("krb5cc_hdfsgate_{}", std::process::id()))
    }
}

#[async_trait]
impl IdentityService for KerberosIdentityService {
    fn set_configuration(&mut self, conf: &Configuration) {
        self.security_enabled = conf
            .get(HADOOP_SECURITY_AUTHENTICATION)
            .map(|v| v.eq_ignore_ascii_case("kerberos"))
            .unwrap_or(false);
    }

    async fn login_from_keytab(&self, principal: &str, keytab: &Path) -> Result<UserContext> {
        if !self.security_enabled {
            return Err(HdfsError::config(format!(
                "keytab login requested but {HADOOP_SECURITY_AUTHENTICATION} is not kerberos"
            )));
        }

        let meta = tokio::fs::metadata(keytab).await.map_err(|e| {
            HdfsError::config(format!("keytab {} is not readable: {e}", keytab.display()))
        })?;
        if !meta.is_file() {
            return Err(HdfsError::config(format!(
                "keytab {} is not a regular file",
                keytab.display()
            )));
        }

        let cache = self.ticket_cache();
        let output = tokio::process::Command::new(&self.kinit)
            .arg("-k")
            .arg("-t")
            .arg(keytab)
            .arg(principal)
            .env("KRB5CCNAME", format!("FILE:{}", cache.display()))
            .output()
            .await
            .map_err(|e| {
                HdfsError::config(format!("failed to run {}: {e}", self.kinit.display()))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(HdfsError::config(format!(
                "kinit failed for {principal} with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        tracing::info!(
            principal,
            keytab = %keytab.display(),
            cache = %cache.display(),
            "logged in from keytab"
        );
        Ok(UserContext::kerberos(principal, keytab, Some(cache)))
    }
}
