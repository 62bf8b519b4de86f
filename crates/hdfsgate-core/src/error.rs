//! Error types for hdfsgate

use thiserror::Error;

/// Message prefix the cluster uses when a requested extended attribute is absent.
pub const XATTR_NOT_FOUND_MESSAGE: &str = "At least one of the attributes provided was not found.";

/// Errors surfaced by configuration assembly, binding and filesystem operations.
#[derive(Error, Debug)]
pub enum HdfsError {
    /// Bootstrap configuration is missing a key or is inconsistent
    #[error("invalid configuration: {reason}")]
    ConfigInvalid {
        /// What was wrong with the configuration
        reason: String,
    },
    /// Operation attempted without a bound filesystem handle
    #[error("filesystem handle is not bound")]
    NotBound,
    /// Path missing where the operation requires it
    #[error("{message}")]
    NotFound {
        /// Localized message naming the path
        message: String,
        /// Underlying file-not-found cause
        #[source]
        source: std::io::Error,
    },
    /// Parent directory of a `mkdir` target does not exist
    #[error("{message}")]
    ParentMissing {
        /// Localized message naming the parent
        message: String,
        /// The missing parent path
        path: String,
    },
    /// The cluster reported a missing extended attribute
    #[error("extended attribute not found: {name}")]
    XAttrMissing {
        /// Attribute name that was requested
        name: String,
    },
    /// Any other failure from the cluster client, cause preserved
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl HdfsError {
    /// Builds a `ConfigInvalid` error from anything printable.
    pub fn config(reason: impl Into<String>) -> Self {
        HdfsError::ConfigInvalid {
            reason: reason.into(),
        }
    }

    /// Builds a `NotFound` error whose cause is a file-not-found I/O error carrying the same message.
    pub fn not_found(message: impl Into<String>) -> Self {
        let message = message.into();
        HdfsError::NotFound {
            source: std::io::Error::new(std::io::ErrorKind::NotFound, message.clone()),
            message,
        }
    }

    /// Classifies a failed xattr read: the cluster's not-found message
    /// becomes `XAttrMissing`, anything else stays `Io`.
    pub fn from_xattr_read(err: std::io::Error, name: &str) -> Self {
        if is_xattr_not_found(&err) {
            HdfsError::XAttrMissing {
                name: name.to_string(),
            }
        } else {
            HdfsError::Io(err)
        }
    }

    /// Stable name of the error kind, used on the bridge wire.
    pub fn kind(&self) -> &'static str {
        match self {
            HdfsError::ConfigInvalid { .. } => "ConfigInvalid",
            HdfsError::NotBound => "NotBound",
            HdfsError::NotFound { .. } => "NotFound",
            HdfsError::ParentMissing { .. } => "ParentMissing",
            HdfsError::XAttrMissing { .. } => "XAttrMissing",
            HdfsError::Io(_) => "IO",
        }
    }
}

/// Returns true when an I/O error carries the cluster's xattr not-found message.
pub fn is_xattr_not_found(err: &std::io::Error) -> bool {
    err.to_string().starts_with(XATTR_NOT_FOUND_MESSAGE)
}

/// Result type alias using HdfsError as the error type.
pub type Result<T> = std::result::Result<T, HdfsError>;
