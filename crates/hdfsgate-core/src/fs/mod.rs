//! Cluster filesystem capability and its backends.
//!
//! [`ClusterFileSystem`] is the narrow client surface the operation layer
//! relies on. Backends: an in-memory tree ([`memory`]), the local disk
//! ([`local`]) and WebHDFS over HTTP ([`webhdfs`]).

pub mod local;
pub mod memory;
pub mod path;
pub mod webhdfs;

use std::fmt::Debug;
use std::io;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite};

/// Lazily-read file contents owned by the caller.
pub type ReadStream = Box<dyn AsyncRead + Send + Unpin>;

/// Output stream; shutting it down commits the written data.
pub type WriteStream = Box<dyn AsyncWrite + Send + Unpin>;

/// Stat record for one filesystem entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileStatus {
    /// Fully-qualified path, including the filesystem URI
    pub path: String,
    /// True for directories
    pub is_dir: bool,
    /// Length in bytes (0 for directories)
    pub length: u64,
    /// Replication factor (0 for directories)
    pub replication: u16,
    /// Block size in bytes
    pub block_size: u64,
    /// Modification time, milliseconds since the epoch
    pub modification_time: i64,
    /// Access time, milliseconds since the epoch
    pub access_time: i64,
    /// Owning user
    pub owner: String,
    /// Owning group
    pub group: String,
    /// Octal permission string, e.g. `755`
    pub permission: String,
}

impl FileStatus {
    /// True for regular files.
    pub fn is_file(&self) -> bool {
        !self.is_dir
    }

    /// True for directories.
    pub fn is_directory(&self) -> bool {
        self.is_dir
    }

    /// Leaf component of the path.
    pub fn name(&self) -> String {
        path::basename(&self.path)
    }
}

/// Operations a bound cluster filesystem must support.
///
/// Paths are cluster-absolute (`/a/b`) or fully qualified with this
/// filesystem's URI. Implementations must be safe to share across tasks.
#[async_trait]
pub trait ClusterFileSystem: Send + Sync + Debug {
    /// Scheme and authority prepended to bare paths, without a trailing slash.
    fn uri(&self) -> &str;

    /// Service name used for delegation tokens, when the backend has one.
    fn canonical_service_name(&self) -> Option<String> {
        None
    }

    /// Returns whether `path` exists.
    async fn exists(&self, path: &str) -> io::Result<bool> {
        match self.get_file_status(path).await {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Lists a directory's entries; a file lists as itself.
    async fn list_status(&self, path: &str) -> io::Result<Vec<FileStatus>>;

    /// Creates `path` and any missing parents.
    async fn mkdirs(&self, path: &str) -> io::Result<bool>;

    /// Creates a file for writing, replacing an existing one when `overwrite`.
    async fn create(&self, path: &str, overwrite: bool) -> io::Result<WriteStream>;

    /// Opens an existing file for appending.
    async fn append(&self, path: &str) -> io::Result<WriteStream>;

    /// Opens a file for reading.
    async fn open(&self, path: &str) -> io::Result<ReadStream>;

    /// Deletes `path`; `false` when the cluster declines.
    async fn delete(&self, path: &str, recursive: bool) -> io::Result<bool>;

    /// Renames `src` to `dst`; `false` when the cluster declines.
    async fn rename(&self, src: &str, dst: &str) -> io::Result<bool>;

    /// Stats a single path.
    async fn get_file_status(&self, path: &str) -> io::Result<FileStatus>;

    /// True when `path` is a file; false when it is absent or a directory.
    async fn is_file(&self, path: &str) -> io::Result<bool> {
        match self.get_file_status(path).await {
            Ok(status) => Ok(status.is_file()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// True when `path` is a directory; false when it is absent or a file.
    async fn is_directory(&self, path: &str) -> io::Result<bool> {
        match self.get_file_status(path).await {
            Ok(status) => Ok(status.is_directory()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Creates or replaces an extended attribute.
    async fn set_xattr(&self, path: &str, name: &str, value: &[u8]) -> io::Result<()>;

    /// Reads an extended attribute.
    async fn get_xattr(&self, path: &str, name: &str) -> io::Result<Vec<u8>>;

    /// Removes an extended attribute.
    async fn remove_xattr(&self, path: &str, name: &str) -> io::Result<()>;
}

/// Namespaces an extended attribute name may start with.
pub const XATTR_NAMESPACES: [&str; 5] = ["user.", "trusted.", "security.", "system.", "raw."];

/// Rejects attribute names outside the known namespaces.
pub fn validate_xattr_name(name: &str) -> io::Result<()> {
    let valid = XATTR_NAMESPACES
        .iter()
        .any(|ns| name.len() > ns.len() && name.starts_with(ns));
    if valid {
        Ok(())
    } else {
        Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!(
                "An XAttr name must be prefixed with user/trusted/security/system/raw, followed by a '.': {name}"
            ),
        ))
    }
}

pub(crate) fn file_not_found(path: &str) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("File {path} does not exist."),
    )
}

pub(crate) fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(path: &str, is_dir: bool) -> FileStatus {
        FileStatus {
            path: path.to_string(),
            is_dir,
            length: 0,
            replication: 0,
            block_size: 0,
            modification_time: 0,
            access_time: 0,
            owner: "hdfs".to_string(),
            group: "supergroup".to_string(),
            permission: "755".to_string(),
        }
    }

    #[test]
    fn test_file_status_flags_and_name() {
        let dir = status("hdfs://ns/t/a", true);
        assert!(dir.is_directory());
        assert!(!dir.is_file());
        assert_eq!(dir.name(), "a");

        let file = status("hdfs://ns/t/f.csv", false);
        assert!(file.is_file());
        assert_eq!(file.name(), "f.csv");
    }

    #[test]
    fn test_file_status_serializes_camel_case() {
        let json = serde_json::to_value(status("hdfs://ns/t", true)).unwrap();
        assert_eq!(json["isDir"], true);
        assert_eq!(json["modificationTime"], 0);
    }

    #[test]
    fn test_validate_xattr_name() {
        assert!(validate_xattr_name("user.tag").is_ok());
        assert!(validate_xattr_name("trusted.x").is_ok());
        assert!(validate_xattr_name("tag").is_err());
        assert!(validate_xattr_name("user.").is_err());
    }
}
