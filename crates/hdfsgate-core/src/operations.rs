//! Path, file and extended-attribute operations over the bound handle.
//!
//! Existence checks that precede `mkdir`, `delete` and `move` are not atomic
//! with the mutation that follows; a concurrent caller can race them. They
//! exist to produce a precise, localized error, nothing more.

use std::io;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tracing::{debug, error, warn};

use crate::binder::Handle;
use crate::error::{HdfsError, Result};
use crate::fs::path::{basename, join, normalize, parent};
use crate::fs::{ClusterFileSystem, FileStatus, ReadStream, WriteStream};
use crate::messages::{Locale, MessageSource, FILE_NOT_EXISTS, PATH_INVALID};

/// Entries of one directory split into sub-directories and files.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryListing {
    /// The directory that was listed
    pub path: String,
    /// Leaf names of sub-directories, in cluster order
    pub folders: Vec<String>,
    /// Leaf names of files, in cluster order
    pub files: Vec<String>,
}

/// Identity of the bound filesystem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandleInfo {
    /// Default URI of the filesystem
    pub uri: String,
    /// Token service name of the filesystem, when it has one
    pub canonical_service_name: Option<String>,
    /// User the handle was bound as
    pub user: String,
}

/// Operation surface exposed to the bridge.
#[derive(Clone)]
pub struct HdfsService {
    handle: Option<Handle>,
    messages: Arc<dyn MessageSource>,
}

impl std::fmt::Debug for HdfsService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HdfsService")
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

impl HdfsService {
    /// Creates the service; `None` leaves it unbound and every call fails with `NotBound`.
    pub fn new(handle: Option<Handle>, messages: Arc<dyn MessageSource>) -> Self {
        Self { handle, messages }
    }

    /// True when a filesystem handle is present.
    pub fn is_bound(&self) -> bool {
        self.handle.is_some()
    }

    fn fs(&self) -> Result<&Arc<dyn ClusterFileSystem>> {
        self.handle.as_ref().map(|h| &h.fs).ok_or(HdfsError::NotBound)
    }

    fn localized(&self, key: &str, arg: &str, locale: &Locale) -> String {
        self.messages.message(key, &[arg], locale)
    }

    /// URI, canonical service name and user of the bound handle.
    pub fn handle_info(&self) -> Result<HandleInfo> {
        let handle = self.handle.as_ref().ok_or(HdfsError::NotBound)?;
        Ok(HandleInfo {
            uri: handle.fs.uri().to_string(),
            canonical_service_name: handle.fs.canonical_service_name(),
            user: handle.user.user_name().to_string(),
        })
    }

    /// True when `path` exists; an empty path is rejected.
    pub async fn exists_path(&self, path: &str) -> Result<bool> {
        let fs = self.fs()?;
        if path.is_empty() {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "path must not be empty").into());
        }
        let exists = fs.exists(path).await?;
        debug!(path, exists, "existsPath");
        Ok(exists)
    }

    /// True when `path` is a file; `NotFound` when it does not exist.
    pub async fn is_file(&self, path: &str, locale: &Locale) -> Result<bool> {
        Ok(self.stat_existing(path, locale).await?.is_file())
    }

    /// True when `path` is a directory; `NotFound` when it does not exist.
    pub async fn is_directory(&self, path: &str, locale: &Locale) -> Result<bool> {
        Ok(self.stat_existing(path, locale).await?.is_directory())
    }

    async fn stat_existing(&self, path: &str, locale: &Locale) -> Result<FileStatus> {
        match self.fs()?.get_file_status(path).await {
            Ok(status) => Ok(status),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(HdfsError::NotFound {
                message: self.localized(FILE_NOT_EXISTS, path, locale),
                source: e,
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Creates `parent/name`. Returns `false` when it already exists.
    ///
    /// An empty `parent` means the root and skips the parent check.
    pub async fn make_directory(&self, name: &str, parent: &str, locale: &Locale) -> Result<bool> {
        let fs = self.fs()?;
        debug!(parent, name, "makeDirectory");

        if !parent.is_empty() && !self.exists_path(parent).await? {
            let message = self.localized(PATH_INVALID, parent, locale);
            error!(parent, "cannot create directory, parent does not exist");
            return Err(HdfsError::ParentMissing {
                message,
                path: parent.to_string(),
            });
        }

        let target = join(parent, name);
        if fs.exists(&target).await? {
            debug!(path = %target, "directory not created, it already exists");
            return Ok(false);
        }
        fs.mkdirs(&target).await?;
        debug!(path = %target, "directory created");
        Ok(true)
    }

    /// Creates `path`, checking that its parent exists.
    pub async fn mkdir(&self, path: &str, locale: &Locale) -> Result<bool> {
        let normalized = normalize(path);
        let Some(dir) = parent(&normalized) else {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("cannot create directory without a leaf name: {path}"),
            )
            .into());
        };
        self.make_directory(&basename(&normalized), &dir, locale).await
    }

    /// Entry stats of a directory in cluster order.
    pub async fn show_directory(&self, path: &str) -> Result<Vec<FileStatus>> {
        let fs = self.fs()?;
        debug!(path, "showDirectory");
        Ok(fs.list_status(path).await?)
    }

    /// Splits a directory's entries into folders and files.
    pub async fn path_info(&self, path: &str) -> Result<DirectoryListing> {
        let mut listing = DirectoryListing {
            path: path.to_string(),
            ..DirectoryListing::default()
        };
        for status in self.show_directory(path).await? {
            if status.is_file() {
                listing.files.push(status.name());
            } else {
                listing.folders.push(status.name());
            }
        }
        Ok(listing)
    }

    /// Entry paths of a directory with the filesystem URI removed.
    pub async fn ls(&self, path: &str) -> Result<Vec<String>> {
        let uri = self.fs()?.uri().to_string();
        let entries = self.show_directory(path).await?;
        Ok(entries
            .into_iter()
            .map(|status| match status.path.strip_prefix(uri.as_str()) {
                Some("") => "/".to_string(),
                Some(stripped) => stripped.to_string(),
                None => {
                    warn!(path = %status.path, uri = %uri, "entry does not start with the filesystem uri");
                    status.path
                }
            })
            .collect())
    }

    /// Output stream for `dir/name`.
    ///
    /// Appends only when `append` is set and the file exists; otherwise the
    /// file is created, replacing any previous content.
    pub async fn get_output_stream_for_write(
        &self,
        dir: &str,
        name: &str,
        append: bool,
    ) -> Result<WriteStream> {
        let fs = self.fs()?;
        let target = join(dir, name);
        debug!(path = %target, append, "getOutputStreamForWrite");
        if append && fs.exists(&target).await? {
            return Ok(fs.append(&target).await?);
        }
        Ok(fs.create(&target, true).await?)
    }

    /// Copies `source` into `dir/name`. The output is shut down on every path.
    pub async fn write_file<R>(&self, source: &mut R, dir: &str, name: &str, append: bool) -> Result<u64>
    where
        R: AsyncRead + Unpin + Send + ?Sized,
    {
        let mut out = self.get_output_stream_for_write(dir, name, append).await?;
        let copied = tokio::io::copy(source, &mut out).await;
        let closed = out.shutdown().await;

        match settle_write(copied, closed) {
            Ok(bytes) => {
                debug!(dir, name, bytes, "file written");
                Ok(bytes)
            }
            Err(e) => {
                error!(dir, name, error = %e, "writing file failed");
                Err(e.into())
            }
        }
    }

    /// Opens a file; the stream belongs to the caller.
    pub async fn read_file(&self, path: &str) -> Result<ReadStream> {
        let fs = self.fs()?;
        debug!(path, "readFile");
        Ok(fs.open(path).await?)
    }

    /// Reads a whole file into memory.
    pub async fn read_all_bytes(&self, path: &str) -> Result<Vec<u8>> {
        let mut input = self.read_file(path).await?;
        let mut buf = Vec::new();
        input.read_to_end(&mut buf).await?;
        debug!(path, bytes = buf.len(), "readAllBytes");
        Ok(buf)
    }

    /// Deletes `path`; `false` when the cluster refuses.
    pub async fn delete_file(&self, path: &str, recursive: bool, locale: &Locale) -> Result<bool> {
        let fs = self.fs()?;
        if !fs.exists(path).await? {
            debug!(path, "cannot delete, file does not exist");
            return Err(HdfsError::not_found(self.localized(FILE_NOT_EXISTS, path, locale)));
        }
        let deleted = fs.delete(path, recursive).await?;
        debug!(path, recursive, deleted, "deleteFile");
        Ok(deleted)
    }

    /// Renames `src` to `dst`; `false` when the cluster refuses.
    pub async fn move_file(&self, src: &str, dst: &str, locale: &Locale) -> Result<bool> {
        let fs = self.fs()?;
        if !fs.exists(src).await? {
            debug!(src, "cannot move, file does not exist");
            return Err(HdfsError::not_found(self.localized(FILE_NOT_EXISTS, src, locale)));
        }
        let moved = fs.rename(src, dst).await?;
        debug!(src, dst, moved, "moveFile");
        Ok(moved)
    }

    /// Full stat record of `path`.
    pub async fn file_info(&self, path: &str) -> Result<FileStatus> {
        let fs = self.fs()?;
        debug!(path, "fileInfo");
        Ok(fs.get_file_status(path).await?)
    }

    /// Writes an attribute, creating or replacing it.
    pub async fn set_extended_attributes(&self, path: &str, name: &str, value: &[u8]) -> Result<()> {
        let fs = self.fs()?;
        fs.set_xattr(path, name, value).await.map_err(|e| {
            error!(path, name, error = %e, "cannot write extended attribute");
            HdfsError::from(e)
        })
    }

    /// Stores `value` as UTF-8.
    pub async fn set_extended_attributes_str(&self, path: &str, name: &str, value: &str) -> Result<()> {
        self.set_extended_attributes(path, name, value.as_bytes()).await
    }

    /// Raw attribute value; `None` when the cluster reports it missing.
    pub async fn get_extended_attribute(&self, path: &str, name: &str) -> Result<Option<Vec<u8>>> {
        let fs = self.fs()?;
        match fs.get_xattr(path, name).await {
            Ok(value) => Ok(Some(value)),
            Err(e) => match HdfsError::from_xattr_read(e, name) {
                HdfsError::XAttrMissing { name } => {
                    debug!(path, name = %name, "extended attribute missing, returning empty value");
                    Ok(None)
                }
                other => {
                    error!(path, name, error = %other, "cannot read extended attribute");
                    Err(other)
                }
            },
        }
    }

    /// Attribute value decoded as UTF-8.
    pub async fn get_extended_attribute_string(&self, path: &str, name: &str) -> Result<Option<String>> {
        Ok(self
            .get_extended_attribute(path, name)
            .await?
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned()))
    }

    /// Removes an attribute; a missing one is an error.
    pub async fn remove_extended_attribute(&self, path: &str, name: &str) -> Result<()> {
        let fs = self.fs()?;
        fs.remove_xattr(path, name).await.map_err(|e| {
            error!(path, name, error = %e, "cannot remove extended attribute");
            HdfsError::from(e)
        })
    }

    /// Streams a local file into `hdfs_dir/<file name>`, replacing it.
    /// Failures are logged and reported as `false`.
    pub async fn upload(&self, local_path: impl AsRef<Path>, hdfs_dir: &str) -> bool {
        let local_path = local_path.as_ref();
        debug!(local = %local_path.display(), hdfs_dir, "upload");
        match self.try_upload(local_path, hdfs_dir).await {
            Ok(bytes) => {
                debug!(local = %local_path.display(), bytes, "upload complete");
                true
            }
            Err(e) => {
                error!(local = %local_path.display(), hdfs_dir, error = %e, "upload failed");
                false
            }
        }
    }

    async fn try_upload(&self, local_path: &Path, hdfs_dir: &str) -> Result<u64> {
        let name = local_path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("{} has no file name", local_path.display()),
                )
            })?;
        let mut input = tokio::fs::File::open(local_path).await?;
        self.write_file(&mut input, hdfs_dir, name, false).await
    }

    /// Streams a cluster file to `local_path`.
    /// Failures are logged and reported as `false`.
    pub async fn download(&self, hdfs_path: &str, local_path: impl AsRef<Path>) -> bool {
        let local_path = local_path.as_ref();
        debug!(hdfs_path, local = %local_path.display(), "download");
        match self.try_download(hdfs_path, local_path).await {
            Ok(bytes) => {
                debug!(hdfs_path, bytes, "download complete");
                true
            }
            Err(e) => {
                error!(hdfs_path, local = %local_path.display(), error = %e, "download failed");
                false
            }
        }
    }

    async fn try_download(&self, hdfs_path: &str, local_path: &Path) -> Result<u64> {
        let mut input = self.read_file(hdfs_path).await?;
        let mut output = tokio::fs::File::create(local_path).await?;
        let bytes = tokio::io::copy(&mut input, &mut output).await?;
        output.flush().await?;
        Ok(bytes)
    }
}

/// Outcome of a copy into an output stream followed by its shutdown.
///
/// A pipe broken mid-copy means the remote side gave up; its own error is
/// reported by the shutdown and is preferred.
fn settle_write(copied: io::Result<u64>, closed: io::Result<()>) -> io::Result<u64> {
    match (copied, closed) {
        (Ok(bytes), Ok(())) => Ok(bytes),
        (Err(e), Err(remote)) if e.kind() == io::ErrorKind::BrokenPipe => Err(remote),
        (Err(e), _) | (Ok(_), Err(e)) => Err(e),
    }
}
