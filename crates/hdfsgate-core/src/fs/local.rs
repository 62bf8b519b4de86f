//! Local-disk filesystem bound to `file://`.

use std::io;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use async_trait::async_trait;
use tokio::fs;

use super::path::{basename, normalize, qualify};
use super::{
    file_not_found, validate_xattr_name, ClusterFileSystem, FileStatus, ReadStream, WriteStream,
};

/// Filesystem backed by the local disk, optionally rooted below a directory.
#[derive(Debug, Clone)]
pub struct LocalFileSystem {
    root: PathBuf,
}

impl Default for LocalFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalFileSystem {
    /// Maps cluster paths one-to-one onto the local disk.
    pub fn new() -> Self {
        Self {
            root: PathBuf::from("/"),
        }
    }

    /// Maps cluster paths below `root`.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory cluster paths resolve under.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let normalized = normalize(path);
        self.root.join(normalized.trim_start_matches('/'))
    }

    async fn stat(&self, path: &str) -> io::Result<FileStatus> {
        let local = self.resolve(path);
        let meta = match fs::metadata(&local).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(file_not_found(&normalize(path)))
            }
            Err(e) => return Err(e),
        };
        Ok(to_status(&qualify(self.uri(), path), &meta))
    }
}

fn millis(time: io::Result<std::time::SystemTime>) -> i64 {
    time.ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

#[cfg(unix)]
fn ownership(meta: &std::fs::Metadata) -> (String, String, String) {
    use std::os::unix::fs::MetadataExt;
    (
        meta.uid().to_string(),
        meta.gid().to_string(),
        format!("{:o}", meta.mode() & 0o7777),
    )
}

#[cfg(not(unix))]
fn ownership(meta: &std::fs::Metadata) -> (String, String, String) {
    let permission = if meta.permissions().readonly() {
        "444"
    } else {
        "644"
    };
    (String::new(), String::new(), permission.to_string())
}

fn to_status(path: &str, meta: &std::fs::Metadata) -> FileStatus {
    let (owner, group, permission) = ownership(meta);
    let is_dir = meta.is_dir();
    FileStatus {
        path: path.to_string(),
        is_dir,
        length: if is_dir { 0 } else { meta.len() },
        replication: if is_dir { 0 } else { 1 },
        block_size: if is_dir { 0 } else { 4096 },
        modification_time: millis(meta.modified()),
        access_time: millis(meta.accessed()),
        owner,
        group,
        permission,
    }
}

#[async_trait]
impl ClusterFileSystem for LocalFileSystem {
    fn uri(&self) -> &str {
        "file://"
    }

    async fn list_status(&self, path: &str) -> io::Result<Vec<FileStatus>> {
        let status = self.stat(path).await?;
        if !status.is_dir {
            return Ok(vec![status]);
        }

        let base = normalize(path);
        let mut entries = fs::read_dir(self.resolve(&base)).await?;
        let mut out = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            let meta = entry.metadata().await?;
            let child = super::path::join(&base, &name);
            out.push(to_status(&qualify(self.uri(), &child), &meta));
        }
        out.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(out)
    }

    async fn mkdirs(&self, path: &str) -> io::Result<bool> {
        fs::create_dir_all(self.resolve(path)).await?;
        Ok(true)
    }

    async fn create(&self, path: &str, overwrite: bool) -> io::Result<WriteStream> {
        let local = self.resolve(path);
        if let Ok(meta) = fs::metadata(&local).await {
            if meta.is_dir() {
                return Err(io::Error::other(format!(
                    "{} already exists as a directory",
                    normalize(path)
                )));
            }
            if !overwrite {
                return Err(io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    format!("File already exists: {}", normalize(path)),
                ));
            }
        }
        if let Some(parent) = local.parent() {
            fs::create_dir_all(parent).await?;
        }
        let file = fs::File::create(&local).await?;
        Ok(Box::new(file))
    }

    async fn append(&self, path: &str) -> io::Result<WriteStream> {
        let file = fs::OpenOptions::new()
            .append(true)
            .open(self.resolve(path))
            .await
            .map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => file_not_found(&normalize(path)),
                _ => e,
            })?;
        Ok(Box::new(file))
    }

    async fn open(&self, path: &str) -> io::Result<ReadStream> {
        let status = self.stat(path).await?;
        if status.is_dir {
            return Err(io::Error::other(format!(
                "Path is not a file: {}",
                normalize(path)
            )));
        }
        let file = fs::File::open(self.resolve(path)).await?;
        Ok(Box::new(file))
    }

    async fn delete(&self, path: &str, recursive: bool) -> io::Result<bool> {
        if normalize(path) == "/" {
            return Ok(false);
        }
        let local = self.resolve(path);
        let meta = match fs::symlink_metadata(&local).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e),
        };
        if !meta.is_dir() {
            fs::remove_file(&local).await?;
            return Ok(true);
        }
        if recursive {
            fs::remove_dir_all(&local).await?;
            return Ok(true);
        }
        let mut entries = fs::read_dir(&local).await?;
        if entries.next_entry().await?.is_some() {
            return Ok(false);
        }
        fs::remove_dir(&local).await?;
        Ok(true)
    }

    async fn rename(&self, src: &str, dst: &str) -> io::Result<bool> {
        let from = self.resolve(src);
        if fs::symlink_metadata(&from).await.is_err() {
            return Ok(false);
        }
        let mut to = self.resolve(dst);
        if let Ok(meta) = fs::metadata(&to).await {
            if !meta.is_dir() {
                return Ok(false);
            }
            to = to.join(basename(src));
            if fs::symlink_metadata(&to).await.is_ok() {
                return Ok(false);
            }
        }
        if to.starts_with(&from) {
            return Ok(false);
        }
        match to.parent() {
            Some(parent) if fs::metadata(parent).await.map(|m| m.is_dir()).unwrap_or(false) => {}
            _ => return Ok(false),
        }
        fs::rename(&from, &to).await?;
        Ok(true)
    }

    async fn get_file_status(&self, path: &str) -> io::Result<FileStatus> {
        self.stat(path).await
    }

    async fn set_xattr(&self, path: &str, name: &str, value: &[u8]) -> io::Result<()> {
        validate_xattr_name(name)?;
        self.stat(path).await?;
        let local = self.resolve(path);
        let name = name.to_string();
        let value = value.to_vec();
        blocking(move || xattr::set(&local, &name, &value)).await
    }

    async fn get_xattr(&self, path: &str, name: &str) -> io::Result<Vec<u8>> {
        validate_xattr_name(name)?;
        self.stat(path).await?;
        let local = self.resolve(path);
        let name = name.to_string();
        blocking(move || xattr::get(&local, &name)).await
    }

    async fn remove_xattr(&self, path: &str, name: &str) -> io::Result<()> {
        validate_xattr_name(name)?;
        self.stat(path).await?;
        let local = self.resolve(path);
        let name = name.to_string();
        blocking(move || xattr::remove(&local, &name)).await
    }
}

async fn blocking<T, F>(f: F) -> io::Result<T>
where
    F: FnOnce() -> io::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| io::Error::other(format!("xattr task failed: {e}")))?
}

#[cfg(target_os = "linux")]
mod xattr {
    use std::ffi::CString;
    use std::io;
    use std::os::unix::ffi::OsStrExt;
    use std::path::Path;

    use crate::error::XATTR_NOT_FOUND_MESSAGE;

    fn c_path(path: &Path) -> io::Result<CString> {
        CString::new(path.as_os_str().as_bytes())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "path contains NUL"))
    }

    fn c_name(name: &str) -> io::Result<CString> {
        CString::new(name)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "name contains NUL"))
    }

    fn last_error() -> io::Error {
        let err = io::Error::last_os_error();
        match err.raw_os_error() {
            Some(libc::ENODATA) => io::Error::other(XATTR_NOT_FOUND_MESSAGE),
            _ => err,
        }
    }

    pub fn set(path: &Path, name: &str, value: &[u8]) -> io::Result<()> {
        let (path, name) = (c_path(path)?, c_name(name)?);
        let res = unsafe {
            libc::lsetxattr(
                path.as_ptr(),
                name.as_ptr(),
                value.as_ptr() as *const libc::c_void,
                value.len(),
                0,
            )
        };
        if res < 0 {
            return Err(last_error());
        }
        Ok(())
    }

    pub fn get(path: &Path, name: &str) -> io::Result<Vec<u8>> {
        let (path, name) = (c_path(path)?, c_name(name)?);
        let size =
            unsafe { libc::lgetxattr(path.as_ptr(), name.as_ptr(), std::ptr::null_mut(), 0) };
        if size < 0 {
            return Err(last_error());
        }
        let mut buf = vec![0u8; size as usize];
        let res = unsafe {
            libc::lgetxattr(
                path.as_ptr(),
                name.as_ptr(),
                buf.as_mut_ptr() as *mut libc::c_void,
                buf.len(),
            )
        };
        if res < 0 {
            return Err(last_error());
        }
        buf.truncate(res as usize);
        Ok(buf)
    }

    pub fn remove(path: &Path, name: &str) -> io::Result<()> {
        let (path, name) = (c_path(path)?, c_name(name)?);
        let res = unsafe { libc::lremovexattr(path.as_ptr(), name.as_ptr()) };
        if res < 0 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::ENODATA) {
                return Err(io::Error::other(
                    "No matching attributes found for remove operation",
                ));
            }
            return Err(err);
        }
        Ok(())
    }
}

#[cfg(not(target_os = "linux"))]
mod xattr {
    use std::io;
    use std::path::Path;

    fn unsupported() -> io::Error {
        io::Error::new(
            io::ErrorKind::Unsupported,
            "extended attributes are not supported on this platform",
        )
    }

    pub fn set(_path: &Path, _name: &str, _value: &[u8]) -> io::Result<()> {
        Err(unsupported())
    }

    pub fn get(_path: &Path, _name: &str) -> io::Result<Vec<u8>> {
        Err(unsupported())
    }

    pub fn remove(_path: &Path, _name: &str) -> io::Result<()> {
        Err(unsupported())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn rooted() -> (TempDir, LocalFileSystem) {
        let dir = TempDir::new().unwrap();
        let fs = LocalFileSystem::with_root(dir.path());
        (dir, fs)
    }

    async fn write(fs: &LocalFileSystem, path: &str, data: &[u8]) {
        let mut out = fs.create(path, true).await.unwrap();
        out.write_all(data).await.unwrap();
        out.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_uri_and_qualified_status() {
        let (_dir, fs) = rooted();
        fs.mkdirs("/t").await.unwrap();
        let status = fs.get_file_status("/t").await.unwrap();
        assert_eq!(fs.uri(), "file://");
        assert_eq!(status.path, "file:///t");
        assert!(status.is_directory());
    }

    #[tokio::test]
    async fn test_write_append_read() {
        let (_dir, fs) = rooted();
        write(&fs, "/t/f.txt", b"hello").await;
        let mut out = fs.append("/t/f.txt").await.unwrap();
        out.write_all(b" world").await.unwrap();
        out.shutdown().await.unwrap();

        let mut input = fs.open("/t/f.txt").await.unwrap();
        let mut buf = String::new();
        input.read_to_string(&mut buf).await.unwrap();
        assert_eq!(buf, "hello world");
        assert_eq!(fs.get_file_status("/t/f.txt").await.unwrap().length, 11);
    }

    #[tokio::test]
    async fn test_create_refuses_existing_without_overwrite() {
        let (_dir, fs) = rooted();
        write(&fs, "/f", b"1").await;
        let err = fs.create("/f", false).await.err().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
    }

    #[tokio::test]
    async fn test_list_status_sorted() {
        let (_dir, fs) = rooted();
        write(&fs, "/t/b", b"").await;
        fs.mkdirs("/t/a").await.unwrap();
        let names: Vec<String> = fs
            .list_status("/t")
            .await
            .unwrap()
            .iter()
            .map(FileStatus::name)
            .collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_missing_is_not_found() {
        let (_dir, fs) = rooted();
        assert!(!fs.exists("/nope").await.unwrap());
        let err = fs.get_file_status("/nope").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        assert!(fs.append("/nope").await.is_err());
    }

    #[tokio::test]
    async fn test_delete_and_rename() {
        let (_dir, fs) = rooted();
        write(&fs, "/d/f", b"x").await;
        assert!(!fs.delete("/d", false).await.unwrap());
        assert!(fs.rename("/d/f", "/g").await.unwrap());
        assert!(fs.is_file("/g").await.unwrap());
        assert!(!fs.rename("/missing", "/h").await.unwrap());
        assert!(fs.delete("/d", false).await.unwrap());
        assert!(!fs.delete("/d", false).await.unwrap());
    }

    #[tokio::test]
    async fn test_rename_into_directory() {
        let (_dir, fs) = rooted();
        write(&fs, "/f", b"x").await;
        fs.mkdirs("/dir").await.unwrap();
        assert!(fs.rename("/f", "/dir").await.unwrap());
        assert!(fs.is_file("/dir/f").await.unwrap());
    }

    #[tokio::test]
    async fn test_xattr_name_validated_before_io() {
        let (_dir, fs) = rooted();
        write(&fs, "/f", b"").await;
        let err = fs.set_xattr("/f", "noprefix", b"v").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }
}
