//! In-memory cluster filesystem.
//!
//! Mirrors the observable behaviour of a name-node closely enough for the
//! operation layer: hierarchical namespace, append, rename into directories,
//! non-recursive delete refusal and the cluster's xattr error messages.

use std::collections::BTreeMap;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio::io::AsyncWrite;

use super::path::{basename, is_ancestor, join, normalize, parent, qualify};
use super::{
    file_not_found, now_millis, validate_xattr_name, ClusterFileSystem, FileStatus, ReadStream,
    WriteStream,
};
use crate::error::XATTR_NOT_FOUND_MESSAGE;

const DEFAULT_BLOCK_SIZE: u64 = 128 * 1024 * 1024;

#[derive(Debug, Clone)]
enum NodeKind {
    Directory,
    File(Arc<Mutex<Vec<u8>>>),
}

#[derive(Debug, Clone)]
struct Node {
    kind: NodeKind,
    xattrs: BTreeMap<String, Vec<u8>>,
    modification_time: i64,
    owner: String,
}

impl Node {
    fn directory(owner: &str) -> Self {
        Self {
            kind: NodeKind::Directory,
            xattrs: BTreeMap::new(),
            modification_time: now_millis(),
            owner: owner.to_string(),
        }
    }

    fn file(owner: &str) -> Self {
        Self {
            kind: NodeKind::File(Arc::new(Mutex::new(Vec::new()))),
            xattrs: BTreeMap::new(),
            modification_time: now_millis(),
            owner: owner.to_string(),
        }
    }

    fn is_dir(&self) -> bool {
        matches!(self.kind, NodeKind::Directory)
    }
}

/// Shared in-memory namespace.
#[derive(Debug)]
pub struct MemoryFileSystem {
    uri: String,
    owner: String,
    replication: u16,
    nodes: RwLock<BTreeMap<String, Node>>,
}

impl MemoryFileSystem {
    /// Creates an empty namespace reachable under `uri`.
    pub fn new(uri: &str) -> Self {
        Self::with_owner(uri, "hdfs")
    }

    /// Creates an empty namespace whose new entries belong to `owner`.
    pub fn with_owner(uri: &str, owner: &str) -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert("/".to_string(), Node::directory(owner));
        Self {
            uri: super::path::trim_uri(uri).to_string(),
            owner: owner.to_string(),
            replication: 1,
            nodes: RwLock::new(nodes),
        }
    }

    /// Sets the replication factor reported for files.
    pub fn with_replication(mut self, replication: u16) -> Self {
        self.replication = replication;
        self
    }

    /// Number of entries, the root included.
    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    /// True when only the root exists.
    pub fn is_empty(&self) -> bool {
        self.len() <= 1
    }

    fn status(&self, path: &str, node: &Node) -> FileStatus {
        let (length, replication, block_size, permission) = match &node.kind {
            NodeKind::Directory => (0, 0, 0, "755"),
            NodeKind::File(data) => (
                data.lock().len() as u64,
                self.replication,
                DEFAULT_BLOCK_SIZE,
                "644",
            ),
        };
        FileStatus {
            path: qualify(&self.uri, path),
            is_dir: node.is_dir(),
            length,
            replication,
            block_size,
            modification_time: node.modification_time,
            access_time: node.modification_time,
            owner: node.owner.clone(),
            group: "supergroup".to_string(),
            permission: permission.to_string(),
        }
    }

    fn children<'a>(
        nodes: &'a BTreeMap<String, Node>,
        dir: &'a str,
    ) -> impl Iterator<Item = (&'a String, &'a Node)> + 'a {
        nodes
            .iter()
            .filter(move |(p, _)| p.as_str() != "/" && parent(p).as_deref() == Some(dir))
    }

    fn ensure_dirs(nodes: &mut BTreeMap<String, Node>, path: &str, owner: &str) -> io::Result<()> {
        let mut missing = Vec::new();
        let mut current = Some(normalize(path));
        while let Some(p) = current {
            match nodes.get(&p) {
                Some(node) if node.is_dir() => break,
                Some(_) => {
                    return Err(io::Error::other(format!(
                        "Parent path is not a directory: {p}"
                    )))
                }
                None => {
                    current = parent(&p);
                    missing.push(p);
                }
            }
        }
        for p in missing.into_iter().rev() {
            nodes.insert(p, Node::directory(owner));
        }
        Ok(())
    }
}

#[async_trait]
impl ClusterFileSystem for MemoryFileSystem {
    fn uri(&self) -> &str {
        &self.uri
    }

    fn canonical_service_name(&self) -> Option<String> {
        Some(self.uri.clone())
    }

    async fn exists(&self, path: &str) -> io::Result<bool> {
        Ok(self.nodes.read().contains_key(&normalize(path)))
    }

    async fn list_status(&self, path: &str) -> io::Result<Vec<FileStatus>> {
        let path = normalize(path);
        let nodes = self.nodes.read();
        let node = nodes.get(&path).ok_or_else(|| file_not_found(&path))?;
        if !node.is_dir() {
            return Ok(vec![self.status(&path, node)]);
        }
        Ok(Self::children(&nodes, &path)
            .map(|(p, n)| self.status(p, n))
            .collect())
    }

    async fn mkdirs(&self, path: &str) -> io::Result<bool> {
        let mut nodes = self.nodes.write();
        Self::ensure_dirs(&mut nodes, path, &self.owner)?;
        Ok(true)
    }

    async fn create(&self, path: &str, overwrite: bool) -> io::Result<WriteStream> {
        let path = normalize(path);
        if path == "/" {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "cannot create a file at the root",
            ));
        }

        let mut nodes = self.nodes.write();
        match nodes.get(&path) {
            Some(node) if node.is_dir() => {
                return Err(io::Error::other(format!("{path} already exists as a directory")))
            }
            Some(_) if !overwrite => {
                return Err(io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    format!("{path} for client already exists"),
                ))
            }
            _ => {}
        }
        if let Some(dir) = parent(&path) {
            Self::ensure_dirs(&mut nodes, &dir, &self.owner)?;
        }

        let data = Arc::new(Mutex::new(Vec::new()));
        let mut node = Node::file(&self.owner);
        node.kind = NodeKind::File(data.clone());
        nodes.insert(path, node);
        Ok(Box::new(MemoryWriter { data }))
    }

    async fn append(&self, path: &str) -> io::Result<WriteStream> {
        let path = normalize(path);
        let mut nodes = self.nodes.write();
        let node = nodes.get_mut(&path).ok_or_else(|| file_not_found(&path))?;
        match &node.kind {
            NodeKind::File(data) => {
                node.modification_time = now_millis();
                Ok(Box::new(MemoryWriter { data: data.clone() }))
            }
            NodeKind::Directory => Err(io::Error::other(format!(
                "Failed to append to non-existent file {path}"
            ))),
        }
    }

    async fn open(&self, path: &str) -> io::Result<ReadStream> {
        let path = normalize(path);
        let nodes = self.nodes.read();
        let node = nodes.get(&path).ok_or_else(|| file_not_found(&path))?;
        match &node.kind {
            NodeKind::File(data) => Ok(Box::new(io::Cursor::new(data.lock().clone()))),
            NodeKind::Directory => Err(io::Error::other(format!("Path is not a file: {path}"))),
        }
    }

    async fn delete(&self, path: &str, recursive: bool) -> io::Result<bool> {
        let path = normalize(path);
        if path == "/" {
            return Ok(false);
        }
        let mut nodes = self.nodes.write();
        let Some(node) = nodes.get(&path) else {
            return Ok(false);
        };
        if node.is_dir() {
            let has_children = Self::children(&nodes, &path).next().is_some();
            if has_children && !recursive {
                return Ok(false);
            }
            nodes.retain(|p, _| !is_ancestor(&path, p));
        } else {
            nodes.remove(&path);
        }
        Ok(true)
    }

    async fn rename(&self, src: &str, dst: &str) -> io::Result<bool> {
        let src = normalize(src);
        let mut dst = normalize(dst);
        if src == "/" {
            return Ok(false);
        }

        let mut nodes = self.nodes.write();
        if src == dst {
            return Ok(nodes.contains_key(&src));
        }
        if !nodes.contains_key(&src) {
            return Ok(false);
        }
        if let Some(existing) = nodes.get(&dst) {
            if !existing.is_dir() {
                return Ok(false);
            }
            dst = join(&dst, &basename(&src));
            if nodes.contains_key(&dst) {
                return Ok(false);
            }
        }
        if is_ancestor(&src, &dst) {
            return Ok(false);
        }
        match parent(&dst).and_then(|p| nodes.get(&p).map(Node::is_dir)) {
            Some(true) => {}
            _ => return Ok(false),
        }

        let moved: Vec<String> = nodes
            .keys()
            .filter(|p| is_ancestor(&src, p))
            .cloned()
            .collect();
        for old in moved {
            if let Some(node) = nodes.remove(&old) {
                let new = format!("{}{}", dst, &old[src.len()..]);
                nodes.insert(new, node);
            }
        }
        Ok(true)
    }

    async fn get_file_status(&self, path: &str) -> io::Result<FileStatus> {
        let path = normalize(path);
        let nodes = self.nodes.read();
        let node = nodes.get(&path).ok_or_else(|| file_not_found(&path))?;
        Ok(self.status(&path, node))
    }

    async fn set_xattr(&self, path: &str, name: &str, value: &[u8]) -> io::Result<()> {
        validate_xattr_name(name)?;
        let path = normalize(path);
        let mut nodes = self.nodes.write();
        let node = nodes.get_mut(&path).ok_or_else(|| file_not_found(&path))?;
        node.xattrs.insert(name.to_string(), value.to_vec());
        Ok(())
    }

    async fn get_xattr(&self, path: &str, name: &str) -> io::Result<Vec<u8>> {
        validate_xattr_name(name)?;
        let path = normalize(path);
        let nodes = self.nodes.read();
        let node = nodes.get(&path).ok_or_else(|| file_not_found(&path))?;
        node.xattrs
            .get(name)
            .cloned()
            .ok_or_else(|| io::Error::other(XATTR_NOT_FOUND_MESSAGE))
    }

    async fn remove_xattr(&self, path: &str, name: &str) -> io::Result<()> {
        validate_xattr_name(name)?;
        let path = normalize(path);
        let mut nodes = self.nodes.write();
        let node = nodes.get_mut(&path).ok_or_else(|| file_not_found(&path))?;
        node.xattrs
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| io::Error::other("No matching attributes found for remove operation"))
    }
}

/// Writes straight into a file node's buffer.
struct MemoryWriter {
    data: Arc<Mutex<Vec<u8>>>,
}

impl AsyncWrite for MemoryWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.data.lock().extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}
