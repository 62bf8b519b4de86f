//! WebHDFS REST client.
//!
//! Name-node calls walk the configured name-nodes in order, moving on when a
//! node is unreachable or answers with `StandbyException`; the last node that
//! answered becomes the first one tried on the next call. Data transfer for
//! `CREATE`, `APPEND` and `OPEN` is a two-step exchange: the name-node hands
//! out a datanode location (`noredirect=true`) and the bytes go there.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{ready, Context, Poll};

use async_trait::async_trait;
use futures::TryStreamExt;
use reqwest::{Method, StatusCode, Url};
use serde::Deserialize;
use tokio::io::{AsyncWrite, DuplexStream};
use tokio::task::JoinHandle;
use tokio_util::io::{ReaderStream, StreamReader};

use super::path::{join, normalize, qualify, split_uri};
use super::{validate_xattr_name, ClusterFileSystem, FileStatus, ReadStream, WriteStream};
use crate::assembler::{
    DFS_HA_NAMENODES_PREFIX, DFS_NAMENODE_HTTP_ADDRESS_PREFIX, DFS_NAMENODE_RPC_ADDRESS_PREFIX,
    DFS_REPLICATION,
};
use crate::configuration::Configuration;
use crate::error::{HdfsError, Result};
use crate::identity::UserContext;

/// Name-node HTTP port key, used when only RPC addresses are configured.
pub const DFS_NAMENODE_HTTP_PORT: &str = "dfs.namenode.http-port";
/// Default name-node HTTP port.
pub const DEFAULT_HTTP_PORT: u32 = 9870;
/// Delegation token presented by Kerberos users.
pub const DFS_WEBHDFS_DELEGATION_TOKEN: &str = "dfs.webhdfs.delegation.token";

const UPLOAD_BUFFER: usize = 64 * 1024;

/// How requests identify the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebHdfsAuth {
    /// `user.name=<user>` (simple authentication)
    User(String),
    /// `delegation=<token>`
    Delegation(String),
}

/// WebHDFS-backed cluster filesystem.
#[derive(Debug)]
pub struct WebHdfsFileSystem {
    uri: String,
    endpoints: Vec<Url>,
    active: AtomicUsize,
    auth: WebHdfsAuth,
    replication: Option<u32>,
    client: reqwest::Client,
}

impl WebHdfsFileSystem {
    /// Creates a client for `uri` talking to the given name-node base URLs.
    pub fn new(uri: &str, endpoints: Vec<Url>, auth: WebHdfsAuth) -> Result<Self> {
        if endpoints.is_empty() {
            return Err(HdfsError::config(format!(
                "no name-node HTTP endpoint configured for {uri}"
            )));
        }
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| HdfsError::config(format!("cannot build HTTP client: {e}")))?;
        Ok(Self {
            uri: super::path::trim_uri(uri).to_string(),
            endpoints,
            active: AtomicUsize::new(0),
            auth,
            replication: None,
            client,
        })
    }

    /// Replication factor requested for files this client creates.
    pub fn with_replication(mut self, replication: Option<u32>) -> Self {
        self.replication = replication;
        self
    }

    /// Builds the client for `default_fs` from an assembled configuration.
    pub fn from_configuration(
        conf: &Configuration,
        default_fs: &str,
        user: &UserContext,
    ) -> Result<Self> {
        let (scheme, authority, _) = split_uri(default_fs);
        let endpoints = resolve_endpoints(conf, scheme, authority)?;
        let auth = if user.is_kerberos() {
            let token = conf.get(DFS_WEBHDFS_DELEGATION_TOKEN).ok_or_else(|| {
                HdfsError::config(format!(
                    "kerberos over WebHDFS requires {DFS_WEBHDFS_DELEGATION_TOKEN}"
                ))
            })?;
            WebHdfsAuth::Delegation(token)
        } else {
            WebHdfsAuth::User(user.short_user_name().to_string())
        };
        Ok(Self::new(&format!("{scheme}://{authority}"), endpoints, auth)?
            .with_replication(conf.get_u32(DFS_REPLICATION)))
    }

    /// Name-node base URLs in failover order.
    pub fn endpoints(&self) -> &[Url] {
        &self.endpoints
    }

    fn url(&self, endpoint: &Url, path: &str, op: &str, params: &[(&str, &str)]) -> Url {
        let mut url = endpoint.clone();
        url.set_path(&format!("/webhdfs/v1{}", normalize(path)));
        {
            let mut query = url.query_pairs_mut();
            query.clear();
            query.append_pair("op", op);
            for (key, value) in params {
                query.append_pair(key, value);
            }
            match &self.auth {
                WebHdfsAuth::User(user) => query.append_pair("user.name", user),
                WebHdfsAuth::Delegation(token) => query.append_pair("delegation", token),
            };
        }
        url
    }

    /// Sends a body-less request to the name-nodes, failing over as needed.
    async fn call(
        &self,
        method: Method,
        path: &str,
        op: &str,
        params: &[(&str, &str)],
    ) -> io::Result<reqwest::Response> {
        let count = self.endpoints.len();
        let start = self.active.load(Ordering::Relaxed);
        let mut last_error = None;

        for attempt in 0..count {
            let idx = (start + attempt) % count;
            let url = self.url(&self.endpoints[idx], path, op, params);
            tracing::trace!(op, endpoint = %self.endpoints[idx], "webhdfs request");

            match self.client.request(method.clone(), url).send().await {
                Ok(resp) if resp.status().is_success() || resp.status().is_redirection() => {
                    self.active.store(idx, Ordering::Relaxed);
                    return Ok(resp);
                }
                Ok(resp) => {
                    let err = response_error(resp).await;
                    if err.standby {
                        tracing::warn!(endpoint = %self.endpoints[idx], op, "name-node is standby, failing over");
                        last_error = Some(err.error);
                        continue;
                    }
                    self.active.store(idx, Ordering::Relaxed);
                    return Err(err.error);
                }
                Err(e) if e.is_connect() || e.is_timeout() => {
                    tracing::warn!(endpoint = %self.endpoints[idx], op, error = %e, "name-node unreachable, failing over");
                    last_error = Some(io::Error::new(io::ErrorKind::ConnectionRefused, e));
                }
                Err(e) => return Err(io::Error::other(e)),
            }
        }

        Err(last_error.unwrap_or_else(|| io::Error::other("no name-node endpoints configured")))
    }

    async fn call_json<T: for<'de> Deserialize<'de>>(
        &self,
        method: Method,
        path: &str,
        op: &str,
        params: &[(&str, &str)],
    ) -> io::Result<T> {
        let resp = self.call(method, path, op, params).await?;
        let body = resp.bytes().await.map_err(io::Error::other)?;
        serde_json::from_slice(&body)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, format!("{op}: {e}")))
    }

    async fn call_boolean(
        &self,
        method: Method,
        path: &str,
        op: &str,
        params: &[(&str, &str)],
    ) -> io::Result<bool> {
        let resp: BooleanResp = self.call_json(method, path, op, params).await?;
        Ok(resp.boolean)
    }

    /// Asks the name-node where the data for `op` must be sent or read.
    async fn location(
        &self,
        method: Method,
        path: &str,
        op: &str,
        params: &[(&str, &str)],
    ) -> io::Result<Url> {
        let mut params = params.to_vec();
        params.push(("noredirect", "true"));
        let resp = self.call(method, path, op, &params).await?;

        let location = if resp.status().is_redirection() {
            resp.headers()
                .get(reqwest::header::LOCATION)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        } else {
            let body = resp.bytes().await.map_err(io::Error::other)?;
            serde_json::from_slice::<LocationResp>(&body)
                .ok()
                .map(|l| l.location)
        };
        let location = location
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, format!("{op}: no location")))?;
        Url::parse(&location).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    fn upload(&self, method: Method, location: Url) -> WriteStream {
        let (writer, reader) = tokio::io::duplex(UPLOAD_BUFFER);
        let body = reqwest::Body::wrap_stream(ReaderStream::new(reader));
        let request = self.client.request(method, location).body(body);
        let task = tokio::spawn(async move {
            let resp = request.send().await.map_err(io::Error::other)?;
            if resp.status().is_success() {
                Ok(())
            } else {
                Err(response_error(resp).await.error)
            }
        });
        Box::new(UploadWriter {
            pipe: writer,
            task: Some(task),
        })
    }

    fn to_status(&self, path: &str, remote: RemoteFileStatus) -> FileStatus {
        let path = if remote.path_suffix.is_empty() {
            normalize(path)
        } else {
            join(path, &remote.path_suffix)
        };
        FileStatus {
            path: qualify(&self.uri, &path),
            is_dir: remote.ty == RemoteFileType::Directory,
            length: remote.length,
            replication: remote.replication,
            block_size: remote.block_size,
            modification_time: remote.modification_time,
            access_time: remote.access_time,
            owner: remote.owner,
            group: remote.group,
            permission: remote.permission,
        }
    }
}

#[async_trait]
impl ClusterFileSystem for WebHdfsFileSystem {
    fn uri(&self) -> &str {
        &self.uri
    }

    fn canonical_service_name(&self) -> Option<String> {
        let idx = self.active.load(Ordering::Relaxed) % self.endpoints.len();
        let endpoint = &self.endpoints[idx];
        let host = endpoint.host_str()?;
        Some(match endpoint.port_or_known_default() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        })
    }

    async fn list_status(&self, path: &str) -> io::Result<Vec<FileStatus>> {
        let resp: FileStatusesWrapper = self.call_json(Method::GET, path, "LISTSTATUS", &[]).await?;
        Ok(resp
            .file_statuses
            .file_status
            .into_iter()
            .map(|s| self.to_status(path, s))
            .collect())
    }

    async fn mkdirs(&self, path: &str) -> io::Result<bool> {
        self.call_boolean(Method::PUT, path, "MKDIRS", &[]).await
    }

    async fn create(&self, path: &str, overwrite: bool) -> io::Result<WriteStream> {
        let overwrite = if overwrite { "true" } else { "false" };
        let replication = self.replication.map(|r| r.to_string());
        let mut params = vec![("overwrite", overwrite)];
        if let Some(replication) = &replication {
            params.push(("replication", replication.as_str()));
        }
        let location = self.location(Method::PUT, path, "CREATE", &params).await?;
        Ok(self.upload(Method::PUT, location))
    }

    async fn append(&self, path: &str) -> io::Result<WriteStream> {
        let location = self.location(Method::POST, path, "APPEND", &[]).await?;
        Ok(self.upload(Method::POST, location))
    }

    async fn open(&self, path: &str) -> io::Result<ReadStream> {
        let location = self.location(Method::GET, path, "OPEN", &[]).await?;
        let resp = self
            .client
            .get(location)
            .send()
            .await
            .map_err(io::Error::other)?;
        if !resp.status().is_success() {
            return Err(response_error(resp).await.error);
        }
        let stream = resp.bytes_stream().map_err(io::Error::other);
        Ok(Box::new(StreamReader::new(stream)))
    }

    async fn delete(&self, path: &str, recursive: bool) -> io::Result<bool> {
        let recursive = if recursive { "true" } else { "false" };
        self.call_boolean(Method::DELETE, path, "DELETE", &[("recursive", recursive)])
            .await
    }

    async fn rename(&self, src: &str, dst: &str) -> io::Result<bool> {
        let destination = normalize(dst);
        self.call_boolean(Method::PUT, src, "RENAME", &[("destination", &destination)])
            .await
    }

    async fn get_file_status(&self, path: &str) -> io::Result<FileStatus> {
        let resp: FileStatusWrapper = self
            .call_json(Method::GET, path, "GETFILESTATUS", &[])
            .await?;
        Ok(self.to_status(path, resp.file_status))
    }

    async fn set_xattr(&self, path: &str, name: &str, value: &[u8]) -> io::Result<()> {
        validate_xattr_name(name)?;
        let value = hex_encode(value);
        self.call(
            Method::PUT,
            path,
            "SETXATTR",
            &[
                ("xattr.name", name),
                ("xattr.value", &value),
                ("flag", "CREATE,REPLACE"),
            ],
        )
        .await?;
        Ok(())
    }

    async fn get_xattr(&self, path: &str, name: &str) -> io::Result<Vec<u8>> {
        validate_xattr_name(name)?;
        let resp: XAttrsResp = self
            .call_json(
                Method::GET,
                path,
                "GETXATTRS",
                &[("xattr.name", name), ("encoding", "hex")],
            )
            .await?;
        let attr = resp
            .x_attrs
            .into_iter()
            .find(|a| a.name == name)
            .ok_or_else(|| io::Error::other(crate::error::XATTR_NOT_FOUND_MESSAGE))?;
        match attr.value {
            Some(value) => hex_decode(&value),
            None => Ok(Vec::new()),
        }
    }

    async fn remove_xattr(&self, path: &str, name: &str) -> io::Result<()> {
        validate_xattr_name(name)?;
        self.call(Method::PUT, path, "REMOVEXATTR", &[("xattr.name", name)])
            .await?;
        Ok(())
    }
}

/// Derives name-node HTTP base URLs for `scheme://authority`.
pub fn resolve_endpoints(conf: &Configuration, scheme: &str, authority: &str) -> Result<Vec<Url>> {
    if authority.is_empty() {
        return Err(HdfsError::config(format!(
            "default filesystem {scheme}:// has no authority"
        )));
    }
    let port = conf.get_u32(DFS_NAMENODE_HTTP_PORT).unwrap_or(DEFAULT_HTTP_PORT);
    let ids = conf.get_trimmed_strings(&format!("{DFS_HA_NAMENODES_PREFIX}{authority}"));

    let addresses = if !ids.is_empty() {
        ids.iter()
            .map(|id| {
                let http = conf.get(&format!("{DFS_NAMENODE_HTTP_ADDRESS_PREFIX}{authority}.{id}"));
                let rpc = conf.get(&format!("{DFS_NAMENODE_RPC_ADDRESS_PREFIX}{authority}.{id}"));
                match (http, rpc) {
                    (Some(http), _) => Ok(http),
                    (None, Some(rpc)) => Ok(format!("{}:{port}", host_of(&rpc))),
                    (None, None) => Err(HdfsError::config(format!(
                        "no address configured for name-node {id} of {authority}"
                    ))),
                }
            })
            .collect::<Result<Vec<_>>>()?
    } else if scheme == "webhdfs" && authority.contains(':') {
        vec![authority.to_string()]
    } else {
        vec![format!("{}:{port}", host_of(authority))]
    };

    addresses
        .into_iter()
        .map(|address| {
            let address = if address.contains("://") {
                address
            } else {
                format!("http://{address}")
            };
            Url::parse(&address)
                .map_err(|e| HdfsError::config(format!("bad name-node address {address}: {e}")))
        })
        .collect()
}

fn host_of(address: &str) -> &str {
    address
        .rsplit_once(':')
        .map(|(host, _)| host)
        .unwrap_or(address)
}

fn hex_encode(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

fn hex_decode(value: &str) -> io::Result<Vec<u8>> {
    let digits = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidData, format!("xattr value {value:?} lacks 0x prefix"))
        })?;
    hex::decode(digits).map_err(|e| {
        io::Error::new(io::ErrorKind::InvalidData, format!("bad hex xattr value {value:?}: {e}"))
    })
}

struct ResponseError {
    error: io::Error,
    standby: bool,
}

async fn response_error(resp: reqwest::Response) -> ResponseError {
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    parse_error(status, &body)
}

fn parse_error(status: StatusCode, body: &str) -> ResponseError {
    let remote = serde_json::from_str::<RemoteExceptionWrapper>(body)
        .ok()
        .map(|w| w.remote_exception);

    let Some(remote) = remote else {
        let kind = status_kind(status);
        return ResponseError {
            error: io::Error::new(kind, format!("{status}: {}", body.trim())),
            standby: false,
        };
    };

    let kind = match remote.exception.as_str() {
        "FileNotFoundException" => io::ErrorKind::NotFound,
        "AccessControlException" | "SecurityException" => io::ErrorKind::PermissionDenied,
        "FileAlreadyExistsException" => io::ErrorKind::AlreadyExists,
        "IllegalArgumentException" => io::ErrorKind::InvalidInput,
        _ => status_kind(status),
    };
    ResponseError {
        standby: remote.exception == "StandbyException",
        error: io::Error::new(kind, remote.message),
    }
}

fn status_kind(status: StatusCode) -> io::ErrorKind {
    match status {
        StatusCode::NOT_FOUND => io::ErrorKind::NotFound,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => io::ErrorKind::PermissionDenied,
        _ => io::ErrorKind::Other,
    }
}

/// Streams written bytes to a datanode; shutdown waits for the upload to finish.
struct UploadWriter {
    pipe: DuplexStream,
    task: Option<JoinHandle<io::Result<()>>>,
}

impl AsyncWrite for UploadWriter {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.pipe).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.pipe).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        ready!(Pin::new(&mut self.pipe).poll_shutdown(cx))?;
        let Some(task) = self.task.as_mut() else {
            return Poll::Ready(Ok(()));
        };
        let result = ready!(Pin::new(task).poll(cx));
        self.task = None;
        Poll::Ready(match result {
            Ok(upload) => upload,
            Err(e) => Err(io::Error::other(format!("upload task failed: {e}"))),
        })
    }
}

#[derive(Debug, Deserialize)]
struct BooleanResp {
    boolean: bool,
}

#[derive(Debug, Deserialize)]
struct LocationResp {
    #[serde(rename = "Location")]
    location: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct FileStatusWrapper {
    file_status: RemoteFileStatus,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct FileStatusesWrapper {
    file_statuses: RemoteFileStatuses,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RemoteFileStatuses {
    #[serde(default)]
    file_status: Vec<RemoteFileStatus>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct RemoteFileStatus {
    access_time: i64,
    block_size: u64,
    group: String,
    length: u64,
    modification_time: i64,
    owner: String,
    path_suffix: String,
    permission: String,
    replication: u16,
    #[serde(rename = "type")]
    ty: RemoteFileType,
}

#[derive(Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
enum RemoteFileType {
    Directory,
    #[default]
    File,
    Symlink,
}

#[derive(Debug, Deserialize)]
struct XAttrsResp {
    #[serde(rename = "XAttrs", default)]
    x_attrs: Vec<XAttr>,
}

#[derive(Debug, Deserialize)]
struct XAttr {
    name: String,
    value: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RemoteExceptionWrapper {
    remote_exception: RemoteException,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoteException {
    exception: String,
    #[serde(default)]
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::is_xattr_not_found;

    fn ha_conf() -> Configuration {
        let mut conf = Configuration::new();
        conf.set("dfs.ha.namenodes.NameNodeCluster", "nn0,nn1");
        conf.set("dfs.namenode.rpc-address.NameNodeCluster.nn0", "nn-a:8020");
        conf.set("dfs.namenode.rpc-address.NameNodeCluster.nn1", "nn-b:8020");
        conf
    }

    fn fs(endpoints: &[&str]) -> WebHdfsFileSystem {
        WebHdfsFileSystem::new(
            "hdfs://NameNodeCluster",
            endpoints.iter().map(|e| Url::parse(e).unwrap()).collect(),
            WebHdfsAuth::User("hdfs".to_string()),
        )
        .unwrap()
    }

    #[test]
    fn test_endpoints_from_rpc_addresses() {
        let endpoints = resolve_endpoints(&ha_conf(), "hdfs", "NameNodeCluster").unwrap();
        let hosts: Vec<String> = endpoints.iter().map(Url::to_string).collect();
        assert_eq!(hosts, vec!["http://nn-a:9870/", "http://nn-b:9870/"]);
    }

    #[test]
    fn test_endpoints_prefer_http_address_and_port() {
        let mut conf = ha_conf();
        conf.set("dfs.namenode.http-port", "50070");
        conf.set(
            "dfs.namenode.http-address.NameNodeCluster.nn1",
            "web-b.example.com:14000",
        );
        let endpoints = resolve_endpoints(&conf, "hdfs", "NameNodeCluster").unwrap();
        assert_eq!(endpoints[0].as_str(), "http://nn-a:50070/");
        assert_eq!(endpoints[1].as_str(), "http://web-b.example.com:14000/");
    }

    #[test]
    fn test_endpoints_single_namenode() {
        let conf = Configuration::new();
        let hdfs = resolve_endpoints(&conf, "hdfs", "nn:8020").unwrap();
        assert_eq!(hdfs[0].as_str(), "http://nn:9870/");
        let web = resolve_endpoints(&conf, "webhdfs", "nn:50070").unwrap();
        assert_eq!(web[0].as_str(), "http://nn:50070/");
        assert!(resolve_endpoints(&conf, "hdfs", "").is_err());
    }

    #[test]
    fn test_missing_namenode_address_is_config_error() {
        let mut conf = Configuration::new();
        conf.set("dfs.ha.namenodes.ns", "nn0");
        let err = resolve_endpoints(&conf, "hdfs", "ns").unwrap_err();
        assert_eq!(err.kind(), "ConfigInvalid");
    }

    #[test]
    fn test_kerberos_requires_delegation_token() {
        let user = UserContext::kerberos("hdfs@EXAMPLE.COM", "/etc/hdfs.keytab", None);
        let err = WebHdfsFileSystem::from_configuration(
            &ha_conf(),
            "hdfs://NameNodeCluster",
            &user,
        )
        .unwrap_err();
        assert_eq!(err.kind(), "ConfigInvalid");

        let mut conf = ha_conf();
        conf.set(DFS_WEBHDFS_DELEGATION_TOKEN, "tok");
        let fs = WebHdfsFileSystem::from_configuration(&conf, "hdfs://NameNodeCluster", &user)
            .unwrap();
        assert_eq!(fs.auth, WebHdfsAuth::Delegation("tok".to_string()));
    }

    #[test]
    fn test_simple_user_uses_short_name() {
        let user = UserContext::simple("etl/host@REALM");
        let fs = WebHdfsFileSystem::from_configuration(&ha_conf(), "hdfs://NameNodeCluster", &user)
            .unwrap();
        assert_eq!(fs.auth, WebHdfsAuth::User("etl".to_string()));
        assert_eq!(fs.uri(), "hdfs://NameNodeCluster");
        assert_eq!(fs.endpoints().len(), 2);
        assert_eq!(fs.replication, None);

        let mut conf = ha_conf();
        conf.set("dfs.replication", "2");
        let fs = WebHdfsFileSystem::from_configuration(&conf, "hdfs://NameNodeCluster", &user)
            .unwrap();
        assert_eq!(fs.replication, Some(2));
    }

    #[test]
    fn test_url_building() {
        let fs = fs(&["http://nn-a:9870"]);
        let url = fs.url(
            &fs.endpoints[0],
            "hdfs://NameNodeCluster/t/a b",
            "MKDIRS",
            &[("recursive", "true")],
        );
        assert_eq!(
            url.as_str(),
            "http://nn-a:9870/webhdfs/v1/t/a%20b?op=MKDIRS&recursive=true&user.name=hdfs"
        );
    }

    #[test]
    fn test_canonical_service_name() {
        let fs = fs(&["http://nn-a:9870", "http://nn-b:9870"]);
        assert_eq!(fs.canonical_service_name().as_deref(), Some("nn-a:9870"));
    }

    #[test]
    fn test_parse_remote_exceptions() {
        let body = r#"{"RemoteException":{"exception":"FileNotFoundException","javaClassName":"java.io.FileNotFoundException","message":"File does not exist: /foo"}}"#;
        let err = parse_error(StatusCode::NOT_FOUND, body);
        assert_eq!(err.error.kind(), io::ErrorKind::NotFound);
        assert_eq!(err.error.to_string(), "File does not exist: /foo");
        assert!(!err.standby);

        let body = r#"{"RemoteException":{"exception":"StandbyException","javaClassName":"org.apache.hadoop.ipc.StandbyException","message":"Operation category READ is not supported in state standby"}}"#;
        assert!(parse_error(StatusCode::FORBIDDEN, body).standby);

        let body = r#"{"RemoteException":{"exception":"IOException","javaClassName":"java.io.IOException","message":"At least one of the attributes provided was not found."}}"#;
        let err = parse_error(StatusCode::FORBIDDEN, body);
        assert!(is_xattr_not_found(&err.error));

        let err = parse_error(StatusCode::BAD_GATEWAY, "upstream down");
        assert_eq!(err.error.to_string(), "502 Bad Gateway: upstream down");
    }

    #[test]
    fn test_status_messages() {
        let json = r#"{"FileStatus":{"accessTime":0,"blockSize":0,"group":"supergroup","length":0,"modificationTime":1320173277227,"owner":"webuser","pathSuffix":"","permission":"777","replication":0,"type":"DIRECTORY"}}"#;
        let status: FileStatusWrapper = serde_json::from_str(json).unwrap();
        let fs = fs(&["http://nn-a:9870"]);
        let status = fs.to_status("/t", status.file_status);
        assert!(status.is_directory());
        assert_eq!(status.path, "hdfs://NameNodeCluster/t");

        let json = r#"{"FileStatuses":{"FileStatus":[{"length":5,"pathSuffix":"f","type":"FILE","replication":2}]}}"#;
        let list: FileStatusesWrapper = serde_json::from_str(json).unwrap();
        let entries: Vec<FileStatus> = list
            .file_statuses
            .file_status
            .into_iter()
            .map(|s| fs.to_status("/t", s))
            .collect();
        assert_eq!(entries[0].path, "hdfs://NameNodeCluster/t/f");
        assert_eq!(entries[0].length, 5);
        assert!(entries[0].is_file());
    }

    #[test]
    fn test_xattr_messages_and_hex() {
        let json = r#"{"XAttrs":[{"name":"user.tag","value":"0x7631"}]}"#;
        let resp: XAttrsResp = serde_json::from_str(json).unwrap();
        let value = resp.x_attrs[0].value.as_deref().unwrap();
        assert_eq!(hex_decode(value).unwrap(), b"v1");
        assert_eq!(hex_encode(b"v1"), "0x7631");
        assert!(hex_decode("7631").is_err());
        assert!(hex_decode("0x763").is_err());
    }

    #[test]
    fn test_non_ascii_xattr_value_is_invalid_data() {
        let json = r#"{"XAttrs":[{"name":"user.tag","value":"0xaéa"}]}"#;
        let resp: XAttrsResp = serde_json::from_str(json).unwrap();
        let value = resp.x_attrs[0].value.as_deref().unwrap();
        let err = hex_decode(value).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        assert!(hex_decode("0xé").is_err());
        assert_eq!(hex_decode("0XFF00").unwrap(), vec![0xff, 0x00]);
    }

    #[tokio::test]
    async fn test_unreachable_namenodes_fail_over_then_error() {
        let fs = fs(&["http://127.0.0.1:1", "http://127.0.0.1:2"]);
        let err = fs.get_file_status("/t").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionRefused);
    }
}
