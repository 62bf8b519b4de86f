//! Loopback tests of the bridge over an in-memory cluster.

use std::sync::Arc;

use hdfsgate_core::binder::Handle;
use hdfsgate_core::fs::memory::MemoryFileSystem;
use hdfsgate_core::{BundleMessageSource, HdfsService, Locale, UserContext};
use hdfsgate_server::BridgeServer;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};

struct Client {
    lines: tokio::io::Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl Client {
    async fn send_raw(&mut self, line: &str) -> Value {
        self.writer.write_all(line.as_bytes()).await.unwrap();
        self.writer.write_all(b"\n").await.unwrap();
        let reply = self.lines.next_line().await.unwrap().unwrap();
        serde_json::from_str(&reply).unwrap()
    }

    async fn send(&mut self, request: Value) -> Value {
        self.send_raw(&request.to_string()).await
    }
}

async fn start(max_frame_bytes: usize) -> (Arc<MemoryFileSystem>, Client) {
    let fs = Arc::new(MemoryFileSystem::new("hdfs://NameNodeCluster"));
    let handle = Handle::new(fs.clone(), UserContext::simple("hdfs"));
    let service = HdfsService::new(Some(handle), Arc::new(BundleMessageSource::builtin()));
    let server = BridgeServer::new(service, Locale::default(), max_frame_bytes);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { server.serve(listener).await });

    let stream = TcpStream::connect(addr).await.unwrap();
    let (reader, writer) = stream.into_split();
    let client = Client {
        lines: BufReader::new(reader).lines(),
        writer,
    };
    (fs, client)
}

#[tokio::test]
async fn test_mkdir_and_exists() {
    let (_fs, mut client) = start(1024 * 1024).await;

    let reply = client.send(json!({"id": 1, "op": "existsPath", "path": "/data"})).await;
    assert_eq!(reply, json!({"id": 1, "ok": false}));

    let reply = client.send(json!({"id": 2, "op": "mkdir", "path": "/data"})).await;
    assert_eq!(reply["ok"], json!(true));

    let reply = client.send(json!({"id": 3, "op": "isDirectory", "path": "/data"})).await;
    assert_eq!(reply["ok"], json!(true));
}

#[tokio::test]
async fn test_write_then_read_base64() {
    let (_fs, mut client) = start(1024 * 1024).await;
    client.send(json!({"id": 0, "op": "mkdir", "path": "/data"})).await;

    let reply = client
        .send(json!({"id": 1, "op": "writeFile", "dir": "/data", "name": "a.txt", "data": "aGVsbG8="}))
        .await;
    assert_eq!(reply["ok"], json!(5));

    let reply = client
        .send(json!({"id": 2, "op": "writeFile", "dir": "/data", "name": "a.txt", "data": "IHdvcmxk", "append": true}))
        .await;
    assert_eq!(reply["ok"], json!(6));

    let reply = client.send(json!({"id": 3, "op": "readFile", "path": "/data/a.txt"})).await;
    assert_eq!(reply["ok"], json!("aGVsbG8gd29ybGQ="));

    let reply = client.send(json!({"id": 4, "op": "ls", "path": "/data"})).await;
    assert_eq!(reply["ok"], json!(["/data/a.txt"]));
}

#[tokio::test]
async fn test_missing_file_is_localized() {
    let (_fs, mut client) = start(1024 * 1024).await;

    let reply = client
        .send(json!({"id": 7, "locale": "pt_BR", "op": "isFile", "path": "/nope"}))
        .await;
    assert_eq!(reply["id"], json!(7));
    assert_eq!(reply["error"]["kind"], json!("NotFound"));
    assert_eq!(reply["error"]["message"], json!("O arquivo '/nope' n\u{e3}o existe."));

    let reply = client.send(json!({"id": 8, "op": "isFile", "path": "/nope"})).await;
    assert_eq!(reply["error"]["message"], json!("The file '/nope' does not exist."));
}

#[tokio::test]
async fn test_xattr_round_trip() {
    let (_fs, mut client) = start(1024 * 1024).await;
    client.send(json!({"id": 1, "op": "mkdir", "path": "/x"})).await;

    let reply = client
        .send(json!({"id": 2, "op": "setExtendedAttributesString", "path": "/x", "name": "user.tag", "value": "blue"}))
        .await;
    assert_eq!(reply, json!({"id": 2, "ok": null}));

    let reply = client
        .send(json!({"id": 3, "op": "getExtendedAttributeString", "path": "/x", "name": "user.tag"}))
        .await;
    assert_eq!(reply["ok"], json!("blue"));

    let reply = client
        .send(json!({"id": 4, "op": "getExtendedAttribute", "path": "/x", "name": "user.other"}))
        .await;
    assert_eq!(reply, json!({"id": 4, "ok": null}));
}

#[tokio::test]
async fn test_connection_survives_bad_lines() {
    let (_fs, mut client) = start(64).await;

    let reply = client.send_raw("this is not json").await;
    assert_eq!(reply["id"], Value::Null);
    assert_eq!(reply["error"]["kind"], json!("Protocol"));

    let long = format!(r#"{{"id":1,"op":"existsPath","path":"/{}"}}"#, "a".repeat(200));
    let reply = client.send_raw(&long).await;
    assert_eq!(reply["error"]["kind"], json!("FrameTooLarge"));

    let reply = client.send(json!({"id": 2, "op": "existsPath", "path": "/"})).await;
    assert_eq!(reply, json!({"id": 2, "ok": true}));
}

#[tokio::test]
async fn test_handle_info() {
    let (_fs, mut client) = start(1024 * 1024).await;
    let reply = client.send(json!({"id": 1, "op": "handleInfo"})).await;
    assert_eq!(reply["ok"]["uri"], json!("hdfs://NameNodeCluster"));
    assert_eq!(reply["ok"]["user"], json!("hdfs"));
}
