//! TCP accept loop and request dispatch for the JSON-lines bridge.

use std::net::SocketAddr;

use bytes::BytesMut;
use futures::SinkExt;
use hdfsgate_core::{HdfsService, Locale};
use serde::Serialize;
use serde_json::Value;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::{Decoder, FramedWrite, LinesCodec, LinesCodecError};
use tracing::{debug, info, warn};

use crate::error::{Result, ServerError};
use crate::protocol::{decode_bytes, encode_bytes, parse_request, Operation, Response};

/// Serves [`HdfsService`] operations to bridge clients.
#[derive(Debug, Clone)]
pub struct BridgeServer {
    service: HdfsService,
    default_locale: Locale,
    max_frame_bytes: usize,
}

impl BridgeServer {
    /// Wraps `service`; `max_frame_bytes` bounds one request line.
    pub fn new(service: HdfsService, default_locale: Locale, max_frame_bytes: usize) -> Self {
        Self {
            service,
            default_locale,
            max_frame_bytes,
        }
    }

    /// The wrapped operation surface.
    pub fn service(&self) -> &HdfsService {
        &self.service
    }

    /// Accepts connections until the listener fails; each connection runs on its own task.
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        info!(addr = ?listener.local_addr().ok(), bound = self.service.is_bound(), "bridge listening");
        loop {
            let (stream, peer) = listener.accept().await?;
            debug!(peer = %peer, "accepted connection");
            let server = self.clone();
            tokio::spawn(async move {
                if let Err(e) = server.handle_connection(stream, peer).await {
                    warn!(peer = %peer, error = %e, "connection failed");
                }
            });
        }
    }

    /// Reads request lines from one connection and answers each in order.
    pub async fn handle_connection(&self, stream: TcpStream, peer: SocketAddr) -> Result<()> {
        let (mut reader, writer) = stream.into_split();
        let mut writer = FramedWrite::new(writer, LinesCodec::new());
        let mut codec = LinesCodec::new_with_max_length(self.max_frame_bytes);
        let mut buf = BytesMut::with_capacity(8 * 1024);
        let mut eof = false;

        loop {
            let decoded = if eof {
                codec.decode_eof(&mut buf)
            } else {
                codec.decode(&mut buf)
            };
            let response = match decoded {
                Ok(Some(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    self.dispatch(&line).await
                }
                Ok(None) if eof => break,
                Ok(None) => {
                    if reader.read_buf(&mut buf).await? == 0 {
                        eof = true;
                    }
                    continue;
                }
                Err(LinesCodecError::MaxLineLengthExceeded) => {
                    warn!(peer = %peer, limit = self.max_frame_bytes, "request line too long");
                    Response::error(
                        None,
                        &ServerError::FrameTooLarge {
                            limit: self.max_frame_bytes,
                        },
                    )
                }
                Err(LinesCodecError::Io(e)) => return Err(e.into()),
            };
            writer.send(response.to_line()).await.map_err(|e| match e {
                LinesCodecError::Io(e) => ServerError::Io(e),
                LinesCodecError::MaxLineLengthExceeded => ServerError::FrameTooLarge {
                    limit: usize::MAX,
                },
            })?;
        }
        debug!(peer = %peer, "connection closed");
        Ok(())
    }

    /// Decodes and executes one request line, always producing a response.
    pub async fn dispatch(&self, line: &str) -> Response {
        let request = match parse_request(line) {
            Ok(request) => request,
            Err((id, e)) => {
                warn!(id = ?id, error = %e, "rejected request");
                return Response::error(id, &e);
            }
        };
        let locale = request
            .locale
            .as_deref()
            .map(Locale::parse)
            .unwrap_or_else(|| self.default_locale.clone());
        let op = request.op.name();
        debug!(id = request.id, op, locale = %locale, "request");
        match self.execute(request.op, &locale).await {
            Ok(value) => Response::ok(request.id, value),
            Err(e) => {
                debug!(id = request.id, op, kind = e.kind(), error = %e, "request failed");
                Response::error(Some(request.id), &e)
            }
        }
    }

    /// Runs one operation against the service and renders its result as JSON.
    pub async fn execute(&self, op: Operation, locale: &Locale) -> Result<Value> {
        let service = &self.service;
        match op {
            Operation::ExistsPath { path } => Ok(Value::Bool(service.exists_path(&path).await?)),
            Operation::IsFile { path } => Ok(Value::Bool(service.is_file(&path, locale).await?)),
            Operation::IsDirectory { path } => {
                Ok(Value::Bool(service.is_directory(&path, locale).await?))
            }
            Operation::MakeDirectory { name, parent } => Ok(Value::Bool(
                service.make_directory(&name, &parent, locale).await?,
            )),
            Operation::Mkdir { path } => Ok(Value::Bool(service.mkdir(&path, locale).await?)),
            Operation::ShowDirectory { path } => to_json(&service.show_directory(&path).await?),
            Operation::PathInfo { path } => to_json(&service.path_info(&path).await?),
            Operation::Ls { path } => to_json(&service.ls(&path).await?),
            Operation::WriteFile {
                dir,
                name,
                data,
                append,
            } => {
                let bytes = decode_bytes("data", &data)?;
                let written = service
                    .write_file(&mut bytes.as_slice(), &dir, &name, append)
                    .await?;
                Ok(Value::from(written))
            }
            Operation::ReadFile { path } | Operation::ReadAllBytes { path } => {
                let bytes = service.read_all_bytes(&path).await?;
                Ok(Value::String(encode_bytes(&bytes)))
            }
            Operation::DeleteFile { path, recursive } => Ok(Value::Bool(
                service.delete_file(&path, recursive, locale).await?,
            )),
            Operation::MoveFile { src, dst } => {
                Ok(Value::Bool(service.move_file(&src, &dst, locale).await?))
            }
            Operation::FileInfo { path } => to_json(&service.file_info(&path).await?),
            Operation::SetExtendedAttributes { path, name, value } => {
                let value = decode_bytes("value", &value)?;
                service.set_extended_attributes(&path, &name, &value).await?;
                Ok(Value::Null)
            }
            Operation::SetExtendedAttributesString { path, name, value } => {
                service
                    .set_extended_attributes_str(&path, &name, &value)
                    .await?;
                Ok(Value::Null)
            }
            Operation::GetExtendedAttribute { path, name } => {
                let value = service.get_extended_attribute(&path, &name).await?;
                Ok(value.map_or(Value::Null, |v| Value::String(encode_bytes(&v))))
            }
            Operation::GetExtendedAttributeString { path, name } => {
                let value = service.get_extended_attribute_string(&path, &name).await?;
                Ok(value.map_or(Value::Null, Value::String))
            }
            Operation::RemoveExtendedAttribute { path, name } => {
                service.remove_extended_attribute(&path, &name).await?;
                Ok(Value::Null)
            }
            Operation::Upload {
                local_path,
                hdfs_dir,
            } => Ok(Value::Bool(service.upload(&local_path, &hdfs_dir).await)),
            Operation::Download {
                hdfs_path,
                local_path,
            } => Ok(Value::Bool(service.download(&hdfs_path, &local_path).await)),
            Operation::HandleInfo => to_json(&service.handle_info()?),
        }
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| ServerError::Protocol(e.to_string()))
}
