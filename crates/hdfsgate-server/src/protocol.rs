//! JSON-lines wire format for the bridge.
//!
//! One request object per line, one response object per line. Requests carry
//! a caller-chosen `id` that is echoed back, an optional `locale` tag and an
//! `op` discriminator with the operation's arguments. Binary payloads
//! (file contents, xattr values) travel as standard base64.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, ServerError};

/// A decoded request line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Correlation id echoed in the response
    pub id: u64,
    /// Locale tag such as `pt_BR`; the server default applies when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    /// The operation and its arguments
    #[serde(flatten)]
    pub op: Operation,
}

/// Every operation the bridge accepts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase", rename_all_fields = "camelCase")]
#[allow(missing_docs)]
pub enum Operation {
    ExistsPath {
        path: String,
    },
    IsFile {
        path: String,
    },
    IsDirectory {
        path: String,
    },
    MakeDirectory {
        name: String,
        parent: String,
    },
    Mkdir {
        path: String,
    },
    ShowDirectory {
        path: String,
    },
    PathInfo {
        path: String,
    },
    Ls {
        path: String,
    },
    WriteFile {
        dir: String,
        name: String,
        /// base64 file contents
        data: String,
        #[serde(default)]
        append: bool,
    },
    ReadFile {
        path: String,
    },
    ReadAllBytes {
        path: String,
    },
    DeleteFile {
        path: String,
        #[serde(default)]
        recursive: bool,
    },
    MoveFile {
        src: String,
        dst: String,
    },
    FileInfo {
        path: String,
    },
    SetExtendedAttributes {
        path: String,
        name: String,
        /// base64 attribute value
        value: String,
    },
    SetExtendedAttributesString {
        path: String,
        name: String,
        value: String,
    },
    GetExtendedAttribute {
        path: String,
        name: String,
    },
    GetExtendedAttributeString {
        path: String,
        name: String,
    },
    RemoveExtendedAttribute {
        path: String,
        name: String,
    },
    Upload {
        local_path: String,
        hdfs_dir: String,
    },
    Download {
        hdfs_path: String,
        local_path: String,
    },
    HandleInfo,
}

impl Operation {
    /// Wire name of the operation, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Operation::ExistsPath { .. } => "existsPath",
            Operation::IsFile { .. } => "isFile",
            Operation::IsDirectory { .. } => "isDirectory",
            Operation::MakeDirectory { .. } => "makeDirectory",
            Operation::Mkdir { .. } => "mkdir",
            Operation::ShowDirectory { .. } => "showDirectory",
            Operation::PathInfo { .. } => "pathInfo",
            Operation::Ls { .. } => "ls",
            Operation::WriteFile { .. } => "writeFile",
            Operation::ReadFile { .. } => "readFile",
            Operation::ReadAllBytes { .. } => "readAllBytes",
            Operation::DeleteFile { .. } => "deleteFile",
            Operation::MoveFile { .. } => "moveFile",
            Operation::FileInfo { .. } => "fileInfo",
            Operation::SetExtendedAttributes { .. } => "setExtendedAttributes",
            Operation::SetExtendedAttributesString { .. } => "setExtendedAttributesString",
            Operation::GetExtendedAttribute { .. } => "getExtendedAttribute",
            Operation::GetExtendedAttributeString { .. } => "getExtendedAttributeString",
            Operation::RemoveExtendedAttribute { .. } => "removeExtendedAttribute",
            Operation::Upload { .. } => "upload",
            Operation::Download { .. } => "download",
            Operation::HandleInfo => "handleInfo",
        }
    }
}

/// Error half of a response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Stable error kind, e.g. `NotFound`
    pub kind: String,
    /// Human-readable, possibly localized, message
    pub message: String,
}

/// A response line. Exactly one of `ok` and `error` is present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Id of the request; absent when the request line could not be read far enough
    pub id: Option<u64>,
    /// Operation result
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ok: Option<Value>,
    /// Failure description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl Response {
    /// Successful response carrying `value`.
    pub fn ok(id: u64, value: Value) -> Self {
        Self {
            id: Some(id),
            ok: Some(value),
            error: None,
        }
    }

    /// Failed response built from a server error.
    pub fn error(id: Option<u64>, err: &ServerError) -> Self {
        Self {
            id,
            ok: None,
            error: Some(ErrorBody {
                kind: err.kind().to_string(),
                message: err.to_string(),
            }),
        }
    }

    /// True when the response carries an error.
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Serializes to a single line, without the trailing newline.
    pub fn to_line(&self) -> String {
        match serde_json::to_string(self) {
            Ok(line) => line,
            Err(e) => format!(
                r#"{{"id":null,"error":{{"kind":"Protocol","message":"{}"}}}}"#,
                e.to_string().replace('"', "'")
            ),
        }
    }
}

/// Decodes one request line.
///
/// On failure the id is still returned when the line was valid JSON with a
/// numeric `id`, so the error response can be correlated.
pub fn parse_request(line: &str) -> std::result::Result<Request, (Option<u64>, ServerError)> {
    let value: Value = serde_json::from_str(line)
        .map_err(|e| (None, ServerError::Protocol(format!("malformed JSON: {e}"))))?;
    let id = value.get("id").and_then(Value::as_u64);
    serde_json::from_value(value).map_err(|e| (id, ServerError::Protocol(e.to_string())))
}

/// Encodes bytes for the wire.
pub fn encode_bytes(data: &[u8]) -> String {
    STANDARD.encode(data)
}

/// Decodes a base64 field named `field`.
pub fn decode_bytes(field: &str, data: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(data)
        .map_err(|e| ServerError::Protocol(format!("{field} is not valid base64: {e}")))
}
