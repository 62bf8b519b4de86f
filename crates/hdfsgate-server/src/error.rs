//! Error types for the bridge server

use hdfsgate_core::HdfsError;
use thiserror::Error;

/// Errors raised while loading configuration or serving bridge requests.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Gateway configuration file could not be used
    #[error("config error: {0}")]
    Config(String),
    /// Malformed request line
    #[error("protocol error: {0}")]
    Protocol(String),
    /// Request line longer than `bridge.max_frame_bytes`
    #[error("request exceeds {limit} bytes")]
    FrameTooLarge {
        /// Configured limit
        limit: usize,
    },
    /// Failure reported by the HDFS operation layer
    #[error(transparent)]
    Hdfs(#[from] HdfsError),
    /// Socket or file I/O failure
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ServerError {
    /// Stable name of the error kind, sent as `error.kind` on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            ServerError::Config(_) => "ConfigInvalid",
            ServerError::Protocol(_) => "Protocol",
            ServerError::FrameTooLarge { .. } => "FrameTooLarge",
            ServerError::Hdfs(e) => e.kind(),
            ServerError::Io(_) => "IO",
        }
    }
}

/// Result type alias using ServerError as the error type.
pub type Result<T> = std::result::Result<T, ServerError>;
