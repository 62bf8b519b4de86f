#![warn(missing_docs)]

//! hdfsgate server: gateway configuration and the JSON-lines bridge that
//! exposes the HDFS operation surface to clients in other runtimes.

pub mod cli;
pub mod config;
pub mod error;
pub mod protocol;
pub mod server;

pub use config::{BridgeConfig, GatewayConfig, MessagesConfig};
pub use error::{Result, ServerError};
pub use protocol::{ErrorBody, Operation, Request, Response};
pub use server::BridgeServer;
