//! Structured error types for omapi-scope
//!
//! Using thiserror for automatic Display implementation and error chaining.
//! None of these ever reach an instrumented call: the hook boundary turns them
//! into dropped or error-tagged records.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Observer endpoint {0} could not be resolved")]
    EndpointUnresolved(PathBuf),

    #[error("Failed to connect to observer at {path}: {error}")]
    ConnectFailed {
        path: PathBuf,
        error: std::io::Error,
    },

    #[error("Failed to encode record payload: {0}")]
    EncodeFailed(#[from] serde_json::Error),

    #[error("Delivery queue is closed")]
    QueueClosed,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum ReceiverError {
    #[error("Failed to bind observer socket {path}: {error}")]
    BindFailed {
        path: PathBuf,
        error: std::io::Error,
    },

    #[error("Malformed record payload: {0}")]
    MalformedPayload(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value {value:?} for {variable}: expected 1/0/true/false")]
    InvalidFlag {
        variable: &'static str,
        value: String,
    },

    #[error("{0} must not be empty")]
    Empty(&'static str),
}

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Failed to serialize records: {0}")]
    SerializationFailed(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
