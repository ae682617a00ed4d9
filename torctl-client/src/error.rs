//! Client error types.

use crate::config::ConfigError;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use torctl_protocol::RpcError;

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("timed out connecting to {addr} after {elapsed:?}")]
    ConnectTimeout { addr: String, elapsed: Duration },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to send request: {0}")]
    Send(#[source] std::io::Error),

    #[error("protocol error: {0}")]
    Parse(#[from] torctl_protocol::ProtocolError),

    #[error("{method} request timed out after {elapsed:?}")]
    Timeout { method: String, elapsed: Duration },

    #[error("connection lost")]
    ConnectionLost,

    #[error("connection closed")]
    Closed,

    #[error("control plane error: {message} ({code})")]
    Remote {
        code: i64,
        message: String,
        data: Option<Value>,
    },

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl ClientError {
    /// Returns whether retrying on a fresh connection may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ClientError::Connect { .. }
                | ClientError::ConnectTimeout { .. }
                | ClientError::Io(_)
                | ClientError::Send(_)
                | ClientError::Timeout { .. }
                | ClientError::ConnectionLost
                | ClientError::Closed
        )
    }

    /// Returns whether the error was reported by the control plane itself.
    pub fn is_remote(&self) -> bool {
        matches!(self, ClientError::Remote { .. })
    }
}

impl From<RpcError> for ClientError {
    fn from(err: RpcError) -> Self {
        ClientError::Remote {
            code: err.code,
            message: err.message,
            data: err.data,
        }
    }
}
