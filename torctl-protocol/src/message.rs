//! JSON-RPC 2.0 records exchanged with the control plane.

use crate::JSONRPC_VERSION;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Control-plane methods exposed by the Tor router.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// Initializes the instance pool.
    CreateTorPool,
    /// Opens the SOCKS listener that routes traffic into the pool.
    CreateSocksServer,
    /// Spawns Tor instances in the pool.
    CreateInstances,
    /// Tears down every instance in the pool.
    CloseInstances,
}

impl Method {
    /// Returns the method name as sent on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::CreateTorPool => "createTorPool",
            Method::CreateSocksServer => "createSOCKSServer",
            Method::CreateInstances => "createInstances",
            Method::CloseInstances => "closeInstances",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Method to invoke.
    pub method: String,

    /// Positional arguments.
    #[serde(default)]
    pub params: Vec<Value>,

    /// Protocol version tag, always "2.0".
    pub jsonrpc: String,

    /// Correlation id.
    pub id: u64,
}

impl Request {
    pub fn new(id: u64, method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            params: Vec::new(),
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
        }
    }

    pub fn with_params(mut self, params: Vec<Value>) -> Self {
        self.params = params;
        self
    }
}

/// Error payload reported by the control plane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.code)
    }
}

/// Response record.
///
/// The id must be a JSON integer. A `null` or missing id means the server
/// could not tell which request it answers; such responses never match a
/// pending call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jsonrpc: Option<String>,

    #[serde(default)]
    pub id: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl Response {
    pub fn ok(id: u64, result: Value) -> Self {
        Self {
            jsonrpc: Some(JSONRPC_VERSION.to_string()),
            id: Some(id),
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: u64, error: RpcError) -> Self {
        Self {
            jsonrpc: Some(JSONRPC_VERSION.to_string()),
            id: Some(id),
            result: None,
            error: Some(error),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Splits the response into its success or error payload.
    ///
    /// An error payload takes precedence; a success without a result is `null`.
    pub fn into_outcome(self) -> Result<Value, RpcError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}
