//! High-level control API for the Tor router.

use crate::config::ClientConfig;
use crate::connection::Connection;
use crate::error::ClientError;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use torctl_protocol::{Method, Response, DEFAULT_SOCKS_PORT};

/// Exposes the control plane's methods as async calls.
///
/// Each call is independent; any number may be in flight at once on the
/// same connection. Results are returned as the server sent them.
#[derive(Clone)]
pub struct TorController {
    conn: Arc<Connection>,
    socks_port: Arc<Mutex<u16>>,
    timeout: Option<Duration>,
}

impl TorController {
    /// Connects to the control plane described by `config`.
    pub async fn connect(config: ClientConfig) -> Result<Self, ClientError> {
        let socks_port = config.socks_port;
        let conn = Connection::connect(config).await?;
        Ok(Self::new(conn, socks_port))
    }

    /// Wraps an existing connection. `socks_port` of `None` means 9050.
    pub fn new(conn: Arc<Connection>, socks_port: Option<u16>) -> Self {
        Self {
            conn,
            socks_port: Arc::new(Mutex::new(socks_port.unwrap_or(DEFAULT_SOCKS_PORT))),
            timeout: None,
        }
    }

    /// Returns a handle whose calls use `timeout` instead of the configured default.
    ///
    /// The handle shares the connection and remembered SOCKS port.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            ..self.clone()
        }
    }

    /// Returns the underlying connection.
    pub fn connection(&self) -> &Arc<Connection> {
        &self.conn
    }

    /// Returns the port the next `create_socks_server(None)` will use.
    pub fn socks_port(&self) -> u16 {
        *self.socks_port.lock()
    }

    // =========================================================================
    // Helper methods
    // =========================================================================

    /// Sends an arbitrary method call and returns the response verbatim.
    pub async fn call(&self, method: &str, params: Vec<Value>) -> Result<Response, ClientError> {
        match self.timeout {
            Some(timeout) => self.conn.submit_with_timeout(method, params, timeout).await,
            None => self.conn.submit(method, params).await,
        }
    }

    async fn request(&self, method: Method, params: Vec<Value>) -> Result<Value, ClientError> {
        let response = self.call(method.as_str(), params).await?;
        response.into_outcome().map_err(|err| {
            tracing::debug!("{} rejected by control plane: {}", method, err);
            ClientError::from(err)
        })
    }

    // =========================================================================
    // Pool operations
    // =========================================================================

    /// Initializes the Tor pool.
    pub async fn create_tor_pool(&self) -> Result<Value, ClientError> {
        tracing::info!("Creating Tor pool");
        self.request(Method::CreateTorPool, vec![]).await
    }

    /// Opens the SOCKS listener that routes traffic into the pool.
    ///
    /// An explicit port also becomes the remembered port for later calls.
    pub async fn create_socks_server(&self, port: Option<u16>) -> Result<Value, ClientError> {
        let port = {
            let mut remembered = self.socks_port.lock();
            if let Some(port) = port {
                *remembered = port;
            }
            *remembered
        };

        tracing::info!("Creating SOCKS server on port {}", port);
        self.request(Method::CreateSocksServer, vec![json!(port)])
            .await
    }

    // =========================================================================
    // Instance operations
    // =========================================================================

    /// Spawns `count` Tor instances.
    pub async fn create_instances(&self, count: u32) -> Result<Value, ClientError> {
        tracing::info!("Creating {} Tor instance(s)", count);
        self.request(Method::CreateInstances, vec![json!(count)])
            .await
    }

    /// Tears down every Tor instance.
    pub async fn close_instances(&self) -> Result<Value, ClientError> {
        tracing::info!("Closing Tor instances");
        self.request(Method::CloseInstances, vec![]).await
    }
}
