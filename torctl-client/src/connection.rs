//! Connection management.
//!
//! A [`Connection`] owns one control stream. A single dispatch task drains
//! the inbound bytes, reassembles responses and hands each one to the
//! pending table; callers never read from the stream themselves.

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::pending::{ConnectionState, PendingTable};
use crate::transport::{Transport, TransportReader, TransportWriter};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::task::JoinHandle;
use torctl_protocol::{Decoder, Encoder, Request, Response};

/// A connection to the control plane.
pub struct Connection {
    config: ClientConfig,
    peer: String,
    pending: Arc<PendingTable>,
    writer: Mutex<Option<TransportWriter>>,
    dispatch: Mutex<Option<JoinHandle<()>>>,
}

impl Connection {
    /// Connects to the configured control endpoint.
    pub async fn connect(config: ClientConfig) -> Result<Arc<Self>, ClientError> {
        config.validate()?;
        let transport = Transport::connect(&config).await?;
        tracing::info!("Connected to control plane at {}", transport.peer());
        Ok(Self::from_transport(transport, config))
    }

    /// Wraps an already-connected stream.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn from_stream<S>(stream: S, peer: impl Into<String>, config: ClientConfig) -> Arc<Self>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        Self::from_transport(Transport::from_stream(stream, peer), config)
    }

    /// Takes ownership of a transport and starts its dispatch task.
    pub fn from_transport(transport: Transport, config: ClientConfig) -> Arc<Self> {
        let peer = transport.peer().to_string();
        let (reader, writer) = transport.into_split(config.read_buffer_size);

        let pending = Arc::new(PendingTable::new());
        pending.mark_open();

        let decoder = Decoder::new(config.wire_mode);
        let dispatch = tokio::spawn(run_dispatch(reader, decoder, pending.clone()));

        Arc::new(Self {
            config,
            peer,
            pending,
            writer: Mutex::new(Some(writer)),
            dispatch: Mutex::new(Some(dispatch)),
        })
    }

    /// Sends a request and waits for its response using the configured timeout.
    pub async fn submit(&self, method: &str, params: Vec<Value>) -> Result<Response, ClientError> {
        self.submit_with_timeout(method, params, self.config.request_timeout())
            .await
    }

    /// Sends a request and waits at most `timeout` for its response.
    ///
    /// The returned response is passed through verbatim; a remote error
    /// payload is not turned into an `Err` here.
    pub async fn submit_with_timeout(
        &self,
        method: &str,
        params: Vec<Value>,
        timeout: Duration,
    ) -> Result<Response, ClientError> {
        // Registered before anything is written, so the response always finds it.
        let call = self.pending.register(method)?;
        let id = call.id();

        let request = Request::new(id, method).with_params(params);
        let encoded = Encoder::encode_request(&request, self.config.wire_mode)?;

        let writer = self.writer.lock().clone().ok_or(ClientError::Closed)?;
        tracing::debug!(
            "Sending request id={} method={} ({} bytes)",
            id,
            method,
            encoded.len()
        );

        // The deadline covers the write too: a peer that stops reading must
        // not hold the caller past it.
        let send = writer.send(encoded);
        let sent = match call.deadline(timeout) {
            Some(deadline) => tokio::time::timeout_at(deadline, send).await.ok(),
            None => Some(send.await),
        };

        match sent {
            Some(Ok(())) => {}
            Some(Err(e)) => {
                call.cancel();
                tracing::warn!("Failed to send request id={}: {}", id, e);
                self.shutdown();
                return Err(ClientError::Send(e));
            }
            // Still queued behind a stalled write; the writer finishes it whole.
            None => tracing::debug!("Request id={} not flushed before its deadline", id),
        }

        // With the deadline already past this settles at once, still taking a
        // response that beat it.
        call.wait(timeout).await
    }

    /// Returns the connection state.
    pub fn state(&self) -> ConnectionState {
        self.pending.state()
    }

    /// Returns whether requests can currently be submitted.
    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Returns the number of pending requests.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Closes the connection.
    ///
    /// Pending calls fail with `ConnectionLost`; later calls fail with `Closed`.
    pub fn close(&self) {
        tracing::debug!("Closing connection to {}", self.peer);
        self.shutdown();
    }

    fn shutdown(&self) {
        let failed = self.pending.fail_all();
        if failed > 0 {
            tracing::debug!("Failed {} pending request(s) on shutdown", failed);
        }
        // The writer task flushes anything queued, then shuts the stream down.
        self.writer.lock().take();
        if let Some(handle) = self.dispatch.lock().take() {
            handle.abort();
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn run_dispatch(mut reader: TransportReader, mut decoder: Decoder, pending: Arc<PendingTable>) {
    match read_loop(&mut reader, &mut decoder, &pending).await {
        Ok(()) => tracing::info!("Control connection closed by peer"),
        Err(e) => tracing::warn!("Control connection failed: {}", e),
    }

    let failed = pending.fail_all();
    if failed > 0 {
        tracing::warn!("Failed {} pending request(s) after connection loss", failed);
    }
}

/// Runs until the peer closes (`Ok`) or the stream becomes unusable (`Err`).
async fn read_loop(
    reader: &mut TransportReader,
    decoder: &mut Decoder,
    pending: &PendingTable,
) -> Result<(), ClientError> {
    loop {
        let Some(chunk) = reader.recv().await? else {
            return Ok(());
        };
        tracing::trace!("Received {} bytes", chunk.len());
        decoder.extend(chunk);

        while let Some(response) = decoder.decode_response()? {
            let id = response.id;
            if !pending.resolve(response) {
                tracing::debug!("Discarding response with no pending request (id={:?})", id);
            }
        }
    }
}
