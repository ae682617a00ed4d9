//! In-memory control-plane peer for tests.

use crate::config::ClientConfig;
use crate::connection::Connection;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use torctl_protocol::{Decoder, Encoder, Request, Response, WireMode};

/// The server end of a duplex pipe, speaking the control protocol.
pub struct MockServer {
    io: DuplexStream,
    decoder: Decoder,
    mode: WireMode,
}

impl MockServer {
    pub fn new(io: DuplexStream, mode: WireMode) -> Self {
        Self {
            io,
            decoder: Decoder::new(mode),
            mode,
        }
    }

    /// Waits for the next complete request from the client.
    pub async fn next_request(&mut self) -> Request {
        let mut buf = [0u8; 1024];
        loop {
            if let Some(request) = self.decoder.decode_request().unwrap() {
                return request;
            }
            let n = tokio::time::timeout(Duration::from_secs(5), self.io.read(&mut buf))
                .await
                .expect("no request within 5s")
                .unwrap();
            assert!(n > 0, "client closed the connection");
            self.decoder.extend(&buf[..n]);
        }
    }

    pub async fn reply(&mut self, id: u64, result: Value) {
        self.respond(&Response::ok(id, result)).await;
    }

    pub async fn respond(&mut self, response: &Response) {
        let bytes = self.encode(response);
        self.send_raw(&bytes).await;
    }

    pub fn encode(&self, response: &Response) -> Vec<u8> {
        Encoder::encode_response(response, self.mode).unwrap().to_vec()
    }

    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.io.write_all(bytes).await.unwrap();
        self.io.flush().await.unwrap();
    }
}

/// Connects a client to a fresh mock server over an in-memory pipe.
pub fn pair(config: ClientConfig) -> (Arc<Connection>, MockServer) {
    let (client_io, server_io) = tokio::io::duplex(64 * 1024);
    let mode = config.wire_mode;
    let conn = Connection::from_stream(client_io, "mock", config);
    (conn, MockServer::new(server_io, mode))
}

/// Polls until `cond` holds or a second passes.
pub async fn eventually(mut cond: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}
