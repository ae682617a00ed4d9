//! Byte-level transport for the control connection.
//!
//! The stream is split in two: the read half is drained by the connection's
//! dispatch task, and the write half is owned by a dedicated writer task that
//! receives whole encoded messages over a channel. A message is therefore
//! always written in full or not at all, even if the caller that queued it
//! goes away mid-send.

use crate::config::ClientConfig;
use crate::error::ClientError;
use bytes::Bytes;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// An established stream, not yet split.
pub struct Transport {
    reader: BoxedReader,
    writer: BoxedWriter,
    peer: String,
}

impl Transport {
    /// Opens a TCP connection to the configured control endpoint.
    pub async fn connect(config: &ClientConfig) -> Result<Self, ClientError> {
        let addr = config.address();
        tracing::debug!("Connecting to {}...", addr);

        let stream = tokio::time::timeout(
            config.connect_timeout(),
            TcpStream::connect((config.host.as_str(), config.control_port)),
        )
        .await
        .map_err(|_| {
            tracing::debug!("Connection to {} timed out", addr);
            ClientError::ConnectTimeout {
                addr: addr.clone(),
                elapsed: config.connect_timeout(),
            }
        })?
        .map_err(|source| {
            tracing::debug!("Connection to {} failed: {}", addr, source);
            ClientError::Connect {
                addr: addr.clone(),
                source,
            }
        })?;

        stream.set_nodelay(true).ok();
        let peer = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or(addr);

        Ok(Self::from_stream(stream, peer))
    }

    /// Adopts an already-connected stream.
    pub fn from_stream<S>(stream: S, peer: impl Into<String>) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half): (ReadHalf<S>, WriteHalf<S>) = tokio::io::split(stream);
        Self {
            reader: Box::new(read_half),
            writer: Box::new(write_half),
            peer: peer.into(),
        }
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Splits into an inbound byte source and a spawned writer task.
    pub fn into_split(self, read_buffer_size: usize) -> (TransportReader, TransportWriter) {
        let reader = TransportReader {
            inner: self.reader,
            buf: vec![0u8; read_buffer_size],
        };
        (reader, TransportWriter::spawn(self.writer))
    }
}

/// Inbound half: an order-preserving byte stream with no message boundaries.
pub struct TransportReader {
    inner: BoxedReader,
    buf: Vec<u8>,
}

impl TransportReader {
    /// Reads the next chunk. Returns `None` once the peer has closed.
    pub async fn recv(&mut self) -> io::Result<Option<&[u8]>> {
        let n = self.inner.read(&mut self.buf).await?;
        if n == 0 {
            return Ok(None);
        }
        Ok(Some(&self.buf[..n]))
    }
}

struct Outbound {
    bytes: Bytes,
    ack: oneshot::Sender<io::Result<()>>,
}

/// Outbound half: queues messages for the writer task.
///
/// Clones share the same task. The task writes out whatever is still queued
/// and shuts the stream down once every clone is dropped.
#[derive(Clone)]
pub struct TransportWriter {
    tx: mpsc::UnboundedSender<Outbound>,
}

impl TransportWriter {
    fn spawn(mut writer: BoxedWriter) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Outbound>();

        tokio::spawn(async move {
            while let Some(Outbound { bytes, ack }) = rx.recv().await {
                let result: io::Result<()> = async {
                    writer.write_all(&bytes).await?;
                    writer.flush().await
                }
                .await;

                let failed = result.is_err();
                let _ = ack.send(result);
                if failed {
                    // Stream state is unknown after a failed write; stop here.
                    break;
                }
            }
            let _ = writer.shutdown().await;
            tracing::debug!("writer task finished");
        });

        Self { tx }
    }

    /// Writes one complete message.
    ///
    /// Resolves once the bytes are flushed. Dropping the returned future does
    /// not interrupt the write.
    pub async fn send(&self, bytes: Bytes) -> io::Result<()> {
        let (ack, done) = oneshot::channel();
        self.tx
            .send(Outbound { bytes, ack })
            .map_err(|_| io::Error::new(io::ErrorKind::NotConnected, "writer closed"))?;
        done.await
            .unwrap_or_else(|_| Err(io::Error::new(io::ErrorKind::NotConnected, "writer closed")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_connect_and_exchange_bytes() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 5];
            socket.read_exact(&mut buf).await.unwrap();
            socket.write_all(b"world").await.unwrap();
            buf
        });

        let config = ClientConfig::new("127.0.0.1", port);
        let transport = Transport::connect(&config).await.unwrap();
        assert!(transport.peer().ends_with(&port.to_string()));

        let (mut reader, writer) = transport.into_split(1024);
        writer.send(Bytes::from_static(b"hello")).await.unwrap();

        let mut received = Vec::new();
        while received.len() < 5 {
            let chunk = reader.recv().await.unwrap().expect("peer closed early");
            received.extend_from_slice(chunk);
        }
        assert_eq!(received, b"world");
        assert_eq!(&server.await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn test_connect_refused() {
        // Bind then drop to get a port nobody is listening on.
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };

        let config =
            ClientConfig::new("127.0.0.1", port).with_connect_timeout(Duration::from_secs(2));
        let result = Transport::connect(&config).await;
        assert!(matches!(result, Err(ClientError::Connect { .. })));
    }

    #[tokio::test]
    async fn test_reader_reports_eof() {
        let (client, server) = tokio::io::duplex(64);
        let (mut reader, _writer) = Transport::from_stream(client, "duplex").into_split(1024);

        drop(server);
        assert!(reader.recv().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_send_after_peer_gone_fails() {
        let (client, server) = tokio::io::duplex(64);
        let (_reader, writer) = Transport::from_stream(client, "duplex").into_split(1024);

        drop(server);
        assert!(writer.send(Bytes::from_static(b"x")).await.is_err());
    }
}
