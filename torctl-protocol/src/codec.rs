//! Encoder and decoder for control-plane messages.
//!
//! The decoder is fed raw bytes as they arrive and hands back complete
//! messages one at a time, so a read may carry half a message or several.

use crate::error::ProtocolError;
use crate::frame::Frame;
use crate::message::{Request, Response};
use crate::MAX_PAYLOAD_SIZE;
use bytes::{Bytes, BytesMut};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How messages are delimited on the stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireMode {
    /// Length-prefixed binary frames with CRC32C.
    #[default]
    Framed,
    /// One JSON record per `\n`-terminated line.
    Jsonl,
}

impl FromStr for WireMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "framed" | "frame" | "binary" => Ok(WireMode::Framed),
            "jsonl" | "lines" | "ndjson" => Ok(WireMode::Jsonl),
            other => Err(format!("unknown wire mode '{other}'")),
        }
    }
}

impl fmt::Display for WireMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireMode::Framed => f.write_str("framed"),
            WireMode::Jsonl => f.write_str("jsonl"),
        }
    }
}

/// Encodes messages for the wire.
pub struct Encoder;

impl Encoder {
    /// Encodes a request.
    pub fn encode_request(request: &Request, mode: WireMode) -> Result<Bytes, ProtocolError> {
        Self::encode_json(request, mode)
    }

    /// Encodes a response.
    pub fn encode_response(response: &Response, mode: WireMode) -> Result<Bytes, ProtocolError> {
        Self::encode_json(response, mode)
    }

    /// Encodes any JSON-serializable value.
    pub fn encode_json<T: Serialize>(value: &T, mode: WireMode) -> Result<Bytes, ProtocolError> {
        match mode {
            WireMode::Framed => Ok(Frame::from_json(value)?.encode()?.freeze()),
            WireMode::Jsonl => {
                let mut bytes = serde_json::to_vec(value)?;
                if bytes.len() > MAX_PAYLOAD_SIZE as usize {
                    return Err(ProtocolError::FrameTooLarge {
                        size: u32::try_from(bytes.len()).unwrap_or(u32::MAX),
                        max: MAX_PAYLOAD_SIZE,
                    });
                }
                bytes.push(b'\n');
                Ok(Bytes::from(bytes))
            }
        }
    }
}

/// Reassembles messages from a byte stream.
pub struct Decoder {
    mode: WireMode,
    buffer: BytesMut,
    /// Bytes of `buffer` already searched for a line terminator.
    scanned: usize,
}

impl Decoder {
    pub fn new(mode: WireMode) -> Self {
        Self {
            mode,
            buffer: BytesMut::with_capacity(8192),
            scanned: 0,
        }
    }

    pub fn mode(&self) -> WireMode {
        self.mode
    }

    /// Appends data to the internal buffer.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Attempts to decode the next response from the buffer.
    pub fn decode_response(&mut self) -> Result<Option<Response>, ProtocolError> {
        self.decode()
    }

    /// Attempts to decode the next request from the buffer.
    pub fn decode_request(&mut self) -> Result<Option<Request>, ProtocolError> {
        self.decode()
    }

    /// Attempts to decode the next message of type `T` from the buffer.
    pub fn decode<T: DeserializeOwned>(&mut self) -> Result<Option<T>, ProtocolError> {
        match self.next_payload()? {
            Some(payload) => {
                let text = std::str::from_utf8(&payload).map_err(|_| ProtocolError::InvalidUtf8)?;
                Ok(Some(serde_json::from_str(text)?))
            }
            None => Ok(None),
        }
    }

    /// Returns the number of bytes currently buffered.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Clears the internal buffer.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.scanned = 0;
    }

    fn next_payload(&mut self) -> Result<Option<Bytes>, ProtocolError> {
        match self.mode {
            WireMode::Framed => Ok(Frame::decode(&mut self.buffer)?.map(|frame| frame.payload)),
            WireMode::Jsonl => self.next_line(),
        }
    }

    fn next_line(&mut self) -> Result<Option<Bytes>, ProtocolError> {
        loop {
            let Some(offset) = self.buffer[self.scanned..].iter().position(|&b| b == b'\n') else {
                self.scanned = self.buffer.len();
                if self.buffer.len() > MAX_PAYLOAD_SIZE as usize {
                    return Err(ProtocolError::LineTooLong {
                        max: MAX_PAYLOAD_SIZE,
                    });
                }
                return Ok(None);
            };

            let end = self.scanned + offset;
            if end > MAX_PAYLOAD_SIZE as usize {
                return Err(ProtocolError::LineTooLong {
                    max: MAX_PAYLOAD_SIZE,
                });
            }
            let mut line = self.buffer.split_to(end + 1).freeze();
            self.scanned = 0;

            line.truncate(end);
            if line.last() == Some(&b'\r') {
                line.truncate(end - 1);
            }
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            return Ok(Some(line));
        }
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new(WireMode::default())
    }
}
