//! # torctl-protocol
//!
//! Wire protocol for talking to the Tor router control plane.
//!
//! This crate provides:
//! - JSON-RPC 2.0 request/response records
//! - Binary framing with length prefix and CRC32C validation
//! - Line-delimited JSON as an alternative wire mode
//! - Stream decoder that reassembles messages across arbitrary reads

pub mod codec;
pub mod error;
pub mod frame;
pub mod message;

pub use codec::{Decoder, Encoder, WireMode};
pub use error::ProtocolError;
pub use frame::{Frame, FrameFlags, FRAME_HEADER_SIZE, MAGIC};
pub use message::{Method, Request, Response, RpcError};

/// Frame format version supported by this implementation.
pub const FRAME_VERSION: u16 = 1;

/// JSON-RPC version tag carried by every request.
pub const JSONRPC_VERSION: &str = "2.0";

/// Default port of the control-plane server.
pub const DEFAULT_CONTROL_PORT: u16 = 9077;

/// Default port for the SOCKS listener when none is configured.
pub const DEFAULT_SOCKS_PORT: u16 = 9050;

/// Maximum message payload size (16 MiB).
pub const MAX_PAYLOAD_SIZE: u32 = 16 * 1024 * 1024;
