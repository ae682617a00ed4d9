//! Protocol error types.

use thiserror::Error;

/// Errors raised while framing or decoding control-plane messages.
///
/// Any of these on the inbound stream means boundary detection can no longer
/// be trusted, so the client treats them as fatal to the connection.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid magic bytes: expected 'TRPC', got {0:?}")]
    InvalidMagic([u8; 4]),

    #[error("unsupported frame version: {0}")]
    UnsupportedVersion(u16),

    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: u32, max: u32 },

    #[error("CRC mismatch: expected {expected:#x}, got {actual:#x}")]
    CrcMismatch { expected: u32, actual: u32 },

    #[error("invalid frame flags: {0:#x}")]
    InvalidFlags(u16),

    #[error("line exceeds {max} bytes without a terminator")]
    LineTooLong { max: u32 },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid UTF-8 in payload")]
    InvalidUtf8,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_error_display() {
        let err = ProtocolError::InvalidMagic(*b"XXXX");
        assert!(err.to_string().contains("magic"));

        let err = ProtocolError::UnsupportedVersion(99);
        assert!(err.to_string().contains("99"));

        let err = ProtocolError::FrameTooLarge { size: 100, max: 50 };
        assert!(err.to_string().contains("100"));

        let err = ProtocolError::CrcMismatch {
            expected: 0xABC,
            actual: 0xDEF,
        };
        let msg = err.to_string();
        assert!(msg.contains("abc") || msg.contains("ABC"));

        let err = ProtocolError::LineTooLong { max: 64 };
        assert!(err.to_string().contains("64"));

        let err = ProtocolError::InvalidUtf8;
        assert!(err.to_string().contains("UTF-8"));

        let err = ProtocolError::InvalidFlags(0xFF);
        let msg = err.to_string();
        assert!(msg.contains("ff") || msg.contains("FF"));
    }
}
