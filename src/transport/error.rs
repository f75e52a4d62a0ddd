use colored::Colorize;
use std::fmt::{self, Display, Formatter};

use crate::geometry::{BYTES_PER_BLOCK, TOTAL_BLOCKS};

/// Errors raised while decoding one of the four transport encodings.
#[derive(Debug)]
pub struct TransportError {
    kind: TransportErrorKind,
}

impl TransportError {
    /// The decoded byte length did not match [`crate::geometry::TOTAL_BYTES`].
    pub fn invalid_block_count(got: usize) -> Self {
        Self {
            kind: TransportErrorKind::InvalidBlockCount(got),
        }
    }

    /// A per-block string did not decode to exactly [`BYTES_PER_BLOCK`] bytes.
    pub fn invalid_block_size(index: usize, got: usize) -> Self {
        Self {
            kind: TransportErrorKind::InvalidBlockSize(index, got),
        }
    }

    /// Hex text failed to decode.
    pub fn invalid_hex(err: hex::FromHexError) -> Self {
        Self {
            kind: TransportErrorKind::InvalidHex(err),
        }
    }

    /// Base-64 text failed to decode.
    pub fn invalid_base64(err: base64::DecodeError) -> Self {
        Self {
            kind: TransportErrorKind::InvalidBase64(err),
        }
    }

    /// The forensic-dump text did not produce exactly 64 data lines, or a
    /// data line did not have the expected `Block NN: ..` shape.
    pub fn invalid_line_format(detail: String) -> Self {
        Self {
            kind: TransportErrorKind::InvalidLineFormat(detail),
        }
    }
}

#[derive(Debug)]
enum TransportErrorKind {
    InvalidBlockCount(usize),
    InvalidBlockSize(usize, usize),
    InvalidHex(hex::FromHexError),
    InvalidBase64(base64::DecodeError),
    InvalidLineFormat(String),
}

impl Display for TransportError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let msg = match &self.kind {
            TransportErrorKind::InvalidBlockCount(got) => format!(
                "{} expected {TOTAL_BLOCKS} blocks ({} bytes), got {got}",
                "INVALID BLOCK COUNT:".underline(),
                TOTAL_BLOCKS * BYTES_PER_BLOCK
            ),
            TransportErrorKind::InvalidBlockSize(index, got) => format!(
                "{} block {index} must decode to {BYTES_PER_BLOCK} bytes, got {got}",
                "INVALID BLOCK SIZE:".underline()
            ),
            TransportErrorKind::InvalidHex(err) => {
                format!("{} {err}", "INVALID HEX:".underline())
            }
            TransportErrorKind::InvalidBase64(err) => {
                format!("{} {err}", "INVALID BASE64:".underline())
            }
            TransportErrorKind::InvalidLineFormat(detail) => {
                format!("{} {detail}", "INVALID FORENSIC DUMP:".underline())
            }
        };
        f.write_str(&msg)
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.kind {
            TransportErrorKind::InvalidHex(err) => Some(err),
            TransportErrorKind::InvalidBase64(err) => Some(err),
            _ => None,
        }
    }
}
