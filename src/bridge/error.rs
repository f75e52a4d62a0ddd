use colored::Colorize;
use std::fmt::{self, Display, Formatter};

/// Errors surfaced by a bridge request or by the session itself.
#[derive(Debug, Clone)]
pub struct BridgeError {
    kind: BridgeErrorKind,
}

impl BridgeError {
    /// No reader is currently connected.
    pub fn not_connected() -> Self {
        Self {
            kind: BridgeErrorKind::NotConnected,
        }
    }

    /// The request's bound elapsed before a response arrived.
    pub fn timeout() -> Self {
        Self {
            kind: BridgeErrorKind::Timeout,
        }
    }

    /// The connection was replaced or closed while the request was pending.
    pub fn cancelled() -> Self {
        Self {
            kind: BridgeErrorKind::Cancelled,
        }
    }

    /// The reader sent a frame this session could not parse, or the reader
    /// itself reported an `ERROR` message.
    pub fn protocol(detail: impl Into<String>) -> Self {
        Self {
            kind: BridgeErrorKind::Protocol(detail.into()),
        }
    }

    /// Whether this error is a [`BridgeErrorKind::Cancelled`].
    pub fn is_cancelled(&self) -> bool {
        matches!(self.kind, BridgeErrorKind::Cancelled)
    }
}

#[derive(Debug, Clone)]
enum BridgeErrorKind {
    NotConnected,
    Timeout,
    Cancelled,
    Protocol(String),
}

impl Display for BridgeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let msg = match &self.kind {
            BridgeErrorKind::NotConnected => {
                format!("{} no reader device connected", "BRIDGE:".underline())
            }
            BridgeErrorKind::Timeout => {
                format!("{} request timed out waiting for the reader", "BRIDGE:".underline())
            }
            BridgeErrorKind::Cancelled => format!(
                "{} request cancelled (connection replaced or closed)",
                "BRIDGE:".underline()
            ),
            BridgeErrorKind::Protocol(detail) => {
                format!("{} {detail}", "BRIDGE PROTOCOL ERROR:".underline())
            }
        };
        f.write_str(&msg)
    }
}

impl std::error::Error for BridgeError {}
