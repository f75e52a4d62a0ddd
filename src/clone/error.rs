use colored::Colorize;
use std::fmt::{self, Display, Formatter};

use crate::bridge::BridgeError;
use crate::catalog::CatalogError;
use crate::format::FormatError;
use crate::transport::TransportError;

/// Error from the cloning pipeline, tagged with the stage that failed so
/// callers can tell a source-read failure from a write failure.
#[derive(Debug)]
pub struct CloneError {
    kind: CloneErrorKind,
}

impl CloneError {
    /// Reading the source tag over the bridge failed.
    pub fn read(err: BridgeError) -> Self {
        Self {
            kind: CloneErrorKind::Read(err),
        }
    }

    /// Fetching or decoding the source dump from the catalog failed.
    pub fn catalog(err: CatalogError) -> Self {
        Self {
            kind: CloneErrorKind::Catalog(err),
        }
    }

    /// The source image's transport encoding did not decode.
    pub fn decode(err: TransportError) -> Self {
        Self {
            kind: CloneErrorKind::Decode(err),
        }
    }

    /// The source image did not parse into a filament record.
    pub fn parse(err: FormatError) -> Self {
        Self {
            kind: CloneErrorKind::Parse(err),
        }
    }

    /// The target UID was not valid hex.
    pub fn invalid_uid(err: hex::FromHexError) -> Self {
        Self {
            kind: CloneErrorKind::InvalidUid(err),
        }
    }

    /// Writing the rebuilt image back over the bridge failed.
    pub fn write(err: BridgeError) -> Self {
        Self {
            kind: CloneErrorKind::Write(err),
        }
    }
}

#[derive(Debug)]
enum CloneErrorKind {
    Read(BridgeError),
    Catalog(CatalogError),
    Decode(TransportError),
    Parse(FormatError),
    InvalidUid(hex::FromHexError),
    Write(BridgeError),
}

impl Display for CloneError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let msg = match &self.kind {
            CloneErrorKind::Read(err) => {
                format!("{} {err}", "CLONE READ FAILED:".underline())
            }
            CloneErrorKind::Catalog(err) => {
                format!("{} {err}", "CLONE CATALOG FETCH FAILED:".underline())
            }
            CloneErrorKind::Decode(err) => {
                format!("{} {err}", "CLONE SOURCE DECODE FAILED:".underline())
            }
            CloneErrorKind::Parse(err) => {
                format!("{} {err}", "CLONE SOURCE PARSE FAILED:".underline())
            }
            CloneErrorKind::InvalidUid(err) => {
                format!("{} {err}", "CLONE TARGET UID INVALID:".underline())
            }
            CloneErrorKind::Write(err) => {
                format!("{} {err}", "CLONE WRITE FAILED:".underline())
            }
        };
        f.write_str(&msg)
    }
}

impl std::error::Error for CloneError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.kind {
            CloneErrorKind::Read(err) | CloneErrorKind::Write(err) => Some(err),
            CloneErrorKind::Catalog(err) => Some(err),
            CloneErrorKind::Decode(err) => Some(err),
            CloneErrorKind::Parse(err) => Some(err),
            CloneErrorKind::InvalidUid(err) => Some(err),
        }
    }
}
