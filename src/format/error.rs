use colored::Colorize;
use std::fmt::{self, Display, Formatter};

use crate::geometry::{BYTES_PER_BLOCK, TOTAL_BLOCKS};

/// Errors raised while parsing or building a tag image.
#[derive(Debug)]
pub struct FormatError {
    kind: FormatErrorKind,
}

impl FormatError {
    /// The block array did not contain exactly [`TOTAL_BLOCKS`] entries.
    pub fn invalid_block_count(got: usize) -> Self {
        Self {
            kind: FormatErrorKind::InvalidBlockCount(got),
        }
    }

    /// A block was not exactly [`BYTES_PER_BLOCK`] bytes.
    pub fn invalid_block_size(index: usize, got: usize) -> Self {
        Self {
            kind: FormatErrorKind::InvalidBlockSize(index, got),
        }
    }
}

#[derive(Debug)]
enum FormatErrorKind {
    InvalidBlockCount(usize),
    InvalidBlockSize(usize, usize),
}

impl Display for FormatError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let msg = match &self.kind {
            FormatErrorKind::InvalidBlockCount(got) => format!(
                "{} expected {TOTAL_BLOCKS} blocks, got {got}",
                "INVALID BLOCK COUNT:".underline()
            ),
            FormatErrorKind::InvalidBlockSize(index, got) => format!(
                "{} block {index} must be {BYTES_PER_BLOCK} bytes, got {got}",
                "INVALID BLOCK SIZE:".underline()
            ),
        };
        f.write_str(&msg)
    }
}

impl std::error::Error for FormatError {}
