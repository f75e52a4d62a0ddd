//! Physical layout of the 1 KiB contactless card: 16 sectors of 4 blocks of
//! 16 bytes each, with every fourth block holding the sector's keys and
//! access bits instead of filament data.

use std::fmt::{self, Display, Formatter};

/// Number of sectors on the card.
pub const NUM_SECTORS: usize = 16;
/// Blocks per sector, including the trailer.
pub const BLOCKS_PER_SECTOR: usize = 4;
/// Bytes per block.
pub const BYTES_PER_BLOCK: usize = 16;
/// Total blocks across the card (16 × 4).
pub const TOTAL_BLOCKS: usize = NUM_SECTORS * BLOCKS_PER_SECTOR;
/// Total bytes across the card (64 × 16).
pub const TOTAL_BYTES: usize = TOTAL_BLOCKS * BYTES_PER_BLOCK;

/// Width of a sector trailer's Key A field.
pub const KEY_A_LENGTH: usize = 6;
/// Width of a sector trailer's access-bits field.
pub const ACCESS_BITS_LENGTH: usize = 4;
/// Width of a sector trailer's Key B field.
pub const KEY_B_LENGTH: usize = 6;

/// The sector a block belongs to.
pub fn sector_of(block: usize) -> usize {
    block / BLOCKS_PER_SECTOR
}

/// The first block index of a sector.
pub fn first_block_of(sector: usize) -> usize {
    sector * BLOCKS_PER_SECTOR
}

/// Whether a block index is a sector trailer (every fourth block).
pub fn is_trailer(block: usize) -> bool {
    (block + 1) % BLOCKS_PER_SECTOR == 0
}

/// The trailer block index for a sector.
pub fn trailer_of(sector: usize) -> usize {
    first_block_of(sector) + BLOCKS_PER_SECTOR - 1
}

/// The three non-trailer block indices belonging to a sector.
pub fn data_blocks_of(sector: usize) -> [usize; 3] {
    let first = first_block_of(sector);
    [first, first + 1, first + 2]
}

/// Every non-trailer block index on the card, in ascending order (48 total).
pub fn all_data_blocks() -> Vec<usize> {
    (0..NUM_SECTORS).flat_map(data_blocks_of).collect()
}

/// A decoded sector trailer: Key A, access bits, and Key B.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectorTrailer {
    /// 6-byte Key A.
    pub key_a: [u8; KEY_A_LENGTH],
    /// 4-byte access-bits field.
    pub access_bits: [u8; ACCESS_BITS_LENGTH],
    /// 6-byte Key B.
    pub key_b: [u8; KEY_B_LENGTH],
}

/// Parse a 16-byte block as a sector trailer.
pub fn parse_sector_trailer(block: &[u8]) -> Result<SectorTrailer, GeometryError> {
    if block.len() != BYTES_PER_BLOCK {
        return Err(GeometryError::invalid_length(block.len()));
    }
    let mut key_a = [0u8; KEY_A_LENGTH];
    key_a.copy_from_slice(&block[0..6]);
    let mut access_bits = [0u8; ACCESS_BITS_LENGTH];
    access_bits.copy_from_slice(&block[6..10]);
    let mut key_b = [0u8; KEY_B_LENGTH];
    key_b.copy_from_slice(&block[10..16]);
    Ok(SectorTrailer {
        key_a,
        access_bits,
        key_b,
    })
}

/// Errors raised by the geometry primitives.
#[derive(Debug)]
pub struct GeometryError {
    kind: GeometryErrorKind,
}

impl GeometryError {
    /// A sector trailer was parsed from a block that was not 16 bytes long.
    pub fn invalid_length(got: usize) -> Self {
        Self {
            kind: GeometryErrorKind::InvalidLength(got),
        }
    }
}

#[derive(Debug)]
enum GeometryErrorKind {
    InvalidLength(usize),
}

impl Display for GeometryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.kind {
            GeometryErrorKind::InvalidLength(got) => {
                write!(f, "sector trailer must be {BYTES_PER_BLOCK} bytes, got {got}")
            }
        }
    }
}

impl std::error::Error for GeometryError {}
