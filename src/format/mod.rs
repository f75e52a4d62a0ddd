//! Structural mapping between a 64-block tag image and the semantic
//! [`FilamentData`] fields it encodes.

mod error;

pub use error::FormatError;

use std::sync::Arc;

use crate::geometry::{BYTES_PER_BLOCK, TOTAL_BLOCKS};

/// One 16-byte physical block.
pub type Block = [u8; BYTES_PER_BLOCK];

/// Sector-3 data blocks used for the RSA-2048 signature, in block order.
/// Six sectors (10-15) × 3 data blocks each = 18 blocks × 16 bytes = 288
/// bytes of which only the first 256 carry signature material.
pub(crate) const RSA_DATA_BLOCKS: [usize; 18] = [
    40, 41, 42, 44, 45, 46, 48, 49, 50, 52, 53, 54, 56, 57, 58, 60, 61, 62,
];

/// RSA-2048 signatures are exactly 256 bytes.
const RSA_SIGNATURE_LEN: usize = 256;

/// Decoded filament data from a tag image.
///
/// Carries its own source blocks (when parsed from one) so a later
/// [`build`] reproduces every untouched byte bit-exactly.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilamentData {
    /// Block 0, bytes 0-3.
    pub uid: Vec<u8>,
    /// Block 0, bytes 4-15.
    pub manufacturer_data: Vec<u8>,
    /// Block 1, bytes 0-7.
    pub material_variant_id: String,
    /// Block 1, bytes 8-15.
    pub material_id: String,
    /// Block 2, bytes 0-15.
    pub filament_type: String,
    /// Block 4, bytes 0-15.
    pub detailed_filament_type: String,
    /// Block 5, bytes 0-3 (R, G, B, A).
    pub color_rgba: [u8; 4],
    /// Block 5, bytes 4-5.
    pub spool_weight_g: u16,
    /// Block 5, bytes 8-11.
    pub filament_diameter_mm: f32,
    /// Block 6, bytes 0-1.
    pub drying_temp_c: u16,
    /// Block 6, bytes 2-3.
    pub drying_time_h: u16,
    /// Block 6, bytes 4-5.
    pub bed_temp_type: u16,
    /// Block 6, bytes 6-7.
    pub bed_temp_c: u16,
    /// Block 6, bytes 8-9.
    pub max_hotend_temp_c: u16,
    /// Block 6, bytes 10-11.
    pub min_hotend_temp_c: u16,
    /// Block 8, bytes 0-11.
    pub xcam_info: Vec<u8>,
    /// Block 8, bytes 12-15.
    pub nozzle_diameter_mm: f32,
    /// Block 9, bytes 0-15.
    pub tray_uid: String,
    /// Block 10, bytes 4-5, stored on the card as mm × 100.
    pub spool_width_mm: f32,
    /// Block 12, bytes 0-15.
    pub production_datetime: String,
    /// Block 13, bytes 0-15.
    pub short_production_datetime: String,
    /// Block 14, bytes 4-5.
    pub filament_length_m: u16,
    /// Block 16, bytes 0-1. `0` = single colour, `2` = dual.
    pub color_format: u16,
    /// Block 16, bytes 2-3.
    pub color_count: u16,
    /// Block 16, bytes 4-7, verbatim ABGR order as found on the card.
    pub secondary_color_abgr: [u8; 4],
    /// The 256-byte RSA-2048 signature assembled from sectors 10-15.
    pub rsa_signature: Vec<u8>,
    /// The 64 blocks this record was parsed from, if any. `build` starts
    /// from these bytes rather than from zero so that cloning preserves
    /// every field this crate does not model.
    pub raw_blocks: Option<Arc<Vec<Block>>>,
}

/// Read a NUL-terminated ASCII string, stripping trailing whitespace.
/// Never fails: non-ASCII bytes decode to the UTF-8 replacement character.
fn read_ascii(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).trim_end().to_string()
}

/// Encode a string as NUL-padded ASCII, truncated to `width` bytes.
fn write_ascii(s: &str, width: usize) -> Vec<u8> {
    let mut out = vec![0u8; width];
    let bytes = s.as_bytes();
    let n = bytes.len().min(width);
    out[..n].copy_from_slice(&bytes[..n]);
    out
}

fn read_u16_le(bytes: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([bytes[offset], bytes[offset + 1]])
}

fn read_f32_le(bytes: &[u8], offset: usize) -> f32 {
    f32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

/// Parse a complete tag image into a [`FilamentData`] record.
///
/// `blocks` must contain exactly [`crate::geometry::TOTAL_BLOCKS`] entries,
/// each exactly [`BYTES_PER_BLOCK`] bytes; any other byte values are
/// accepted and simply retained.
pub fn parse_tag_dump(blocks: &[impl AsRef<[u8]>]) -> Result<FilamentData, FormatError> {
    if blocks.len() != TOTAL_BLOCKS {
        return Err(FormatError::invalid_block_count(blocks.len()));
    }
    let mut raw: Vec<Block> = Vec::with_capacity(TOTAL_BLOCKS);
    for (i, b) in blocks.iter().enumerate() {
        let b = b.as_ref();
        if b.len() != BYTES_PER_BLOCK {
            return Err(FormatError::invalid_block_size(i, b.len()));
        }
        let mut block = [0u8; BYTES_PER_BLOCK];
        block.copy_from_slice(b);
        raw.push(block);
    }

    let mut fd = FilamentData {
        uid: raw[0][0..4].to_vec(),
        manufacturer_data: raw[0][4..16].to_vec(),
        material_variant_id: read_ascii(&raw[1][0..8]),
        material_id: read_ascii(&raw[1][8..16]),
        filament_type: read_ascii(&raw[2]),
        detailed_filament_type: read_ascii(&raw[4]),
        color_rgba: [raw[5][0], raw[5][1], raw[5][2], raw[5][3]],
        spool_weight_g: read_u16_le(&raw[5], 4),
        filament_diameter_mm: read_f32_le(&raw[5], 8),
        drying_temp_c: read_u16_le(&raw[6], 0),
        drying_time_h: read_u16_le(&raw[6], 2),
        bed_temp_type: read_u16_le(&raw[6], 4),
        bed_temp_c: read_u16_le(&raw[6], 6),
        max_hotend_temp_c: read_u16_le(&raw[6], 8),
        min_hotend_temp_c: read_u16_le(&raw[6], 10),
        xcam_info: raw[8][0..12].to_vec(),
        nozzle_diameter_mm: read_f32_le(&raw[8], 12),
        tray_uid: read_ascii(&raw[9]),
        spool_width_mm: read_u16_le(&raw[10], 4) as f32 / 100.0,
        production_datetime: read_ascii(&raw[12]),
        short_production_datetime: read_ascii(&raw[13]),
        filament_length_m: read_u16_le(&raw[14], 4),
        color_format: read_u16_le(&raw[16], 0),
        color_count: read_u16_le(&raw[16], 2),
        secondary_color_abgr: [0; 4],
        rsa_signature: Vec::with_capacity(RSA_SIGNATURE_LEN),
        raw_blocks: None,
    };

    if fd.color_format == 2 {
        fd.secondary_color_abgr
            .copy_from_slice(&raw[16][4..8]);
    }

    let mut sig = Vec::with_capacity(RSA_DATA_BLOCKS.len() * BYTES_PER_BLOCK);
    for &blk in &RSA_DATA_BLOCKS {
        sig.extend_from_slice(&raw[blk]);
    }
    sig.truncate(RSA_SIGNATURE_LEN);
    fd.rsa_signature = sig;

    fd.raw_blocks = Some(Arc::new(raw));
    Ok(fd)
}

/// Build a complete 64-block tag image from a [`FilamentData`] record.
///
/// When `fd.raw_blocks` holds a full image, that image is the starting
/// point and only the byte ranges of fields on `fd` are overwritten — every
/// other byte, including the signature region and any vendor bytes this
/// crate does not model, survives unchanged. Otherwise the image starts
/// from sixty-four zeroed blocks. Sector trailers are never written here;
/// the reader device regenerates them from the derived keys during a write.
pub fn build_tag_blocks(fd: &FilamentData) -> Vec<Block> {
    let mut blocks: Vec<Block> = match &fd.raw_blocks {
        Some(raw) if raw.len() == TOTAL_BLOCKS => raw.as_ref().clone(),
        _ => vec![[0u8; BYTES_PER_BLOCK]; TOTAL_BLOCKS],
    };

    if !fd.uid.is_empty() {
        blocks[0][0..4].copy_from_slice(&write_ascii_bytes(&fd.uid, 4));
    }
    if !fd.manufacturer_data.is_empty() {
        blocks[0][4..16].copy_from_slice(&write_ascii_bytes(&fd.manufacturer_data, 12));
    }

    blocks[1][0..8].copy_from_slice(&write_ascii(&fd.material_variant_id, 8));
    blocks[1][8..16].copy_from_slice(&write_ascii(&fd.material_id, 8));

    blocks[2].copy_from_slice(&write_ascii(&fd.filament_type, 16));

    blocks[4].copy_from_slice(&write_ascii(&fd.detailed_filament_type, 16));

    blocks[5][0..4].copy_from_slice(&fd.color_rgba);
    blocks[5][4..6].copy_from_slice(&fd.spool_weight_g.to_le_bytes());
    blocks[5][8..12].copy_from_slice(&fd.filament_diameter_mm.to_le_bytes());

    blocks[6][0..2].copy_from_slice(&fd.drying_temp_c.to_le_bytes());
    blocks[6][2..4].copy_from_slice(&fd.drying_time_h.to_le_bytes());
    blocks[6][4..6].copy_from_slice(&fd.bed_temp_type.to_le_bytes());
    blocks[6][6..8].copy_from_slice(&fd.bed_temp_c.to_le_bytes());
    blocks[6][8..10].copy_from_slice(&fd.max_hotend_temp_c.to_le_bytes());
    blocks[6][10..12].copy_from_slice(&fd.min_hotend_temp_c.to_le_bytes());

    if !fd.xcam_info.is_empty() {
        blocks[8][0..12].copy_from_slice(&write_ascii_bytes(&fd.xcam_info, 12));
    }
    blocks[8][12..16].copy_from_slice(&fd.nozzle_diameter_mm.to_le_bytes());

    blocks[9].copy_from_slice(&write_ascii(&fd.tray_uid, 16));

    let raw_width = (fd.spool_width_mm * 100.0).round() as u16;
    blocks[10][4..6].copy_from_slice(&raw_width.to_le_bytes());

    blocks[12].copy_from_slice(&write_ascii(&fd.production_datetime, 16));
    blocks[13].copy_from_slice(&write_ascii(&fd.short_production_datetime, 16));

    blocks[14][4..6].copy_from_slice(&fd.filament_length_m.to_le_bytes());

    blocks[16][0..2].copy_from_slice(&fd.color_format.to_le_bytes());
    blocks[16][2..4].copy_from_slice(&fd.color_count.to_le_bytes());
    if fd.color_format == 2 {
        blocks[16][4..8].copy_from_slice(&fd.secondary_color_abgr);
    }

    if !fd.rsa_signature.is_empty() {
        let mut sig = fd.rsa_signature.clone();
        sig.resize(RSA_SIGNATURE_LEN, 0);
        for (i, &blk) in RSA_DATA_BLOCKS.iter().enumerate() {
            let chunk = &sig[i * BYTES_PER_BLOCK..(i + 1) * BYTES_PER_BLOCK];
            blocks[blk].copy_from_slice(chunk);
        }
    }

    blocks
}

/// Copy raw bytes (not ASCII text) into a fixed-width, zero-padded field.
fn write_ascii_bytes(bytes: &[u8], width: usize) -> Vec<u8> {
    let mut out = vec![0u8; width];
    let n = bytes.len().min(width);
    out[..n].copy_from_slice(&bytes[..n]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zero_image() -> Vec<Block> {
        vec![[0u8; BYTES_PER_BLOCK]; TOTAL_BLOCKS]
    }

    fn ascii_block(s: &str) -> Block {
        let mut b = [0u8; 16];
        let bytes = s.as_bytes();
        b[..bytes.len().min(16)].copy_from_slice(&bytes[..bytes.len().min(16)]);
        b
    }

    #[test]
    fn rejects_wrong_block_count() {
        let blocks: Vec<Block> = vec![[0u8; 16]; 10];
        assert!(parse_tag_dump(&blocks).is_err());
    }

    #[test]
    fn rejects_wrong_block_size() {
        let mut blocks: Vec<Vec<u8>> = (0..TOTAL_BLOCKS).map(|_| vec![0u8; 16]).collect();
        blocks[5] = vec![0u8; 4];
        assert!(parse_tag_dump(&blocks).is_err());
    }

    #[test]
    fn s2_parses_synthetic_image() {
        let mut blocks = zero_image();
        blocks[1] = ascii_block("A50-K0\0\0GFA00\0\0\0");
        blocks[2] = ascii_block("PLA");
        blocks[4] = ascii_block("PLA Basic");
        blocks[5][0..4].copy_from_slice(&[0xFF, 0xFF, 0xFF, 0xFF]);
        blocks[5][4..6].copy_from_slice(&1000u16.to_le_bytes());
        blocks[5][8..12].copy_from_slice(&1.75f32.to_le_bytes());

        let fd = parse_tag_dump(&blocks).unwrap();
        assert_eq!(fd.material_variant_id, "A50-K0");
        assert_eq!(fd.material_id, "GFA00");
        assert_eq!(fd.filament_type, "PLA");
        assert_eq!(fd.detailed_filament_type, "PLA Basic");
        assert_eq!(fd.color_rgba, [0xFF, 0xFF, 0xFF, 0xFF]);
        assert_eq!(fd.spool_weight_g, 1000);
        assert!((fd.filament_diameter_mm - 1.75).abs() < 1e-2);
    }

    #[test]
    fn build_always_returns_64_blocks_of_16_bytes() {
        let fd = FilamentData::default();
        let blocks = build_tag_blocks(&fd);
        assert_eq!(blocks.len(), TOTAL_BLOCKS);
        for b in &blocks {
            assert_eq!(b.len(), BYTES_PER_BLOCK);
        }
    }

    #[test]
    fn s3_round_trip_preserves_fields() {
        let mut blocks = zero_image();
        blocks[1] = ascii_block("A50-K0\0\0GFA00\0\0\0");
        blocks[2] = ascii_block("PLA");
        blocks[4] = ascii_block("PLA Basic");
        blocks[5][8..12].copy_from_slice(&1.75f32.to_le_bytes());

        let fd1 = parse_tag_dump(&blocks).unwrap();
        let rebuilt = build_tag_blocks(&fd1);
        let fd2 = parse_tag_dump(&rebuilt).unwrap();
        assert_eq!(fd1.material_variant_id, fd2.material_variant_id);
        assert_eq!(fd1.material_id, fd2.material_id);
        assert_eq!(fd1.filament_type, fd2.filament_type);
        assert_eq!(fd1.detailed_filament_type, fd2.detailed_filament_type);
        assert!((fd1.filament_diameter_mm - fd2.filament_diameter_mm).abs() < 1e-2);
    }

    #[test]
    fn round_trip_is_byte_exact_outside_trailers() {
        let mut blocks = zero_image();
        blocks[2] = ascii_block("PETG");
        let fd = parse_tag_dump(&blocks).unwrap();
        let rebuilt = build_tag_blocks(&fd);
        for (i, (orig, new)) in blocks.iter().zip(rebuilt.iter()).enumerate() {
            if crate::geometry::is_trailer(i) {
                continue;
            }
            assert_eq!(orig, new, "block {i} changed");
        }
    }

    #[test]
    fn s4_clone_edit_preserves_signature_region() {
        let mut blocks = zero_image();
        blocks[2] = ascii_block("PLA");
        // Pseudo-random signature bytes.
        for &blk in &RSA_DATA_BLOCKS {
            for (j, byte) in blocks[blk].iter_mut().enumerate() {
                *byte = ((blk * 31 + j * 7) % 256) as u8;
            }
        }

        let mut fd = parse_tag_dump(&blocks).unwrap();
        fd.filament_type = "PETG".to_string();
        let rebuilt = build_tag_blocks(&fd);

        for (i, (orig, new)) in blocks.iter().zip(rebuilt.iter()).enumerate() {
            if i == 2 {
                assert_ne!(orig, new);
            } else {
                assert_eq!(orig, new, "unexpected change in block {i}");
            }
        }
    }

    #[test]
    fn secondary_color_only_written_when_dual() {
        let mut fd = FilamentData::default();
        fd.color_format = 0;
        fd.secondary_color_abgr = [1, 2, 3, 4];
        let blocks = build_tag_blocks(&fd);
        assert_eq!(&blocks[16][4..8], &[0, 0, 0, 0]);

        fd.color_format = 2;
        let blocks = build_tag_blocks(&fd);
        assert_eq!(&blocks[16][4..8], &[1, 2, 3, 4]);
    }

    #[test]
    fn malformed_ascii_bytes_never_error() {
        let mut blocks = zero_image();
        blocks[2] = [0xFF; 16];
        let fd = parse_tag_dump(&blocks).unwrap();
        assert!(!fd.filament_type.is_empty());
    }
}
