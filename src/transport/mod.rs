//! Encode/decode a 64-block tag image to and from the four external
//! transports the rest of the system exchanges dumps in: raw binary, hex
//! text, per-block base64/hex arrays, and line-oriented forensic dumps.
//!
//! Every decoder converges on the same `64 × 16` validation; encoders are
//! pure functions of the block array and never consult [`crate::format::FilamentData`].

mod error;

pub use error::TransportError;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

use crate::format::Block;
use crate::geometry::{BYTES_PER_BLOCK, TOTAL_BLOCKS, TOTAL_BYTES};

fn blocks_from_bytes(data: &[u8]) -> Result<Vec<Block>, TransportError> {
    if data.len() != TOTAL_BYTES {
        return Err(TransportError::invalid_block_count(data.len() / BYTES_PER_BLOCK));
    }
    Ok(data
        .chunks_exact(BYTES_PER_BLOCK)
        .map(|chunk| {
            let mut block = [0u8; BYTES_PER_BLOCK];
            block.copy_from_slice(chunk);
            block
        })
        .collect())
}

/// Concatenate the 64 blocks into a 1024-byte image.
pub fn encode_binary(blocks: &[Block]) -> Vec<u8> {
    blocks.concat()
}

/// Decode a raw 1024-byte binary dump into 64 blocks.
pub fn decode_binary(data: &[u8]) -> Result<Vec<Block>, TransportError> {
    blocks_from_bytes(data)
}

/// Encode the image as upper-case hex text (2048 characters).
pub fn encode_hex(blocks: &[Block]) -> String {
    hex::encode_upper(encode_binary(blocks))
}

/// Decode hex text into 64 blocks. Whitespace and CRLF are stripped before
/// decoding; case is not significant.
pub fn decode_hex(text: &str) -> Result<Vec<Block>, TransportError> {
    let clean: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    let data = hex::decode(clean).map_err(TransportError::invalid_hex)?;
    blocks_from_bytes(&data)
}

/// Encode the image as 64 base64 strings, one per block.
pub fn encode_base64_blocks(blocks: &[Block]) -> Vec<String> {
    blocks.iter().map(|b| BASE64.encode(b)).collect()
}

/// Decode a list of exactly 64 base64 block strings.
pub fn decode_base64_blocks(strings: &[impl AsRef<str>]) -> Result<Vec<Block>, TransportError> {
    if strings.len() != TOTAL_BLOCKS {
        return Err(TransportError::invalid_block_count(strings.len()));
    }
    decode_block_strings(strings, |s| {
        BASE64.decode(s).map_err(TransportError::invalid_base64)
    })
}

/// Encode the image as 64 hex strings, one per block.
pub fn encode_hex_blocks(blocks: &[Block]) -> Vec<String> {
    blocks.iter().map(hex::encode_upper).collect()
}

/// Decode a list of exactly 64 hex block strings.
pub fn decode_hex_blocks(strings: &[impl AsRef<str>]) -> Result<Vec<Block>, TransportError> {
    if strings.len() != TOTAL_BLOCKS {
        return Err(TransportError::invalid_block_count(strings.len()));
    }
    decode_block_strings(strings, |s| hex::decode(s).map_err(TransportError::invalid_hex))
}

fn decode_block_strings(
    strings: &[impl AsRef<str>],
    decode_one: impl Fn(&str) -> Result<Vec<u8>, TransportError>,
) -> Result<Vec<Block>, TransportError> {
    let mut blocks = Vec::with_capacity(TOTAL_BLOCKS);
    for (i, s) in strings.iter().enumerate() {
        let bytes = decode_one(s.as_ref())?;
        if bytes.len() != BYTES_PER_BLOCK {
            return Err(TransportError::invalid_block_size(i, bytes.len()));
        }
        let mut block = [0u8; BYTES_PER_BLOCK];
        block.copy_from_slice(&bytes);
        blocks.push(block);
    }
    Ok(blocks)
}

/// Build a line-oriented forensic dump: one `Block NN: HH HH … HH` line per
/// block, in ascending order.
pub fn encode_forensic_dump(blocks: &[Block]) -> String {
    blocks
        .iter()
        .enumerate()
        .map(|(i, block)| {
            let hex_bytes = block
                .iter()
                .map(|b| format!("{b:02X}"))
                .collect::<Vec<_>>()
                .join(" ");
            format!("Block {i:02}: {hex_bytes}")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Parse a forensic dump. Blank lines and lines starting with `#` are
/// ignored; the remaining lines must number exactly 64, each carrying 16
/// space-separated hex bytes after an optional `Block NN:` prefix.
pub fn decode_forensic_dump(text: &str) -> Result<Vec<Block>, TransportError> {
    let mut blocks = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let hex_part = match line.split_once(':') {
            Some((_, rest)) => rest.trim(),
            None => line,
        };
        let hex_clean: String = hex_part.chars().filter(|c| !c.is_whitespace()).collect();
        if hex_clean.len() != BYTES_PER_BLOCK * 2 {
            return Err(TransportError::invalid_line_format(format!(
                "line {:?} does not carry {BYTES_PER_BLOCK} hex bytes",
                line
            )));
        }
        let bytes = hex::decode(&hex_clean).map_err(TransportError::invalid_hex)?;
        let mut block = [0u8; BYTES_PER_BLOCK];
        block.copy_from_slice(&bytes);
        blocks.push(block);
    }

    if blocks.len() != TOTAL_BLOCKS {
        return Err(TransportError::invalid_block_count(blocks.len()));
    }
    Ok(blocks)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_image() -> Vec<Block> {
        (0..TOTAL_BLOCKS)
            .map(|i| {
                let mut block = [0u8; BYTES_PER_BLOCK];
                block[0] = i as u8;
                block
            })
            .collect()
    }

    #[test]
    fn binary_round_trips() {
        let blocks = sample_image();
        let data = encode_binary(&blocks);
        assert_eq!(data.len(), TOTAL_BYTES);
        assert_eq!(decode_binary(&data).unwrap(), blocks);
    }

    #[test]
    fn hex_round_trips_and_tolerates_whitespace() {
        let blocks = sample_image();
        let hex_text = encode_hex(&blocks);
        assert_eq!(decode_hex(&hex_text).unwrap(), blocks);

        let spaced = format!(" {}\r\n{} ", &hex_text[..10], &hex_text[10..]);
        assert_eq!(decode_hex(&spaced).unwrap(), blocks);
        assert_eq!(decode_hex(&hex_text.to_lowercase()).unwrap(), blocks);
    }

    #[test]
    fn base64_blocks_round_trip() {
        let blocks = sample_image();
        let encoded = encode_base64_blocks(&blocks);
        assert_eq!(encoded.len(), TOTAL_BLOCKS);
        assert_eq!(decode_base64_blocks(&encoded).unwrap(), blocks);
    }

    #[test]
    fn hex_blocks_round_trip() {
        let blocks = sample_image();
        let encoded = encode_hex_blocks(&blocks);
        assert_eq!(decode_hex_blocks(&encoded).unwrap(), blocks);
    }

    #[test]
    fn s5_forensic_dump_decodes_and_tolerates_comments() {
        let mut blocks = vec![[0u8; BYTES_PER_BLOCK]; TOTAL_BLOCKS];
        blocks[0] = [
            0xDE, 0xAD, 0xBE, 0xEF, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
        ];
        let mut dump = encode_forensic_dump(&blocks);
        dump = format!("# captured with a handheld reader\n{dump}\n\n");

        let decoded = decode_forensic_dump(&dump).unwrap();
        assert_eq!(decoded, blocks);
        assert_eq!(&decoded[0][0..4], &[0xDE, 0xAD, 0xBE, 0xEF]);
    }

    #[test]
    fn forensic_dump_rejects_wrong_line_count() {
        let text = "Block 00: 00 00 00 00 00 00 00 00 00 00 00 00 00 00 00 00";
        assert!(decode_forensic_dump(text).is_err());
    }

    #[test]
    fn decoders_reject_malformed_input() {
        assert!(decode_hex("not hex at all").is_err());
        assert!(decode_base64_blocks(&["!!!not base64"]).is_err());
        assert!(decode_binary(&[0u8; 10]).is_err());
    }
}
