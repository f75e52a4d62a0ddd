//! HKDF-SHA256 derivation of the sixteen per-sector MIFARE Classic keys from
//! a tag's UID.

use hkdf::Hkdf;
use sha2::Sha256;

use crate::geometry::{KEY_A_LENGTH, NUM_SECTORS};

/// Master salt recovered from the field. Fixed across every tag generation.
const MASTER_SALT: [u8; 16] = [
    0x9A, 0x75, 0x9C, 0xF2, 0xC4, 0xF7, 0xCA, 0xFF, 0x22, 0x2C, 0xB9, 0x76, 0x9B, 0x41, 0xBC, 0x96,
];

/// HKDF info/context string, including the trailing NUL.
const INFO: &[u8] = b"RFID-A\0";

/// A single 6-byte MIFARE Classic sector key.
pub type SectorKey = [u8; KEY_A_LENGTH];

/// Derive the sixteen sector keys for a tag from its UID.
///
/// Deterministic and total: any UID length, including empty, produces a
/// well-defined set of sixteen keys.
pub fn derive_keys(uid: &[u8]) -> [SectorKey; NUM_SECTORS] {
    let hk = Hkdf::<Sha256>::new(Some(&MASTER_SALT), uid);
    let mut okm = [0u8; NUM_SECTORS * KEY_A_LENGTH];
    // NUM_SECTORS * KEY_A_LENGTH = 96 bytes, well within HKDF-SHA256's
    // 255 * 32-byte expansion limit, so this can never fail.
    hk.expand(INFO, &mut okm)
        .expect("fixed-size HKDF expansion cannot exceed SHA-256 output limit");

    let mut keys = [[0u8; KEY_A_LENGTH]; NUM_SECTORS];
    for (i, key) in keys.iter_mut().enumerate() {
        key.copy_from_slice(&okm[i * KEY_A_LENGTH..(i + 1) * KEY_A_LENGTH]);
    }
    keys
}

/// Derive sector keys from a hex-encoded UID, returning upper-case hex keys.
///
/// Accepts case-insensitive hex input via [`hex::decode`].
pub fn derive_keys_hex(uid_hex: &str) -> Result<[String; NUM_SECTORS], hex::FromHexError> {
    let uid = hex::decode(uid_hex)?;
    let keys = derive_keys(&uid);
    let mut hex_keys: [String; NUM_SECTORS] = Default::default();
    for (i, key) in keys.iter().enumerate() {
        hex_keys[i] = hex::encode_upper(key);
    }
    Ok(hex_keys)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEFAULT_KEY: SectorKey = [0xFF; 6];

    #[test]
    fn derivation_is_deterministic() {
        let uid = [0x7A, 0xD4, 0x3F, 0x1C];
        assert_eq!(derive_keys(&uid), derive_keys(&uid));
    }

    #[test]
    fn different_uids_yield_different_keys() {
        let a = derive_keys(&[0x7A, 0xD4, 0x3F, 0x1C]);
        let b = derive_keys(&[0x00, 0x11, 0x22, 0x33]);
        assert_ne!(a, b);
    }

    #[test]
    fn shape_is_sixteen_six_byte_keys() {
        let keys = derive_keys(&[0x7A, 0xD4, 0x3F, 0x1C]);
        assert_eq!(keys.len(), 16);
        for key in &keys {
            assert_eq!(key.len(), 6);
        }
    }

    #[test]
    fn default_key_never_appears_for_a_real_uid() {
        let keys = derive_keys(&[0x7A, 0xD4, 0x3F, 0x1C]);
        assert!(!keys.iter().any(|k| *k == DEFAULT_KEY));
    }

    #[test]
    fn empty_uid_still_derives_a_well_defined_key_set() {
        let keys = derive_keys(&[]);
        assert_eq!(keys.len(), 16);
        assert_eq!(keys, derive_keys(&[]));
    }

    #[test]
    fn hex_wrapper_is_case_insensitive_and_upper_cases_output() {
        let lower = derive_keys_hex("7ad43f1c").unwrap();
        let upper = derive_keys_hex("7AD43F1C").unwrap();
        assert_eq!(lower, upper);
        for key in &lower {
            assert_eq!(key, &key.to_uppercase());
        }
    }

    #[test]
    fn hex_wrapper_rejects_malformed_hex() {
        assert!(derive_keys_hex("not-hex").is_err());
    }
}
