//! Core codec and cryptographic stack for consumer 3D printer filament
//! spool RFID tags: key derivation, the block-to-field layout, transport
//! encodings for tag dumps, the bridge session to an external reader
//! device, the community dump catalog, and the cloning pipeline that
//! composes them.
#![warn(missing_debug_implementations, missing_docs, rust_2018_idioms)]

/// Process-wide settings resolved from the environment.
pub mod config;
/// Physical card layout: sectors, blocks, and trailers.
pub mod geometry;
/// HKDF-SHA256 sector key derivation from a tag UID.
pub mod kdf;
/// Mapping between a 64-block tag image and semantic filament fields.
pub mod format;
/// Encode/decode a tag image to and from its four external transports.
pub mod transport;
/// Request/response session with an external contactless-reader device.
pub mod bridge;
/// Index, search, and fetch over the community dump catalog.
pub mod catalog;
/// Composition of fetch, parse, edit, rebuild, and write into one clone.
pub mod clone;

#[cfg(any(test, feature = "test-support"))]
/// Fixtures for exercising the codec and bridge layers without hardware.
pub mod testing;

pub use config::Config;
pub use kdf::derive_keys;
