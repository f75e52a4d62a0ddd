//! Composition of already-specified operations into the end-to-end clone
//! flow: fetch a source image (live read or catalog download), parse it,
//! apply edits, rebuild, and write the result back through the bridge.
//!
//! The pipeline holds no state of its own; every dependency is an explicit
//! argument, never an ambient singleton.

mod error;

pub use error::CloneError;

use tracing::{debug, info};

use crate::bridge::{BridgeSession, WriteOutcome, WriteTagRequest};
use crate::catalog::{dump_to_blocks, TagCatalog, TagEntry};
use crate::format::{build_tag_blocks, parse_tag_dump, FilamentData};
use crate::kdf::derive_keys_hex;
use crate::transport::{decode_base64_blocks, encode_base64_blocks};

/// Where the source image for a clone comes from.
#[derive(Debug, Clone)]
pub enum CloneSource {
    /// Read the source tag live, through the bridge.
    Live,
    /// Download a known-good dump from the community catalog.
    Library(TagEntry),
}

/// Read the source image for a clone, returning the UID it was derived
/// from (the live tag's own UID, or the catalog entry's UID) and the
/// decoded 64-block image.
async fn fetch_source(
    bridge: &BridgeSession,
    catalog: &TagCatalog,
    source: &CloneSource,
) -> Result<(String, Vec<crate::format::Block>), CloneError> {
    match source {
        CloneSource::Live => {
            debug!("clone: reading source tag live");
            let tag = bridge.read_tag().await.map_err(CloneError::read)?;
            let blocks = decode_base64_blocks(&tag.blocks).map_err(CloneError::decode)?;
            Ok((tag.uid, blocks))
        }
        CloneSource::Library(entry) => {
            debug!(entry = %entry.id(), "clone: fetching source dump from catalog");
            let dump = catalog.download(entry).await.map_err(CloneError::catalog)?;
            let blocks = dump_to_blocks(&dump).map_err(CloneError::catalog)?;
            Ok((entry.uid.clone(), blocks))
        }
    }
}

/// Run the full clone pipeline: fetch, parse, edit, rebuild, write.
///
/// `edit` mutates the parsed record in place before rebuild; it runs
/// exactly once and sees the source record's retained raw blocks, so a
/// rebuild afterwards reproduces every untouched byte (clone preservation).
/// `target_uid`, when set, is both the UID written to a magic tag and the
/// UID whose derived keys authenticate the write; when absent the source
/// UID is used for key derivation and the tag's existing UID is left alone.
pub async fn clone_tag(
    bridge: &BridgeSession,
    catalog: &TagCatalog,
    source: CloneSource,
    target_uid: Option<String>,
    edit: impl FnOnce(&mut FilamentData),
) -> Result<WriteOutcome, CloneError> {
    let (source_uid, blocks) = fetch_source(bridge, catalog, &source).await?;

    debug!("clone: parsing source image");
    let mut record = parse_tag_dump(&blocks).map_err(CloneError::parse)?;

    debug!("clone: applying field edits");
    edit(&mut record);

    debug!("clone: rebuilding image");
    let new_blocks = build_tag_blocks(&record);

    let key_uid = target_uid.as_deref().unwrap_or(&source_uid);
    let keys = derive_keys_hex(key_uid).map_err(CloneError::invalid_uid)?;

    debug!(key_uid, "clone: writing rebuilt image via bridge");
    let outcome = bridge
        .write_tag(WriteTagRequest {
            keys: keys.to_vec(),
            blocks: encode_base64_blocks(&new_blocks),
            uid: target_uid,
        })
        .await
        .map_err(CloneError::write)?;

    info!(success = outcome.success, "clone: pipeline finished");
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CatalogClient;
    use crate::testing::synthetic_image_builder;
    use std::sync::Arc;
    use tokio_stream::wrappers::UnboundedReceiverStream;

    fn test_catalog() -> TagCatalog {
        let client = CatalogClient::new("https://example.invalid/tree", "https://example.invalid/raw/")
            .expect("static URLs parse");
        TagCatalog::new(client, std::env::temp_dir().join("spoolrfid-clone-test-cache"))
    }

    #[tokio::test]
    async fn clone_live_round_trip_edits_one_field_and_writes() {
        let bridge = Arc::new(BridgeSession::new());
        let (to_reader_tx, mut to_reader_rx) = tokio::sync::mpsc::unbounded_channel();
        let (from_reader_tx, from_reader_rx) = tokio::sync::mpsc::unbounded_channel();
        bridge.accept(to_reader_tx, UnboundedReceiverStream::new(from_reader_rx));

        let source_blocks = synthetic_image_builder().with_filament_type("PLA").build();
        let source_b64 = encode_base64_blocks(&source_blocks);

        let catalog = test_catalog();

        let bridge_task = {
            let bridge = Arc::clone(&bridge);
            tokio::spawn(async move {
                clone_tag(&bridge, &catalog, CloneSource::Live, None, |fd| {
                    fd.filament_type = "PETG".to_string();
                })
                .await
            })
        };

        let read_request = to_reader_rx.recv().await.unwrap();
        let read_request: serde_json::Value = serde_json::from_str(&read_request).unwrap();
        let read_id = read_request["request_id"].as_str().unwrap();
        from_reader_tx
            .send(
                serde_json::json!({
                    "action": "TAG_DATA",
                    "request_id": read_id,
                    "uid": "7AD43F1C",
                    "blocks": source_b64,
                })
                .to_string(),
            )
            .unwrap();

        let write_request = to_reader_rx.recv().await.unwrap();
        let write_request: serde_json::Value = serde_json::from_str(&write_request).unwrap();
        assert_eq!(write_request["action"], "WRITE_TAG");
        let write_id = write_request["request_id"].as_str().unwrap();
        let written_blocks = write_request["blocks"].as_array().unwrap();
        assert_eq!(written_blocks.len(), 64);

        from_reader_tx
            .send(
                serde_json::json!({
                    "action": "WRITE_RESULT",
                    "request_id": write_id,
                    "success": true,
                })
                .to_string(),
            )
            .unwrap();

        let outcome = bridge_task.await.unwrap().unwrap();
        assert!(outcome.success);
    }
}
