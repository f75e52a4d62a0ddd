//! Fixtures for exercising the codec and bridge layers without real
//! hardware: a builder for synthetic 64-block images, and a mock bridge
//! transport pairing an [`mpsc`](tokio::sync::mpsc) channel with the stream
//! shape [`BridgeSession::accept`](crate::bridge::BridgeSession::accept)
//! expects.
//!
//! Built under `cfg(test)` and also exported behind the `test-support`
//! feature so adapter crates can build integration tests on the same
//! fixtures without duplicating them.

use rand::{Rng, SeedableRng};
use rand::rngs::StdRng;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::format::Block;
use crate::geometry::{BYTES_PER_BLOCK, TOTAL_BLOCKS};

/// Builder for a synthetic 64-block tag image, defaulting to all-zero
/// blocks with a settable UID and an optional pseudo-random signature
/// region (sectors 10-15's data blocks).
#[derive(Debug, Clone)]
pub struct SyntheticImageBuilder {
    uid: [u8; 4],
    filament_type: Option<String>,
    signature_seed: Option<u64>,
}

/// Start building a synthetic image.
pub fn synthetic_image_builder() -> SyntheticImageBuilder {
    SyntheticImageBuilder {
        uid: [0x7A, 0xD4, 0x3F, 0x1C],
        filament_type: None,
        signature_seed: None,
    }
}

impl SyntheticImageBuilder {
    /// Set block 0's UID bytes.
    pub fn with_uid(mut self, uid: [u8; 4]) -> Self {
        self.uid = uid;
        self
    }

    /// Set the short filament type string written to block 2.
    pub fn with_filament_type(mut self, filament_type: impl Into<String>) -> Self {
        self.filament_type = Some(filament_type.into());
        self
    }

    /// Fill the RSA signature region with a deterministic pseudo-random
    /// sequence derived from `seed`, so tests can assert it survives a
    /// rebuild untouched without depending on real signature material.
    pub fn with_pseudo_random_signature(mut self, seed: u64) -> Self {
        self.signature_seed = Some(seed);
        self
    }

    /// Produce the 64-block image.
    pub fn build(self) -> Vec<Block> {
        let mut blocks = vec![[0u8; BYTES_PER_BLOCK]; TOTAL_BLOCKS];

        blocks[0][0..4].copy_from_slice(&self.uid);

        if let Some(filament_type) = &self.filament_type {
            let bytes = filament_type.as_bytes();
            let n = bytes.len().min(BYTES_PER_BLOCK);
            blocks[2][..n].copy_from_slice(&bytes[..n]);
        }

        if let Some(seed) = self.signature_seed {
            let mut rng = StdRng::seed_from_u64(seed);
            for &index in crate::format::RSA_DATA_BLOCKS.iter() {
                rng.fill(&mut blocks[index]);
            }
        }

        for sector in 0..16 {
            let trailer = sector * 4 + 3;
            blocks[trailer][0..6].copy_from_slice(&[0xFF; 6]);
            blocks[trailer][6..10].copy_from_slice(&[0xFF, 0x07, 0x80, 0x69]);
            blocks[trailer][10..16].copy_from_slice(&[0xFF; 6]);
        }

        blocks
    }
}

/// One end of a mock reader connection: the channel the session under test
/// reads frames from, and the sender it writes outgoing frames to.
pub struct MockBridgeTransport {
    /// Feed frames into the session as if the reader sent them.
    pub from_reader: mpsc::UnboundedSender<String>,
    /// Observe frames the session sends to the reader.
    pub to_reader: mpsc::UnboundedReceiver<String>,
}

impl std::fmt::Debug for MockBridgeTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockBridgeTransport").finish_non_exhaustive()
    }
}

impl MockBridgeTransport {
    /// Build a transport pair and accept it on `session`, replacing any
    /// connection the session already had.
    pub fn accept(session: &std::sync::Arc<crate::bridge::BridgeSession>) -> Self {
        let (to_reader_tx, to_reader_rx) = mpsc::unbounded_channel();
        let (from_reader_tx, from_reader_rx) = mpsc::unbounded_channel();
        session.accept(to_reader_tx, UnboundedReceiverStream::new(from_reader_rx));
        Self {
            from_reader: from_reader_tx,
            to_reader: to_reader_rx,
        }
    }

    /// Parse the next outgoing frame's `request_id` field, panicking if one
    /// is not sent within the default bridge timeout-free test window.
    pub async fn next_request_id(&mut self) -> String {
        let frame = self.to_reader.recv().await.expect("sender dropped");
        let value: serde_json::Value = serde_json::from_str(&frame).expect("sent frame was not JSON");
        value["request_id"]
            .as_str()
            .expect("frame had no request_id")
            .to_string()
    }

    /// Send a `TAG_DATA` response for `request_id`.
    pub fn respond_tag_data(&self, request_id: &str, uid: &str, blocks: &[String]) {
        let _ = self.from_reader.send(
            serde_json::json!({
                "action": "TAG_DATA",
                "request_id": request_id,
                "uid": uid,
                "blocks": blocks,
            })
            .to_string(),
        );
    }

    /// Send a `WRITE_RESULT` response for `request_id`.
    pub fn respond_write_result(&self, request_id: &str, success: bool, error: Option<&str>) {
        let _ = self.from_reader.send(
            serde_json::json!({
                "action": "WRITE_RESULT",
                "request_id": request_id,
                "success": success,
                "error": error,
            })
            .to_string(),
        );
    }

    /// Send an `ERROR` frame, failing every currently pending request.
    pub fn respond_error(&self, message: &str) {
        let _ = self.from_reader.send(
            serde_json::json!({
                "action": "ERROR",
                "message": message,
            })
            .to_string(),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults_to_zeroed_blocks_with_a_uid() {
        let blocks = synthetic_image_builder().build();
        assert_eq!(blocks.len(), TOTAL_BLOCKS);
        assert_eq!(&blocks[0][0..4], &[0x7A, 0xD4, 0x3F, 0x1C]);
        assert_eq!(&blocks[1], &[0u8; BYTES_PER_BLOCK]);
    }

    #[test]
    fn builder_writes_filament_type_and_signature() {
        let blocks = synthetic_image_builder()
            .with_filament_type("PLA")
            .with_pseudo_random_signature(42)
            .build();
        assert!(blocks[2].starts_with(b"PLA"));
        assert!(crate::format::RSA_DATA_BLOCKS.iter().any(|&i| blocks[i] != [0u8; BYTES_PER_BLOCK]));
    }

    #[tokio::test]
    async fn mock_transport_round_trips_a_read() {
        let session = std::sync::Arc::new(crate::bridge::BridgeSession::new());
        let mut transport = MockBridgeTransport::accept(&session);

        let read = tokio::spawn({
            let session = std::sync::Arc::clone(&session);
            async move { session.read_tag().await }
        });

        let id = transport.next_request_id().await;
        transport.respond_tag_data(&id, "DEADBEEF", &["AA==".to_string()]);

        let data = read.await.unwrap().unwrap();
        assert_eq!(data.uid, "DEADBEEF");
    }
}
