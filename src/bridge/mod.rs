//! Request/response session with one external contactless-reader device,
//! connected over a long-lived bidirectional text-frame channel.
//!
//! The session is deliberately independent of the concrete transport: the
//! caller hands it an outbound sink and an inbound stream of JSON text
//! frames (a WebSocket in production, an in-memory channel in tests) and
//! the session owns correlation, timeouts, and cancellation from there.

mod error;
mod message;

pub use error::BridgeError;
pub use message::{parse_incoming, IncomingMessage, OutgoingMessage};

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::Stream;
use futures::StreamExt;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

/// Default bound for a bridge request when the caller does not specify one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

type PendingSlot<T> = oneshot::Sender<Result<T, BridgeError>>;

/// The resolved payload of a `TAG_DATA` response.
#[derive(Debug, Clone)]
pub struct TagData {
    /// UID reported by the reader.
    pub uid: String,
    /// Sixty-four base64-encoded 16-byte blocks.
    pub blocks: Vec<String>,
}

/// The resolved payload of a `WRITE_RESULT` response.
#[derive(Debug, Clone)]
pub struct WriteOutcome {
    /// Whether the write succeeded.
    pub success: bool,
    /// Failure detail, present when `success` is false.
    pub error: Option<String>,
}

/// Parameters for a `WRITE_TAG` request.
#[derive(Debug, Clone)]
pub struct WriteTagRequest {
    /// Sixteen 12-character upper-case hex sector keys.
    pub keys: Vec<String>,
    /// Sixty-four base64-encoded 16-byte blocks.
    pub blocks: Vec<String>,
    /// Target UID, for UID-writable ("magic") tags.
    pub uid: Option<String>,
}

struct Connection {
    generation: u64,
    outbound: mpsc::UnboundedSender<String>,
    device_name: Option<String>,
}

#[derive(Default)]
struct PendingTables {
    reads: HashMap<String, PendingSlot<TagData>>,
    writes: HashMap<String, PendingSlot<WriteOutcome>>,
}

impl PendingTables {
    fn cancel_all(&mut self) {
        for (_, slot) in self.reads.drain() {
            let _ = slot.send(Err(BridgeError::cancelled()));
        }
        for (_, slot) in self.writes.drain() {
            let _ = slot.send(Err(BridgeError::cancelled()));
        }
    }

    fn fail_all(&mut self, message: &str) {
        for (_, slot) in self.reads.drain() {
            let _ = slot.send(Err(BridgeError::protocol(message.to_string())));
        }
        for (_, slot) in self.writes.drain() {
            let _ = slot.send(Err(BridgeError::protocol(message.to_string())));
        }
    }
}

struct Inner {
    connection: Option<Connection>,
    pending: PendingTables,
    generation_counter: u64,
}

/// The process-wide bridge session. Owns at most one active reader
/// connection plus the two correlation tables. Construct one instance
/// behind an `Arc` and share it with every caller that issues requests.
pub struct BridgeSession {
    inner: Mutex<Inner>,
    next_request_id: AtomicU64,
    unsolicited_tag_data: Mutex<Option<mpsc::UnboundedSender<TagData>>>,
}

impl Default for BridgeSession {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for BridgeSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeSession")
            .field("is_connected", &self.is_connected())
            .finish()
    }
}

impl BridgeSession {
    /// Create a session with no active connection.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                connection: None,
                pending: PendingTables::default(),
                generation_counter: 0,
            }),
            next_request_id: AtomicU64::new(1),
            unsolicited_tag_data: Mutex::new(None),
        }
    }

    /// Whether a reader is currently connected.
    pub fn is_connected(&self) -> bool {
        self.inner.lock().unwrap().connection.is_some()
    }

    /// Register a listener for `TAG_DATA` frames that do not match any
    /// pending read (e.g. a reader that proactively streams scans).
    pub fn on_unsolicited_tag_data(&self, sender: mpsc::UnboundedSender<TagData>) {
        *self.unsolicited_tag_data.lock().unwrap() = Some(sender);
    }

    /// Accept a new reader connection, replacing and cancelling any prior
    /// one. Spawns a task that drains `inbound` until it ends or a protocol
    /// violation closes the session.
    pub fn accept(
        self: &Arc<Self>,
        outbound: mpsc::UnboundedSender<String>,
        inbound: impl Stream<Item = String> + Send + Unpin + 'static,
    ) {
        let generation = {
            let mut inner = self.inner.lock().unwrap();
            inner.pending.cancel_all();
            inner.generation_counter += 1;
            let generation = inner.generation_counter;
            inner.connection = Some(Connection {
                generation,
                outbound,
                device_name: None,
            });
            info!(generation, "bridge: reader connection accepted, replacing any prior session");
            generation
        };

        let session = Arc::clone(self);
        tokio::spawn(async move {
            session.receive_loop(generation, inbound).await;
        });
    }

    async fn receive_loop(
        self: Arc<Self>,
        generation: u64,
        mut inbound: impl Stream<Item = String> + Send + Unpin,
    ) {
        while let Some(frame) = inbound.next().await {
            match message::parse_incoming(&frame) {
                Ok(msg) => self.handle_message(generation, msg),
                Err(err) => {
                    warn!(generation, %err, "bridge: protocol violation, closing session");
                    self.disconnect(generation, &err.to_string());
                    return;
                }
            }
        }
        debug!(generation, "bridge: reader stream ended");
        self.disconnect(generation, "reader disconnected");
    }

    fn handle_message(&self, generation: u64, msg: IncomingMessage) {
        let mut inner = self.inner.lock().unwrap();
        // A stale receive loop from a connection that has already been
        // replaced must not touch the current one's tables.
        if inner.connection.as_ref().map(|c| c.generation) != Some(generation) {
            return;
        }
        match msg {
            IncomingMessage::TagData {
                request_id,
                uid,
                blocks,
            } => {
                if let Some(slot) = inner.pending.reads.remove(&request_id) {
                    let _ = slot.send(Ok(TagData { uid, blocks }));
                } else {
                    drop(inner);
                    if let Some(listener) = self.unsolicited_tag_data.lock().unwrap().as_ref() {
                        let _ = listener.send(TagData { uid, blocks });
                    } else {
                        debug!("bridge: unsolicited TAG_DATA with no registered listener, dropped");
                    }
                }
            }
            IncomingMessage::WriteResult {
                request_id,
                success,
                error,
            } => {
                if let Some(slot) = inner.pending.writes.remove(&request_id) {
                    let _ = slot.send(Ok(WriteOutcome { success, error }));
                }
            }
            IncomingMessage::TagDetected { uid } => {
                info!(uid = uid.as_deref().unwrap_or("unknown"), "bridge: tag detected");
            }
            IncomingMessage::Status { device } => {
                info!(device = device.as_deref().unwrap_or("unknown"), "bridge: reader status");
                if let Some(conn) = inner.connection.as_mut() {
                    conn.device_name = device;
                }
            }
            IncomingMessage::Error { message } => {
                error!(%message, "bridge: reader reported an error, failing pending requests");
                inner.pending.fail_all(&message);
            }
        }
    }

    fn disconnect(&self, generation: u64, reason: &str) {
        let mut inner = self.inner.lock().unwrap();
        if inner.connection.as_ref().map(|c| c.generation) != Some(generation) {
            // Already replaced; the new connection's state must not be
            // disturbed by this stale loop's teardown.
            return;
        }
        inner.connection = None;
        inner.pending.cancel_all();
        info!(generation, reason, "bridge: connection closed, pending requests cancelled");
    }

    fn next_id(&self) -> String {
        self.next_request_id.fetch_add(1, Ordering::Relaxed).to_string()
    }

    /// Request the reader scan and report the next tag, with the default
    /// timeout.
    pub async fn read_tag(&self) -> Result<TagData, BridgeError> {
        self.read_tag_with_timeout(DEFAULT_TIMEOUT).await
    }

    /// Request the reader scan and report the next tag, bounded by `timeout`.
    pub async fn read_tag_with_timeout(&self, timeout: Duration) -> Result<TagData, BridgeError> {
        let request_id = self.next_id();
        let (tx, rx) = oneshot::channel();
        {
            let mut inner = self.inner.lock().unwrap();
            let conn = inner.connection.as_ref().ok_or_else(BridgeError::not_connected)?;
            let frame = serde_json::to_string(&OutgoingMessage::ReadTag {
                request_id: request_id.clone(),
            })
            .expect("OutgoingMessage always serializes");
            if conn.outbound.send(frame).is_err() {
                return Err(BridgeError::not_connected());
            }
            inner.pending.reads.insert(request_id.clone(), tx);
        }
        self.await_slot(request_id, rx, timeout, Table::Reads).await
    }

    /// Request the reader write `request` to the next tag it sees, with the
    /// default timeout.
    pub async fn write_tag(&self, request: WriteTagRequest) -> Result<WriteOutcome, BridgeError> {
        self.write_tag_with_timeout(request, DEFAULT_TIMEOUT).await
    }

    /// Request the reader write `request` to the next tag it sees, bounded
    /// by `timeout`.
    pub async fn write_tag_with_timeout(
        &self,
        request: WriteTagRequest,
        timeout: Duration,
    ) -> Result<WriteOutcome, BridgeError> {
        let request_id = self.next_id();
        let (tx, rx) = oneshot::channel();
        {
            let mut inner = self.inner.lock().unwrap();
            let conn = inner.connection.as_ref().ok_or_else(BridgeError::not_connected)?;
            let frame = serde_json::to_string(&OutgoingMessage::WriteTag {
                request_id: request_id.clone(),
                keys: request.keys,
                blocks: request.blocks,
                uid: request.uid,
            })
            .expect("OutgoingMessage always serializes");
            if conn.outbound.send(frame).is_err() {
                return Err(BridgeError::not_connected());
            }
            inner.pending.writes.insert(request_id.clone(), tx);
        }
        self.await_slot(request_id, rx, timeout, Table::Writes).await
    }

    async fn await_slot<T>(
        &self,
        request_id: String,
        rx: oneshot::Receiver<Result<T, BridgeError>>,
        timeout: Duration,
        table: Table,
    ) -> Result<T, BridgeError> {
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_cancelled_without_value)) => Err(BridgeError::cancelled()),
            Err(_elapsed) => {
                let mut inner = self.inner.lock().unwrap();
                match table {
                    Table::Reads => {
                        inner.pending.reads.remove(&request_id);
                    }
                    Table::Writes => {
                        inner.pending.writes.remove(&request_id);
                    }
                }
                Err(BridgeError::timeout())
            }
        }
    }

    #[cfg(any(test, feature = "test-support"))]
    /// Number of pending read and write slots. Exposed for tests asserting
    /// that timeouts and cancellations leave no residue.
    pub fn pending_count(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.pending.reads.len() + inner.pending.writes.len()
    }
}

enum Table {
    Reads,
    Writes,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_stream::wrappers::UnboundedReceiverStream;

    fn mock_connection() -> (
        Arc<BridgeSession>,
        mpsc::UnboundedReceiver<String>,
        mpsc::UnboundedSender<String>,
    ) {
        let session = Arc::new(BridgeSession::new());
        let (to_reader_tx, to_reader_rx) = mpsc::unbounded_channel();
        let (from_reader_tx, from_reader_rx) = mpsc::unbounded_channel();
        session.accept(to_reader_tx, UnboundedReceiverStream::new(from_reader_rx));
        (session, to_reader_rx, from_reader_tx)
    }

    #[tokio::test]
    async fn not_connected_without_an_accepted_session() {
        let session = BridgeSession::new();
        let err = session.read_tag().await.unwrap_err();
        assert!(err.to_string().contains("no reader"));
    }

    #[tokio::test]
    async fn s6_read_tag_resolves_from_tag_data() {
        let (session, mut to_reader, from_reader) = mock_connection();

        let read = tokio::spawn({
            let session = Arc::clone(&session);
            async move { session.read_tag().await }
        });

        let sent = to_reader.recv().await.unwrap();
        let request: serde_json::Value = serde_json::from_str(&sent).unwrap();
        assert_eq!(request["action"], "READ_TAG");
        let id = request["request_id"].as_str().unwrap();

        from_reader
            .send(format!(
                r#"{{"action":"TAG_DATA","request_id":"{id}","uid":"DEADBEEF","blocks":["AA=="]}}"#
            ))
            .unwrap();

        let data = read.await.unwrap().unwrap();
        assert_eq!(data.uid, "DEADBEEF");
        assert_eq!(session.pending_count(), 0);
    }

    #[tokio::test]
    async fn s7_read_tag_times_out_when_reader_is_silent() {
        let (session, _to_reader, _from_reader) = mock_connection();
        let err = session
            .read_tag_with_timeout(Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(err.to_string().to_lowercase().contains("timed out"));
        assert_eq!(session.pending_count(), 0);
    }

    #[tokio::test]
    async fn s8_replacing_the_connection_cancels_pending_reads() {
        let (session, _to_reader, _from_reader) = mock_connection();

        let read = tokio::spawn({
            let session = Arc::clone(&session);
            async move { session.read_tag().await }
        });
        // Let the read register before replacing.
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        let (to_reader_tx2, _to_reader_rx2) = mpsc::unbounded_channel();
        let (_from_reader_tx2, from_reader_rx2) = mpsc::unbounded_channel();
        session.accept(
            to_reader_tx2,
            UnboundedReceiverStream::new(from_reader_rx2),
        );

        let err = read.await.unwrap().unwrap_err();
        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn write_result_resolves_pending_write() {
        let (session, mut to_reader, from_reader) = mock_connection();

        let write = tokio::spawn({
            let session = Arc::clone(&session);
            async move {
                session
                    .write_tag(WriteTagRequest {
                        keys: vec!["FFFFFFFFFFFF".to_string(); 16],
                        blocks: vec!["AA==".to_string(); 64],
                        uid: None,
                    })
                    .await
            }
        });

        let sent = to_reader.recv().await.unwrap();
        let request: serde_json::Value = serde_json::from_str(&sent).unwrap();
        let id = request["request_id"].as_str().unwrap();

        from_reader
            .send(format!(
                r#"{{"action":"WRITE_RESULT","request_id":"{id}","success":true}}"#
            ))
            .unwrap();

        let outcome = write.await.unwrap().unwrap();
        assert!(outcome.success);
    }

    #[tokio::test]
    async fn error_frame_fails_every_pending_request() {
        let (session, _to_reader, from_reader) = mock_connection();

        let read = tokio::spawn({
            let session = Arc::clone(&session);
            async move { session.read_tag().await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;

        from_reader
            .send(r#"{"action":"ERROR","message":"antenna fault"}"#.to_string())
            .unwrap();

        let err = read.await.unwrap().unwrap_err();
        assert!(err.to_string().contains("antenna fault"));
    }

    #[tokio::test]
    async fn malformed_frame_closes_the_session_and_cancels_pending() {
        let (session, _to_reader, from_reader) = mock_connection();

        let read = tokio::spawn({
            let session = Arc::clone(&session);
            async move { session.read_tag().await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;

        from_reader.send("not json at all".to_string()).unwrap();

        let err = read.await.unwrap().unwrap_err();
        assert!(err.is_cancelled());
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!session.is_connected());
    }
}
