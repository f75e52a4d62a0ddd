//! Wire shape of the bridge protocol: newline-independent JSON objects
//! carrying a required `action` and an optional `request_id`.

use serde::Serialize;
use serde_json::Value;

use super::error::BridgeError;

/// A message the backend sends to the reader device.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "action")]
pub enum OutgoingMessage {
    /// Ask the reader to scan and report the next tag it sees.
    #[serde(rename = "READ_TAG")]
    ReadTag {
        /// Correlation id for the matching `TAG_DATA` response.
        request_id: String,
    },
    /// Ask the reader to write `blocks` to the next tag it sees, using
    /// `keys` for sector authentication.
    #[serde(rename = "WRITE_TAG")]
    WriteTag {
        /// Correlation id for the matching `WRITE_RESULT` response.
        request_id: String,
        /// Sixteen 12-character upper-case hex sector keys.
        keys: Vec<String>,
        /// Sixty-four base64-encoded 16-byte blocks.
        blocks: Vec<String>,
        /// Target UID, present only when writing to a UID-writable tag.
        #[serde(skip_serializing_if = "Option::is_none")]
        uid: Option<String>,
    },
}

/// A message the reader device sends to the backend.
#[derive(Debug, Clone)]
pub enum IncomingMessage {
    /// The reader scanned a tag and is reporting its contents.
    TagData {
        /// Correlation id, empty when unsolicited.
        request_id: String,
        /// The tag's UID as reported by the reader.
        uid: String,
        /// Sixty-four base64-encoded 16-byte blocks.
        blocks: Vec<String>,
    },
    /// The reader finished a requested write.
    WriteResult {
        /// Correlation id of the original `WRITE_TAG` request.
        request_id: String,
        /// Whether the write succeeded.
        success: bool,
        /// Failure detail, present when `success` is false.
        error: Option<String>,
    },
    /// A tag entered the reader's field; informational only.
    TagDetected {
        /// UID of the detected tag, if the reader reports one.
        uid: Option<String>,
    },
    /// Unsolicited announcement of the reader's identity.
    Status {
        /// Human-readable device name.
        device: Option<String>,
    },
    /// The reader reported an error unrelated to a specific request.
    Error {
        /// Human-readable error detail.
        message: String,
    },
}

/// Parse one JSON text frame from the reader.
///
/// Returns a [`BridgeError::protocol`] for unparseable JSON or a recognized
/// action missing one of its required fields.
pub fn parse_incoming(text: &str) -> Result<IncomingMessage, BridgeError> {
    let value: Value = serde_json::from_str(text)
        .map_err(|err| BridgeError::protocol(format!("malformed JSON frame: {err}")))?;

    let action = value
        .get("action")
        .and_then(Value::as_str)
        .ok_or_else(|| BridgeError::protocol("frame is missing required field `action`"))?;

    let string_field = |field: &str| -> Option<String> {
        value.get(field).and_then(Value::as_str).map(str::to_string)
    };
    let require = |field: &str| -> Result<String, BridgeError> {
        string_field(field)
            .ok_or_else(|| BridgeError::protocol(format!("`{action}` frame is missing field `{field}`")))
    };

    match action {
        "TAG_DATA" => {
            let blocks = value
                .get("blocks")
                .and_then(Value::as_array)
                .ok_or_else(|| BridgeError::protocol("`TAG_DATA` frame is missing field `blocks`"))?
                .iter()
                .map(|v| {
                    v.as_str()
                        .map(str::to_string)
                        .ok_or_else(|| BridgeError::protocol("`TAG_DATA` block entry was not a string"))
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok(IncomingMessage::TagData {
                request_id: string_field("request_id").unwrap_or_default(),
                uid: require("uid")?,
                blocks,
            })
        }
        "WRITE_RESULT" => Ok(IncomingMessage::WriteResult {
            request_id: require("request_id")?,
            success: value
                .get("success")
                .and_then(Value::as_bool)
                .ok_or_else(|| BridgeError::protocol("`WRITE_RESULT` frame is missing field `success`"))?,
            error: string_field("error"),
        }),
        "TAG_DETECTED" => Ok(IncomingMessage::TagDetected {
            uid: string_field("uid"),
        }),
        "STATUS" => Ok(IncomingMessage::Status {
            device: string_field("device"),
        }),
        "ERROR" => Ok(IncomingMessage::Error {
            message: string_field("message").unwrap_or_else(|| "unspecified reader error".into()),
        }),
        other => Err(BridgeError::protocol(format!("unrecognized action `{other}`"))),
    }
}
