//! Outbound message and acknowledgment types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Image sent as a photo with the message text as its caption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageAttachment {
    pub bytes: Vec<u8>,
    pub filename: String,
}

/// A message ready for the channel. `text` is HTML.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub text: String,
    pub image: Option<ImageAttachment>,
}

impl OutboundMessage {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            image: None,
        }
    }

    #[must_use]
    pub fn with_image(mut self, bytes: Vec<u8>, filename: impl Into<String>) -> Self {
        self.image = Some(ImageAttachment {
            bytes,
            filename: filename.into(),
        });
        self
    }
}

/// Channel acknowledgment: the `ok` flag plus the raw response body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelAck {
    pub ok: bool,
    pub detail: Value,
}

impl ChannelAck {
    /// Build from a raw response body. A body that is not JSON is kept as
    /// a string and counts as not ok.
    pub fn from_body(body: &str) -> Self {
        match serde_json::from_str::<Value>(body) {
            Ok(detail) => Self {
                ok: detail.get("ok").and_then(Value::as_bool).unwrap_or(false),
                detail,
            },
            Err(_) => Self {
                ok: false,
                detail: Value::String(body.to_string()),
            },
        }
    }

    /// Telegram's `description` field, if present.
    pub fn description(&self) -> Option<&str> {
        self.detail.get("description").and_then(Value::as_str)
    }

    /// Telegram's `result.message_id`, if present.
    pub fn message_id(&self) -> Option<i64> {
        self.detail
            .get("result")
            .and_then(|r| r.get("message_id"))
            .and_then(Value::as_i64)
    }
}
