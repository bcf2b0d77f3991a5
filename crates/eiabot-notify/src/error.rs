//! Delivery error types.

use crate::message::ChannelAck;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum DeliveryError {
    /// Connection failure or timeout; nothing was acknowledged.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Non-2xx status or `"ok": false` in the body.
    #[error("Channel rejected message (HTTP {status}): {description}")]
    Rejected {
        status: u16,
        description: String,
        ack: Option<ChannelAck>,
    },

    #[error("HTTP client error: {0}")]
    HttpClient(String),
}

impl DeliveryError {
    /// The channel's response body, when one was received.
    pub fn ack(&self) -> Option<&ChannelAck> {
        match self {
            DeliveryError::Rejected { ack, .. } => ack.as_ref(),
            _ => None,
        }
    }
}

pub type NotifyResult<T> = Result<T, DeliveryError>;
