//! Notifier trait and a recording test double.

use crate::error::{DeliveryError, NotifyResult};
use crate::message::{ChannelAck, OutboundMessage};
use eiabot_core::BoxFuture;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// Delivers a message to the notification channel.
pub trait Notifier: Send + Sync {
    /// Send one message. `Ok` only when the channel acknowledged it.
    fn deliver<'a>(&'a self, message: &'a OutboundMessage) -> BoxFuture<'a, NotifyResult<ChannelAck>>;
}

pub type DynNotifier = Arc<dyn Notifier>;

/// Records every delivery and answers from a script.
///
/// With an empty script every delivery is acknowledged.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    deliveries: Mutex<Vec<OutboundMessage>>,
    script: Mutex<VecDeque<NotifyResult<ChannelAck>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the result for the next delivery.
    pub fn push_result(&self, result: NotifyResult<ChannelAck>) {
        self.script.lock().push_back(result);
    }

    /// Queue a Telegram-style rejection for the next delivery.
    pub fn reject_next(&self, status: u16, description: &str) {
        let ack = ChannelAck {
            ok: false,
            detail: serde_json::json!({
                "ok": false,
                "error_code": status,
                "description": description,
            }),
        };
        self.push_result(Err(DeliveryError::Rejected {
            status,
            description: description.to_string(),
            ack: Some(ack),
        }));
    }

    /// Messages passed to `deliver`, including rejected ones.
    pub fn deliveries(&self) -> Vec<OutboundMessage> {
        self.deliveries.lock().clone()
    }

    pub fn delivery_count(&self) -> usize {
        self.deliveries.lock().len()
    }

    fn default_ack(sequence: usize) -> ChannelAck {
        ChannelAck {
            ok: true,
            detail: serde_json::json!({
                "ok": true,
                "result": { "message_id": sequence },
            }),
        }
    }
}

impl Notifier for RecordingNotifier {
    fn deliver<'a>(&'a self, message: &'a OutboundMessage) -> BoxFuture<'a, NotifyResult<ChannelAck>> {
        Box::pin(async move {
            let sequence = {
                let mut deliveries = self.deliveries.lock();
                deliveries.push(message.clone());
                deliveries.len()
            };
            self.script
                .lock()
                .pop_front()
                .unwrap_or_else(|| Ok(Self::default_ack(sequence)))
        })
    }
}
