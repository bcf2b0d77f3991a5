//! Notification delivery.
//!
//! `Notifier` is the seam the pipeline talks to. `TelegramNotifier` posts
//! to the Telegram Bot API; `RecordingNotifier` stands in for it in tests.

pub mod error;
pub mod message;
pub mod notifier;
pub mod telegram;

pub use error::{DeliveryError, NotifyResult};
pub use message::{ChannelAck, ImageAttachment, OutboundMessage};
pub use notifier::{DynNotifier, Notifier, RecordingNotifier};
pub use telegram::{TelegramNotifier, CAPTION_LIMIT, DEFAULT_API_BASE};
