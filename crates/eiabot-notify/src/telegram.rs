//! Telegram Bot API notifier.
//!
//! Text goes through `sendMessage` (form encoded), messages with an image
//! through `sendPhoto` (multipart, text as caption). The bot token is part
//! of the request path, so it is kept out of logs and error messages.

use crate::error::{DeliveryError, NotifyResult};
use crate::message::{ChannelAck, ImageAttachment, OutboundMessage};
use crate::notifier::Notifier;
use eiabot_core::BoxFuture;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use std::time::Duration;
use tracing::{info, warn};

pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Telegram's limit on photo captions, in characters.
pub const CAPTION_LIMIT: usize = 1024;

pub struct TelegramNotifier {
    client: Client,
    api_base: String,
    bot_token: String,
    chat_id: String,
    disable_web_page_preview: bool,
}

impl TelegramNotifier {
    pub fn new(
        api_base: impl Into<String>,
        bot_token: impl Into<String>,
        chat_id: impl Into<String>,
        timeout: Duration,
    ) -> NotifyResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DeliveryError::HttpClient(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            bot_token: bot_token.into(),
            chat_id: chat_id.into(),
            disable_web_page_preview: true,
        })
    }

    #[must_use]
    pub fn with_web_page_preview(mut self, enabled: bool) -> Self {
        self.disable_web_page_preview = !enabled;
        self
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.bot_token, method)
    }

    /// Send an HTML text message.
    pub async fn send_message(&self, text: &str) -> NotifyResult<ChannelAck> {
        let preview = if self.disable_web_page_preview { "true" } else { "false" };
        let response = self
            .client
            .post(self.method_url("sendMessage"))
            .form(&[
                ("chat_id", self.chat_id.as_str()),
                ("text", text),
                ("parse_mode", "HTML"),
                ("disable_web_page_preview", preview),
            ])
            .send()
            .await
            .map_err(|e| DeliveryError::Transport(e.without_url().to_string()))?;

        Self::read_ack("sendMessage", response).await
    }

    /// Send a photo with an HTML caption.
    pub async fn send_photo(&self, caption: &str, image: &ImageAttachment) -> NotifyResult<ChannelAck> {
        if caption.chars().count() > CAPTION_LIMIT {
            warn!(
                len = caption.chars().count(),
                limit = CAPTION_LIMIT,
                "Caption exceeds Telegram limit, channel will likely reject it"
            );
        }

        let photo = Part::bytes(image.bytes.clone()).file_name(image.filename.clone());
        let form = Form::new()
            .text("chat_id", self.chat_id.clone())
            .text("caption", caption.to_string())
            .text("parse_mode", "HTML")
            .part("photo", photo);

        let response = self
            .client
            .post(self.method_url("sendPhoto"))
            .multipart(form)
            .send()
            .await
            .map_err(|e| DeliveryError::Transport(e.without_url().to_string()))?;

        Self::read_ack("sendPhoto", response).await
    }

    async fn read_ack(method: &str, response: Response) -> NotifyResult<ChannelAck> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| DeliveryError::Transport(format!("Failed to read body: {}", e.without_url())))?;
        let ack = ChannelAck::from_body(&body);

        if status.is_success() && ack.ok {
            info!(method, message_id = ?ack.message_id(), "Telegram accepted message");
            return Ok(ack);
        }

        let description = ack
            .description()
            .map(str::to_string)
            .unwrap_or_else(|| format!("HTTP {status}"));
        warn!(method, status = status.as_u16(), description = %description, "Telegram rejected message");
        Err(DeliveryError::Rejected {
            status: status.as_u16(),
            description,
            ack: Some(ack),
        })
    }
}

impl Notifier for TelegramNotifier {
    fn deliver<'a>(&'a self, message: &'a OutboundMessage) -> BoxFuture<'a, NotifyResult<ChannelAck>> {
        Box::pin(async move {
            match &message.image {
                Some(image) => self.send_photo(&message.text, image).await,
                None => self.send_message(&message.text).await,
            }
        })
    }
}

// Manual impl so the token never shows up in `{:?}` output.
impl std::fmt::Debug for TelegramNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramNotifier")
            .field("api_base", &self.api_base)
            .field("chat_id", &self.chat_id)
            .field("bot_token", &"<redacted>")
            .finish()
    }
}
