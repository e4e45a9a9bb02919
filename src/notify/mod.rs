use axum::async_trait;
use serde::Serialize;

pub mod correlation;
pub mod messages;
pub mod telegram;

pub use correlation::{CorrelationStore, PgCorrelation};
pub use telegram::TelegramClient;

/// Inline keyboard attached to an outbound message. Mirrors the subset of
/// the Bot API markup the app actually sends.
#[derive(Debug, Clone, Default, Serialize)]
pub struct InlineKeyboard {
    pub inline_keyboard: Vec<Vec<InlineButton>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InlineButton {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callback_data: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub web_app: Option<WebAppInfo>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WebAppInfo {
    pub url: String,
}

impl InlineKeyboard {
    pub fn single(button: InlineButton) -> Self {
        Self {
            inline_keyboard: vec![vec![button]],
        }
    }
}

impl InlineButton {
    pub fn url(text: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            url: Some(url.into()),
            callback_data: None,
            web_app: None,
        }
    }

    pub fn callback(text: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            url: None,
            callback_data: Some(data.into()),
            web_app: None,
        }
    }

    pub fn web_app(text: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            url: None,
            callback_data: None,
            web_app: Some(WebAppInfo { url: url.into() }),
        }
    }
}

/// Outbound delivery seam used by the webhook handler and the pipeline's
/// terminal stage. The production impl talks to the Telegram Bot API.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Sends a message and returns its message id for correlation.
    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        markup: Option<InlineKeyboard>,
    ) -> anyhow::Result<i64>;

    /// Edits a previously sent message in place.
    async fn edit_message(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
        markup: Option<InlineKeyboard>,
    ) -> anyhow::Result<()>;
}
