use axum::async_trait;
use bytes::Bytes;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::{InlineKeyboard, Notifier};

const TELEGRAM_API: &str = "https://api.telegram.org";

/// Thin Bot API client. Covers the calls the app makes: sending and
/// editing messages, setting the menu button, and downloading files the
/// user sent to the bot.
pub struct TelegramClient {
    http: reqwest::Client,
    token: String,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    message_id: i64,
}

#[derive(Debug, Deserialize)]
struct FileInfo {
    file_path: String,
}

impl TelegramClient {
    pub fn new(token: &str) -> Self {
        Self::with_base_url(token, TELEGRAM_API)
    }

    pub fn with_base_url(token: &str, base_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            token: token.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.base_url, self.token, method)
    }

    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        body: serde_json::Value,
    ) -> anyhow::Result<T> {
        let resp = self
            .http
            .post(self.method_url(method))
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("telegram {method} failed with {status}: {body}");
        }

        let envelope: ApiEnvelope<T> = resp.json().await?;
        if !envelope.ok {
            anyhow::bail!(
                "telegram {method} returned ok=false: {}",
                envelope.description.unwrap_or_default()
            );
        }
        envelope
            .result
            .ok_or_else(|| anyhow::anyhow!("telegram {method} returned no result"))
    }

    /// Resolves a file_id to a download URL via getFile.
    pub async fn file_download_url(&self, file_id: &str) -> anyhow::Result<String> {
        let info: FileInfo = self
            .call("getFile", json!({ "file_id": file_id }))
            .await?;
        Ok(format!(
            "{}/file/bot{}/{}",
            self.base_url, self.token, info.file_path
        ))
    }

    pub async fn download(&self, url: &str) -> anyhow::Result<Bytes> {
        let resp = self.http.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            anyhow::bail!("file download failed with {status}");
        }
        Ok(resp.bytes().await?)
    }

    pub async fn set_menu_button(&self, chat_id: i64, text: &str, url: &str) -> anyhow::Result<()> {
        let _: serde_json::Value = self
            .call(
                "setChatMenuButton",
                json!({
                    "chat_id": chat_id,
                    "menu_button": {
                        "type": "web_app",
                        "text": text,
                        "web_app": { "url": url }
                    }
                }),
            )
            .await?;
        debug!(chat_id, "menu button set");
        Ok(())
    }
}

#[async_trait]
impl Notifier for TelegramClient {
    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        markup: Option<InlineKeyboard>,
    ) -> anyhow::Result<i64> {
        let mut body = json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "Markdown",
        });
        if let Some(markup) = markup {
            body["reply_markup"] = serde_json::to_value(markup)?;
        }
        let sent: SentMessage = self.call("sendMessage", body).await?;
        Ok(sent.message_id)
    }

    async fn edit_message(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
        markup: Option<InlineKeyboard>,
    ) -> anyhow::Result<()> {
        let mut body = json!({
            "chat_id": chat_id,
            "message_id": message_id,
            "text": text,
            "parse_mode": "Markdown",
        });
        if let Some(markup) = markup {
            body["reply_markup"] = serde_json::to_value(markup)?;
        }
        let _: serde_json::Value = self.call("editMessageText", body).await?;
        Ok(())
    }
}

/// Escapes the characters legacy Markdown parse mode treats as formatting.
pub fn escape_markdown(s: &str) -> String {
    const RESERVED: &str = "_*[`";
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if RESERVED.contains(c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::InlineButton;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn escape_markdown_escapes_reserved_characters() {
        assert_eq!(escape_markdown("a_b*c"), "a\\_b\\*c");
        assert_eq!(escape_markdown("rice [steamed]"), "rice \\[steamed]");
        assert_eq!(escape_markdown("plain 1.5!"), "plain 1.5!");
    }

    #[tokio::test]
    async fn send_message_returns_message_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot42:TEST/sendMessage"))
            .and(body_partial_json(json!({ "chat_id": 7, "text": "hello" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "result": { "message_id": 1234 }
            })))
            .mount(&server)
            .await;

        let tg = TelegramClient::with_base_url("42:TEST", &server.uri());
        let id = tg.send_message(7, "hello", None).await.unwrap();
        assert_eq!(id, 1234);
    }

    #[tokio::test]
    async fn edit_message_sends_markup() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot42:TEST/editMessageText"))
            .and(body_partial_json(json!({
                "chat_id": 7,
                "message_id": 1234,
                "reply_markup": { "inline_keyboard": [[{ "text": "Open" }]] }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "result": {}
            })))
            .mount(&server)
            .await;

        let tg = TelegramClient::with_base_url("42:TEST", &server.uri());
        tg.edit_message(
            7,
            1234,
            "done",
            Some(InlineKeyboard::single(InlineButton::url(
                "Open",
                "https://app.test",
            ))),
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn ok_false_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot42:TEST/sendMessage"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": false,
                "description": "Bad Request: chat not found"
            })))
            .mount(&server)
            .await;

        let tg = TelegramClient::with_base_url("42:TEST", &server.uri());
        let err = tg.send_message(7, "hello", None).await.unwrap_err();
        assert!(err.to_string().contains("chat not found"));
    }

    #[tokio::test]
    async fn file_download_url_uses_get_file_path() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot42:TEST/getFile"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "result": { "file_path": "photos/file_1.jpg" }
            })))
            .mount(&server)
            .await;

        let tg = TelegramClient::with_base_url("42:TEST", &server.uri());
        let url = tg.file_download_url("abc").await.unwrap();
        assert_eq!(
            url,
            format!("{}/file/bot42:TEST/photos/file_1.jpg", server.uri())
        );
    }
}
