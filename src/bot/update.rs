use serde::Deserialize;

/// Incoming webhook payload. Only the fields the handlers look at are
/// modeled; everything else Telegram sends is ignored by serde.
#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    pub from: Option<TgUser>,
    pub text: Option<String>,
    /// Telegram delivers the text attached to a photo here, not in `text`.
    pub caption: Option<String>,
    #[serde(default)]
    pub photo: Vec<PhotoSize>,
    pub document: Option<Document>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: String,
}

impl Chat {
    pub fn is_private(&self) -> bool {
        self.kind == "private"
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TgUser {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub username: String,
    pub language_code: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PhotoSize {
    pub file_id: String,
    pub file_size: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Document {
    pub file_id: String,
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: TgUser,
    pub message: Option<Message>,
    pub data: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_photo_message_update() {
        let raw = r#"{
            "update_id": 9000,
            "message": {
                "message_id": 42,
                "chat": { "id": 777, "type": "private" },
                "from": {
                    "id": 777,
                    "is_bot": false,
                    "first_name": "Ann",
                    "username": "ann",
                    "language_code": "ru"
                },
                "caption": "dinner",
                "photo": [
                    { "file_id": "small", "file_size": 1200 },
                    { "file_id": "big", "file_size": 95000 }
                ]
            }
        }"#;
        let update: Update = serde_json::from_str(raw).unwrap();
        let msg = update.message.unwrap();
        assert!(msg.chat.is_private());
        assert_eq!(msg.photo.len(), 2);
        assert_eq!(msg.photo[1].file_id, "big");
        // Photo messages carry their text in `caption`, never in `text`.
        assert_eq!(msg.text, None);
        assert_eq!(msg.caption.as_deref(), Some("dinner"));
        assert_eq!(msg.from.unwrap().language_code.as_deref(), Some("ru"));
    }

    #[test]
    fn parses_callback_update_without_message_fields() {
        let raw = r#"{
            "update_id": 9001,
            "callback_query": {
                "id": "cb1",
                "from": { "id": 777, "first_name": "Ann" },
                "message": {
                    "message_id": 42,
                    "chat": { "id": 777, "type": "private" }
                },
                "data": "share_15"
            }
        }"#;
        let update: Update = serde_json::from_str(raw).unwrap();
        let cb = update.callback_query.unwrap();
        assert_eq!(cb.data.as_deref(), Some("share_15"));
        assert_eq!(cb.message.unwrap().chat.id, 777);
    }
}
