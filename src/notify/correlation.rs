use axum::async_trait;
use sqlx::PgPool;

use crate::error::AppError;

/// Tracks which bot message belongs to which (chat, post) pair so the
/// pipeline can edit the placeholder instead of sending a new message.
/// Append-only; the newest row for a pair wins.
#[async_trait]
pub trait CorrelationStore: Send + Sync {
    async fn record_sent_message(
        &self,
        chat_id: i64,
        post_id: i64,
        message_id: i64,
    ) -> Result<(), AppError>;

    /// The most recently recorded message id for the pair, or `None` when
    /// nothing was tracked. Absence is degraded delivery, not an error.
    async fn last_message_id(&self, chat_id: i64, post_id: i64)
        -> Result<Option<i64>, AppError>;
}

pub struct PgCorrelation {
    pub db: PgPool,
}

#[async_trait]
impl CorrelationStore for PgCorrelation {
    async fn record_sent_message(
        &self,
        chat_id: i64,
        post_id: i64,
        message_id: i64,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO bot_messages (chat_id, post_id, message_id)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(chat_id)
        .bind(post_id)
        .bind(message_id)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn last_message_id(
        &self,
        chat_id: i64,
        post_id: i64,
    ) -> Result<Option<i64>, AppError> {
        let row: Option<(i64,)> = sqlx::query_as(
            r#"
            SELECT message_id
            FROM bot_messages
            WHERE chat_id = $1 AND post_id = $2
            ORDER BY sent_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(chat_id)
        .bind(post_id)
        .fetch_optional(&self.db)
        .await?;
        Ok(row.map(|(id,)| id))
    }
}
