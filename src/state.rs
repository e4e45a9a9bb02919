use std::sync::Arc;

use sqlx::PgPool;

use crate::config::AppConfig;
use crate::notify::{CorrelationStore, Notifier, PgCorrelation, TelegramClient};
use crate::pipeline::EnrichmentPipeline;
use crate::posts::repo::PgPosts;
use crate::recognition::OpenAiRecognizer;
use crate::storage::{Storage, StorageClient};

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: Arc<AppConfig>,
    pub storage: Arc<dyn StorageClient>,
    pub tg: Arc<TelegramClient>,
    pub correlation: Arc<dyn CorrelationStore>,
    pub pipeline: Arc<EnrichmentPipeline>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let db = sqlx::postgres::PgPoolOptions::new()
            .max_connections(10)
            .connect(&config.database_url)
            .await?;

        let storage = Arc::new(Storage::new(&config.s3).await?) as Arc<dyn StorageClient>;
        let tg = Arc::new(TelegramClient::new(&config.telegram.bot_token));
        let correlation =
            Arc::new(PgCorrelation { db: db.clone() }) as Arc<dyn CorrelationStore>;

        let recognizer = Arc::new(OpenAiRecognizer::new(&config.openai)?);
        let pipeline = EnrichmentPipeline::new(
            Arc::new(PgPosts { db: db.clone() }),
            correlation.clone(),
            recognizer,
            tg.clone() as Arc<dyn Notifier>,
        );

        Ok(Self {
            db,
            config,
            storage,
            tg,
            correlation,
            pipeline,
        })
    }

    #[cfg(test)]
    pub fn fake() -> Self {
        Self::fake_with_config(crate::config::test_config())
    }

    #[cfg(test)]
    pub fn fake_with_config(config: AppConfig) -> Self {
        use axum::async_trait;
        use bytes::Bytes;

        #[derive(Clone)]
        struct FakeStorage;
        #[async_trait]
        impl StorageClient for FakeStorage {
            async fn put_object(&self, _k: &str, _b: Bytes, _ct: &str) -> anyhow::Result<()> {
                Ok(())
            }
            async fn delete_object(&self, _k: &str) -> anyhow::Result<()> {
                Ok(())
            }
            async fn presign_get(&self, k: &str, _s: u64) -> anyhow::Result<String> {
                Ok(format!("https://fake.local/{k}"))
            }
            async fn presign_put(&self, k: &str, _s: u64) -> anyhow::Result<String> {
                Ok(format!("https://fake.local/{k}"))
            }
        }

        let db = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy(&config.database_url)
            .expect("lazy pool ok");

        let config = Arc::new(config);
        let tg = Arc::new(TelegramClient::new(&config.telegram.bot_token));
        let correlation =
            Arc::new(PgCorrelation { db: db.clone() }) as Arc<dyn CorrelationStore>;
        let recognizer =
            Arc::new(OpenAiRecognizer::new(&config.openai).expect("recognizer from test config"));
        let pipeline = EnrichmentPipeline::new(
            Arc::new(PgPosts { db: db.clone() }),
            correlation.clone(),
            recognizer,
            tg.clone() as Arc<dyn Notifier>,
        );

        Self {
            db,
            config,
            storage: Arc::new(FakeStorage) as Arc<dyn StorageClient>,
            tg,
            correlation,
            pipeline,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fake_state_builds_without_connecting() {
        let state = AppState::fake();
        assert_eq!(state.config.telegram.web_app_url, "https://app.test");
        let url = state.storage.presign_get("k.jpg", 60).await.unwrap();
        assert_eq!(url, "https://fake.local/k.jpg");
    }
}
