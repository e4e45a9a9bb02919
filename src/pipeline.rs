use std::sync::Arc;

use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};

use crate::error::AppError;
use crate::notify::messages::{insights_text, strings};
use crate::notify::{CorrelationStore, InlineButton, InlineKeyboard, Notifier};
use crate::posts::repo::{EnrichmentOutcome, FoodInsights, Post, PostStore};
use crate::recognition::{format_ingredients, Locale, Recognizer};

/// Drives a freshly created post through AI enrichment on a detached task:
/// image recognition, optional nutrition analysis, one consolidated
/// repository write, and an in-place edit of the placeholder bot message.
///
/// Tasks are supervised by a [`TaskTracker`] so shutdown (and tests) can
/// await completion instead of racing against wall-clock sleeps.
pub struct EnrichmentPipeline {
    posts: Arc<dyn PostStore>,
    correlation: Arc<dyn CorrelationStore>,
    recognizer: Arc<dyn Recognizer>,
    notifier: Arc<dyn Notifier>,
    tracker: TaskTracker,
}

/// Everything a single run needs; completion order across posts is
/// unspecified, two quick uploads may finish out of order.
#[derive(Debug, Clone, Copy)]
pub struct EnrichmentJob {
    pub user_id: i64,
    pub post_id: i64,
    pub chat_id: i64,
    pub locale: Locale,
}

impl EnrichmentPipeline {
    pub fn new(
        posts: Arc<dyn PostStore>,
        correlation: Arc<dyn CorrelationStore>,
        recognizer: Arc<dyn Recognizer>,
        notifier: Arc<dyn Notifier>,
    ) -> Arc<Self> {
        Arc::new(Self {
            posts,
            correlation,
            recognizer,
            notifier,
            tracker: TaskTracker::new(),
        })
    }

    pub fn tracker(&self) -> &TaskTracker {
        &self.tracker
    }

    /// Fire-and-forget entry point. The caller returns its HTTP response
    /// immediately; errors never propagate back, they are logged and turned
    /// into a failure notification here.
    pub fn spawn(self: &Arc<Self>, job: EnrichmentJob) {
        let this = Arc::clone(self);
        self.tracker.spawn(async move {
            if let Err(err) = this.run(job).await {
                error!(
                    post_id = job.post_id,
                    user_id = job.user_id,
                    error = %err,
                    "enrichment failed"
                );
                this.notify_failure(job).await;
            }
        });
    }

    async fn run(&self, job: EnrichmentJob) -> Result<(), AppError> {
        let post = self.posts.get_owned(job.user_id, job.post_id).await?;

        // Re-entry guard: a post that already reached a terminal state is
        // never enriched again, so retries cannot duplicate tags or
        // notifications.
        if post.is_enriched() {
            info!(post_id = post.id, "post already enriched, skipping");
            return Ok(());
        }

        let analysis = self
            .recognizer
            .analyze_image(job.locale, &post.photo_url, post.text.as_deref())
            .await?;

        if analysis.is_spam {
            self.posts.mark_spam(job.user_id, job.post_id).await?;
            info!(post_id = post.id, "post flagged as spam");
            self.edit_tracked_message(&job, strings(job.locale).spam_detected, None)
                .await;
            return Ok(());
        }

        let description = format_ingredients(job.locale, &analysis.ingredients);
        let ingredients = self
            .recognizer
            .analyze_nutrition(job.locale, &description)
            .await?;

        let insights = FoodInsights::from_ingredients(&ingredients);
        let outcome = EnrichmentOutcome {
            dish_name: analysis.dish_name,
            ingredients,
            insights,
            tags: analysis.tags,
            language: job.locale.code().to_string(),
            health_rating: analysis.health_rating,
            aesthetic_rating: analysis.aesthetic_rating,
        };

        let post = self
            .posts
            .apply_enrichment(job.user_id, job.post_id, &outcome)
            .await?;

        info!(
            post_id = post.id,
            user_id = post.user_id,
            calories = insights.calories,
            "post enriched"
        );

        self.notify_success(&job, &post).await;
        Ok(())
    }

    async fn notify_success(&self, job: &EnrichmentJob, post: &Post) {
        let s = strings(job.locale);
        let text = match (&post.dish_name, &post.food_insights) {
            (Some(dish), Some(insights)) => insights_text(job.locale, dish, insights),
            _ => s.insights_not_found.to_string(),
        };
        let markup = InlineKeyboard::single(InlineButton::callback(
            s.share_with_community,
            format!("share_{}", post.id),
        ));
        self.edit_tracked_message(job, &text, Some(markup)).await;
    }

    async fn notify_failure(&self, job: EnrichmentJob) {
        self.edit_tracked_message(&job, strings(job.locale).enrichment_failed, None)
            .await;
    }

    /// Edits the placeholder message recorded at upload time. A missing
    /// correlation row or a delivery error degrades to a log line; the
    /// enrichment result is already durable at this point.
    async fn edit_tracked_message(
        &self,
        job: &EnrichmentJob,
        text: &str,
        markup: Option<InlineKeyboard>,
    ) {
        let message_id = match self.correlation.last_message_id(job.chat_id, job.post_id).await {
            Ok(Some(id)) => id,
            Ok(None) => {
                warn!(
                    chat_id = job.chat_id,
                    post_id = job.post_id,
                    "no tracked message for post, skipping notification"
                );
                return;
            }
            Err(err) => {
                warn!(
                    chat_id = job.chat_id,
                    post_id = job.post_id,
                    error = %err,
                    "failed to look up tracked message"
                );
                return;
            }
        };

        if let Err(err) = self
            .notifier
            .edit_message(job.chat_id, message_id, text, markup)
            .await
        {
            warn!(
                chat_id = job.chat_id,
                message_id,
                error = %err,
                "failed to edit message"
            );
        }
    }
}


#[cfg(test)]
trait TrackerTestExt {
    async fn wait_idle_for_test(&self);
}

#[cfg(test)]
impl TrackerTestExt for TaskTracker {
    /// Waits for in-flight tasks without closing the tracker, so a test can
    /// spawn again afterwards.
    async fn wait_idle_for_test(&self) {
        while !self.is_empty() {
            tokio::task::yield_now().await;
        }
    }
}
