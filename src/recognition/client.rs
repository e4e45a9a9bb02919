use std::time::Duration;

use axum::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::config::OpenAiConfig;
use crate::error::AppError;
use crate::posts::repo::Ingredient;
use crate::recognition::prompts::{prompts, Locale};
use crate::recognition::{ImageAnalysis, Recognizer};

/// Waits between image-availability probes: immediate, +1s, +3s, give up.
/// The photo may still be propagating through the media store right after
/// upload.
const AVAILABILITY_DELAYS: [Duration; 3] = [
    Duration::from_secs(0),
    Duration::from_secs(1),
    Duration::from_secs(3),
];

pub struct OpenAiRecognizer {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    availability_delays: Vec<Duration>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
    finish_reason: String,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: String,
    #[serde(default)]
    refusal: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NutritionPayload {
    ingredients: Vec<Ingredient>,
}

impl OpenAiRecognizer {
    pub fn new(cfg: &OpenAiConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.request_timeout_secs))
            .build()?;
        Ok(Self {
            http,
            api_key: cfg.api_key.clone(),
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            model: cfg.model.clone(),
            availability_delays: AVAILABILITY_DELAYS.to_vec(),
        })
    }

    /// Probes the image URL until it serves HTTP 200. Called before the
    /// model request so the provider never sees a URL it cannot fetch.
    async fn check_image_available(&self, image_url: &str) -> Result<(), AppError> {
        for delay in &self.availability_delays {
            tokio::time::sleep(*delay).await;
            match self.http.get(image_url).send().await {
                Ok(resp) if resp.status().is_success() => return Ok(()),
                Ok(resp) => {
                    debug!(url = image_url, status = %resp.status(), "image not yet available");
                }
                Err(e) => {
                    debug!(url = image_url, error = %e, "image availability probe failed");
                }
            }
        }
        warn!(url = image_url, "image not available after retries");
        Err(AppError::ProviderUnavailable(format!(
            "image not available: {image_url}"
        )))
    }

    async fn send_chat(&self, body: Value) -> Result<String, AppError> {
        let resp = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::ProviderUnavailable(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AppError::ProviderUnavailable(format!(
                "unexpected status {status}: {body}"
            )));
        }

        let parsed: ChatResponse = resp
            .json()
            .await
            .map_err(|e| AppError::ResponseMalformed(e.to_string()))?;

        let Some(choice) = parsed.choices.into_iter().next() else {
            return Err(AppError::ResponseMalformed("no choices in response".into()));
        };

        if choice.finish_reason == "length" {
            return Err(AppError::TruncatedOutput);
        }
        if let Some(refusal) = choice.message.refusal {
            return Err(AppError::ModelRefused(refusal));
        }
        match choice.finish_reason.as_str() {
            "content_filter" => Err(AppError::ContentFiltered),
            "stop" => Ok(choice.message.content),
            other => Err(AppError::ResponseMalformed(format!(
                "unexpected finish reason: {other}"
            ))),
        }
    }

    fn image_request(&self, locale: Locale, image_url: &str, caption: Option<&str>) -> Value {
        let p = prompts(locale);

        let mut user_content = Vec::new();
        if let Some(caption) = caption {
            user_content.push(json!({ "type": "text", "text": caption }));
        }
        user_content.push(json!({
            "type": "image_url",
            "image_url": { "url": image_url }
        }));

        json!({
            "model": self.model,
            "messages": [
                {
                    "role": "system",
                    "content": [{ "type": "text", "text": p.analyze_prompt }]
                },
                {
                    "role": "user",
                    "content": user_content
                }
            ],
            "response_format": {
                "type": "json_schema",
                "json_schema": {
                    "name": "food_image_analysis",
                    "description": p.analyze_description,
                    "strict": true,
                    "schema": {
                        "type": "object",
                        "properties": {
                            "spam": { "type": "boolean", "description": p.spam_description },
                            "dish": { "type": "string", "description": p.dish_description },
                            "tags": {
                                "type": "array",
                                "items": { "type": "string", "enum": p.tags },
                                "description": p.tags_description
                            },
                            "ingredients": {
                                "type": "array",
                                "items": {
                                    "type": "object",
                                    "properties": {
                                        "name": { "type": "string", "description": p.ingredient_name_description },
                                        "amount": { "type": "number", "description": p.ingredient_amount_description }
                                    },
                                    "additionalProperties": false,
                                    "required": ["name", "amount"]
                                },
                                "description": p.ingredients_description
                            },
                            "health_rating": {
                                "type": "integer",
                                "description": "How healthy the dish is, from 1 to 10."
                            },
                            "aesthetic_rating": {
                                "type": "integer",
                                "description": "How visually appealing the dish is, from 1 to 10."
                            }
                        },
                        "additionalProperties": false,
                        "required": ["ingredients", "dish", "spam", "tags", "health_rating", "aesthetic_rating"]
                    }
                }
            },
            "temperature": 0.7,
            "max_tokens": 300,
            "top_p": 1,
            "frequency_penalty": 0,
            "presence_penalty": 0
        })
    }

    fn nutrition_request(&self, locale: Locale, description: &str) -> Value {
        let p = prompts(locale);

        json!({
            "model": self.model,
            "messages": [
                {
                    "role": "system",
                    "content": [{ "type": "text", "text": p.nutrition_prompt }]
                },
                {
                    "role": "user",
                    "content": [{ "type": "text", "text": description }]
                }
            ],
            "response_format": {
                "type": "json_schema",
                "json_schema": {
                    "name": "nutrition_info",
                    "strict": true,
                    "schema": {
                        "type": "object",
                        "properties": {
                            "ingredients": {
                                "type": "array",
                                "description": p.ingredient_list_description,
                                "items": {
                                    "type": "object",
                                    "properties": {
                                        "name": { "type": "string", "description": p.ingredient_name_description },
                                        "calories": { "type": "number", "description": p.calories_description },
                                        "weight": { "type": "number", "description": p.ingredient_weight_description },
                                        "macronutrients": {
                                            "type": "object",
                                            "description": p.macronutrients_description,
                                            "properties": {
                                                "carbohydrates": { "type": "number" },
                                                "proteins": { "type": "number" },
                                                "fats": { "type": "number" }
                                            },
                                            "additionalProperties": false,
                                            "required": ["carbohydrates", "proteins", "fats"]
                                        }
                                    },
                                    "additionalProperties": false,
                                    "required": ["name", "calories", "macronutrients", "weight"]
                                }
                            }
                        },
                        "additionalProperties": false,
                        "required": ["ingredients"]
                    }
                }
            },
            "temperature": 0.7,
            "max_tokens": 400,
            "top_p": 1,
            "frequency_penalty": 0,
            "presence_penalty": 0
        })
    }
}

#[async_trait]
impl Recognizer for OpenAiRecognizer {
    async fn analyze_image(
        &self,
        locale: Locale,
        image_url: &str,
        caption: Option<&str>,
    ) -> Result<ImageAnalysis, AppError> {
        debug!(url = image_url, "running image recognition");

        self.check_image_available(image_url).await?;

        let content = self
            .send_chat(self.image_request(locale, image_url, caption))
            .await?;

        let analysis: ImageAnalysis = serde_json::from_str(&content)
            .map_err(|e| AppError::ResponseMalformed(format!("image analysis payload: {e}")))?;

        debug!(
            dish = %analysis.dish_name,
            spam = analysis.is_spam,
            ingredients = analysis.ingredients.len(),
            "image recognition done"
        );
        Ok(analysis)
    }

    async fn analyze_nutrition(
        &self,
        locale: Locale,
        description: &str,
    ) -> Result<Vec<Ingredient>, AppError> {
        debug!(description, "running nutrition analysis");

        let content = self
            .send_chat(self.nutrition_request(locale, description))
            .await?;

        let payload: NutritionPayload = serde_json::from_str(&content)
            .map_err(|e| AppError::ResponseMalformed(format!("nutrition payload: {e}")))?;

        Ok(payload.ingredients)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn recognizer(server: &MockServer) -> OpenAiRecognizer {
        OpenAiRecognizer {
            http: reqwest::Client::new(),
            api_key: "sk-test".into(),
            base_url: server.uri(),
            model: "gpt-4o-2024-08-06".into(),
            // Keep the retry schedule but avoid multi-second test runs.
            availability_delays: vec![
                Duration::from_millis(0),
                Duration::from_millis(10),
                Duration::from_millis(30),
            ],
        }
    }

    fn chat_reply(content: &str, finish_reason: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{
                "message": { "role": "assistant", "content": content, "refusal": null },
                "finish_reason": finish_reason
            }]
        }))
    }

    const IMAGE_CONTENT: &str = r#"{
        "spam": false,
        "dish": "Pasta",
        "tags": ["vegetarian"],
        "ingredients": [{"name": "pasta", "amount": 200}],
        "health_rating": 6,
        "aesthetic_rating": 7
    }"#;

    #[tokio::test]
    async fn image_analysis_succeeds_when_image_is_available() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/img.jpg"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(chat_reply(IMAGE_CONTENT, "stop"))
            .mount(&server)
            .await;

        let rec = recognizer(&server);
        let url = format!("{}/img.jpg", server.uri());
        let analysis = rec
            .analyze_image(Locale::En, &url, Some("dinner"))
            .await
            .unwrap();

        assert_eq!(analysis.dish_name, "Pasta");
        assert!(!analysis.is_spam);
        assert_eq!(analysis.ingredients.len(), 1);
        assert_eq!(analysis.health_rating, Some(6));
    }

    #[tokio::test]
    async fn availability_check_retries_then_proceeds() {
        let server = MockServer::start().await;
        // First two probes fail, third succeeds; the pipeline must not
        // abort prematurely.
        Mock::given(method("GET"))
            .and(path("/img.jpg"))
            .respond_with(ResponseTemplate::new(404))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/img.jpg"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(chat_reply(IMAGE_CONTENT, "stop"))
            .mount(&server)
            .await;

        let rec = recognizer(&server);
        let url = format!("{}/img.jpg", server.uri());
        rec.analyze_image(Locale::En, &url, None).await.unwrap();

        let probes = server
            .received_requests()
            .await
            .unwrap()
            .iter()
            .filter(|r| r.url.path() == "/img.jpg")
            .count();
        assert_eq!(probes, 3);
    }

    #[tokio::test]
    async fn availability_check_gives_up_after_three_probes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/img.jpg"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let rec = recognizer(&server);
        let url = format!("{}/img.jpg", server.uri());
        let err = rec.analyze_image(Locale::En, &url, None).await.unwrap_err();
        assert!(matches!(err, AppError::ProviderUnavailable(_)));

        let probes = server.received_requests().await.unwrap().len();
        assert_eq!(probes, 3);
    }

    #[tokio::test]
    async fn default_delay_schedule_is_bounded() {
        assert_eq!(
            AVAILABILITY_DELAYS,
            [
                Duration::from_secs(0),
                Duration::from_secs(1),
                Duration::from_secs(3)
            ]
        );
    }

    #[tokio::test]
    async fn truncated_output_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(chat_reply("{\"ingredients\": []}", "length"))
            .mount(&server)
            .await;

        let rec = recognizer(&server);
        let err = rec
            .analyze_nutrition(Locale::En, "Ingredient: pasta, Amount: 200 grams.")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::TruncatedOutput));
    }

    #[tokio::test]
    async fn refusal_maps_to_model_refused() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{
                    "message": { "role": "assistant", "content": "", "refusal": "cannot help" },
                    "finish_reason": "stop"
                }]
            })))
            .mount(&server)
            .await;

        let rec = recognizer(&server);
        let err = rec.analyze_nutrition(Locale::En, "x").await.unwrap_err();
        assert!(matches!(err, AppError::ModelRefused(r) if r == "cannot help"));
    }

    #[tokio::test]
    async fn content_filter_maps_to_content_filtered() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(chat_reply("", "content_filter"))
            .mount(&server)
            .await;

        let rec = recognizer(&server);
        let err = rec.analyze_nutrition(Locale::En, "x").await.unwrap_err();
        assert!(matches!(err, AppError::ContentFiltered));
    }

    #[tokio::test]
    async fn unparseable_content_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(chat_reply("not json at all", "stop"))
            .mount(&server)
            .await;

        let rec = recognizer(&server);
        let err = rec.analyze_nutrition(Locale::En, "x").await.unwrap_err();
        assert!(matches!(err, AppError::ResponseMalformed(_)));
    }

    #[tokio::test]
    async fn empty_choices_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })))
            .mount(&server)
            .await;

        let rec = recognizer(&server);
        let err = rec.analyze_nutrition(Locale::En, "x").await.unwrap_err();
        assert!(matches!(err, AppError::ResponseMalformed(_)));
    }

    #[tokio::test]
    async fn provider_error_status_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let rec = recognizer(&server);
        let err = rec.analyze_nutrition(Locale::En, "x").await.unwrap_err();
        assert!(matches!(err, AppError::ProviderUnavailable(_)));
    }

    #[tokio::test]
    async fn nutrition_payload_parses_into_ingredients() {
        let server = MockServer::start().await;
        let content = r#"{
            "ingredients": [{
                "name": "pasta",
                "calories": 300.4,
                "weight": 200,
                "macronutrients": {"proteins": 10.9, "fats": 2.1, "carbohydrates": 55.6}
            }]
        }"#;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(chat_reply(content, "stop"))
            .mount(&server)
            .await;

        let rec = recognizer(&server);
        let out = rec
            .analyze_nutrition(Locale::En, "Ingredient: pasta, Amount: 200 grams.")
            .await
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].name, "pasta");
        assert_eq!(out[0].calories, 300.4);
        assert_eq!(out[0].macros.carbohydrates, 55.6);
    }
}
