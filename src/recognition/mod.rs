use axum::async_trait;
use serde::Deserialize;

use crate::error::AppError;
use crate::posts::repo::Ingredient;

pub mod client;
pub mod prompts;

pub use client::OpenAiRecognizer;
pub use prompts::Locale;

/// What the image stage reports before any nutrition lookup happens.
#[derive(Debug, Clone, Deserialize)]
pub struct ImageAnalysis {
    #[serde(rename = "dish")]
    pub dish_name: String,
    #[serde(rename = "spam")]
    pub is_spam: bool,
    pub tags: Vec<String>,
    pub ingredients: Vec<RecognizedIngredient>,
    #[serde(default)]
    pub health_rating: Option<i32>,
    #[serde(default)]
    pub aesthetic_rating: Option<i32>,
}

/// An ingredient as seen on the photo: name plus estimated grams.
#[derive(Debug, Clone, Deserialize)]
pub struct RecognizedIngredient {
    pub name: String,
    pub amount: f64,
}

#[async_trait]
pub trait Recognizer: Send + Sync {
    /// Image stage. Verifies the photo is retrievable (bounded retries)
    /// before issuing the model call.
    async fn analyze_image(
        &self,
        locale: Locale,
        image_url: &str,
        caption: Option<&str>,
    ) -> Result<ImageAnalysis, AppError>;

    /// Nutrition stage, fed with the formatted output of the image stage.
    async fn analyze_nutrition(
        &self,
        locale: Locale,
        description: &str,
    ) -> Result<Vec<Ingredient>, AppError>;
}

/// Renders the recognized ingredient list as the prompt for the nutrition
/// stage. Amounts are whole grams; quotes and newlines would break the
/// request body, so they are stripped.
pub fn format_ingredients(locale: Locale, ingredients: &[RecognizedIngredient]) -> String {
    let mut out = String::new();
    for ing in ingredients {
        let line = match locale {
            Locale::Ru => format!(
                "Ингредиент: {}, Количество: {} грамм. ",
                ing.name, ing.amount as i64
            ),
            Locale::En => format!(
                "Ingredient: {}, Amount: {} grams. ",
                ing.name, ing.amount as i64
            ),
        };
        out.push_str(&line);
    }

    out.retain(|c| c != '"' && c != '\n' && c != '\r');
    out.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ing(name: &str, amount: f64) -> RecognizedIngredient {
        RecognizedIngredient {
            name: name.into(),
            amount,
        }
    }

    #[test]
    fn formats_english_with_truncated_grams() {
        let s = format_ingredients(Locale::En, &[ing("pasta", 200.9), ing("cheese", 30.2)]);
        assert_eq!(
            s,
            "Ingredient: pasta, Amount: 200 grams. Ingredient: cheese, Amount: 30 grams."
        );
    }

    #[test]
    fn formats_russian() {
        let s = format_ingredients(Locale::Ru, &[ing("рис", 150.0)]);
        assert_eq!(s, "Ингредиент: рис, Количество: 150 грамм.");
    }

    #[test]
    fn strips_quotes_and_newlines() {
        let s = format_ingredients(Locale::En, &[ing("\"fancy\"\ntoast", 50.0)]);
        assert!(!s.contains('"'));
        assert!(!s.contains('\n'));
    }

    #[test]
    fn empty_list_formats_to_empty_string() {
        assert_eq!(format_ingredients(Locale::En, &[]), "");
    }
}
