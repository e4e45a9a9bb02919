//! Localized bot strings and message formatting. Static per-locale tables
//! with the same fallback rule as the prompt tables.

use super::telegram::escape_markdown;
use crate::posts::repo::FoodInsights;
use crate::recognition::Locale;

pub struct BotStrings {
    pub welcome: &'static str,
    pub open_web_app: &'static str,
    pub getting_insights: &'static str,
    pub photo_add_error: &'static str,
    pub upload_error: &'static str,
    pub insights_not_found: &'static str,
    pub open_app: &'static str,
    pub check_in_app: &'static str,
    pub share_with_community: &'static str,
    pub spam_detected: &'static str,
    pub enrichment_failed: &'static str,
    pub user_deleted: &'static str,
    pub user_delete_failed: &'static str,
}

static EN: BotStrings = BotStrings {
    welcome: "This bot will help you track your meals and get insights about your nutrition.\nTry sending a photo",
    open_web_app: "You can open the web app by tapping the button below.",
    getting_insights: "Getting insights from the image...",
    photo_add_error: "Please send the picture as a 'Photo', not as a 'File'.",
    upload_error: "Failed to upload the image. Please try again.",
    insights_not_found: "No insights found for this image.",
    open_app: "Open",
    check_in_app: "Check the insights in the app",
    share_with_community: "Share with community",
    spam_detected: "Cannot process the image. It seems like it contains spam.",
    enrichment_failed: "Could not analyze this photo. Please try again.",
    user_deleted: "User deleted",
    user_delete_failed: "Failed to delete user",
};

static RU: BotStrings = BotStrings {
    welcome: "Этот бот поможет вам отслеживать приемы пищи и получать информацию о вашем питании.\nПопробуй отправить фото",
    open_web_app: "Вы можете открыть веб-приложение, нажав на кнопку ниже.",
    getting_insights: "Обработка в процессе...",
    photo_add_error: "Пожалуйста, отправьте изображение как 'Фото', а не как 'Файл'.",
    upload_error: "Не удалось загрузить изображение. Пожалуйста, попробуйте еще раз.",
    insights_not_found: "Для этого изображения не найдено данных.",
    open_app: "Открыть",
    check_in_app: "Проверьте результат в приложении",
    share_with_community: "Поделиться с сообществом",
    spam_detected: "Не удалось обработать изображение. Похоже, что оно содержит спам.",
    enrichment_failed: "Не удалось проанализировать фото. Пожалуйста, попробуйте еще раз.",
    user_deleted: "Пользователь удален",
    user_delete_failed: "Не удалось удалить пользователя",
};

pub fn strings(locale: Locale) -> &'static BotStrings {
    match locale {
        Locale::En => &EN,
        Locale::Ru => &RU,
    }
}

/// Body of the terminal success message: dish name plus aggregate totals.
pub fn insights_text(locale: Locale, dish_name: &str, insights: &FoodInsights) -> String {
    let dish = escape_markdown(dish_name);
    match locale {
        Locale::Ru => format!(
            "*{}*\n\nКалории: {} ккал\n\nБелки: {} г\nУглеводы: {} г\nЖиры: {} г",
            dish,
            insights.calories,
            insights.proteins,
            insights.carbohydrates,
            insights.fats
        ),
        Locale::En => format!(
            "*{}*\n\nCalories: {} kcal\n\nProteins: {} g\nCarbohydrates: {} g\nFats: {} g",
            dish,
            insights.calories,
            insights.proteins,
            insights.carbohydrates,
            insights.fats
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insights_text_contains_dish_and_totals() {
        let insights = FoodInsights {
            calories: 300,
            proteins: 10,
            fats: 2,
            carbohydrates: 55,
        };
        let text = insights_text(Locale::En, "Pasta", &insights);
        assert!(text.starts_with("*Pasta*"));
        assert!(text.contains("300 kcal"));
        assert!(text.contains("Proteins: 10 g"));
        assert!(text.contains("Carbohydrates: 55 g"));
        assert!(text.contains("Fats: 2 g"));
    }

    #[test]
    fn reset_outcome_strings_are_localized() {
        assert_eq!(strings(Locale::En).user_deleted, "User deleted");
        assert_eq!(strings(Locale::En).user_delete_failed, "Failed to delete user");
        assert_ne!(
            strings(Locale::Ru).user_deleted,
            strings(Locale::En).user_deleted
        );
        assert_ne!(
            strings(Locale::Ru).user_delete_failed,
            strings(Locale::En).user_delete_failed
        );
    }

    #[test]
    fn strings_fall_back_through_locale_parse() {
        assert_eq!(
            strings(Locale::parse("fr")).welcome,
            strings(Locale::En).welcome
        );
        assert_ne!(strings(Locale::Ru).welcome, strings(Locale::En).welcome);
    }
}
