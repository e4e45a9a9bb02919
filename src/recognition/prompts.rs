//! Per-locale prompt material for both recognition stages. The tables are
//! immutable process-wide data; unsupported locale codes fall back to
//! English.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Locale {
    En,
    Ru,
}

impl Locale {
    /// Two-letter hint from Telegram or the API. Anything unrecognized is
    /// treated as English.
    pub fn parse(code: &str) -> Self {
        match code {
            "ru" => Locale::Ru,
            _ => Locale::En,
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Locale::En => "en",
            Locale::Ru => "ru",
        }
    }
}

impl Default for Locale {
    fn default() -> Self {
        Locale::En
    }
}

pub struct PromptSet {
    pub analyze_prompt: &'static str,
    pub analyze_description: &'static str,
    pub spam_description: &'static str,
    pub dish_description: &'static str,
    pub tags_description: &'static str,
    pub ingredients_description: &'static str,
    pub nutrition_prompt: &'static str,
    pub ingredient_name_description: &'static str,
    pub ingredient_amount_description: &'static str,
    pub ingredient_list_description: &'static str,
    pub macronutrients_description: &'static str,
    pub calories_description: &'static str,
    pub ingredient_weight_description: &'static str,
    /// Closed tag vocabulary offered to the model as an enum.
    pub tags: &'static [&'static str],
}

static EN: PromptSet = PromptSet {
    analyze_prompt: "What dish or food is displayed on this picture?",
    analyze_description: "Analyzes an image of food to determine if it's spam, identify the dish, tag the image based on its contents, and list the ingredients along with their approximate amounts.",
    spam_description: "Indicates whether the image is considered spam or irrelevant to the task",
    dish_description: "The identified main dish in the image.",
    tags_description: "Tags that describe the dish displayed in the photo based on dietary preferences, ingredients, or taste profiles.",
    ingredients_description: "List all visible ingredients and estimate the approximate amount of each in grams, using standard objects in the photo such as utensils or dishware for scale.",
    nutrition_prompt: "Analyzing the nutritional information of the food and provide insights on the calories, macronutrients, and dietary information.",
    ingredient_name_description: "Name of the ingredient",
    ingredient_amount_description: "Approximate amount of the ingredient in grams",
    ingredient_list_description: "List of ingredients with their nutritional information.",
    macronutrients_description: "Breakdown of macronutrients in grams for this ingredient.",
    calories_description: "Calories for this ingredient.",
    ingredient_weight_description: "Weight of the ingredient in grams",
    tags: &[
        "vegan",
        "gluten-free",
        "high-protein",
        "low-carb",
        "paleo",
        "dairy-free",
        "vegetarian",
        "sugar-free",
        "low-fat",
        "mediterranean",
        "high-fiber",
    ],
};

static RU: PromptSet = PromptSet {
    analyze_prompt: "Какое блюдо или продукт изображены на этой картинке?",
    analyze_description: "Анализ изображения с едой для определения, является ли оно спамом, идентификации блюда, маркировки изображения по содержанию и перечисления ингредиентов вместе с их приблизительным количеством.",
    spam_description: "Указывает, считается ли изображение спамом или не относящимся к задаче",
    dish_description: "Определенное основное блюдо на изображении.",
    tags_description: "Теги, описывающие блюдо на фото с учетом диетических предпочтений, ингредиентов или вкусовых профилей.",
    ingredients_description: "Перечисли все видимые ингредиенты и оцените приблизительное количество каждого в граммах, используя стандартные объекты на фото, такие как столовые приборы или посуда для масштабирования.",
    nutrition_prompt: "Проанализируй информацию о питательности продукта и предоставь данные о калориях, макронутриентах и диетической информации.",
    ingredient_name_description: "Название ингредиента",
    ingredient_amount_description: "Приблизительное количество ингредиента в граммах",
    ingredient_list_description: "Список ингредиентов с их питательной информацией.",
    macronutrients_description: "Разбивка макронутриентов в граммах для этого ингредиента.",
    calories_description: "Калории для этого ингредиента.",
    ingredient_weight_description: "Вес ингредиента в граммах",
    tags: &[
        "веган",
        "без глютена",
        "богатый белком",
        "низкоуглеводный",
        "палео",
        "без лактозы",
        "вегетарианский",
        "без сахара",
        "низкожирный",
        "средиземноморский",
        "богатый клетчаткой",
    ],
};

pub fn prompts(locale: Locale) -> &'static PromptSet {
    match locale {
        Locale::En => &EN,
        Locale::Ru => &RU,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_locale_falls_back_to_english() {
        assert_eq!(Locale::parse("de"), Locale::En);
        assert_eq!(Locale::parse(""), Locale::En);
        assert_eq!(Locale::parse("en"), Locale::En);
        assert_eq!(Locale::parse("ru"), Locale::Ru);
    }

    #[test]
    fn prompt_tables_differ_per_locale() {
        assert_ne!(
            prompts(Locale::En).analyze_prompt,
            prompts(Locale::Ru).analyze_prompt
        );
        assert_eq!(prompts(Locale::En).tags.len(), prompts(Locale::Ru).tags.len());
    }
}
