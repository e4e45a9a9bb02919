use axum::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::{types::Json, FromRow, PgPool};
use time::OffsetDateTime;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Macros {
    pub proteins: f64,
    pub fats: f64,
    pub carbohydrates: f64,
}

/// A single ingredient with the nutrition estimate returned by the
/// nutrition stage. Stored on the post as a JSONB array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ingredient {
    pub name: String,
    pub weight: f64,
    pub calories: f64,
    #[serde(rename = "macronutrients")]
    pub macros: Macros,
}

/// Aggregate totals for a post, in whole kcal/grams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FoodInsights {
    pub calories: i32,
    pub proteins: i32,
    pub fats: i32,
    pub carbohydrates: i32,
}

impl FoodInsights {
    /// Sums the per-ingredient estimates and truncates each total to an
    /// integer. Truncation, not rounding: [120.7, 80.2] kcal is 200 kcal.
    pub fn from_ingredients(items: &[Ingredient]) -> Self {
        let mut calories = 0.0_f64;
        let mut proteins = 0.0_f64;
        let mut fats = 0.0_f64;
        let mut carbohydrates = 0.0_f64;

        for it in items {
            calories += it.calories;
            proteins += it.macros.proteins;
            fats += it.macros.fats;
            carbohydrates += it.macros.carbohydrates;
        }

        Self {
            calories: calories as i32,
            proteins: proteins as i32,
            fats: fats as i32,
            carbohydrates: carbohydrates as i32,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Tag {
    pub id: i64,
    pub name: String,
    pub language: String,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Post {
    pub id: i64,
    pub user_id: i64,
    pub text: Option<String>,
    pub photo_url: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
    pub hidden_at: Option<OffsetDateTime>,
    pub dish_name: Option<String>,
    pub ingredients: Option<Json<Vec<Ingredient>>>,
    pub food_insights: Option<Json<FoodInsights>>,
    pub is_spam: bool,
    pub health_rating: Option<i32>,
    pub aesthetic_rating: Option<i32>,
    pub enriched_at: Option<OffsetDateTime>,
}

impl Post {
    /// True once the pipeline has reached a terminal state for this post.
    pub fn is_enriched(&self) -> bool {
        self.is_spam || self.enriched_at.is_some()
    }
}

/// Everything the pipeline persists on success, applied in one write.
#[derive(Debug, Clone)]
pub struct EnrichmentOutcome {
    pub dish_name: String,
    pub ingredients: Vec<Ingredient>,
    pub insights: FoodInsights,
    pub tags: Vec<String>,
    pub language: String,
    pub health_rating: Option<i32>,
    pub aesthetic_rating: Option<i32>,
}

/// Persistence seam for the enrichment pipeline. The production impl runs
/// against Postgres; tests plug in an in-memory store.
#[async_trait]
pub trait PostStore: Send + Sync {
    async fn get_owned(&self, user_id: i64, post_id: i64) -> Result<Post, AppError>;
    /// Consolidated enrichment write: suggestion fields, aggregate insights
    /// and tag associations land in a single transaction so readers never
    /// observe a half-enriched post.
    async fn apply_enrichment(
        &self,
        user_id: i64,
        post_id: i64,
        outcome: &EnrichmentOutcome,
    ) -> Result<Post, AppError>;
    async fn mark_spam(&self, user_id: i64, post_id: i64) -> Result<(), AppError>;
}

pub struct PgPosts {
    pub db: PgPool,
}

const POST_COLUMNS: &str = r#"
    id, user_id, text, photo_url, created_at, updated_at, hidden_at,
    dish_name, ingredients, food_insights, is_spam,
    health_rating, aesthetic_rating, enriched_at
"#;

#[async_trait]
impl PostStore for PgPosts {
    async fn get_owned(&self, user_id: i64, post_id: i64) -> Result<Post, AppError> {
        let post = sqlx::query_as::<_, Post>(&format!(
            r#"
            SELECT {POST_COLUMNS}
            FROM posts
            WHERE id = $1 AND user_id = $2
            "#,
        ))
        .bind(post_id)
        .bind(user_id)
        .fetch_one(&self.db)
        .await?;
        Ok(post)
    }

    async fn apply_enrichment(
        &self,
        user_id: i64,
        post_id: i64,
        outcome: &EnrichmentOutcome,
    ) -> Result<Post, AppError> {
        let mut tx = self.db.begin().await?;

        let post = sqlx::query_as::<_, Post>(&format!(
            r#"
            UPDATE posts
            SET dish_name = $1,
                ingredients = $2,
                food_insights = $3,
                health_rating = $4,
                aesthetic_rating = $5,
                is_spam = FALSE,
                enriched_at = now(),
                updated_at = now()
            WHERE id = $6 AND user_id = $7
            RETURNING {POST_COLUMNS}
            "#,
        ))
        .bind(&outcome.dish_name)
        .bind(Json(&outcome.ingredients))
        .bind(Json(&outcome.insights))
        .bind(outcome.health_rating)
        .bind(outcome.aesthetic_rating)
        .bind(post_id)
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;

        // Tag rewrite is delete-then-insert inside the same transaction:
        // re-running enrichment replaces associations instead of appending.
        sqlx::query("DELETE FROM post_tags WHERE post_id = $1")
            .bind(post_id)
            .execute(&mut *tx)
            .await?;

        for name in &outcome.tags {
            let (tag_id,): (i64,) = sqlx::query_as(
                r#"
                INSERT INTO tags (name, language)
                VALUES ($1, $2)
                ON CONFLICT (name, language) DO UPDATE SET name = EXCLUDED.name
                RETURNING id
                "#,
            )
            .bind(name)
            .bind(&outcome.language)
            .fetch_one(&mut *tx)
            .await?;

            sqlx::query(
                r#"
                INSERT INTO post_tags (post_id, tag_id)
                VALUES ($1, $2)
                ON CONFLICT DO NOTHING
                "#,
            )
            .bind(post_id)
            .bind(tag_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(post)
    }

    async fn mark_spam(&self, user_id: i64, post_id: i64) -> Result<(), AppError> {
        let res = sqlx::query(
            r#"
            UPDATE posts
            SET is_spam = TRUE, updated_at = now()
            WHERE id = $1 AND user_id = $2
            "#,
        )
        .bind(post_id)
        .bind(user_id)
        .execute(&self.db)
        .await?;
        if res.rows_affected() == 0 {
            return Err(AppError::NotFound);
        }
        Ok(())
    }
}

// ---- Handler-side queries ----

pub async fn create_post(
    db: &PgPool,
    user_id: i64,
    photo_url: &str,
    text: Option<&str>,
    hidden: bool,
) -> Result<Post, AppError> {
    let post = sqlx::query_as::<_, Post>(&format!(
        r#"
        INSERT INTO posts (user_id, photo_url, text, hidden_at)
        VALUES ($1, $2, $3, CASE WHEN $4 THEN now() ELSE NULL END)
        RETURNING {POST_COLUMNS}
        "#,
    ))
    .bind(user_id)
    .bind(photo_url)
    .bind(text)
    .bind(hidden)
    .fetch_one(db)
    .await?;
    Ok(post)
}

/// A feed entry: the post plus its author profile and tags.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct FeedPost {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub post: Post,
    pub author: Json<Author>,
    pub tags: Json<Vec<Tag>>,
    pub smile_count: i64,
    pub meh_count: i64,
    pub frown_count: i64,
    pub viewer_reaction: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Author {
    pub id: i64,
    pub username: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub avatar_url: Option<String>,
}

const FEED_SELECT: &str = r#"
    SELECT p.id, p.user_id, p.text, p.photo_url, p.created_at, p.updated_at,
           p.hidden_at, p.dish_name, p.ingredients, p.food_insights, p.is_spam,
           p.health_rating, p.aesthetic_rating, p.enriched_at,
           json_build_object(
               'id', u.id, 'username', u.username, 'first_name', u.first_name,
               'last_name', u.last_name, 'avatar_url', u.avatar_url
           ) AS author,
           COALESCE(
               jsonb_agg(DISTINCT jsonb_build_object('id', t.id, 'name', t.name, 'language', t.language))
                   FILTER (WHERE t.id IS NOT NULL),
               '[]'
           ) AS tags,
           COUNT(DISTINCT r.user_id) FILTER (WHERE r.type = 'smile') AS smile_count,
           COUNT(DISTINCT r.user_id) FILTER (WHERE r.type = 'meh') AS meh_count,
           COUNT(DISTINCT r.user_id) FILTER (WHERE r.type = 'frown') AS frown_count,
           MAX(r.type) FILTER (WHERE r.user_id = $1) AS viewer_reaction
    FROM posts p
    JOIN users u ON u.id = p.user_id
    LEFT JOIN post_tags pt ON pt.post_id = p.id
    LEFT JOIN tags t ON t.id = pt.tag_id
    LEFT JOIN post_reactions r ON r.post_id = p.id
"#;

/// Community feed: shared, non-spam posts, newest first.
pub async fn list_feed(
    db: &PgPool,
    viewer_id: i64,
    limit: i64,
    offset: i64,
) -> Result<Vec<FeedPost>, AppError> {
    let rows = sqlx::query_as::<_, FeedPost>(&format!(
        r#"
        {FEED_SELECT}
        WHERE p.hidden_at IS NULL AND p.is_spam = FALSE
        GROUP BY p.id, u.id
        ORDER BY p.created_at DESC
        LIMIT $2 OFFSET $3
        "#,
    ))
    .bind(viewer_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

pub async fn get_post(db: &PgPool, viewer_id: i64, post_id: i64) -> Result<FeedPost, AppError> {
    let row = sqlx::query_as::<_, FeedPost>(&format!(
        r#"
        {FEED_SELECT}
        WHERE p.id = $2
          AND (p.user_id = $1 OR (p.hidden_at IS NULL AND p.is_spam = FALSE))
        GROUP BY p.id, u.id
        "#,
    ))
    .bind(viewer_id)
    .bind(post_id)
    .fetch_one(db)
    .await?;
    Ok(row)
}

/// Owner edit: caption and tags; editing publishes the post.
pub async fn update_post(
    db: &PgPool,
    user_id: i64,
    post_id: i64,
    text: Option<&str>,
    tag_ids: &[i64],
) -> Result<Post, AppError> {
    let mut tx = db.begin().await?;

    let post = sqlx::query_as::<_, Post>(&format!(
        r#"
        UPDATE posts
        SET text = $1, hidden_at = NULL, updated_at = now()
        WHERE id = $2 AND user_id = $3
        RETURNING {POST_COLUMNS}
        "#,
    ))
    .bind(text)
    .bind(post_id)
    .bind(user_id)
    .fetch_one(&mut *tx)
    .await?;

    if !tag_ids.is_empty() {
        sqlx::query("DELETE FROM post_tags WHERE post_id = $1")
            .bind(post_id)
            .execute(&mut *tx)
            .await?;
        for tag_id in tag_ids {
            sqlx::query("INSERT INTO post_tags (post_id, tag_id) VALUES ($1, $2) ON CONFLICT DO NOTHING")
                .bind(post_id)
                .bind(tag_id)
                .execute(&mut *tx)
                .await?;
        }
    }

    tx.commit().await?;
    Ok(post)
}

/// Publishes a hidden post (the "share with community" flow).
pub async fn publish_post(db: &PgPool, user_id: i64, post_id: i64) -> Result<(), AppError> {
    let res = sqlx::query(
        r#"
        UPDATE posts
        SET hidden_at = NULL, updated_at = now()
        WHERE id = $1 AND user_id = $2
        "#,
    )
    .bind(post_id)
    .bind(user_id)
    .execute(db)
    .await?;
    if res.rows_affected() == 0 {
        return Err(AppError::NotFound);
    }
    Ok(())
}

pub async fn set_reaction(
    db: &PgPool,
    user_id: i64,
    post_id: i64,
    reaction: &str,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        INSERT INTO post_reactions (post_id, user_id, type)
        VALUES ($1, $2, $3)
        ON CONFLICT (post_id, user_id) DO UPDATE SET type = EXCLUDED.type
        "#,
    )
    .bind(post_id)
    .bind(user_id)
    .bind(reaction)
    .execute(db)
    .await?;
    Ok(())
}

pub async fn delete_reaction(db: &PgPool, user_id: i64, post_id: i64) -> Result<(), AppError> {
    let res = sqlx::query("DELETE FROM post_reactions WHERE post_id = $1 AND user_id = $2")
        .bind(post_id)
        .bind(user_id)
        .execute(db)
        .await?;
    if res.rows_affected() == 0 {
        return Err(AppError::NotFound);
    }
    Ok(())
}

pub async fn list_tags(db: &PgPool, language: &str) -> Result<Vec<Tag>, AppError> {
    let tags = sqlx::query_as::<_, Tag>(
        r#"
        SELECT id, name, language
        FROM tags
        WHERE language = $1
        ORDER BY name
        "#,
    )
    .bind(language)
    .fetch_all(db)
    .await?;
    Ok(tags)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ingredient(name: &str, calories: f64, proteins: f64, fats: f64, carbs: f64) -> Ingredient {
        Ingredient {
            name: name.into(),
            weight: 100.0,
            calories,
            macros: Macros {
                proteins,
                fats,
                carbohydrates: carbs,
            },
        }
    }

    #[test]
    fn insights_truncate_instead_of_rounding() {
        let items = vec![
            ingredient("rice", 120.7, 2.6, 0.4, 26.9),
            ingredient("chicken", 80.2, 15.1, 1.8, 0.0),
        ];
        let insights = FoodInsights::from_ingredients(&items);
        // 120.7 + 80.2 = 200.9 kcal -> 200, never 201
        assert_eq!(insights.calories, 200);
        assert_eq!(insights.proteins, 17);
        assert_eq!(insights.fats, 2);
        assert_eq!(insights.carbohydrates, 26);
    }

    #[test]
    fn insights_single_ingredient_scenario() {
        let items = vec![Ingredient {
            name: "pasta".into(),
            weight: 200.0,
            calories: 300.4,
            macros: Macros {
                proteins: 10.9,
                fats: 2.1,
                carbohydrates: 55.6,
            },
        }];
        let insights = FoodInsights::from_ingredients(&items);
        assert_eq!(
            insights,
            FoodInsights {
                calories: 300,
                proteins: 10,
                fats: 2,
                carbohydrates: 55
            }
        );
    }

    #[test]
    fn insights_empty_list_is_zero() {
        assert_eq!(
            FoodInsights::from_ingredients(&[]),
            FoodInsights {
                calories: 0,
                proteins: 0,
                fats: 0,
                carbohydrates: 0
            }
        );
    }

    #[test]
    fn ingredient_uses_provider_field_names() {
        let json = r#"{
            "name": "pasta",
            "weight": 200,
            "calories": 300.4,
            "macronutrients": {"proteins": 10.9, "fats": 2.1, "carbohydrates": 55.6}
        }"#;
        let ing: Ingredient = serde_json::from_str(json).unwrap();
        assert_eq!(ing.name, "pasta");
        assert_eq!(ing.macros.proteins, 10.9);

        let back = serde_json::to_value(&ing).unwrap();
        assert!(back.get("macronutrients").is_some());
        assert!(back.get("macros").is_none());
    }
}
