use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;

use crate::error::AppError;
use crate::recognition::Locale;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i64,
    pub chat_id: i64,
    pub username: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub language_code: Option<String>,
    pub notifications_enabled: bool,
    pub avatar_url: Option<String>,
    pub age: Option<i32>,
    pub weight_kg: Option<f64>,
    pub height_cm: Option<i32>,
    pub goal: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl User {
    pub fn locale(&self) -> Locale {
        self.language_code
            .as_deref()
            .map(Locale::parse)
            .unwrap_or_default()
    }
}

/// Fields known at first contact (webhook or mini-app auth).
#[derive(Debug, Clone)]
pub struct NewUser {
    pub chat_id: i64,
    pub username: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub language_code: Option<String>,
    pub notifications_enabled: bool,
    pub avatar_url: Option<String>,
}

const USER_COLUMNS: &str = r#"
    id, chat_id, username, first_name, last_name, language_code,
    notifications_enabled, avatar_url, age, weight_kg, height_cm, goal,
    created_at, updated_at
"#;

pub async fn find_by_chat_id(db: &PgPool, chat_id: i64) -> Result<Option<User>, AppError> {
    let user = sqlx::query_as::<_, User>(&format!(
        r#"
        SELECT {USER_COLUMNS}
        FROM users
        WHERE chat_id = $1
        "#,
    ))
    .bind(chat_id)
    .fetch_optional(db)
    .await?;
    Ok(user)
}

pub async fn find_by_id(db: &PgPool, id: i64) -> Result<User, AppError> {
    let user = sqlx::query_as::<_, User>(&format!(
        r#"
        SELECT {USER_COLUMNS}
        FROM users
        WHERE id = $1
        "#,
    ))
    .bind(id)
    .fetch_one(db)
    .await?;
    Ok(user)
}

pub async fn create(db: &PgPool, new: &NewUser) -> Result<User, AppError> {
    let user = sqlx::query_as::<_, User>(&format!(
        r#"
        INSERT INTO users
            (chat_id, username, first_name, last_name, language_code,
             notifications_enabled, avatar_url)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING {USER_COLUMNS}
        "#,
    ))
    .bind(new.chat_id)
    .bind(&new.username)
    .bind(&new.first_name)
    .bind(&new.last_name)
    .bind(&new.language_code)
    .bind(new.notifications_enabled)
    .bind(&new.avatar_url)
    .fetch_one(db)
    .await?;
    Ok(user)
}

/// Profile fields the user can edit from the mini-app.
#[derive(Debug, Clone, Deserialize)]
pub struct ProfileUpdate {
    pub language_code: Option<String>,
    pub notifications_enabled: Option<bool>,
    pub age: Option<i32>,
    pub weight_kg: Option<f64>,
    pub height_cm: Option<i32>,
    pub goal: Option<String>,
}

pub async fn update_profile(
    db: &PgPool,
    user_id: i64,
    update: &ProfileUpdate,
) -> Result<User, AppError> {
    let user = sqlx::query_as::<_, User>(&format!(
        r#"
        UPDATE users
        SET language_code = COALESCE($1, language_code),
            notifications_enabled = COALESCE($2, notifications_enabled),
            age = COALESCE($3, age),
            weight_kg = COALESCE($4, weight_kg),
            height_cm = COALESCE($5, height_cm),
            goal = COALESCE($6, goal),
            updated_at = now()
        WHERE id = $7
        RETURNING {USER_COLUMNS}
        "#,
    ))
    .bind(&update.language_code)
    .bind(update.notifications_enabled)
    .bind(update.age)
    .bind(update.weight_kg)
    .bind(update.height_cm)
    .bind(&update.goal)
    .bind(user_id)
    .fetch_one(db)
    .await?;
    Ok(user)
}

pub async fn delete_by_id(db: &PgPool, user_id: i64) -> Result<(), AppError> {
    let res = sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(user_id)
        .execute(db)
        .await?;
    if res.rows_affected() == 0 {
        return Err(AppError::NotFound);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_with_lang(lang: Option<&str>) -> User {
        User {
            id: 1,
            chat_id: 100,
            username: "u".into(),
            first_name: None,
            last_name: None,
            language_code: lang.map(|s| s.to_string()),
            notifications_enabled: false,
            avatar_url: None,
            age: None,
            weight_kg: None,
            height_cm: None,
            goal: None,
            created_at: OffsetDateTime::now_utc(),
            updated_at: OffsetDateTime::now_utc(),
        }
    }

    #[test]
    fn locale_defaults_to_english() {
        assert_eq!(user_with_lang(None).locale(), Locale::En);
        assert_eq!(user_with_lang(Some("de")).locale(), Locale::En);
        assert_eq!(user_with_lang(Some("ru")).locale(), Locale::Ru);
    }
}
