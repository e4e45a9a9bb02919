use axum::{
    extract::{FromRef, State},
    Json,
};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{initdata, jwt::JwtKeys};
use crate::error::AppError;
use crate::state::AppState;
use crate::users::repo::{self as users, NewUser, User};

/// Init data older than this is rejected.
const INIT_DATA_MAX_AGE_SECS: i64 = 24 * 3600;

#[derive(Debug, Deserialize)]
pub struct TelegramAuthRequest {
    pub init_data: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: User,
}

/// Mini-app login: validate signed init data, upsert the user keyed by
/// chat id, and issue a JWT.
pub async fn telegram_auth(
    State(state): State<AppState>,
    Json(req): Json<TelegramAuthRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    let data = initdata::validate(
        &req.init_data,
        &state.config.telegram.bot_token,
        INIT_DATA_MAX_AGE_SECS,
    )?;

    let user = match users::find_by_chat_id(&state.db, data.user.id).await? {
        Some(user) => user,
        None => {
            let tg = &data.user;
            let username = if tg.username.is_empty() {
                format!("u_{}", tg.id)
            } else {
                tg.username.clone()
            };
            let new = NewUser {
                chat_id: tg.id,
                username,
                first_name: non_empty(&tg.first_name),
                last_name: non_empty(&tg.last_name),
                language_code: tg.language_code.clone(),
                notifications_enabled: tg.allows_write_to_pm,
                avatar_url: Some(random_avatar_url(&state.config.cdn_url)),
            };
            let user = users::create(&state.db, &new).await?;
            info!(user_id = user.id, chat_id = user.chat_id, "user created via mini-app auth");
            user
        }
    };

    let keys = JwtKeys::from_ref(&state);
    let token = keys.sign(user.id, user.chat_id)?;

    Ok(Json(AuthResponse { token, user }))
}

fn non_empty(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

/// Stock avatar for users without a profile photo.
pub fn random_avatar_url(cdn_url: &str) -> String {
    let n = rand::thread_rng().gen_range(1..=40);
    format!("{}/avatars/{}.svg", cdn_url.trim_end_matches('/'), n)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_empty_maps_empty_to_none() {
        assert_eq!(non_empty(""), None);
        assert_eq!(non_empty("Ann"), Some("Ann".to_string()));
    }

    #[test]
    fn random_avatar_stays_in_range() {
        for _ in 0..100 {
            let url = random_avatar_url("https://cdn.test/");
            let n: u32 = url
                .trim_start_matches("https://cdn.test/avatars/")
                .trim_end_matches(".svg")
                .parse()
                .unwrap();
            assert!((1..=40).contains(&n));
        }
    }
}
