use axum::{extract::State, Json};

use super::repo::{self, ProfileUpdate, User};
use crate::auth::AuthUser;
use crate::error::AppError;
use crate::state::AppState;

pub async fn me(
    State(state): State<AppState>,
    AuthUser { user_id, .. }: AuthUser,
) -> Result<Json<User>, AppError> {
    let user = repo::find_by_id(&state.db, user_id).await?;
    Ok(Json(user))
}

pub async fn update_me(
    State(state): State<AppState>,
    AuthUser { user_id, .. }: AuthUser,
    Json(update): Json<ProfileUpdate>,
) -> Result<Json<User>, AppError> {
    let user = repo::update_profile(&state.db, user_id, &update).await?;
    Ok(Json(user))
}
