use axum::{routing::post, Router};

use crate::state::AppState;

pub mod extractors;
pub mod handlers;
pub mod initdata;
pub mod jwt;

pub use extractors::AuthUser;

pub fn router() -> Router<AppState> {
    Router::new().route("/auth/telegram", post(handlers::telegram_auth))
}
