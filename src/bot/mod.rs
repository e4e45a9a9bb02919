use axum::{routing::post, Router};

use crate::state::AppState;

pub mod handlers;
pub mod update;

pub fn router() -> Router<AppState> {
    Router::new().route("/webhook/telegram", post(handlers::webhook))
}
