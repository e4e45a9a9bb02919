use axum::{routing::get, Router};

use crate::state::AppState;

pub mod handlers;
pub mod repo;

pub fn router() -> Router<AppState> {
    Router::new().route("/users/me", get(handlers::me).put(handlers::update_me))
}
