use axum::{
    routing::{delete, get, post},
    Router,
};

use crate::state::AppState;

pub mod dto;
pub mod handlers;
pub mod repo;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/posts", get(handlers::list_feed).post(handlers::create_post))
        .route("/posts/:id", get(handlers::get_post).put(handlers::update_post))
        .route("/posts/:id/publish", post(handlers::publish_post))
        .route("/posts/:id/reactions/:reaction", post(handlers::react))
        .route("/posts/:id/reactions", delete(handlers::drop_reaction))
        .route("/tags", get(handlers::list_tags))
        .route("/photos/presigned", post(handlers::presign_upload))
}
