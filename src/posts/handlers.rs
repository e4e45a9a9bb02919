use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use rand::Rng;
use time::{format_description::well_known::Iso8601, OffsetDateTime};

use super::dto::{
    CreatePostRequest, FeedQuery, PresignUploadRequest, PresignUploadResponse, TagsQuery,
    UpdatePostRequest,
};
use super::repo::{self, FeedPost, Post, Tag};
use crate::auth::AuthUser;
use crate::error::AppError;
use crate::pipeline::EnrichmentJob;
use crate::state::AppState;
use crate::users::repo as users;

const PRESIGN_TTL_SECS: u64 = 15 * 60;

/// REST entry point into the enrichment pipeline: creates a hidden draft
/// post from a pre-uploaded photo and detaches the AI workflow. The
/// response returns as soon as the draft is durable.
pub async fn create_post(
    State(state): State<AppState>,
    AuthUser { user_id, chat_id }: AuthUser,
    Json(req): Json<CreatePostRequest>,
) -> Result<(StatusCode, Json<Post>), AppError> {
    if req.photo.is_empty() {
        return Err(AppError::Validation("photo is required".into()));
    }

    let photo_url = state.config.public_url(&req.photo);
    let post = repo::create_post(&state.db, user_id, &photo_url, req.text.as_deref(), true).await?;

    let user = users::find_by_id(&state.db, user_id).await?;
    state.pipeline.spawn(EnrichmentJob {
        user_id,
        post_id: post.id,
        chat_id,
        locale: user.locale(),
    });

    Ok((StatusCode::CREATED, Json(post)))
}

pub async fn list_feed(
    State(state): State<AppState>,
    AuthUser { user_id, .. }: AuthUser,
    Query(q): Query<FeedQuery>,
) -> Result<Json<Vec<FeedPost>>, AppError> {
    let limit = q.limit.unwrap_or(50).clamp(1, 100);
    let offset = q.offset.unwrap_or(0).max(0);
    let posts = repo::list_feed(&state.db, user_id, limit, offset).await?;
    Ok(Json(posts))
}

pub async fn get_post(
    State(state): State<AppState>,
    AuthUser { user_id, .. }: AuthUser,
    Path(post_id): Path<i64>,
) -> Result<Json<FeedPost>, AppError> {
    let post = repo::get_post(&state.db, user_id, post_id).await?;
    Ok(Json(post))
}

pub async fn update_post(
    State(state): State<AppState>,
    AuthUser { user_id, .. }: AuthUser,
    Path(post_id): Path<i64>,
    Json(req): Json<UpdatePostRequest>,
) -> Result<Json<Post>, AppError> {
    let post =
        repo::update_post(&state.db, user_id, post_id, req.text.as_deref(), &req.tags).await?;
    Ok(Json(post))
}

pub async fn publish_post(
    State(state): State<AppState>,
    AuthUser { user_id, .. }: AuthUser,
    Path(post_id): Path<i64>,
) -> Result<StatusCode, AppError> {
    repo::publish_post(&state.db, user_id, post_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

const REACTIONS: [&str; 3] = ["smile", "meh", "frown"];

pub async fn react(
    State(state): State<AppState>,
    AuthUser { user_id, .. }: AuthUser,
    Path((post_id, reaction)): Path<(i64, String)>,
) -> Result<StatusCode, AppError> {
    if !REACTIONS.contains(&reaction.as_str()) {
        return Err(AppError::Validation(format!(
            "invalid reaction type: {reaction}"
        )));
    }
    repo::set_reaction(&state.db, user_id, post_id, &reaction).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn drop_reaction(
    State(state): State<AppState>,
    AuthUser { user_id, .. }: AuthUser,
    Path(post_id): Path<i64>,
) -> Result<StatusCode, AppError> {
    repo::delete_reaction(&state.db, user_id, post_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_tags(
    State(state): State<AppState>,
    Query(q): Query<TagsQuery>,
) -> Result<Json<Vec<Tag>>, AppError> {
    let lang = q.lang.unwrap_or_else(|| "en".into());
    let tags = repo::list_tags(&state.db, &lang).await?;
    Ok(Json(tags))
}

/// Hands the client a presigned PUT for a fresh object key; the key comes
/// back in the create-post request.
pub async fn presign_upload(
    State(state): State<AppState>,
    AuthUser { user_id, .. }: AuthUser,
    Json(req): Json<PresignUploadRequest>,
) -> Result<Json<PresignUploadResponse>, AppError> {
    let ext = ext_from_file_name(&req.file_name)
        .ok_or_else(|| AppError::Validation("unsupported file extension".into()))?;

    let date = OffsetDateTime::now_utc()
        .date()
        .format(&Iso8601::DATE)
        .map_err(|e| AppError::Other(e.into()))?;
    let file_name = format!("{user_id}/{date}/{}.{ext}", random_string(10));

    let url = state
        .storage
        .presign_put(&file_name, PRESIGN_TTL_SECS)
        .await?;

    Ok(Json(PresignUploadResponse { url, file_name }))
}

fn ext_from_file_name(file_name: &str) -> Option<&'static str> {
    let ext = file_name.rsplit_once('.')?.1.to_ascii_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" => Some("jpg"),
        "png" => Some("png"),
        "gif" => Some("gif"),
        "webp" => Some("webp"),
        "heic" => Some("heic"),
        _ => None,
    }
}

fn random_string(n: usize) -> String {
    const LETTERS: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";
    let mut rng = rand::thread_rng();
    (0..n)
        .map(|_| LETTERS[rng.gen_range(0..LETTERS.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ext_from_file_name_validates_extension() {
        assert_eq!(ext_from_file_name("a.JPG"), Some("jpg"));
        assert_eq!(ext_from_file_name("a.jpeg"), Some("jpg"));
        assert_eq!(ext_from_file_name("photo.png"), Some("png"));
        assert_eq!(ext_from_file_name("doc.pdf"), None);
        assert_eq!(ext_from_file_name("no_extension"), None);
    }

    #[test]
    fn random_string_has_requested_length() {
        let s = random_string(10);
        assert_eq!(s.len(), 10);
        assert!(s.chars().all(|c| c.is_ascii_alphabetic()));
    }
}
