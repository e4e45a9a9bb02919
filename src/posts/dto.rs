use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct CreatePostRequest {
    /// Object key of a photo already uploaded through the presigned URL.
    pub photo: String,
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePostRequest {
    pub text: Option<String>,
    #[serde(default)]
    pub tags: Vec<i64>,
}

#[derive(Debug, Deserialize)]
pub struct FeedQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct TagsQuery {
    pub lang: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PresignUploadRequest {
    pub file_name: String,
}

#[derive(Debug, Serialize)]
pub struct PresignUploadResponse {
    pub url: String,
    pub file_name: String,
}
