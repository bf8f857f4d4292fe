use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};

use agora_core::Forum;
use agora_types::api::{Claims, MessageResponse, NewComment, NewPost, PostListQuery};
use agora_types::models::{Info, VoteValue};

use crate::auth::AppState;
use crate::error::ApiError;

/// Runs a forum operation off the async runtime; every call blocks on SQLite.
async fn run<F, T>(state: &AppState, op: F) -> Result<T, ApiError>
where
    F: FnOnce(&Forum) -> agora_core::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let forum = state.forum.clone();
    let result = tokio::task::spawn_blocking(move || op(&forum))
        .await
        .map_err(|e| ApiError::Internal(format!("spawn_blocking join error: {e}")))?;
    Ok(result?)
}

// -- Reads --

/// GET /api/posts?category=&user=
pub async fn list_posts(
    State(state): State<AppState>,
    Query(query): Query<PostListQuery>,
) -> Result<Json<Vec<Info>>, ApiError> {
    let posts = run(&state, move |forum| {
        forum.query_filtered(query.category.as_deref(), query.user.as_deref())
    })
    .await?;
    Ok(Json(posts))
}

pub async fn posts_by_category(
    State(state): State<AppState>,
    Path(category): Path<String>,
) -> Result<Json<Vec<Info>>, ApiError> {
    let posts = run(&state, move |forum| forum.query_by_category(&category)).await?;
    Ok(Json(posts))
}

pub async fn posts_by_user(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<Json<Vec<Info>>, ApiError> {
    let posts = run(&state, move |forum| forum.query_by_user(&username)).await?;
    Ok(Json(posts))
}

pub async fn get_post(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
) -> Result<Json<Info>, ApiError> {
    let post = run(&state, move |forum| forum.query_by_id(&post_id)).await?;
    Ok(Json(post))
}

// -- Writes --

pub async fn create_post(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<NewPost>,
) -> Result<impl IntoResponse, ApiError> {
    let now = chrono::Utc::now();
    let post = run(&state, move |forum| forum.create_post(&claims, req, now)).await?;
    Ok((StatusCode::CREATED, Json(post)))
}

pub async fn delete_post(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(post_id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    run(&state, move |forum| forum.delete_post(&claims, &post_id)).await?;
    Ok(Json(MessageResponse {
        message: "success".into(),
    }))
}

/// POST /api/post/{post_id} adds a comment.
pub async fn create_comment(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(post_id): Path<String>,
    Json(req): Json<NewComment>,
) -> Result<impl IntoResponse, ApiError> {
    let now = chrono::Utc::now();
    let post = run(&state, move |forum| {
        forum.create_comment(&claims, &post_id, req, now)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(post)))
}

pub async fn delete_comment(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path((post_id, comment_id)): Path<(String, String)>,
) -> Result<Json<Info>, ApiError> {
    let post = run(&state, move |forum| {
        forum.delete_comment(&claims, &post_id, &comment_id)
    })
    .await?;
    Ok(Json(post))
}

// -- Votes --

pub async fn upvote(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(post_id): Path<String>,
) -> Result<Json<Info>, ApiError> {
    let post = run(&state, move |forum| forum.vote(&claims, &post_id, VoteValue::Up)).await?;
    Ok(Json(post))
}

pub async fn downvote(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(post_id): Path<String>,
) -> Result<Json<Info>, ApiError> {
    let post = run(&state, move |forum| forum.vote(&claims, &post_id, VoteValue::Down)).await?;
    Ok(Json(post))
}

pub async fn unvote(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(post_id): Path<String>,
) -> Result<Json<Info>, ApiError> {
    let post = run(&state, move |forum| forum.unvote(&claims, &post_id)).await?;
    Ok(Json(post))
}
