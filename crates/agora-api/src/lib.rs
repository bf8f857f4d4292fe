pub mod auth;
pub mod error;
pub mod middleware;
pub mod posts;

use axum::{
    Router,
    routing::{delete, get, post},
};

use crate::auth::AppState;
use crate::middleware::require_auth;

/// REST routes for auth, posts, comments and votes.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/api/register", post(auth::register))
        .route("/api/login", post(auth::login))
        .route("/api/posts", get(posts::list_posts))
        .route("/api/posts/{category}", get(posts::posts_by_category))
        .route("/api/post/{post_id}", get(posts::get_post))
        .route("/api/user/{username}", get(posts::posts_by_user));

    let protected_routes = Router::new()
        .route("/api/posts", post(posts::create_post))
        .route("/api/post/{post_id}", post(posts::create_comment))
        .route("/api/post/{post_id}", delete(posts::delete_post))
        .route("/api/post/{post_id}/{comment_id}", delete(posts::delete_comment))
        .route("/api/post/{post_id}/upvote", get(posts::upvote))
        .route("/api/post/{post_id}/downvote", get(posts::downvote))
        .route("/api/post/{post_id}/unvote", get(posts::unvote))
        .layer(axum::middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}
