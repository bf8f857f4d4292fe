use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

use agora_core::ForumError;
use agora_types::api::MessageResponse;

use crate::middleware::AuthError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Forum(#[from] ForumError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("{0}")]
    BadRequest(&'static str),

    #[error("{0}")]
    Conflict(&'static str),

    #[error("invalid username or password")]
    InvalidLogin,

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Forum(e) => match e {
                ForumError::InvalidPostId
                | ForumError::InvalidCommentId
                | ForumError::InvalidUserId
                | ForumError::WrongPostType
                | ForumError::MissingField(_)
                | ForumError::EmptyComment => StatusCode::BAD_REQUEST,
                ForumError::PostNotFound | ForumError::CommentNotFound | ForumError::UserNotFound => {
                    StatusCode::NOT_FOUND
                }
                ForumError::Forbidden => StatusCode::FORBIDDEN,
                ForumError::Store { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Auth(_) | Self::InvalidLogin => StatusCode::UNAUTHORIZED,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Internal detail is logged, never sent to the client
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            match &self {
                Self::Forum(ForumError::Store { context, source }) => {
                    error!("{}: {}", context, source)
                }
                other => error!("{}", other),
            }
            "internal server error".to_string()
        } else {
            self.to_string()
        };

        (status, Json(MessageResponse { message })).into_response()
    }
}
