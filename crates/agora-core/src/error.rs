use agora_db::DbError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ForumError {
    #[error("invalid post id")]
    InvalidPostId,

    #[error("invalid comment id")]
    InvalidCommentId,

    #[error("invalid user id")]
    InvalidUserId,

    #[error("post not found")]
    PostNotFound,

    #[error("comment not found")]
    CommentNotFound,

    #[error("user not found")]
    UserNotFound,

    #[error("attempted action is not allowed")]
    Forbidden,

    #[error("new posts should be of type link or text")]
    WrongPostType,

    #[error("missing field: {0}")]
    MissingField(&'static str),

    #[error("comment body is empty")]
    EmptyComment,

    /// Unexpected storage failure, tagged with the operation that hit it.
    #[error("{context}")]
    Store {
        context: String,
        #[source]
        source: DbError,
    },
}

impl ForumError {
    /// True for failures the caller did not cause. Their detail must not
    /// reach untrusted clients.
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::Store { .. })
    }
}

pub type Result<T> = std::result::Result<T, ForumError>;

pub(crate) trait StoreContext<T> {
    fn store_context<F>(self, context: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> StoreContext<T> for std::result::Result<T, DbError> {
    fn store_context<F>(self, context: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|source| ForumError::Store {
            context: context(),
            source,
        })
    }
}
