//! Posts, comments and votes: the rules that keep them consistent and the
//! read model assembled from them.

pub mod error;
pub mod forum;
pub mod view;

pub use error::{ForumError, Result};
pub use forum::{Forum, ForumConfig};
