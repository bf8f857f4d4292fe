use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

/// Display fields of whoever wrote a post or comment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub username: String,
    pub id: Uuid,
}

// -- Votes --

#[derive(Debug, Error, PartialEq, Eq)]
#[error("vote value must be 1 or -1, got {0}")]
pub struct InvalidVoteValue(pub i64);

/// A single user's stance on a post. Only two values exist; "no vote" is the
/// absence of a row, never a stored zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i8", try_from = "i8")]
pub enum VoteValue {
    Up,
    Down,
}

impl VoteValue {
    pub fn as_i64(self) -> i64 {
        match self {
            Self::Up => 1,
            Self::Down => -1,
        }
    }
}

impl From<VoteValue> for i8 {
    fn from(value: VoteValue) -> Self {
        value.as_i64() as i8
    }
}

impl TryFrom<i64> for VoteValue {
    type Error = InvalidVoteValue;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Up),
            -1 => Ok(Self::Down),
            other => Err(InvalidVoteValue(other)),
        }
    }
}

impl TryFrom<i8> for VoteValue {
    type Error = InvalidVoteValue;

    fn try_from(value: i8) -> Result<Self, Self::Error> {
        Self::try_from(i64::from(value))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    pub user: Uuid,
    pub vote: VoteValue,
}

// -- Comments --

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: Uuid,
    pub author: Author,
    pub body: String,
    pub created: DateTime<Utc>,
}

// -- Posts --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostKind {
    Text,
    Link,
}

impl PostKind {
    /// Parses the wire name of a post kind. Anything but `text` or `link` is
    /// rejected.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "text" => Some(Self::Text),
            "link" => Some(Self::Link),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Link => "link",
        }
    }
}

/// Body of a post. Text posts carry free text, link posts carry a URL; the
/// store keeps either in a single payload column next to the kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PostContent {
    Text { text: String },
    Link { url: String },
}

impl PostContent {
    pub fn from_parts(kind: PostKind, payload: String) -> Self {
        match kind {
            PostKind::Text => Self::Text { text: payload },
            PostKind::Link => Self::Link { url: payload },
        }
    }

    pub fn kind(&self) -> PostKind {
        match self {
            Self::Text { .. } => PostKind::Text,
            Self::Link { .. } => PostKind::Link,
        }
    }

    pub fn payload(&self) -> &str {
        match self {
            Self::Text { text } => text,
            Self::Link { url } => url,
        }
    }
}

/// Read model of a post: the row plus its author, votes and comments, with
/// score and upvote percentage derived from the votes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Info {
    pub id: Uuid,
    pub author: Author,
    pub title: String,
    pub category: String,
    #[serde(flatten)]
    pub content: PostContent,
    pub views: i64,
    pub created: DateTime<Utc>,
    pub votes: Vec<Vote>,
    pub comments: Vec<Comment>,
    pub score: i64,
    #[serde(rename = "upvotePercentage")]
    pub upvote_percentage: u32,
}
