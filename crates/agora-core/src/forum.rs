use std::sync::Arc;

use agora_db::models::{CommentRow, PostFilter, PostRow};
use agora_db::{Database, DbError};
use agora_types::api::{Claims, NewComment, NewPost};
use agora_types::models::{Author, Info, PostContent, PostKind, VoteValue};
use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use crate::error::{ForumError, Result, StoreContext};
use crate::view;

#[derive(Debug, Clone)]
pub struct ForumConfig {
    /// Record an upvote from the author when a post is created.
    pub auto_upvote: bool,
}

impl Default for ForumConfig {
    fn default() -> Self {
        Self { auto_upvote: true }
    }
}

/// Entry point for every post, comment and vote operation. Holds no state
/// of its own; each call re-reads the store.
#[derive(Clone)]
pub struct Forum {
    db: Arc<Database>,
    config: ForumConfig,
}

impl Forum {
    pub fn new(db: Arc<Database>, config: ForumConfig) -> Self {
        Self { db, config }
    }

    // -- Posts --

    pub fn create_post(&self, claims: &Claims, new_post: NewPost, now: DateTime<Utc>) -> Result<Info> {
        let content = post_content(&new_post)?;
        if new_post.title.trim().is_empty() {
            return Err(ForumError::MissingField("title"));
        }
        if new_post.category.trim().is_empty() {
            return Err(ForumError::MissingField("category"));
        }

        let kind = content.kind();
        let post = PostRow {
            id: Uuid::new_v4(),
            author_id: claims.sub,
            kind,
            title: new_post.title,
            payload: content.payload().to_string(),
            category: new_post.category,
            views: 0,
            created_at: now,
        };

        debug!("Creating {} post {} by {}", kind.as_str(), post.id, claims.sub);
        let author_vote = self.config.auto_upvote.then_some(VoteValue::Up);
        self.db
            .insert_post(&post, author_vote)
            .store_context(|| format!("inserting post {}", post.id))?;

        self.info(post)
    }

    /// Deletes a post with its votes and comments. Returns the post as it
    /// looked right before deletion.
    pub fn delete_post(&self, claims: &Claims, post_id: &str) -> Result<Info> {
        let post_id = parse_id(post_id, ForumError::InvalidPostId)?;
        let post = self.require_post(post_id)?;

        if post.author_id != claims.sub {
            return Err(ForumError::Forbidden);
        }

        let snapshot = self.info(post)?;
        self.db
            .delete_post(post_id)
            .store_context(|| format!("deleting post {post_id}"))?;

        debug!("Post {} deleted by {}", post_id, claims.sub);
        Ok(snapshot)
    }

    pub fn query(&self) -> Result<Vec<Info>> {
        self.list(PostFilter::default())
    }

    pub fn query_by_category(&self, category: &str) -> Result<Vec<Info>> {
        self.list(PostFilter {
            category: Some(category.to_string()),
            author_id: None,
        })
    }

    pub fn query_by_user(&self, username: &str) -> Result<Vec<Info>> {
        self.query_filtered(None, Some(username))
    }

    /// Lists posts matching an optional category and an optional author
    /// username. An unknown username is `UserNotFound`.
    pub fn query_filtered(&self, category: Option<&str>, username: Option<&str>) -> Result<Vec<Info>> {
        let author_id = match username {
            Some(name) => Some(
                self.db
                    .get_user_by_name(name)
                    .store_context(|| format!("looking up user {name}"))?
                    .ok_or(ForumError::UserNotFound)?
                    .id,
            ),
            None => None,
        };

        self.list(PostFilter {
            category: category.map(str::to_string),
            author_id,
        })
    }

    pub fn query_by_id(&self, post_id: &str) -> Result<Info> {
        let post_id = parse_id(post_id, ForumError::InvalidPostId)?;
        let post = self.require_post(post_id)?;
        self.info(post)
    }

    // -- Votes --

    /// Sets the caller's vote on a post. Voting again replaces the previous
    /// value instead of adding to it.
    pub fn vote(&self, claims: &Claims, post_id: &str, value: VoteValue) -> Result<Info> {
        let post_id = parse_id(post_id, ForumError::InvalidPostId)?;
        self.require_post_exists(post_id)?;

        debug!("User {} votes {} on post {}", claims.sub, value.as_i64(), post_id);

        // UNIQUE(post_id, user_id) turns a repeat or concurrent insert into
        // DuplicateKey, which then becomes an in-place update.
        match self.db.insert_vote(post_id, claims.sub, value) {
            Ok(()) => {}
            Err(DbError::DuplicateKey) => {
                let updated = self
                    .db
                    .update_vote(post_id, claims.sub, value)
                    .store_context(|| format!("updating vote on {post_id} by {}", claims.sub))?;
                if !updated {
                    debug!("Vote on {} by {} was removed before it could be updated", post_id, claims.sub);
                }
            }
            Err(e) => {
                return Err(e).store_context(|| format!("inserting vote on {post_id} by {}", claims.sub));
            }
        }

        let post = self.require_post(post_id)?;
        self.info(post)
    }

    /// Removes the caller's vote. Without a vote this returns the post
    /// unchanged.
    pub fn unvote(&self, claims: &Claims, post_id: &str) -> Result<Info> {
        let post_id = parse_id(post_id, ForumError::InvalidPostId)?;
        let post = self.require_post(post_id)?;

        let exists = self
            .db
            .vote_exists(post_id, claims.sub)
            .store_context(|| format!("checking vote on {post_id} by {}", claims.sub))?;
        if !exists {
            return self.info(post);
        }

        self.db
            .delete_vote(post_id, claims.sub)
            .store_context(|| format!("deleting vote on {post_id} by {}", claims.sub))?;

        debug!("User {} unvoted post {}", claims.sub, post_id);
        self.info(post)
    }

    // -- Comments --

    pub fn create_comment(
        &self,
        claims: &Claims,
        post_id: &str,
        new_comment: NewComment,
        now: DateTime<Utc>,
    ) -> Result<Info> {
        let post_id = parse_id(post_id, ForumError::InvalidPostId)?;
        if new_comment.text.trim().is_empty() {
            return Err(ForumError::EmptyComment);
        }
        let post = self.require_post(post_id)?;

        let comment = CommentRow {
            id: Uuid::new_v4(),
            post_id,
            author_id: claims.sub,
            body: new_comment.text,
            created_at: now,
        };
        self.db
            .insert_comment(&comment)
            .store_context(|| format!("inserting comment on post {post_id}"))?;

        self.info(post)
    }

    pub fn delete_comment(&self, claims: &Claims, post_id: &str, comment_id: &str) -> Result<Info> {
        let post_id = parse_id(post_id, ForumError::InvalidPostId)?;
        let comment_id = parse_id(comment_id, ForumError::InvalidCommentId)?;
        let post = self.require_post(post_id)?;

        let comment = self
            .db
            .get_comment(comment_id)
            .store_context(|| format!("selecting comment {comment_id}"))?
            .filter(|c| c.post_id == post_id)
            .ok_or(ForumError::CommentNotFound)?;

        if comment.author_id != claims.sub {
            return Err(ForumError::Forbidden);
        }

        self.db
            .delete_comment(comment_id)
            .store_context(|| format!("deleting comment {comment_id}"))?;

        self.info(post)
    }

    // -- Users --

    pub fn author_by_id(&self, user_id: &str) -> Result<Author> {
        let user_id = parse_id(user_id, ForumError::InvalidUserId)?;
        self.author(user_id)
    }

    // -- Helpers --

    fn author(&self, user_id: Uuid) -> Result<Author> {
        let user = self
            .db
            .get_user_by_id(user_id)
            .store_context(|| format!("selecting user {user_id}"))?
            .ok_or(ForumError::UserNotFound)?;
        Ok(view::author_from_row(user))
    }

    fn require_post(&self, post_id: Uuid) -> Result<PostRow> {
        self.db
            .get_post(post_id)
            .store_context(|| format!("selecting post {post_id}"))?
            .ok_or(ForumError::PostNotFound)
    }

    fn require_post_exists(&self, post_id: Uuid) -> Result<()> {
        let exists = self
            .db
            .post_exists(post_id)
            .store_context(|| format!("checking post {post_id}"))?;
        if exists { Ok(()) } else { Err(ForumError::PostNotFound) }
    }

    fn list(&self, filter: PostFilter) -> Result<Vec<Info>> {
        let posts = self
            .db
            .list_posts(&filter)
            .store_context(|| format!("listing posts {filter:?}"))?;
        posts.into_iter().map(|post| self.info(post)).collect()
    }

    /// Builds the read model for a post from its current votes and comments.
    fn info(&self, post: PostRow) -> Result<Info> {
        let post_id = post.id;
        let author = self.author(post.author_id)?;
        let votes = self
            .db
            .list_votes(post_id)
            .store_context(|| format!("selecting votes of post {post_id}"))?;
        let comments = self
            .db
            .list_comments_with_author(post_id)
            .store_context(|| format!("selecting comments of post {post_id}"))?;

        Ok(view::assemble(post, author, votes, comments))
    }
}

fn parse_id(raw: &str, invalid: ForumError) -> Result<Uuid> {
    raw.parse().map_err(|_| invalid)
}

fn post_content(new_post: &NewPost) -> Result<PostContent> {
    let kind = PostKind::parse(&new_post.kind).ok_or(ForumError::WrongPostType)?;
    let content = match kind {
        PostKind::Text => PostContent::Text {
            text: new_post.text.clone().ok_or(ForumError::MissingField("text"))?,
        },
        PostKind::Link => PostContent::Link {
            url: new_post.url.clone().ok_or(ForumError::MissingField("url"))?,
        },
    };
    Ok(content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_db::models::UserRow;

    fn forum(auto_upvote: bool) -> Forum {
        let db = Database::open_in_memory().unwrap();
        Forum::new(Arc::new(db), ForumConfig { auto_upvote })
    }

    fn register(forum: &Forum, name: &str) -> Claims {
        let id = Uuid::new_v4();
        forum
            .db
            .create_user(&UserRow {
                id,
                username: name.to_string(),
                password: "hash".to_string(),
                created_at: Utc::now(),
            })
            .unwrap();
        Claims {
            sub: id,
            username: name.to_string(),
            exp: usize::MAX,
        }
    }

    fn text_post(title: &str, category: &str) -> NewPost {
        NewPost {
            kind: "text".into(),
            title: title.into(),
            category: category.into(),
            text: Some("body".into()),
            url: None,
        }
    }

    #[test]
    fn create_post_upvotes_for_author() {
        let forum = forum(true);
        let alice = register(&forum, "alice");

        let info = forum.create_post(&alice, text_post("hello", "news"), Utc::now()).unwrap();

        assert_eq!(info.author.id, alice.sub);
        assert_eq!(info.author.username, "alice");
        assert_eq!(info.score, 1);
        assert_eq!(info.upvote_percentage, 100);
        assert_eq!(info.content, PostContent::Text { text: "body".into() });
    }

    #[test]
    fn auto_upvote_can_be_disabled() {
        let forum = forum(false);
        let alice = register(&forum, "alice");

        let info = forum.create_post(&alice, text_post("hello", "news"), Utc::now()).unwrap();

        assert!(info.votes.is_empty());
        assert_eq!(info.score, 0);
        assert_eq!(info.upvote_percentage, 0);
    }

    #[test]
    fn link_post_requires_url() {
        let forum = forum(true);
        let alice = register(&forum, "alice");
        let mut post = text_post("link", "news");
        post.kind = "link".into();

        let err = forum.create_post(&alice, post.clone(), Utc::now()).unwrap_err();
        assert!(matches!(err, ForumError::MissingField("url")));

        post.url = Some("https://example.com".into());
        let info = forum.create_post(&alice, post, Utc::now()).unwrap();
        assert_eq!(info.content.kind(), PostKind::Link);
        assert_eq!(info.content.payload(), "https://example.com");
    }

    #[test]
    fn blank_title_is_rejected() {
        let forum = forum(true);
        let alice = register(&forum, "alice");

        let err = forum.create_post(&alice, text_post("  ", "news"), Utc::now()).unwrap_err();
        assert!(matches!(err, ForumError::MissingField("title")));
        assert!(forum.query().unwrap().is_empty());
    }

    #[test]
    fn malformed_ids_are_distinct_from_missing() {
        let forum = forum(true);
        let alice = register(&forum, "alice");

        assert!(matches!(forum.query_by_id("nope"), Err(ForumError::InvalidPostId)));
        assert!(matches!(
            forum.query_by_id(&Uuid::new_v4().to_string()),
            Err(ForumError::PostNotFound)
        ));
        assert!(matches!(forum.author_by_id("42"), Err(ForumError::InvalidUserId)));
        assert!(matches!(
            forum.author_by_id(&Uuid::new_v4().to_string()),
            Err(ForumError::UserNotFound)
        ));

        let post = forum.create_post(&alice, text_post("t", "c"), Utc::now()).unwrap();
        assert!(matches!(
            forum.delete_comment(&alice, &post.id.to_string(), "bad"),
            Err(ForumError::InvalidCommentId)
        ));
    }

    #[test]
    fn author_by_id_returns_display_fields() {
        let forum = forum(true);
        let alice = register(&forum, "alice");

        let author = forum.author_by_id(&alice.sub.to_string()).unwrap();
        assert_eq!(author, Author { username: "alice".into(), id: alice.sub });
    }

    #[test]
    fn voting_sets_rather_than_accumulates() {
        let forum = forum(true);
        let alice = register(&forum, "alice");
        let bob = register(&forum, "bob");
        let post = forum.create_post(&alice, text_post("t", "c"), Utc::now()).unwrap();
        let id = post.id.to_string();

        forum.vote(&bob, &id, VoteValue::Up).unwrap();
        forum.vote(&bob, &id, VoteValue::Up).unwrap();
        let info = forum.vote(&bob, &id, VoteValue::Down).unwrap();

        assert_eq!(info.votes.len(), 2);
        assert_eq!(info.score, 0);
        assert_eq!(info.upvote_percentage, 50);
    }

    #[test]
    fn vote_on_missing_post_fails() {
        let forum = forum(true);
        let bob = register(&forum, "bob");

        let err = forum.vote(&bob, &Uuid::new_v4().to_string(), VoteValue::Up).unwrap_err();
        assert!(matches!(err, ForumError::PostNotFound));
        let err = forum.unvote(&bob, &Uuid::new_v4().to_string()).unwrap_err();
        assert!(matches!(err, ForumError::PostNotFound));
    }

    #[test]
    fn mutations_reject_bad_and_unknown_post_ids() {
        let forum = forum(true);
        let alice = register(&forum, "alice");
        let existing = forum.create_post(&alice, text_post("t", "c"), Utc::now()).unwrap();
        let info = forum
            .create_comment(&alice, &existing.id.to_string(), NewComment { text: "hi".into() }, Utc::now())
            .unwrap();
        let comment_id = info.comments[0].id.to_string();

        fn check(name: &str, op: impl Fn(&str) -> Result<Info>) {
            assert!(matches!(op("not-a-uuid"), Err(ForumError::InvalidPostId)), "{name} with malformed id");
            let unknown = Uuid::new_v4().to_string();
            assert!(matches!(op(&unknown), Err(ForumError::PostNotFound)), "{name} with unknown id");
        }

        check("delete_post", |id| forum.delete_post(&alice, id));
        check("upvote", |id| forum.vote(&alice, id, VoteValue::Up));
        check("downvote", |id| forum.vote(&alice, id, VoteValue::Down));
        check("unvote", |id| forum.unvote(&alice, id));
        check("create_comment", |id| {
            forum.create_comment(&alice, id, NewComment { text: "hi".into() }, Utc::now())
        });
        check("delete_comment", |id| forum.delete_comment(&alice, id, &comment_id));

        // Nothing above touched the real post
        let after = forum.query_by_id(&existing.id.to_string()).unwrap();
        assert_eq!(after.score, 1);
        assert_eq!(after.comments.len(), 1);
    }

    #[test]
    fn failed_author_vote_leaves_no_post() {
        let forum = forum(true);
        let alice = register(&forum, "alice");
        forum
            .db
            .with_conn(|conn| {
                conn.execute_batch(
                    "CREATE TRIGGER reject_votes BEFORE INSERT ON votes
                     BEGIN SELECT RAISE(ABORT, 'votes disabled'); END;",
                )?;
                Ok(())
            })
            .unwrap();

        let err = forum.create_post(&alice, text_post("t", "c"), Utc::now()).unwrap_err();
        assert!(err.is_internal());
        assert!(forum.query().unwrap().is_empty());
    }

    #[test]
    fn empty_comment_is_rejected() {
        let forum = forum(true);
        let alice = register(&forum, "alice");
        let post = forum.create_post(&alice, text_post("t", "c"), Utc::now()).unwrap();

        let err = forum
            .create_comment(&alice, &post.id.to_string(), NewComment { text: "   ".into() }, Utc::now())
            .unwrap_err();
        assert!(matches!(err, ForumError::EmptyComment));
    }

    #[test]
    fn comment_must_belong_to_post() {
        let forum = forum(true);
        let alice = register(&forum, "alice");
        let first = forum.create_post(&alice, text_post("a", "c"), Utc::now()).unwrap();
        let second = forum.create_post(&alice, text_post("b", "c"), Utc::now()).unwrap();

        let info = forum
            .create_comment(&alice, &first.id.to_string(), NewComment { text: "hi".into() }, Utc::now())
            .unwrap();
        let comment_id = info.comments[0].id.to_string();

        let err = forum
            .delete_comment(&alice, &second.id.to_string(), &comment_id)
            .unwrap_err();
        assert!(matches!(err, ForumError::CommentNotFound));
    }

    #[test]
    fn query_by_unknown_user_fails() {
        let forum = forum(true);
        assert!(matches!(forum.query_by_user("ghost"), Err(ForumError::UserNotFound)));
    }

    #[test]
    fn store_failures_are_internal() {
        let forum = forum(true);
        // Claims for a user the store has never seen trip the foreign key
        let ghost = Claims {
            sub: Uuid::new_v4(),
            username: "ghost".into(),
            exp: usize::MAX,
        };

        let err = forum.create_post(&ghost, text_post("t", "c"), Utc::now()).unwrap_err();
        assert!(err.is_internal());
        assert!(!ForumError::Forbidden.is_internal());
    }
}
