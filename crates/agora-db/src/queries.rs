use agora_types::models::{PostKind, VoteValue};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::Database;
use crate::Result;
use crate::models::{CommentRow, CommentWithAuthorRow, PostFilter, PostRow, UserRow, VoteRow};

const POST_COLUMNS: &str = "id, author_id, kind, title, payload, category, views, created_at";

impl Database {
    // -- Users --

    pub fn create_user(&self, user: &UserRow) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, password, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![user.id.to_string(), user.username, user.password, user.created_at],
            )?;
            debug!("Created user {} ({})", user.username, user.id);
            Ok(())
        })
    }

    pub fn get_user_by_id(&self, id: Uuid) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            query_user(
                conn,
                "SELECT id, username, password, created_at FROM users WHERE id = ?1",
                &id.to_string(),
            )
        })
    }

    pub fn get_user_by_name(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            query_user(
                conn,
                "SELECT id, username, password, created_at FROM users WHERE username = ?1",
                username,
            )
        })
    }

    // -- Posts --

    /// Inserts a post and, when `author_vote` is set, the author's vote on it
    /// in the same transaction.
    pub fn insert_post(&self, post: &PostRow, author_vote: Option<VoteValue>) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO posts (id, author_id, kind, title, payload, category, views, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    post.id.to_string(),
                    post.author_id.to_string(),
                    post.kind.as_str(),
                    post.title,
                    post.payload,
                    post.category,
                    post.views,
                    post.created_at,
                ],
            )?;
            if let Some(value) = author_vote {
                tx.execute(
                    "INSERT INTO votes (post_id, user_id, vote) VALUES (?1, ?2, ?3)",
                    params![post.id.to_string(), post.author_id.to_string(), value.as_i64()],
                )?;
            }
            tx.commit()?;

            debug!("Inserted post {} by {}", post.id, post.author_id);
            Ok(())
        })
    }

    pub fn get_post(&self, id: Uuid) -> Result<Option<PostRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {POST_COLUMNS} FROM posts WHERE id = ?1");
            let row = conn
                .query_row(&sql, [id.to_string()], post_from_row)
                .optional()?;
            Ok(row)
        })
    }

    pub fn post_exists(&self, id: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            let found = conn
                .query_row("SELECT 1 FROM posts WHERE id = ?1", [id.to_string()], |_| Ok(()))
                .optional()?;
            Ok(found.is_some())
        })
    }

    /// Removes a post together with its comments and votes in one
    /// transaction. Deleting a post that does not exist is a no-op.
    pub fn delete_post(&self, id: Uuid) -> Result<()> {
        let id = id.to_string();
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let comments = tx.execute("DELETE FROM comments WHERE post_id = ?1", [&id])?;
            let votes = tx.execute("DELETE FROM votes WHERE post_id = ?1", [&id])?;
            tx.execute("DELETE FROM posts WHERE id = ?1", [&id])?;
            tx.commit()?;

            debug!("Deleted post {} ({} comments, {} votes)", id, comments, votes);
            Ok(())
        })
    }

    /// Lists posts in insertion order, narrowed by whichever filter fields
    /// are set.
    pub fn list_posts(&self, filter: &PostFilter) -> Result<Vec<PostRow>> {
        let mut conditions = Vec::new();
        let mut args = Vec::new();

        if let Some(category) = &filter.category {
            args.push(category.clone());
            conditions.push(format!("category = ?{}", args.len()));
        }
        if let Some(author_id) = filter.author_id {
            args.push(author_id.to_string());
            conditions.push(format!("author_id = ?{}", args.len()));
        }

        let mut sql = format!("SELECT {POST_COLUMNS} FROM posts");
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }
        sql.push_str(" ORDER BY rowid");

        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params_from_iter(args.iter()), post_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Votes --

    /// Fails with `DbError::DuplicateKey` when the user already voted on the
    /// post.
    pub fn insert_vote(&self, post_id: Uuid, user_id: Uuid, value: VoteValue) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO votes (post_id, user_id, vote) VALUES (?1, ?2, ?3)",
                params![post_id.to_string(), user_id.to_string(), value.as_i64()],
            )?;
            Ok(())
        })
    }

    /// Returns whether a row was updated.
    pub fn update_vote(&self, post_id: Uuid, user_id: Uuid, value: VoteValue) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE votes SET vote = ?3 WHERE post_id = ?1 AND user_id = ?2",
                params![post_id.to_string(), user_id.to_string(), value.as_i64()],
            )?;
            Ok(changed > 0)
        })
    }

    pub fn delete_vote(&self, post_id: Uuid, user_id: Uuid) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "DELETE FROM votes WHERE post_id = ?1 AND user_id = ?2",
                params![post_id.to_string(), user_id.to_string()],
            )?;
            Ok(())
        })
    }

    pub fn vote_exists(&self, post_id: Uuid, user_id: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            let found = conn
                .query_row(
                    "SELECT 1 FROM votes WHERE post_id = ?1 AND user_id = ?2",
                    params![post_id.to_string(), user_id.to_string()],
                    |_| Ok(()),
                )
                .optional()?;
            Ok(found.is_some())
        })
    }

    pub fn list_votes(&self, post_id: Uuid) -> Result<Vec<VoteRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT post_id, user_id, vote FROM votes WHERE post_id = ?1 ORDER BY rowid",
            )?;
            let rows = stmt
                .query_map([post_id.to_string()], |row| {
                    Ok(VoteRow {
                        post_id: uuid_col(row, 0)?,
                        user_id: uuid_col(row, 1)?,
                        value: vote_col(row, 2)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Comments --

    pub fn insert_comment(&self, comment: &CommentRow) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO comments (id, post_id, author_id, body, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    comment.id.to_string(),
                    comment.post_id.to_string(),
                    comment.author_id.to_string(),
                    comment.body,
                    comment.created_at,
                ],
            )?;
            debug!("Inserted comment {} on post {}", comment.id, comment.post_id);
            Ok(())
        })
    }

    pub fn get_comment(&self, id: Uuid) -> Result<Option<CommentRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, post_id, author_id, body, created_at FROM comments WHERE id = ?1",
                    [id.to_string()],
                    |row| {
                        Ok(CommentRow {
                            id: uuid_col(row, 0)?,
                            post_id: uuid_col(row, 1)?,
                            author_id: uuid_col(row, 2)?,
                            body: row.get(3)?,
                            created_at: row.get(4)?,
                        })
                    },
                )
                .optional()?;
            Ok(row)
        })
    }

    pub fn delete_comment(&self, id: Uuid) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM comments WHERE id = ?1", [id.to_string()])?;
            debug!("Deleted comment {}", id);
            Ok(())
        })
    }

    pub fn list_comments_with_author(&self, post_id: Uuid) -> Result<Vec<CommentWithAuthorRow>> {
        // JOIN users to fetch the author name in a single query
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT c.id, c.post_id, c.author_id, u.username, c.body, c.created_at
                 FROM comments c
                 JOIN users u ON c.author_id = u.id
                 WHERE c.post_id = ?1
                 ORDER BY c.rowid",
            )?;
            let rows = stmt
                .query_map([post_id.to_string()], |row| {
                    Ok(CommentWithAuthorRow {
                        id: uuid_col(row, 0)?,
                        post_id: uuid_col(row, 1)?,
                        author_id: uuid_col(row, 2)?,
                        author_username: row.get(3)?,
                        body: row.get(4)?,
                        created_at: row.get(5)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn query_user(conn: &Connection, sql: &str, key: &str) -> Result<Option<UserRow>> {
    let row = conn
        .query_row(sql, [key], |row| {
            Ok(UserRow {
                id: uuid_col(row, 0)?,
                username: row.get(1)?,
                password: row.get(2)?,
                created_at: row.get(3)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn post_from_row(row: &Row<'_>) -> rusqlite::Result<PostRow> {
    Ok(PostRow {
        id: uuid_col(row, 0)?,
        author_id: uuid_col(row, 1)?,
        kind: kind_col(row, 2)?,
        title: row.get(3)?,
        payload: row.get(4)?,
        category: row.get(5)?,
        views: row.get(6)?,
        created_at: row.get(7)?,
    })
}

#[derive(Debug, Error)]
#[error("unknown post kind {0:?}")]
struct UnknownPostKind(String);

fn uuid_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn kind_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<PostKind> {
    let raw: String = row.get(idx)?;
    PostKind::parse(&raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(UnknownPostKind(raw)))
    })
}

fn vote_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<VoteValue> {
    let raw: i64 = row.get(idx)?;
    VoteValue::try_from(raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Integer, Box::new(e)))
}
