use agora_db::models::{CommentWithAuthorRow, PostRow, UserRow, VoteRow};
use agora_types::models::{Author, Comment, Info, PostContent, Vote, VoteValue};

/// Sum of all vote values.
pub fn score(votes: &[Vote]) -> i64 {
    votes.iter().map(|v| v.vote.as_i64()).sum()
}

/// Share of upvotes among all votes, 0-100, rounded down. A post without
/// votes reports 0.
pub fn upvote_percentage(votes: &[Vote]) -> u32 {
    if votes.is_empty() {
        return 0;
    }
    let up = votes.iter().filter(|v| v.vote == VoteValue::Up).count();
    (up * 100 / votes.len()) as u32
}

pub(crate) fn author_from_row(user: UserRow) -> Author {
    Author {
        username: user.username,
        id: user.id,
    }
}

pub(crate) fn assemble(
    post: PostRow,
    author: Author,
    votes: Vec<VoteRow>,
    comments: Vec<CommentWithAuthorRow>,
) -> Info {
    let votes: Vec<Vote> = votes
        .into_iter()
        .map(|v| Vote {
            user: v.user_id,
            vote: v.value,
        })
        .collect();

    let comments = comments
        .into_iter()
        .map(|c| Comment {
            id: c.id,
            author: Author {
                username: c.author_username,
                id: c.author_id,
            },
            body: c.body,
            created: c.created_at,
        })
        .collect();

    Info {
        id: post.id,
        author,
        title: post.title,
        category: post.category,
        content: PostContent::from_parts(post.kind, post.payload),
        views: post.views,
        created: post.created_at,
        score: score(&votes),
        upvote_percentage: upvote_percentage(&votes),
        votes,
        comments,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_types::models::PostKind;
    use chrono::Utc;
    use uuid::Uuid;

    fn votes(values: &[VoteValue]) -> Vec<Vote> {
        values
            .iter()
            .map(|&vote| Vote {
                user: Uuid::new_v4(),
                vote,
            })
            .collect()
    }

    #[test]
    fn no_votes_means_zero() {
        assert_eq!(score(&[]), 0);
        assert_eq!(upvote_percentage(&[]), 0);
    }

    #[test]
    fn percentage_rounds_down() {
        let v = votes(&[VoteValue::Up, VoteValue::Up, VoteValue::Down]);
        assert_eq!(score(&v), 1);
        assert_eq!(upvote_percentage(&v), 66);

        let v = votes(&[VoteValue::Up, VoteValue::Down]);
        assert_eq!(score(&v), 0);
        assert_eq!(upvote_percentage(&v), 50);

        let v = votes(&[VoteValue::Down]);
        assert_eq!(score(&v), -1);
        assert_eq!(upvote_percentage(&v), 0);
    }

    #[test]
    fn assemble_shapes_link_posts() {
        let author_id = Uuid::new_v4();
        let post = PostRow {
            id: Uuid::new_v4(),
            author_id,
            kind: PostKind::Link,
            title: "Rust".into(),
            payload: "https://www.rust-lang.org".into(),
            category: "programming".into(),
            views: 3,
            created_at: Utc::now(),
        };
        let vote = VoteRow {
            post_id: post.id,
            user_id: author_id,
            value: VoteValue::Up,
        };
        let author = Author {
            username: "ferris".into(),
            id: author_id,
        };

        let info = assemble(post.clone(), author.clone(), vec![vote], vec![]);

        assert_eq!(info.author, author);
        assert_eq!(
            info.content,
            PostContent::Link {
                url: "https://www.rust-lang.org".into()
            }
        );
        assert_eq!(info.views, 3);
        assert_eq!(info.score, 1);
        assert_eq!(info.upvote_percentage, 100);
        assert!(info.comments.is_empty());
    }
}
