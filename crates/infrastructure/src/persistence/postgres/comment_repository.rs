//! PostgreSQL Comment Repository
//!
//! Comments live next to the replicated `posts` table in the comments
//! database, which is what makes [`CommentRepository::query_post_comments`]
//! a plain outer join.

use agora_domain::comments::{Comment, CommentRepository, PostComment};
use agora_domain::posts::{page_offset, Post};
use agora_domain::{CommentId, DomainError, PostId, Result, UserId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::FromRow;

use super::post_repository::PostRow;
use super::transaction::{impl_pg_transactional, PgStore};

const COMMENT_COLUMNS: &str = "id, description, post_id, user_id, date_created, date_updated";

#[derive(Debug, FromRow)]
struct CommentRow {
    id: String,
    description: String,
    post_id: String,
    user_id: String,
    date_created: DateTime<Utc>,
    date_updated: DateTime<Utc>,
}

impl From<CommentRow> for Comment {
    fn from(row: CommentRow) -> Self {
        Comment {
            id: CommentId::from_string(row.id),
            description: row.description,
            post_id: PostId::from_string(row.post_id),
            user_id: UserId::from_string(row.user_id),
            date_created: row.date_created,
            date_updated: row.date_updated,
        }
    }
}

/// One row of the post/comment outer join; comment columns are NULL when the
/// post has no comments.
#[derive(Debug, FromRow)]
struct PostCommentRow {
    #[sqlx(flatten)]
    post: PostRow,
    comment_id: Option<String>,
    comment_description: Option<String>,
    comment_user_id: Option<String>,
    comment_date_created: Option<DateTime<Utc>>,
    comment_date_updated: Option<DateTime<Utc>>,
}

impl From<PostCommentRow> for PostComment {
    fn from(row: PostCommentRow) -> Self {
        let post = Post::from(row.post);
        let comment = match (
            row.comment_id,
            row.comment_description,
            row.comment_user_id,
            row.comment_date_created,
            row.comment_date_updated,
        ) {
            (Some(id), Some(description), Some(user_id), Some(created), Some(updated)) => {
                Some(Comment {
                    id: CommentId::from_string(id),
                    description,
                    post_id: post.id.clone(),
                    user_id: UserId::from_string(user_id),
                    date_created: created,
                    date_updated: updated,
                })
            }
            _ => None,
        };
        PostComment { post, comment }
    }
}

#[derive(Debug, Clone)]
pub struct PostgresCommentRepository {
    store: PgStore,
}

impl PostgresCommentRepository {
    pub fn new(store: PgStore) -> Self {
        Self { store }
    }

    async fn select_where(&self, filter: &str, value: &str) -> Result<Vec<Comment>> {
        let sql = format!(
            "SELECT {COMMENT_COLUMNS} FROM comments WHERE {filter} = $1 ORDER BY date_created, id"
        );
        let rows = self
            .store
            .fetch_all(sqlx::query_as::<_, CommentRow>(&sql).bind(value))
            .await?;
        Ok(rows.into_iter().map(Comment::from).collect())
    }
}

impl_pg_transactional!(PostgresCommentRepository);

#[async_trait]
impl CommentRepository for PostgresCommentRepository {
    async fn create(&self, comment: &Comment) -> Result<()> {
        self.store
            .execute(
                sqlx::query(
                    r#"
                    INSERT INTO comments (id, description, post_id, user_id, date_created, date_updated)
                    VALUES ($1, $2, $3, $4, $5, $6)
                    "#,
                )
                .bind(comment.id.as_str())
                .bind(&comment.description)
                .bind(comment.post_id.as_str())
                .bind(comment.user_id.as_str())
                .bind(comment.date_created)
                .bind(comment.date_updated),
            )
            .await?;
        Ok(())
    }

    async fn update(&self, comment: &Comment) -> Result<()> {
        let result = self
            .store
            .execute(
                sqlx::query(
                    "UPDATE comments SET description = $2, date_updated = $3 WHERE id = $1",
                )
                .bind(comment.id.as_str())
                .bind(&comment.description)
                .bind(comment.date_updated),
            )
            .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::CommentNotFound {
                comment_id: comment.id.clone(),
            });
        }
        Ok(())
    }

    async fn delete(&self, comment_id: &CommentId) -> Result<bool> {
        let result = self
            .store
            .execute(sqlx::query("DELETE FROM comments WHERE id = $1").bind(comment_id.as_str()))
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn query(&self, page_number: u32, rows_per_page: u32) -> Result<Vec<Comment>> {
        let sql = format!(
            "SELECT {COMMENT_COLUMNS} FROM comments ORDER BY date_created, id OFFSET $1 ROWS FETCH NEXT $2 ROWS ONLY"
        );
        let rows = self
            .store
            .fetch_all(
                sqlx::query_as::<_, CommentRow>(&sql)
                    .bind(page_offset(page_number, rows_per_page) as i64)
                    .bind(i64::from(rows_per_page)),
            )
            .await?;
        Ok(rows.into_iter().map(Comment::from).collect())
    }

    async fn query_by_id(&self, comment_id: &CommentId) -> Result<Comment> {
        let sql = format!("SELECT {COMMENT_COLUMNS} FROM comments WHERE id = $1");
        self.store
            .fetch_optional(sqlx::query_as::<_, CommentRow>(&sql).bind(comment_id.as_str()))
            .await?
            .map(Comment::from)
            .ok_or_else(|| DomainError::CommentNotFound {
                comment_id: comment_id.clone(),
            })
    }

    async fn query_by_user_id(&self, user_id: &UserId) -> Result<Vec<Comment>> {
        self.select_where("user_id", user_id.as_str()).await
    }

    async fn query_by_post_id(&self, post_id: &PostId) -> Result<Vec<Comment>> {
        self.select_where("post_id", post_id.as_str()).await
    }

    async fn query_post_comments(&self, post_id: &PostId) -> Result<Vec<PostComment>> {
        let rows = self
            .store
            .fetch_all(
                sqlx::query_as::<_, PostCommentRow>(
                    r#"
                    SELECT p.id, p.title, p.description, p.user_id, p.date_created, p.date_updated,
                           c.id AS comment_id,
                           c.description AS comment_description,
                           c.user_id AS comment_user_id,
                           c.date_created AS comment_date_created,
                           c.date_updated AS comment_date_updated
                    FROM posts p
                    LEFT JOIN comments c ON c.post_id = p.id
                    WHERE p.id = $1
                    ORDER BY c.date_created, c.id
                    "#,
                )
                .bind(post_id.as_str()),
            )
            .await?;
        Ok(rows.into_iter().map(PostComment::from).collect())
    }
}
