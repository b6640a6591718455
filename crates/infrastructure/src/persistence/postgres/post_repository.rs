//! PostgreSQL Post Repository
//!
//! The posts service's own `posts` table.

use agora_domain::posts::{page_offset, Post, PostRepository};
use agora_domain::{DomainError, PostId, Result, UserId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::FromRow;

use super::transaction::{impl_pg_transactional, PgStore};

pub(crate) const POST_COLUMNS: &str =
    "id, title, description, user_id, date_created, date_updated";

#[derive(Debug, FromRow)]
pub(crate) struct PostRow {
    pub id: String,
    pub title: String,
    pub description: String,
    pub user_id: String,
    pub date_created: DateTime<Utc>,
    pub date_updated: DateTime<Utc>,
}

impl From<PostRow> for Post {
    fn from(row: PostRow) -> Self {
        Post {
            id: PostId::from_string(row.id),
            title: row.title,
            description: row.description,
            user_id: UserId::from_string(row.user_id),
            date_created: row.date_created,
            date_updated: row.date_updated,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PostgresPostRepository {
    store: PgStore,
}

impl PostgresPostRepository {
    pub fn new(store: PgStore) -> Self {
        Self { store }
    }
}

impl_pg_transactional!(PostgresPostRepository);

#[async_trait]
impl PostRepository for PostgresPostRepository {
    async fn create(&self, post: &Post) -> Result<()> {
        self.store
            .execute(
                sqlx::query(
                    r#"
                    INSERT INTO posts (id, title, description, user_id, date_created, date_updated)
                    VALUES ($1, $2, $3, $4, $5, $6)
                    "#,
                )
                .bind(post.id.as_str())
                .bind(&post.title)
                .bind(&post.description)
                .bind(post.user_id.as_str())
                .bind(post.date_created)
                .bind(post.date_updated),
            )
            .await?;
        Ok(())
    }

    async fn update(&self, post: &Post) -> Result<()> {
        let result = self
            .store
            .execute(
                sqlx::query(
                    r#"
                    UPDATE posts
                    SET title = $2, description = $3, date_updated = $4
                    WHERE id = $1
                    "#,
                )
                .bind(post.id.as_str())
                .bind(&post.title)
                .bind(&post.description)
                .bind(post.date_updated),
            )
            .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::PostNotFound {
                post_id: post.id.clone(),
            });
        }
        Ok(())
    }

    async fn delete(&self, post_id: &PostId) -> Result<bool> {
        let result = self
            .store
            .execute(sqlx::query("DELETE FROM posts WHERE id = $1").bind(post_id.as_str()))
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn query(&self, page_number: u32, rows_per_page: u32) -> Result<Vec<Post>> {
        let sql = format!(
            "SELECT {POST_COLUMNS} FROM posts ORDER BY date_created, id OFFSET $1 ROWS FETCH NEXT $2 ROWS ONLY"
        );
        let rows = self
            .store
            .fetch_all(
                sqlx::query_as::<_, PostRow>(&sql)
                    .bind(page_offset(page_number, rows_per_page) as i64)
                    .bind(i64::from(rows_per_page)),
            )
            .await?;
        Ok(rows.into_iter().map(Post::from).collect())
    }

    async fn query_by_id(&self, post_id: &PostId) -> Result<Post> {
        let sql = format!("SELECT {POST_COLUMNS} FROM posts WHERE id = $1");
        self.store
            .fetch_optional(sqlx::query_as::<_, PostRow>(&sql).bind(post_id.as_str()))
            .await?
            .map(Post::from)
            .ok_or_else(|| DomainError::PostNotFound {
                post_id: post_id.clone(),
            })
    }

    async fn query_by_user_id(&self, user_id: &UserId) -> Result<Vec<Post>> {
        let sql = format!(
            "SELECT {POST_COLUMNS} FROM posts WHERE user_id = $1 ORDER BY date_created, id"
        );
        let rows = self
            .store
            .fetch_all(sqlx::query_as::<_, PostRow>(&sql).bind(user_id.as_str()))
            .await?;
        Ok(rows.into_iter().map(Post::from).collect())
    }
}
