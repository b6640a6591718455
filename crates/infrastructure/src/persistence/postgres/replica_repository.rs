//! PostgreSQL replica of posts in the comments database.
//!
//! Each write is a single statement, so concurrent appliers rely on row
//! locking alone. `rows_affected` tells an applied write from a no-op.
//! Deleted ids are kept in `deleted_posts` and never inserted again.

use agora_domain::posts::Post;
use agora_domain::replica::{ReplicaRepository, ReplicaWrite};
use agora_domain::{PostId, Result};
use async_trait::async_trait;
use tracing::debug;

use super::post_repository::{PostRow, POST_COLUMNS};
use super::transaction::PgStore;

#[derive(Debug, Clone)]
pub struct PostgresReplicaRepository {
    store: PgStore,
}

impl PostgresReplicaRepository {
    pub fn new(store: PgStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ReplicaRepository for PostgresReplicaRepository {
    async fn insert(&self, post: &Post) -> Result<ReplicaWrite> {
        let result = self
            .store
            .execute(
                sqlx::query(
                    r#"
                    INSERT INTO posts (id, title, description, user_id, date_created, date_updated)
                    SELECT $1, $2, $3, $4, $5, $6
                    WHERE NOT EXISTS (SELECT 1 FROM deleted_posts WHERE id = $1)
                    ON CONFLICT (id) DO NOTHING
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

        if result.rows_affected() > 0 {
            return Ok(ReplicaWrite::Applied);
        }

        let tombstone = self
            .store
            .fetch_optional(
                sqlx::query_as::<_, (String,)>("SELECT id FROM deleted_posts WHERE id = $1")
                    .bind(post.id.as_str()),
            )
            .await?;
        if tombstone.is_some() {
            debug!(post_id = %post.id, "Replica insert skipped for deleted post");
            return Ok(ReplicaWrite::Tombstoned);
        }
        debug!(post_id = %post.id, "Replica row already present");
        Ok(ReplicaWrite::AlreadyPresent)
    }

    async fn update(&self, post: &Post) -> Result<ReplicaWrite> {
        let result = self
            .store
            .execute(
                sqlx::query(
                    r#"
                    UPDATE posts
                    SET title = $2, description = $3, user_id = $4, date_updated = $5
                    WHERE id = $1
                    "#,
                )
                .bind(post.id.as_str())
                .bind(&post.title)
                .bind(&post.description)
                .bind(post.user_id.as_str())
                .bind(post.date_updated),
            )
            .await?;

        Ok(if result.rows_affected() == 0 {
            ReplicaWrite::Missing
        } else {
            ReplicaWrite::Applied
        })
    }

    async fn delete(&self, post_id: &PostId) -> Result<ReplicaWrite> {
        let result = self
            .store
            .execute(
                sqlx::query(
                    r#"
                    WITH tombstone AS (
                        INSERT INTO deleted_posts (id) VALUES ($1)
                        ON CONFLICT (id) DO NOTHING
                    )
                    DELETE FROM posts WHERE id = $1
                    "#,
                )
                .bind(post_id.as_str()),
            )
            .await?;

        Ok(if result.rows_affected() == 0 {
            ReplicaWrite::Missing
        } else {
            ReplicaWrite::Applied
        })
    }

    async fn find_by_id(&self, post_id: &PostId) -> Result<Option<Post>> {
        let sql = format!("SELECT {POST_COLUMNS} FROM posts WHERE id = $1");
        let row = self
            .store
            .fetch_optional(sqlx::query_as::<_, PostRow>(&sql).bind(post_id.as_str()))
            .await?;
        Ok(row.map(Post::from))
    }
}
