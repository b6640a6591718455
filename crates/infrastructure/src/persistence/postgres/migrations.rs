//! Schema bootstrap
//!
//! The posts database holds `posts`. The comments database holds its own
//! `comments` plus the `posts` replica, with the same layout as the source
//! table so replicated rows are stored verbatim. Statements are idempotent;
//! running them against an existing schema changes nothing.
//!
//! `comments.post_id` has no foreign key: a comment may reference a post
//! whose `post-created` event has not been applied yet. `deleted_posts`
//! keeps the ids of replicated deletes.

use sqlx::postgres::PgPool;
use sqlx::Executor;
use tracing::info;

const POSTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS posts (
    id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    description TEXT NOT NULL,
    user_id TEXT NOT NULL,
    date_created TIMESTAMPTZ NOT NULL,
    date_updated TIMESTAMPTZ NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_posts_user_id ON posts (user_id);
"#;

const COMMENTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS comments (
    id TEXT PRIMARY KEY,
    description TEXT NOT NULL,
    post_id TEXT NOT NULL,
    user_id TEXT NOT NULL,
    date_created TIMESTAMPTZ NOT NULL,
    date_updated TIMESTAMPTZ NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_comments_post_id ON comments (post_id);
CREATE INDEX IF NOT EXISTS idx_comments_user_id ON comments (user_id);
"#;

const REPLICA_TOMBSTONES: &str = r#"
CREATE TABLE IF NOT EXISTS deleted_posts (
    id TEXT PRIMARY KEY,
    date_deleted TIMESTAMPTZ NOT NULL DEFAULT now()
);
"#;

/// Creates the posts service schema.
pub async fn run_posts_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    pool.execute(POSTS_TABLE).await?;
    info!("Posts schema ready");
    Ok(())
}

/// Creates the comments service schema, replica table included.
pub async fn run_comments_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    pool.execute(POSTS_TABLE).await?;
    pool.execute(REPLICA_TOMBSTONES).await?;
    pool.execute(COMMENTS_TABLE).await?;
    info!("Comments schema ready");
    Ok(())
}
