//! PostgreSQL adapters
//!
//! Every store wraps a [`PgStore`], which runs statements either on the pool
//! or on the transaction it is bound to.

pub mod comment_repository;
pub mod migrations;
pub mod pool;
pub mod post_repository;
pub mod replica_repository;
pub mod transaction;

pub use comment_repository::PostgresCommentRepository;
pub use migrations::{run_comments_migrations, run_posts_migrations};
pub use pool::{DatabasePool, DatabasePoolConfig, PoolError};
pub use post_repository::PostgresPostRepository;
pub use replica_repository::PostgresReplicaRepository;
pub use transaction::{PgStore, PgTransactionHandle, StoreError};
