//! Agora infrastructure layer
//!
//! Concrete adapters for the domain ports:
//! - persistence: PostgreSQL pool, transactional store, repositories and
//!   schema bootstrap
//! - messaging: NATS JetStream implementation of the message broker

pub mod messaging;
pub mod persistence;

pub use messaging::nats::{NatsBroker, NatsDelivery};
pub use persistence::postgres::{
    run_comments_migrations, run_posts_migrations, DatabasePool, DatabasePoolConfig, PgStore,
    PgTransactionHandle, PoolError, PostgresCommentRepository, PostgresPostRepository,
    PostgresReplicaRepository, StoreError,
};
