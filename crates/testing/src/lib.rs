//! # agora-testing
//!
//! Test doubles for the agora services: an in-memory durable broker with
//! queue groups, manual acknowledgment and ack-wait redelivery, in-memory
//! repositories, fixtures, and a shared PostgreSQL container.

pub mod broker;
pub mod fixtures;
pub mod postgres;
pub mod repositories;

pub use broker::{InMemoryBroker, StoredMessage};
pub use repositories::{InMemoryCommentRepository, InMemoryPostRepository, InMemoryReplicaRepository};
