//! Application layer: post and comment use cases plus the replication
//! pipeline that keeps the comments service's copy of posts current.

pub mod comments;
pub mod posts;
pub mod publisher;
pub mod replication;

pub use comments::CommentService;
pub use posts::PostService;
pub use publisher::PostEventPublisher;
pub use replication::{
    ApplyError, ApplyOutcome, DeliveryOutcome, ReplicationApplier, ReplicationSubscriber,
    SubscriberHandle, SubscriberSettings,
};
