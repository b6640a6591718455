//! Replication of posts into the comments service.
//!
//! [`ReplicationSubscriber`] holds one durable queue subscription per post
//! subject and hands each delivery to [`ReplicationApplier`], which decodes
//! it and writes the replica. Messages are acknowledged only after the
//! replica write succeeded.

mod applier;
mod subscriber;

pub use applier::{ApplyError, ApplyOutcome, ReplicationApplier};
pub use subscriber::{DeliveryOutcome, ReplicationSubscriber, SubscriberHandle, SubscriberSettings};
