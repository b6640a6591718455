//! Local replica of posts kept by the comments service.
//!
//! Only the replication applier writes here. Every write is idempotent so
//! that redelivered events leave the table as a single delivery would.
//! Deletes leave a tombstone, so a `post-created` redelivered after the
//! post's `post-deleted` does not bring the post back.

use async_trait::async_trait;

use crate::posts::Post;
use crate::shared_kernel::{PostId, Result};

/// Effect a replica write had on the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicaWrite {
    /// The row changed.
    Applied,
    /// An insert found the row already present; nothing changed.
    AlreadyPresent,
    /// An update or delete found no row; nothing changed.
    Missing,
    /// An insert found the post deleted; nothing changed.
    Tombstoned,
}

#[async_trait]
pub trait ReplicaRepository: Send + Sync {
    /// Insert the post, ignoring a conflict on its id or a tombstone.
    async fn insert(&self, post: &Post) -> Result<ReplicaWrite>;

    /// Overwrite title, description, user and `date_updated` of the row with
    /// the post's id. A missing row is left missing.
    async fn update(&self, post: &Post) -> Result<ReplicaWrite>;

    /// Tombstone the id and delete its row if it exists.
    async fn delete(&self, post_id: &PostId) -> Result<ReplicaWrite>;

    async fn find_by_id(&self, post_id: &PostId) -> Result<Option<Post>>;
}
