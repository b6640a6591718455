//! Replication events.
//!
//! An event is identified by its subject; the payload carries the full post
//! for creates and updates and the bare identifier for deletes. There is no
//! envelope, version or sequence number in the payload.

use std::fmt;
use std::str::FromStr;

use agora_shared::event_topics::post_topics;

use crate::posts::Post;
use crate::shared_kernel::PostId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Created,
    Updated,
    Deleted,
}

impl EventKind {
    pub const ALL: [EventKind; 3] = [EventKind::Created, EventKind::Updated, EventKind::Deleted];

    pub fn subject(&self) -> &'static str {
        match self {
            Self::Created => post_topics::CREATED,
            Self::Updated => post_topics::UPDATED,
            Self::Deleted => post_topics::DELETED,
        }
    }

    pub fn from_subject(subject: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.subject() == subject)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.subject())
    }
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_subject(s).ok_or_else(|| format!("Unknown post event subject: {}", s))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostEvent {
    Created(Post),
    Updated(Post),
    Deleted(PostId),
}

impl PostEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Created(_) => EventKind::Created,
            Self::Updated(_) => EventKind::Updated,
            Self::Deleted(_) => EventKind::Deleted,
        }
    }

    pub fn subject(&self) -> &'static str {
        self.kind().subject()
    }

    pub fn post_id(&self) -> &PostId {
        match self {
            Self::Created(post) | Self::Updated(post) => &post.id,
            Self::Deleted(id) => id,
        }
    }
}
