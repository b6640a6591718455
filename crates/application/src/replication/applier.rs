use std::sync::Arc;

use agora_domain::codec::{CodecError, PayloadCodec};
use agora_domain::events::{EventKind, PostEvent};
use agora_domain::replica::{ReplicaRepository, ReplicaWrite};
use agora_domain::{DomainError, PostId};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("No post event is published on subject {0}")]
    UnknownSubject(String),

    #[error("Undecodable payload on {subject}: {source}")]
    Decode {
        subject: String,
        #[source]
        source: CodecError,
    },

    #[error("Replica write for {subject} failed: {source}")]
    Store {
        subject: String,
        #[source]
        source: DomainError,
    },
}

/// What one applied event did to the replica.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyOutcome {
    pub kind: EventKind,
    pub post_id: PostId,
    pub write: ReplicaWrite,
}

/// Applies decoded post events to the replica table.
///
/// Creates are insert-or-ignore and skip deleted posts, updates overwrite,
/// deletes tombstone the id and remove the row if present, so applying the same event any number of times leaves
/// the replica as applying it once.
pub struct ReplicationApplier {
    replica: Arc<dyn ReplicaRepository>,
    codec: Arc<dyn PayloadCodec>,
}

impl ReplicationApplier {
    pub fn new(replica: Arc<dyn ReplicaRepository>, codec: Arc<dyn PayloadCodec>) -> Self {
        Self { replica, codec }
    }

    /// Decode the payload received on `subject` and apply it.
    #[instrument(skip(self, payload), fields(bytes = payload.len()))]
    pub async fn apply(&self, subject: &str, payload: &[u8]) -> Result<ApplyOutcome, ApplyError> {
        let kind = EventKind::from_subject(subject)
            .ok_or_else(|| ApplyError::UnknownSubject(subject.to_string()))?;

        let event = self
            .codec
            .decode(kind, payload)
            .map_err(|source| ApplyError::Decode {
                subject: subject.to_string(),
                source,
            })?;

        self.apply_event(event).await
    }

    pub async fn apply_event(&self, event: PostEvent) -> Result<ApplyOutcome, ApplyError> {
        let kind = event.kind();
        let post_id = event.post_id().clone();

        let written = match &event {
            PostEvent::Created(post) => self.replica.insert(post).await,
            PostEvent::Updated(post) => self.replica.update(post).await,
            PostEvent::Deleted(id) => self.replica.delete(id).await,
        };

        let write = written.map_err(|source| ApplyError::Store {
            subject: kind.subject().to_string(),
            source,
        })?;

        match (kind, write) {
            (_, ReplicaWrite::Applied) => {
                info!(subject = %kind, post_id = %post_id, "Replica updated")
            }
            (EventKind::Created, ReplicaWrite::AlreadyPresent) => {
                debug!(post_id = %post_id, "Post already replicated, insert ignored")
            }
            (EventKind::Created, ReplicaWrite::Tombstoned) => {
                info!(post_id = %post_id, "Create for a deleted post ignored")
            }
            (EventKind::Updated, ReplicaWrite::Missing) => {
                warn!(post_id = %post_id, "Update for a post that is not replicated, skipped")
            }
            (_, other) => {
                debug!(subject = %kind, post_id = %post_id, write = ?other, "Replica unchanged")
            }
        }

        Ok(ApplyOutcome {
            kind,
            post_id,
            write,
        })
    }
}
