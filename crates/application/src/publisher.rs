//! Publishes post events after the write that produced them has committed.

use std::sync::Arc;

use agora_domain::codec::PayloadCodec;
use agora_domain::events::PostEvent;
use agora_domain::messaging::MessageBroker;
use agora_domain::{DomainError, Result};
use tracing::{info, instrument, warn};

#[derive(Clone)]
pub struct PostEventPublisher {
    broker: Arc<dyn MessageBroker>,
    codec: Arc<dyn PayloadCodec>,
}

impl PostEventPublisher {
    pub fn new(broker: Arc<dyn MessageBroker>, codec: Arc<dyn PayloadCodec>) -> Self {
        Self { broker, codec }
    }

    /// Encode and publish synchronously.
    ///
    /// There is no retry: a failure is returned to the caller even though the
    /// write it describes is already committed.
    #[instrument(skip(self, event), fields(subject = event.subject(), post_id = %event.post_id()))]
    pub async fn publish(&self, event: &PostEvent) -> Result<()> {
        let subject = event.subject();

        let payload = self.codec.encode(event).map_err(|e| DomainError::Publish {
            subject: subject.to_string(),
            message: e.to_string(),
        })?;

        self.broker.publish(subject, payload).await.map_err(|e| {
            warn!(error = %e, "Post event not published; the local write stays committed");
            DomainError::Publish {
                subject: subject.to_string(),
                message: e.to_string(),
            }
        })?;

        info!(codec = self.codec.codec_id(), "Post event published");
        Ok(())
    }
}
