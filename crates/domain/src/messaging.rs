//! Durable publish/subscribe port.
//!
//! The broker behind this trait persists published messages, lets a queue
//! group share a durable consumer, and redelivers any message that was not
//! acknowledged within the ack wait.

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Publish to {subject} failed: {message}")]
    Publish { subject: String, message: String },

    #[error("Subscribe to {subject} failed: {message}")]
    Subscribe { subject: String, message: String },

    #[error("Acknowledgment failed: {0}")]
    Ack(String),

    #[error("Subscription closed")]
    Closed,
}

/// Options of a durable queue subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionOptions {
    /// Name under which the broker remembers the consumer's position.
    pub durable_name: String,
    /// Start from the first retained message when the consumer is new.
    pub deliver_all_available: bool,
    /// Redeliver a message that is still unacknowledged after this long.
    pub ack_wait: Duration,
    /// Give up redelivering after this many attempts; `None` never gives up.
    pub max_deliver: Option<u32>,
}

impl SubscriptionOptions {
    pub fn new(durable_name: impl Into<String>) -> Self {
        Self {
            durable_name: durable_name.into(),
            deliver_all_available: true,
            ack_wait: Duration::from_secs(60),
            max_deliver: None,
        }
    }

    pub fn with_ack_wait(mut self, ack_wait: Duration) -> Self {
        self.ack_wait = ack_wait;
        self
    }

    pub fn with_max_deliver(mut self, max_deliver: u32) -> Self {
        self.max_deliver = Some(max_deliver);
        self
    }
}

/// One delivery of a message. Acknowledgment is always manual.
#[async_trait]
pub trait Delivery: Send + Sync {
    fn subject(&self) -> &str;

    fn payload(&self) -> &[u8];

    /// 1 on the first delivery, incremented on every redelivery.
    fn delivery_count(&self) -> u32;

    /// Mark the message as processed; it will not be delivered again.
    async fn ack(&self) -> Result<(), BrokerError>;

    /// Stop redelivering the message without marking it processed.
    async fn term(&self) -> Result<(), BrokerError>;
}

pub type DeliveryStream = BoxStream<'static, Result<Box<dyn Delivery>, BrokerError>>;

#[async_trait]
pub trait MessageBroker: Send + Sync {
    /// Publish and wait until the broker has persisted the message.
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<(), BrokerError>;

    async fn publish_with_headers(
        &self,
        subject: &str,
        headers: &[(&str, &str)],
        payload: Vec<u8>,
    ) -> Result<(), BrokerError>;

    /// Join the durable consumer `options.durable_name` on `subject` as a
    /// member of `queue_group`. Members of one group share the messages.
    async fn durable_queue_subscribe(
        &self,
        subject: &str,
        queue_group: &str,
        options: &SubscriptionOptions,
    ) -> Result<DeliveryStream, BrokerError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscription_defaults() {
        let options = SubscriptionOptions::new("posts-post-created");
        assert!(options.deliver_all_available);
        assert_eq!(options.ack_wait, Duration::from_secs(60));
        assert_eq!(options.max_deliver, None);

        let options = options
            .with_ack_wait(Duration::from_millis(50))
            .with_max_deliver(2);
        assert_eq!(options.ack_wait, Duration::from_millis(50));
        assert_eq!(options.max_deliver, Some(2));
    }

    #[test]
    fn error_display() {
        let err = BrokerError::Publish {
            subject: "post-created".to_string(),
            message: "no responders".to_string(),
        };
        assert!(err.to_string().contains("post-created"));
    }
}
