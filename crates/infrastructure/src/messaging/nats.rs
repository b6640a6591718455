//! NATS JetStream message broker.
//!
//! All post subjects are captured by one stream named after the cluster id.
//! A durable queue subscription is a durable pull consumer filtered to one
//! subject: every instance of a service binds to the same consumer name and
//! the server hands each message to one of them. Messages are acknowledged
//! explicitly and redelivered once `ack_wait` elapses without an ack.

use std::time::Duration;

use agora_domain::config::NatsConfig;
use agora_domain::event_topics::{post_topics, stream_name};
use agora_domain::messaging::{
    BrokerError, Delivery, DeliveryStream, MessageBroker, SubscriptionOptions,
};
use async_nats::jetstream::consumer::pull::Config as PullConsumerConfig;
use async_nats::jetstream::consumer::{AckPolicy, DeliverPolicy, PullConsumer};
use async_nats::jetstream::stream::Config as StreamConfig;
use async_nats::jetstream::stream::Stream as StreamHandle;
use async_nats::jetstream::{AckKind, Context as JetStreamContext, Message};
use async_nats::{Client, ConnectOptions, HeaderMap};
use async_trait::async_trait;
use futures::StreamExt;
use tracing::{debug, info, instrument};

/// Retained messages older than this are discarded by the server.
const STREAM_MAX_AGE: Duration = Duration::from_secs(7 * 24 * 60 * 60);

#[derive(Clone)]
pub struct NatsBroker {
    client: Client,
    jetstream: JetStreamContext,
    stream: StreamHandle,
}

impl NatsBroker {
    /// Connects and makes sure the post stream exists.
    ///
    /// `dead_letter_subject` is captured by the stream as well so that
    /// dead-lettered messages are retained for inspection.
    ///
    /// # Errors
    /// Returns an error if the server cannot be reached or the stream cannot
    /// be created.
    pub async fn connect(
        config: &NatsConfig,
        dead_letter_subject: &str,
    ) -> Result<Self, BrokerError> {
        let options = ConnectOptions::new()
            .name(&config.client_id)
            .connection_timeout(Duration::from_secs(config.connect_timeout_secs));

        let urls = config.urls.join(",");
        let client = async_nats::connect_with_options(urls.as_str(), options)
            .await
            .map_err(|e| BrokerError::Connection(e.to_string()))?;
        info!(
            urls = ?config.urls,
            client_id = %config.client_id,
            "Connected to NATS"
        );

        let jetstream = async_nats::jetstream::new(client.clone());
        let stream =
            Self::ensure_stream(&jetstream, &stream_name(&config.cluster_id), dead_letter_subject)
                .await?;

        Ok(Self {
            client,
            jetstream,
            stream,
        })
    }

    async fn ensure_stream(
        jetstream: &JetStreamContext,
        name: &str,
        dead_letter_subject: &str,
    ) -> Result<StreamHandle, BrokerError> {
        let mut subjects: Vec<String> = post_topics::ALL.iter().map(|s| s.to_string()).collect();
        subjects.push(dead_letter_subject.to_string());

        let stream = jetstream
            .get_or_create_stream(StreamConfig {
                name: name.to_string(),
                subjects,
                max_age: STREAM_MAX_AGE,
                ..Default::default()
            })
            .await
            .map_err(|e| BrokerError::Connection(format!("stream {}: {}", name, e)))?;

        debug!(stream = name, "Stream ready");
        Ok(stream)
    }

    /// Flushes pending publishes and closes the connection.
    pub async fn close(&self) -> Result<(), BrokerError> {
        self.client
            .flush()
            .await
            .map_err(|e| BrokerError::Connection(e.to_string()))
    }

    async fn consumer(
        &self,
        subject: &str,
        options: &SubscriptionOptions,
    ) -> Result<PullConsumer, BrokerError> {
        let config = PullConsumerConfig {
            durable_name: Some(options.durable_name.clone()),
            filter_subject: subject.to_string(),
            deliver_policy: if options.deliver_all_available {
                DeliverPolicy::All
            } else {
                DeliverPolicy::New
            },
            ack_policy: AckPolicy::Explicit,
            ack_wait: options.ack_wait,
            max_deliver: options.max_deliver.map_or(-1, i64::from),
            ..Default::default()
        };

        self.stream
            .get_or_create_consumer(&options.durable_name, config)
            .await
            .map_err(|e| BrokerError::Subscribe {
                subject: subject.to_string(),
                message: e.to_string(),
            })
    }
}

#[async_trait]
impl MessageBroker for NatsBroker {
    #[instrument(skip(self, payload), fields(bytes = payload.len()))]
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<(), BrokerError> {
        let publish_error = |e: &dyn std::fmt::Display| BrokerError::Publish {
            subject: subject.to_string(),
            message: e.to_string(),
        };

        let ack = self
            .jetstream
            .publish(subject.to_string(), payload.into())
            .await
            .map_err(|e| publish_error(&e))?;
        ack.await.map_err(|e| publish_error(&e))?;

        debug!("Published");
        Ok(())
    }

    #[instrument(skip(self, headers, payload), fields(bytes = payload.len()))]
    async fn publish_with_headers(
        &self,
        subject: &str,
        headers: &[(&str, &str)],
        payload: Vec<u8>,
    ) -> Result<(), BrokerError> {
        let publish_error = |e: &dyn std::fmt::Display| BrokerError::Publish {
            subject: subject.to_string(),
            message: e.to_string(),
        };

        let mut header_map = HeaderMap::new();
        for (name, value) in headers {
            header_map.insert(*name, *value);
        }

        let ack = self
            .jetstream
            .publish_with_headers(subject.to_string(), header_map, payload.into())
            .await
            .map_err(|e| publish_error(&e))?;
        ack.await.map_err(|e| publish_error(&e))?;

        debug!("Published with headers");
        Ok(())
    }

    async fn durable_queue_subscribe(
        &self,
        subject: &str,
        queue_group: &str,
        options: &SubscriptionOptions,
    ) -> Result<DeliveryStream, BrokerError> {
        let consumer = self.consumer(subject, options).await?;
        let messages = consumer
            .messages()
            .await
            .map_err(|e| BrokerError::Subscribe {
                subject: subject.to_string(),
                message: e.to_string(),
            })?;

        info!(
            subject,
            queue_group,
            durable = %options.durable_name,
            "Durable queue subscription started"
        );

        let deliveries = messages.map(|result| match result {
            Ok(message) => Ok(Box::new(NatsDelivery::new(message)) as Box<dyn Delivery>),
            Err(e) => Err(BrokerError::Connection(e.to_string())),
        });
        Ok(deliveries.boxed())
    }
}

/// A JetStream message awaiting acknowledgment.
pub struct NatsDelivery {
    message: Message,
    delivered: u32,
}

impl NatsDelivery {
    fn new(message: Message) -> Self {
        // Metadata is missing only on messages that did not come from a
        // consumer; treat those as first deliveries.
        let delivered = message
            .info()
            .map(|info| u32::try_from(info.delivered).unwrap_or(u32::MAX))
            .unwrap_or(1);
        Self { message, delivered }
    }
}

#[async_trait]
impl Delivery for NatsDelivery {
    fn subject(&self) -> &str {
        self.message.subject.as_str()
    }

    fn payload(&self) -> &[u8] {
        &self.message.payload
    }

    fn delivery_count(&self) -> u32 {
        self.delivered
    }

    async fn ack(&self) -> Result<(), BrokerError> {
        self.message
            .ack()
            .await
            .map_err(|e| BrokerError::Ack(e.to_string()))
    }

    async fn term(&self) -> Result<(), BrokerError> {
        self.message
            .ack_with(AckKind::Term)
            .await
            .map_err(|e| BrokerError::Ack(e.to_string()))
    }
}
