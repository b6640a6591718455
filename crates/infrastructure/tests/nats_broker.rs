//! JetStream broker against a running NATS server with JetStream enabled.
//!
//! `NATS_URL` overrides the default `nats://localhost:4222`.

use std::time::Duration;

use agora_domain::config::NatsConfig;
use agora_domain::event_topics::{durable_name, post_topics, ORIGINAL_SUBJECT_HEADER};
use agora_domain::messaging::{Delivery, MessageBroker, SubscriptionOptions};
use agora_domain::PostId;
use agora_infrastructure::NatsBroker;
use futures::StreamExt;

/// Every test shares one stream; unique queue groups keep their consumers apart.
async fn broker() -> anyhow::Result<NatsBroker> {
    let url = std::env::var("NATS_URL").unwrap_or_else(|_| "nats://localhost:4222".to_string());
    let config = NatsConfig {
        urls: vec![url],
        cluster_id: "agora-it".to_string(),
        client_id: "agora-it".to_string(),
        connect_timeout_secs: 2,
    };
    Ok(NatsBroker::connect(&config, post_topics::DEAD_LETTER).await?)
}

#[tokio::test]
#[ignore = "Requires running NATS"]
async fn unacknowledged_message_is_redelivered() -> anyhow::Result<()> {
    let group = format!("it-{}", PostId::new());
    let broker = broker().await?;
    let mut options = SubscriptionOptions::new(durable_name(&group, post_topics::CREATED))
        .with_ack_wait(Duration::from_secs(1));
    options.deliver_all_available = false;

    let mut first = broker
        .durable_queue_subscribe(post_topics::CREATED, &group, &options)
        .await?;
    broker
        .publish(post_topics::CREATED, b"payload".to_vec())
        .await?;

    let delivery = tokio::time::timeout(Duration::from_secs(5), first.next())
        .await?
        .ok_or_else(|| anyhow::anyhow!("stream ended"))??;
    assert_eq!(delivery.subject(), post_topics::CREATED);
    assert_eq!(delivery.payload(), b"payload");
    assert_eq!(delivery.delivery_count(), 1);
    drop(delivery);

    let again = tokio::time::timeout(Duration::from_secs(5), first.next())
        .await?
        .ok_or_else(|| anyhow::anyhow!("stream ended"))??;
    assert_eq!(again.payload(), b"payload");
    assert_eq!(again.delivery_count(), 2);
    again.ack().await?;
    Ok(())
}

#[tokio::test]
#[ignore = "Requires running NATS"]
async fn dead_letter_carries_headers() -> anyhow::Result<()> {
    let group = format!("it-{}", PostId::new());
    let broker = broker().await?;
    let mut options = SubscriptionOptions::new(durable_name(&group, post_topics::DEAD_LETTER));
    options.deliver_all_available = false;

    let mut dead = broker
        .durable_queue_subscribe(post_topics::DEAD_LETTER, &group, &options)
        .await?;
    broker
        .publish_with_headers(
            post_topics::DEAD_LETTER,
            &[(ORIGINAL_SUBJECT_HEADER, post_topics::UPDATED)],
            b"poison".to_vec(),
        )
        .await?;

    let delivery = tokio::time::timeout(Duration::from_secs(5), dead.next())
        .await?
        .ok_or_else(|| anyhow::anyhow!("stream ended"))??;
    assert_eq!(delivery.payload(), b"poison");
    delivery.term().await?;
    Ok(())
}
