//! Startup module - wires the replication subscriber from configuration.

pub mod shutdown;

use std::sync::Arc;
use std::time::Duration;

use agora_application::{ReplicationApplier, ReplicationSubscriber, SubscriberSettings};
use agora_domain::codec::CodecType;
use agora_domain::config::{ReplicationConfig, ServiceConfigDto};
use agora_infrastructure::{
    run_comments_migrations, DatabasePool, NatsBroker, PostgresReplicaRepository,
};
use anyhow::Context;
use tracing::info;

pub fn subscriber_settings(config: &ReplicationConfig) -> SubscriberSettings {
    SubscriberSettings {
        queue_group: config.queue_group.clone(),
        ack_wait: Duration::from_secs(config.ack_wait_secs),
        max_deliver: config.max_deliver,
        dead_letter_subject: config.dead_letter_subject.clone(),
        ..SubscriberSettings::default()
    }
}

/// Runs the replicator until a shutdown signal arrives.
pub async fn run(config: ServiceConfigDto, migrate: bool) -> anyhow::Result<()> {
    let pool = DatabasePool::from_config(&config.database)
        .await
        .context("Failed to open the comments database")?;

    if migrate {
        run_comments_migrations(pool.pool())
            .await
            .context("Failed to bootstrap the comments schema")?;
    }

    let broker = NatsBroker::connect(&config.nats, &config.replication.dead_letter_subject)
        .await
        .context("Failed to connect to NATS")?;

    let codec = config
        .replication
        .codec
        .parse::<CodecType>()
        .map_err(anyhow::Error::msg)?
        .create_codec();
    info!(codec = codec.codec_id(), "Event codec selected");

    let replica = Arc::new(PostgresReplicaRepository::new(pool.store()));
    let applier = Arc::new(ReplicationApplier::new(replica, codec));
    let subscriber = ReplicationSubscriber::new(
        Arc::new(broker.clone()),
        applier,
        subscriber_settings(&config.replication),
    );

    let handle = subscriber
        .start()
        .await
        .context("Failed to start the replication subscriber")?;
    info!(
        queue_group = %config.replication.queue_group,
        "Replicator running"
    );

    let reason = shutdown::wait_for_signal().await;
    info!(%reason, "Shutting down gracefully...");

    handle.shutdown().await;
    if let Err(e) = broker.close().await {
        tracing::warn!("Failed to flush NATS connection: {}", e);
    }
    pool.close().await;

    info!("Replicator stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscriber_settings_follow_config() {
        let settings = subscriber_settings(&ReplicationConfig {
            queue_group: "comments".to_string(),
            ack_wait_secs: 30,
            max_deliver: 3,
            dead_letter_subject: "dlq".to_string(),
            codec: "json".to_string(),
        });

        assert_eq!(settings.queue_group, "comments");
        assert_eq!(settings.ack_wait, Duration::from_secs(30));
        assert_eq!(settings.max_deliver, 3);
        assert_eq!(settings.dead_letter_subject, "dlq");
    }
}
