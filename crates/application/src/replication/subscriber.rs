use std::sync::Arc;
use std::time::Duration;

use agora_domain::event_topics::{durable_name, post_topics, ORIGINAL_SUBJECT_HEADER};
use agora_domain::messaging::{
    BrokerError, Delivery, DeliveryStream, MessageBroker, SubscriptionOptions,
};
use futures::StreamExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{error, info, warn};

use super::applier::{ApplyError, ReplicationApplier};

/// Settings of the replication subscriber.
#[derive(Debug, Clone)]
pub struct SubscriberSettings {
    /// Queue group shared by all instances of the comments service
    pub queue_group: String,
    pub ack_wait: Duration,
    /// Deliveries before a failing message is dead-lettered
    pub max_deliver: u32,
    pub dead_letter_subject: String,
    /// Delay before the first re-subscribe after a delivery stream ends
    pub resubscribe_delay: Duration,
    /// Upper bound of the doubling re-subscribe delay
    pub max_resubscribe_delay: Duration,
}

impl Default for SubscriberSettings {
    fn default() -> Self {
        Self {
            queue_group: "posts".to_string(),
            ack_wait: Duration::from_secs(60),
            max_deliver: 5,
            dead_letter_subject: post_topics::DEAD_LETTER.to_string(),
            resubscribe_delay: Duration::from_secs(1),
            max_resubscribe_delay: Duration::from_secs(60),
        }
    }
}

impl SubscriberSettings {
    /// The consumer itself never stops redelivering. `max_deliver` is
    /// enforced by the subscriber, so a message whose dead-letter publish
    /// failed comes back for another attempt.
    pub fn subscription_options(&self, subject: &str) -> SubscriptionOptions {
        SubscriptionOptions::new(durable_name(&self.queue_group, subject))
            .with_ack_wait(self.ack_wait)
    }
}

/// What happened to one delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Applied and acknowledged.
    Acked,
    /// Left unacknowledged; the broker redelivers after the ack wait.
    Unacked,
    /// Failed on or after its last allowed delivery; forwarded and terminated.
    DeadLettered,
}

/// Subscribes the applier to every post subject.
pub struct ReplicationSubscriber {
    broker: Arc<dyn MessageBroker>,
    applier: Arc<ReplicationApplier>,
    settings: SubscriberSettings,
}

impl ReplicationSubscriber {
    pub fn new(
        broker: Arc<dyn MessageBroker>,
        applier: Arc<ReplicationApplier>,
        settings: SubscriberSettings,
    ) -> Self {
        Self {
            broker,
            applier,
            settings,
        }
    }

    /// Register one durable subscription per subject and spawn a task per
    /// subscription. Fails without spawning anything if any subscription
    /// cannot be registered.
    pub async fn start(&self) -> Result<SubscriberHandle, BrokerError> {
        let mut streams = Vec::with_capacity(post_topics::ALL.len());
        for subject in post_topics::ALL {
            let options = self.settings.subscription_options(subject);
            let stream = self
                .broker
                .durable_queue_subscribe(subject, &self.settings.queue_group, &options)
                .await?;
            info!(
                subject,
                durable = %options.durable_name,
                queue_group = %self.settings.queue_group,
                "Replication subscription registered"
            );
            streams.push((subject, stream));
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let tasks = streams
            .into_iter()
            .map(|(subject, stream)| {
                tokio::spawn(run_subscription(
                    subject,
                    stream,
                    self.broker.clone(),
                    self.applier.clone(),
                    self.settings.clone(),
                    shutdown_rx.clone(),
                ))
            })
            .collect();

        Ok(SubscriberHandle {
            shutdown: shutdown_tx,
            tasks,
        })
    }

    /// Apply one delivery and settle it with the broker.
    pub async fn process_delivery(&self, delivery: &dyn Delivery) -> DeliveryOutcome {
        process_delivery(
            self.broker.as_ref(),
            &self.applier,
            &self.settings,
            delivery,
        )
        .await
    }
}

/// Running subscription tasks.
pub struct SubscriberHandle {
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl SubscriberHandle {
    pub fn is_running(&self) -> bool {
        self.tasks.iter().any(|task| !task.is_finished())
    }

    /// Stop every subscription task and wait for them to finish. A message
    /// being applied when shutdown arrives is finished first.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for task in self.tasks {
            if let Err(e) = task.await {
                error!(error = %e, "Replication task ended abnormally");
            }
        }
        info!("Replication subscriber stopped");
    }
}

async fn run_subscription(
    subject: &'static str,
    mut stream: DeliveryStream,
    broker: Arc<dyn MessageBroker>,
    applier: Arc<ReplicationApplier>,
    settings: SubscriberSettings,
    mut shutdown: watch::Receiver<bool>,
) {
    info!(subject, "Replication consumer started");

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            next = stream.next() => match next {
                Some(Ok(delivery)) => {
                    process_delivery(broker.as_ref(), &applier, &settings, delivery.as_ref()).await;
                }
                Some(Err(e)) => warn!(subject, error = %e, "Error receiving delivery"),
                None => {
                    warn!(subject, "Delivery stream ended");
                    match resubscribe(subject, broker.as_ref(), &settings, &mut shutdown).await {
                        Some(restored) => stream = restored,
                        None => break,
                    }
                }
            },
        }
    }

    info!(subject, "Replication consumer stopped");
}

/// Join the durable consumer again, doubling the delay between attempts.
/// Gives up only when shutdown is requested.
async fn resubscribe(
    subject: &'static str,
    broker: &dyn MessageBroker,
    settings: &SubscriberSettings,
    shutdown: &mut watch::Receiver<bool>,
) -> Option<DeliveryStream> {
    let options = settings.subscription_options(subject);
    let mut delay = settings.resubscribe_delay;
    let mut attempt = 0u32;

    loop {
        if *shutdown.borrow() {
            return None;
        }
        attempt += 1;
        info!(subject, attempt, delay = ?delay, "Re-subscribing");

        tokio::select! {
            _ = shutdown.changed() => return None,
            _ = sleep(delay) => {}
        }

        match broker
            .durable_queue_subscribe(subject, &settings.queue_group, &options)
            .await
        {
            Ok(stream) => {
                info!(
                    subject,
                    attempt,
                    durable = %options.durable_name,
                    "Replication subscription restored"
                );
                return Some(stream);
            }
            Err(e) => warn!(subject, attempt, error = %e, "Re-subscribe failed"),
        }

        delay = delay.saturating_mul(2).min(settings.max_resubscribe_delay);
    }
}

async fn process_delivery(
    broker: &dyn MessageBroker,
    applier: &ReplicationApplier,
    settings: &SubscriberSettings,
    delivery: &dyn Delivery,
) -> DeliveryOutcome {
    let subject = delivery.subject();
    let attempt = delivery.delivery_count();

    let failure = match applier.apply(subject, delivery.payload()).await {
        Ok(_) => {
            return match delivery.ack().await {
                Ok(()) => DeliveryOutcome::Acked,
                Err(e) => {
                    // Replica writes are idempotent and deletes leave a
                    // tombstone, so the redelivery changes nothing.
                    warn!(subject, delivery = attempt, error = %e, "Failed to ack");
                    DeliveryOutcome::Unacked
                }
            };
        }
        Err(e) => e,
    };

    match &failure {
        ApplyError::Decode { .. } | ApplyError::UnknownSubject(_) => {
            error!(subject, delivery = attempt, error = %failure, "Undecodable delivery")
        }
        ApplyError::Store { .. } => {
            error!(subject, delivery = attempt, error = %failure, "Replica write failed")
        }
    }

    if attempt < settings.max_deliver {
        return DeliveryOutcome::Unacked;
    }

    dead_letter(broker, settings, delivery).await
}

async fn dead_letter(
    broker: &dyn MessageBroker,
    settings: &SubscriberSettings,
    delivery: &dyn Delivery,
) -> DeliveryOutcome {
    let subject = delivery.subject();

    if let Err(e) = broker
        .publish_with_headers(
            &settings.dead_letter_subject,
            &[(ORIGINAL_SUBJECT_HEADER, subject)],
            delivery.payload().to_vec(),
        )
        .await
    {
        // Stays unacknowledged; the next redelivery retries the forward.
        error!(
            subject,
            delivery = delivery.delivery_count(),
            error = %e,
            "Failed to dead-letter delivery"
        );
        return DeliveryOutcome::Unacked;
    }

    if let Err(e) = delivery.term().await {
        warn!(subject, error = %e, "Failed to terminate dead-lettered delivery");
    }

    warn!(
        subject,
        dead_letter_subject = %settings.dead_letter_subject,
        deliveries = delivery.delivery_count(),
        "Delivery dead-lettered"
    );
    DeliveryOutcome::DeadLettered
}
