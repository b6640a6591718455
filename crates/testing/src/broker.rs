//! In-memory durable broker.
//!
//! Mirrors the delivery contract of the NATS JetStream broker closely enough
//! to test the replication pipeline without a server:
//!
//! - every published message is retained in a log;
//! - a durable consumer keeps its cursor and its unacknowledged messages
//!   across subscribers coming and going;
//! - subscribers of one durable consumer share its messages round-robin;
//! - an unacknowledged message is redelivered after the ack wait, and a
//!   message held by a subscriber that went away is redelivered as soon as a
//!   new subscriber joins;
//! - with a `max_deliver` cap, a message is no longer redelivered after that
//!   many deliveries.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use agora_domain::messaging::{
    BrokerError, Delivery, DeliveryStream, MessageBroker, SubscriptionOptions,
};
use async_trait::async_trait;
use futures::channel::mpsc::{self, UnboundedSender};
use futures::StreamExt;
use tokio::sync::Mutex;
use tracing::debug;

/// A message as retained by the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMessage {
    pub seq: u64,
    pub subject: String,
    pub headers: Vec<(String, String)>,
    pub payload: Vec<u8>,
}

impl StoredMessage {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

type Shared = Arc<Mutex<BrokerState>>;
type MemberSender = UnboundedSender<Result<Box<dyn Delivery>, BrokerError>>;

#[derive(Default)]
struct BrokerState {
    log: Vec<StoredMessage>,
    consumers: HashMap<String, Consumer>,
    next_member_id: u64,
}

struct Consumer {
    subject: String,
    options: SubscriptionOptions,
    /// Index into the log of the next message to consider.
    cursor: usize,
    pending: BTreeMap<u64, Pending>,
    members: Vec<Member>,
    round_robin: usize,
    terminated: Vec<u64>,
    exhausted: Vec<u64>,
}

struct Pending {
    deliveries: u32,
    member_id: u64,
}

struct Member {
    id: u64,
    sender: MemberSender,
}

#[derive(Clone, Default)]
pub struct InMemoryBroker {
    state: Shared,
    fail_publishes: Arc<AtomicBool>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every publish fail until reset.
    pub fn set_fail_publishes(&self, fail: bool) {
        self.fail_publishes.store(fail, Ordering::SeqCst);
    }

    /// Messages retained for `subject`, oldest first.
    pub async fn published(&self, subject: &str) -> Vec<StoredMessage> {
        let state = self.state.lock().await;
        state
            .log
            .iter()
            .filter(|message| message.subject == subject)
            .cloned()
            .collect()
    }

    /// Messages delivered to `durable` and not yet acknowledged or terminated.
    pub async fn pending_count(&self, durable: &str) -> usize {
        let state = self.state.lock().await;
        state
            .consumers
            .get(durable)
            .map_or(0, |consumer| consumer.pending.len())
    }

    /// Sequence numbers terminated by subscribers of `durable`.
    pub async fn terminated(&self, durable: &str) -> Vec<u64> {
        let state = self.state.lock().await;
        state
            .consumers
            .get(durable)
            .map(|consumer| consumer.terminated.clone())
            .unwrap_or_default()
    }

    /// Sequence numbers `durable` gave up on after `max_deliver` deliveries.
    pub async fn exhausted(&self, durable: &str) -> Vec<u64> {
        let state = self.state.lock().await;
        state
            .consumers
            .get(durable)
            .map(|consumer| consumer.exhausted.clone())
            .unwrap_or_default()
    }

    /// Drop every subscriber connection, as a crashed process would. Their
    /// delivery streams end and their unacknowledged messages stay pending.
    pub async fn disconnect_all(&self) {
        let mut state = self.state.lock().await;
        for consumer in state.consumers.values_mut() {
            consumer.members.clear();
        }
    }
}

#[async_trait]
impl MessageBroker for InMemoryBroker {
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<(), BrokerError> {
        self.publish_with_headers(subject, &[], payload).await
    }

    async fn publish_with_headers(
        &self,
        subject: &str,
        headers: &[(&str, &str)],
        payload: Vec<u8>,
    ) -> Result<(), BrokerError> {
        if self.fail_publishes.load(Ordering::SeqCst) {
            return Err(BrokerError::Publish {
                subject: subject.to_string(),
                message: "broker unavailable".to_string(),
            });
        }

        let weak = Arc::downgrade(&self.state);
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        let seq = state.log.len() as u64 + 1;
        state.log.push(StoredMessage {
            seq,
            subject: subject.to_string(),
            headers: headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            payload,
        });
        debug!(subject, seq, "Message stored");

        for (durable, consumer) in state.consumers.iter_mut() {
            if consumer.subject == subject {
                pump(&weak, durable, consumer, &state.log);
            }
        }

        Ok(())
    }

    async fn durable_queue_subscribe(
        &self,
        subject: &str,
        _queue_group: &str,
        options: &SubscriptionOptions,
    ) -> Result<DeliveryStream, BrokerError> {
        let weak = Arc::downgrade(&self.state);
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        let log_len = state.log.len();
        let durable = options.durable_name.clone();
        let consumer = state
            .consumers
            .entry(durable.clone())
            .or_insert_with(|| Consumer {
                subject: subject.to_string(),
                options: options.clone(),
                cursor: if options.deliver_all_available { 0 } else { log_len },
                pending: BTreeMap::new(),
                members: Vec::new(),
                round_robin: 0,
                terminated: Vec::new(),
                exhausted: Vec::new(),
            });

        if consumer.subject != subject {
            return Err(BrokerError::Subscribe {
                subject: subject.to_string(),
                message: format!(
                    "durable {} is bound to {}",
                    options.durable_name, consumer.subject
                ),
            });
        }

        state.next_member_id += 1;
        let (sender, receiver) = mpsc::unbounded();
        consumer.members.retain(|member| !member.sender.is_closed());
        consumer.members.push(Member {
            id: state.next_member_id,
            sender,
        });

        redeliver_orphans(&weak, &durable, consumer, &state.log);
        pump(&weak, &durable, consumer, &state.log);

        Ok(receiver.boxed())
    }
}

/// Deliver every not-yet-delivered message on the consumer's subject while
/// a live subscriber exists.
fn pump(weak: &Weak<Mutex<BrokerState>>, durable: &str, consumer: &mut Consumer, log: &[StoredMessage]) {
    while let Some(message) = log.get(consumer.cursor) {
        if message.subject == consumer.subject && !deliver(weak, durable, consumer, message, 1) {
            break;
        }
        consumer.cursor += 1;
    }
}

/// Redeliver pending messages whose subscriber is gone.
fn redeliver_orphans(
    weak: &Weak<Mutex<BrokerState>>,
    durable: &str,
    consumer: &mut Consumer,
    log: &[StoredMessage],
) {
    let orphans: Vec<(u64, u32)> = consumer
        .pending
        .iter()
        .filter(|(_, pending)| {
            !consumer
                .members
                .iter()
                .any(|member| member.id == pending.member_id && !member.sender.is_closed())
        })
        .map(|(seq, pending)| (*seq, pending.deliveries))
        .collect();

    for (seq, deliveries) in orphans {
        redeliver(weak, durable, consumer, log, seq, deliveries);
    }
}

fn redeliver(
    weak: &Weak<Mutex<BrokerState>>,
    durable: &str,
    consumer: &mut Consumer,
    log: &[StoredMessage],
    seq: u64,
    deliveries: u32,
) {
    if consumer
        .options
        .max_deliver
        .is_some_and(|max_deliver| deliveries >= max_deliver)
    {
        consumer.pending.remove(&seq);
        consumer.exhausted.push(seq);
        debug!(durable, seq, "Max deliveries reached");
        return;
    }
    if let Some(message) = log.get((seq - 1) as usize) {
        deliver(weak, durable, consumer, message, deliveries + 1);
    }
}

/// Hand a message to the next live subscriber and start its ack timer.
fn deliver(
    weak: &Weak<Mutex<BrokerState>>,
    durable: &str,
    consumer: &mut Consumer,
    message: &StoredMessage,
    deliveries: u32,
) -> bool {
    while !consumer.members.is_empty() {
        let idx = consumer.round_robin % consumer.members.len();
        consumer.round_robin = consumer.round_robin.wrapping_add(1);

        let delivery = InMemoryDelivery {
            state: weak.clone(),
            durable: durable.to_string(),
            seq: message.seq,
            subject: message.subject.clone(),
            payload: message.payload.clone(),
            deliveries,
        };

        let member = &consumer.members[idx];
        if member.sender.unbounded_send(Ok(Box::new(delivery))).is_ok() {
            consumer.pending.insert(
                message.seq,
                Pending {
                    deliveries,
                    member_id: member.id,
                },
            );
            schedule_expiry(
                weak.clone(),
                durable.to_string(),
                message.seq,
                deliveries,
                consumer.options.ack_wait,
            );
            return true;
        }

        consumer.members.remove(idx);
    }
    false
}

fn schedule_expiry(
    weak: Weak<Mutex<BrokerState>>,
    durable: String,
    seq: u64,
    deliveries: u32,
    ack_wait: Duration,
) {
    tokio::spawn(async move {
        tokio::time::sleep(ack_wait).await;
        let Some(shared) = weak.upgrade() else {
            return;
        };
        let mut guard = shared.lock().await;
        let state = &mut *guard;
        let Some(consumer) = state.consumers.get_mut(&durable) else {
            return;
        };
        // Only the delivery this timer was started for may expire.
        match consumer.pending.get(&seq) {
            Some(pending) if pending.deliveries == deliveries => {}
            _ => return,
        }
        debug!(durable = %durable, seq, deliveries, "Ack wait expired");
        redeliver(&weak, &durable, consumer, &state.log, seq, deliveries);
    });
}

struct InMemoryDelivery {
    state: Weak<Mutex<BrokerState>>,
    durable: String,
    seq: u64,
    subject: String,
    payload: Vec<u8>,
    deliveries: u32,
}

impl InMemoryDelivery {
    async fn settle(&self, terminate: bool) -> Result<(), BrokerError> {
        let shared = self.state.upgrade().ok_or(BrokerError::Closed)?;
        let mut state = shared.lock().await;
        let consumer = state
            .consumers
            .get_mut(&self.durable)
            .ok_or_else(|| BrokerError::Ack(format!("unknown durable {}", self.durable)))?;

        if consumer.pending.remove(&self.seq).is_some() && terminate {
            consumer.terminated.push(self.seq);
        }
        Ok(())
    }
}

#[async_trait]
impl Delivery for InMemoryDelivery {
    fn subject(&self) -> &str {
        &self.subject
    }

    fn payload(&self) -> &[u8] {
        &self.payload
    }

    fn delivery_count(&self) -> u32 {
        self.deliveries
    }

    async fn ack(&self) -> Result<(), BrokerError> {
        self.settle(false).await
    }

    async fn term(&self) -> Result<(), BrokerError> {
        self.settle(true).await
    }
}
