use crate::domain::events::{IntegrationEvent, OrderInitiated, Topic};
use crate::domain::ports::{MessageBus, Responder, Subscriber, SubscriptionId};
use crate::domain::response::ResponseMessage;
use crate::error::{BillingError, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::{Mutex, Notify};

#[derive(Debug, Clone)]
pub struct BusConfig {
    /// Deliveries per subscriber before a failing event is dead-lettered.
    pub max_delivery_attempts: u32,
    pub redelivery_delay: Duration,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            max_delivery_attempts: 3,
            redelivery_delay: Duration::from_millis(50),
        }
    }
}

/// An event a subscriber kept failing on.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeadLetter {
    pub topic: Topic,
    pub event: IntegrationEvent,
    pub error: String,
    pub attempts: u32,
}

#[derive(Default)]
struct Bindings {
    responder: Option<(SubscriptionId, Responder)>,
    subscribers: HashMap<Topic, Vec<(SubscriptionId, Subscriber)>>,
}

/// Keeps count of delivery tasks still running so callers can wait for quiescence.
#[derive(Default)]
struct InFlight {
    count: AtomicUsize,
    idle: Notify,
}

impl InFlight {
    fn begin(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }

    fn end(&self) {
        if self.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }

    fn track(self: &Arc<Self>) -> InFlightGuard {
        self.begin();
        InFlightGuard(self.clone())
    }
}

/// Leaves the in-flight count when dropped, even if the delivery task unwinds.
struct InFlightGuard(Arc<InFlight>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.end();
    }
}

/// A process-local message bus.
///
/// Requests are answered point-to-point by the single bound responder. Published
/// events are delivered to every subscriber of their topic on separate tasks,
/// at least once: a failing delivery is retried until `max_delivery_attempts`
/// and then recorded as a [`DeadLetter`].
pub struct InMemoryBus {
    config: BusConfig,
    next_id: AtomicU64,
    bindings: Arc<RwLock<Bindings>>,
    in_flight: Arc<InFlight>,
    published: Mutex<Vec<IntegrationEvent>>,
    dead_letters: Arc<Mutex<Vec<DeadLetter>>>,
}

impl InMemoryBus {
    pub fn new(config: BusConfig) -> Self {
        Self {
            config,
            next_id: AtomicU64::new(1),
            bindings: Arc::new(RwLock::new(Bindings::default())),
            in_flight: Arc::new(InFlight::default()),
            published: Mutex::new(Vec::new()),
            dead_letters: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Sends an `OrderInitiated` request and waits for the responder's reply.
    pub async fn request(&self, request: OrderInitiated) -> Result<ResponseMessage> {
        let responder = {
            let bindings = self.read_bindings()?;
            bindings
                .responder
                .as_ref()
                .map(|(_, handler)| handler.clone())
        };
        let responder = responder
            .ok_or_else(|| BillingError::Bus("no responder bound for OrderInitiated".to_string()))?;

        responder(request).await
    }

    /// Hands `event` to the subscribers of `topic` without recording it as published.
    pub fn deliver(&self, topic: Topic, event: IntegrationEvent) -> Result<usize> {
        let subscribers = self.subscribers_of(topic)?;
        let count = subscribers.len();
        for (id, subscriber) in subscribers {
            self.spawn_delivery(topic, event.clone(), id, subscriber);
        }
        Ok(count)
    }

    /// Waits until no delivery is in flight, including deliveries started by handlers.
    pub async fn drain(&self) {
        loop {
            let notified = self.in_flight.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.in_flight.count.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }

    pub async fn published(&self) -> Vec<IntegrationEvent> {
        self.published.lock().await.clone()
    }

    pub async fn dead_letters(&self) -> Vec<DeadLetter> {
        self.dead_letters.lock().await.clone()
    }

    pub fn has_responder(&self) -> bool {
        self.read_bindings()
            .map(|bindings| bindings.responder.is_some())
            .unwrap_or(false)
    }

    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.subscribers_of(topic).map(|s| s.len()).unwrap_or(0)
    }

    fn next_subscription(&self) -> SubscriptionId {
        SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn read_bindings(&self) -> Result<std::sync::RwLockReadGuard<'_, Bindings>> {
        read_bindings(&self.bindings)
    }

    fn write_bindings(&self) -> Result<std::sync::RwLockWriteGuard<'_, Bindings>> {
        self.bindings
            .write()
            .map_err(|_| BillingError::Bus("binding table poisoned".to_string()))
    }

    fn subscribers_of(&self, topic: Topic) -> Result<Vec<(SubscriptionId, Subscriber)>> {
        Ok(self
            .read_bindings()?
            .subscribers
            .get(&topic)
            .cloned()
            .unwrap_or_default())
    }

    fn spawn_delivery(
        &self,
        topic: Topic,
        event: IntegrationEvent,
        id: SubscriptionId,
        subscriber: Subscriber,
    ) {
        let delivery = Delivery {
            config: self.config.clone(),
            bindings: self.bindings.clone(),
            topic,
            id,
            subscriber,
        };
        let dead_letters = self.dead_letters.clone();
        let guard = self.in_flight.track();

        tokio::spawn(async move {
            let _guard = guard;
            if let Some(dead_letter) = delivery.run(event).await {
                dead_letters.lock().await.push(dead_letter);
            }
        });
    }
}

fn read_bindings(bindings: &RwLock<Bindings>) -> Result<std::sync::RwLockReadGuard<'_, Bindings>> {
    bindings
        .read()
        .map_err(|_| BillingError::Bus("binding table poisoned".to_string()))
}

/// One event on its way to one subscription.
struct Delivery {
    config: BusConfig,
    bindings: Arc<RwLock<Bindings>>,
    topic: Topic,
    id: SubscriptionId,
    subscriber: Subscriber,
}

impl Delivery {
    fn is_bound(&self) -> bool {
        read_bindings(&self.bindings)
            .map(|bindings| {
                bindings
                    .subscribers
                    .get(&self.topic)
                    .is_some_and(|subs| subs.iter().any(|(bound, _)| *bound == self.id))
            })
            .unwrap_or(false)
    }

    /// Runs one handler invocation on its own task; a panic is reported as a failed attempt.
    async fn attempt(&self, event: IntegrationEvent) -> Result<()> {
        match tokio::spawn((self.subscriber)(event)).await {
            Ok(result) => result,
            Err(e) => Err(BillingError::Bus(format!("handler aborted: {e}"))),
        }
    }

    async fn run(self, event: IntegrationEvent) -> Option<DeadLetter> {
        let max_attempts = self.config.max_delivery_attempts.max(1);
        let topic = self.topic;
        let mut attempt = 0;

        loop {
            attempt += 1;
            let error = match self.attempt(event.clone()).await {
                Ok(()) => return None,
                Err(e) => e,
            };

            if error.is_domain_violation() {
                tracing::warn!(
                    topic = %topic,
                    order_id = %event.order_id(),
                    attempt,
                    error = %error,
                    "handler rejected event"
                );
            } else {
                tracing::warn!(
                    topic = %topic,
                    order_id = %event.order_id(),
                    attempt,
                    error = %error,
                    "handler failed"
                );
            }

            if attempt >= max_attempts {
                tracing::error!(
                    topic = %topic,
                    order_id = %event.order_id(),
                    attempts = attempt,
                    "moving event to dead letters"
                );
                return Some(DeadLetter {
                    topic,
                    event,
                    error: error.to_string(),
                    attempts: attempt,
                });
            }

            tokio::time::sleep(self.config.redelivery_delay).await;
            if !self.is_bound() {
                tracing::warn!(
                    topic = %topic,
                    order_id = %event.order_id(),
                    binding = self.id.0,
                    attempts = attempt,
                    "subscriber unbound, not redelivering"
                );
                return Some(DeadLetter {
                    topic,
                    event,
                    error: error.to_string(),
                    attempts: attempt,
                });
            }
        }
    }
}

#[async_trait]
impl MessageBus for InMemoryBus {
    fn respond(&self, handler: Responder) -> Result<SubscriptionId> {
        let mut bindings = self.write_bindings()?;
        if bindings.responder.is_some() {
            return Err(BillingError::Bus(
                "a responder for OrderInitiated is already bound".to_string(),
            ));
        }

        let id = self.next_subscription();
        bindings.responder = Some((id, handler));
        tracing::debug!(binding = id.0, "responder bound for OrderInitiated");
        Ok(id)
    }

    fn subscribe(&self, topic: Topic, handler: Subscriber) -> Result<SubscriptionId> {
        let id = self.next_subscription();
        self.write_bindings()?
            .subscribers
            .entry(topic)
            .or_default()
            .push((id, handler));
        tracing::debug!(binding = id.0, topic = %topic, "subscriber bound");
        Ok(id)
    }

    fn unsubscribe(&self, id: SubscriptionId) -> Result<()> {
        let mut bindings = self.write_bindings()?;
        if bindings
            .responder
            .as_ref()
            .is_some_and(|(bound, _)| *bound == id)
        {
            bindings.responder = None;
        }
        for subs in bindings.subscribers.values_mut() {
            subs.retain(|(bound, _)| *bound != id);
        }
        Ok(())
    }

    async fn publish(&self, event: IntegrationEvent) -> Result<()> {
        let topic = event.topic().ok_or_else(|| {
            BillingError::Bus(format!("{} is not a pub/sub event", event.name()))
        })?;

        self.published.lock().await.push(event.clone());
        let delivered = self.deliver(topic, event)?;
        tracing::debug!(topic = %topic, subscribers = delivered, "event published");
        Ok(())
    }
}
