use super::events::{IntegrationEvent, OrderId, OrderInitiated, Topic};
use super::payment::Payment;
use super::response::ResponseMessage;
use crate::error::Result;
use async_trait::async_trait;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Billing operations consumed by the orchestrator.
///
/// Business failures come back as an invalid `ResponseMessage`. An `Err` means the
/// billing side itself could not be reached or failed.
#[async_trait]
pub trait BillingService: Send + Sync {
    async fn authorize(&self, payment: Payment) -> Result<ResponseMessage>;
    async fn cancel(&self, order_id: OrderId) -> Result<ResponseMessage>;
    async fn get_transaction(&self, order_id: OrderId) -> Result<ResponseMessage>;
}

pub type BillingServiceBox = Box<dyn BillingService>;
/// Produces a fresh billing service instance for every message scope.
pub type BillingServiceFactory = Arc<dyn Fn() -> BillingServiceBox + Send + Sync>;

pub type HandlerFuture<T> = Pin<Box<dyn Future<Output = Result<T>> + Send>>;
/// Request/response handler for `OrderInitiated`.
pub type Responder = Arc<dyn Fn(OrderInitiated) -> HandlerFuture<ResponseMessage> + Send + Sync>;
/// Pub/sub handler bound to a topic.
pub type Subscriber = Arc<dyn Fn(IntegrationEvent) -> HandlerFuture<()> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

/// Messaging capabilities consumed by the orchestrator.
///
/// Delivery guarantees, redelivery and dead-lettering belong to the implementation.
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Binds the single responder for `OrderInitiated` requests.
    fn respond(&self, handler: Responder) -> Result<SubscriptionId>;
    fn subscribe(&self, topic: Topic, handler: Subscriber) -> Result<SubscriptionId>;
    /// Removes a binding. Unknown ids are ignored.
    fn unsubscribe(&self, id: SubscriptionId) -> Result<()>;
    async fn publish(&self, event: IntegrationEvent) -> Result<()>;
}

pub type MessageBusRef = Arc<dyn MessageBus>;
