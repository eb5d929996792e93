use super::scope::ExecutionScope;
use crate::domain::events::{
    IntegrationEvent, OrderCanceled, OrderInitiated, OrderLoweredStock, OrderPaid, Topic,
};
use crate::domain::payment::Payment;
use crate::domain::ports::{
    BillingServiceFactory, HandlerFuture, MessageBusRef, Responder, Subscriber,
    SubscriptionId,
};
use crate::domain::response::ResponseMessage;
use crate::error::{BillingError, Result};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::Instrument;

/// Binds billing operations to the bus and translates between integration
/// events and billing calls.
///
/// | Inbound             | Pattern           | Outbound                    |
/// |---------------------|-------------------|-----------------------------|
/// | `OrderInitiated`    | request/response  | `ResponseMessage` reply     |
/// | `OrderCanceled`     | `OrderCanceled`   | none                        |
/// | `OrderLoweredStock` | `UpdateStockOrder`| `OrderPaid` on success      |
///
/// Every handled message gets its own [`ExecutionScope`]. No ordering or
/// de-duplication is applied per order; that is left to the bus and billing.
#[derive(Clone)]
pub struct TransactionOrchestrator {
    bus: MessageBusRef,
    billing: BillingServiceFactory,
}

impl TransactionOrchestrator {
    /// Creates a new orchestrator.
    ///
    /// # Arguments
    ///
    /// * `bus` - Bus the handlers are bound to and `OrderPaid` is published on.
    /// * `billing` - Factory resolving a fresh billing service for each message.
    pub fn new(bus: MessageBusRef, billing: BillingServiceFactory) -> Self {
        Self { bus, billing }
    }

    /// Registers the responder and both subscriptions.
    ///
    /// Returns the binding handles so they can be released on shutdown. If any
    /// registration fails, the ones already made are undone.
    pub fn start(&self) -> Result<Vec<SubscriptionId>> {
        let mut bindings = Vec::with_capacity(3);
        if let Err(e) = self.bind(&mut bindings) {
            self.stop(&bindings);
            return Err(e);
        }

        tracing::info!(bindings = bindings.len(), "billing handlers bound");
        Ok(bindings)
    }

    fn bind(&self, bindings: &mut Vec<SubscriptionId>) -> Result<()> {
        bindings.push(self.bus.respond(self.authorize_responder())?);
        bindings.push(
            self.bus
                .subscribe(Topic::OrderCanceled, self.cancel_subscriber())?,
        );
        bindings.push(
            self.bus
                .subscribe(Topic::UpdateStockOrder, self.capture_subscriber())?,
        );
        Ok(())
    }

    /// Releases the bindings returned by [`start`](Self::start).
    ///
    /// Handlers already running are left to finish.
    pub fn stop(&self, bindings: &[SubscriptionId]) {
        for id in bindings {
            if let Err(e) = self.bus.unsubscribe(*id) {
                tracing::error!(error = %e, binding = id.0, "failed to release binding");
            }
        }
        tracing::info!("billing handlers unbound");
    }

    /// Binds the handlers, then stays passive until `shutdown` turns `true` or
    /// its sender is dropped.
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> Result<()> {
        let bindings = self.start()?;
        self.serve(bindings, shutdown).await;
        Ok(())
    }

    /// Waits for the stop signal, then releases `bindings`.
    ///
    /// Does no work of its own while waiting; messages are handled on the bus's tasks.
    pub async fn serve(&self, bindings: Vec<SubscriptionId>, mut shutdown: watch::Receiver<bool>) {
        while !*shutdown.borrow_and_update() {
            if shutdown.changed().await.is_err() {
                break;
            }
        }

        tracing::info!("stop requested, no longer accepting messages");
        self.stop(&bindings);
    }

    /// Authorizes the payment described by `message`.
    ///
    /// The billing verdict is returned as is; a rejected payment is an `Ok` with an
    /// invalid response, never an error.
    pub async fn authorize_transaction(&self, message: OrderInitiated) -> Result<ResponseMessage> {
        let scope = ExecutionScope::open(&self.billing);
        let payment = Payment::from(&message);
        let order_id = payment.order_id;

        async {
            tracing::debug!(order_id = %order_id, "authorizing payment");
            let response = scope.billing().authorize(payment).await?;
            if !response.is_valid() {
                tracing::warn!(
                    order_id = %order_id,
                    errors = ?response.errors(),
                    "payment authorization rejected"
                );
            }
            Ok(response)
        }
        .instrument(scope.span())
        .await
    }

    /// Cancels the payment of `message`'s order.
    ///
    /// A rejection from billing becomes a `DomainViolation` carrying the order id.
    pub async fn cancel_transaction(&self, message: OrderCanceled) -> Result<()> {
        let scope = ExecutionScope::open(&self.billing);
        let order_id = message.order_id;

        async {
            tracing::debug!(order_id = %order_id, "canceling payment");
            let response = scope.billing().cancel(order_id).await?;
            if !response.is_valid() {
                tracing::warn!(order_id = %order_id, errors = ?response.errors(), "cancel rejected");
                return Err(BillingError::domain_violation(
                    order_id,
                    format!("Failed to cancel order payment {order_id}"),
                ));
            }
            tracing::info!(order_id = %order_id, "order payment canceled");
            Ok(())
        }
        .instrument(scope.span())
        .await
    }

    /// Confirms the payment of an order whose stock was reserved and announces it
    /// with a single `OrderPaid` event.
    pub async fn capture_payment(&self, message: OrderLoweredStock) -> Result<()> {
        let scope = ExecutionScope::open(&self.billing);
        let OrderLoweredStock {
            order_id,
            customer_id,
        } = message;

        async {
            tracing::debug!(order_id = %order_id, "capturing payment");
            let response = scope.billing().get_transaction(order_id).await?;
            if !response.is_valid() {
                tracing::warn!(order_id = %order_id, errors = ?response.errors(), "capture rejected");
                return Err(BillingError::domain_violation(
                    order_id,
                    format!("Error trying to get order payment {order_id}"),
                ));
            }

            self.bus
                .publish(IntegrationEvent::OrderPaid(OrderPaid::new(
                    customer_id,
                    order_id,
                )))
                .await?;
            tracing::info!(order_id = %order_id, customer_id = %customer_id, "order paid");
            Ok(())
        }
        .instrument(scope.span())
        .await
    }

    fn authorize_responder(&self) -> Responder {
        let orchestrator = self.clone();
        Arc::new(move |request: OrderInitiated| {
            let orchestrator = orchestrator.clone();
            Box::pin(async move { orchestrator.authorize_transaction(request).await })
                as HandlerFuture<ResponseMessage>
        })
    }

    fn cancel_subscriber(&self) -> Subscriber {
        let orchestrator = self.clone();
        Arc::new(move |event: IntegrationEvent| {
            let orchestrator = orchestrator.clone();
            Box::pin(async move {
                match event {
                    IntegrationEvent::OrderCanceled(message) => {
                        orchestrator.cancel_transaction(message).await
                    }
                    other => Err(unexpected(Topic::OrderCanceled, &other)),
                }
            }) as HandlerFuture<()>
        })
    }

    fn capture_subscriber(&self) -> Subscriber {
        let orchestrator = self.clone();
        Arc::new(move |event: IntegrationEvent| {
            let orchestrator = orchestrator.clone();
            Box::pin(async move {
                match event {
                    IntegrationEvent::OrderLoweredStock(message) => {
                        orchestrator.capture_payment(message).await
                    }
                    other => Err(unexpected(Topic::UpdateStockOrder, &other)),
                }
            }) as HandlerFuture<()>
        })
    }
}

fn unexpected(topic: Topic, event: &IntegrationEvent) -> BillingError {
    BillingError::Bus(format!(
        "unexpected {} event on topic {topic}",
        event.name()
    ))
}
