mod common;

use billing_integration::application::orchestrator::TransactionOrchestrator;
use billing_integration::domain::events::{
    CustomerId, IntegrationEvent, OrderId, OrderPaid, Topic,
};
use billing_integration::domain::payment::PaymentType;
use billing_integration::domain::ports::MessageBus;
use billing_integration::error::BillingError;
use billing_integration::infrastructure::in_memory_bus::{BusConfig, InMemoryBus};
use common::{BillingScript, Call, Op, order_canceled, order_initiated, order_lowered_stock};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

fn bus() -> Arc<InMemoryBus> {
    Arc::new(InMemoryBus::new(BusConfig {
        max_delivery_attempts: 2,
        redelivery_delay: Duration::from_millis(1),
    }))
}

fn paid_events(events: &[IntegrationEvent]) -> Vec<OrderPaid> {
    events
        .iter()
        .filter_map(|event| match event {
            IntegrationEvent::OrderPaid(paid) => Some(paid.clone()),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_start_binds_one_responder_and_two_topics() {
    let bus = bus();
    let script = BillingScript::new();
    let orchestrator = TransactionOrchestrator::new(bus.clone(), script.factory());

    let bindings = orchestrator.start().unwrap();

    assert_eq!(bindings.len(), 3);
    assert!(bus.has_responder());
    assert_eq!(bus.subscriber_count(Topic::OrderCanceled), 1);
    assert_eq!(bus.subscriber_count(Topic::UpdateStockOrder), 1);
    assert_eq!(bus.subscriber_count(Topic::OrderPaid), 0);
    // Binding alone resolves nothing.
    assert_eq!(script.instances(), 0);
}

#[tokio::test]
async fn test_authorize_request_gets_facade_reply() {
    let bus = bus();
    let script = BillingScript::new();
    TransactionOrchestrator::new(bus.clone(), script.factory())
        .start()
        .unwrap();

    let reply = bus.request(order_initiated(42)).await.unwrap();

    assert!(reply.is_valid());
    assert_eq!(
        script.calls(),
        vec![Call {
            instance: 1,
            op: Op::Authorize,
            order_id: OrderId(42),
        }]
    );
    assert!(bus.published().await.is_empty());
}

#[tokio::test]
async fn test_rejected_authorization_is_returned_not_raised() {
    let bus = bus();
    let script = BillingScript::new();
    script.reject(Op::Authorize, OrderId(43), "Payment denied");
    TransactionOrchestrator::new(bus.clone(), script.factory())
        .start()
        .unwrap();

    let reply = bus.request(order_initiated(43)).await.unwrap();

    assert!(!reply.is_valid());
    assert_eq!(reply.errors(), ["Payment denied".to_string()]);
}

#[tokio::test]
async fn test_unrecognized_payment_type_reaches_billing_unchanged() {
    let bus = bus();
    let ledger = billing_integration::infrastructure::in_memory_billing::InMemoryLedger::new();
    TransactionOrchestrator::new(bus.clone(), ledger.factory())
        .start()
        .unwrap();

    let mut request = order_initiated(44);
    request.payment_type = 77;
    let reply = bus.request(request).await.unwrap();

    assert_eq!(reply.errors(), ["Unsupported payment type".to_string()]);
    assert!(ledger.transactions(OrderId(44)).await.is_empty());
    assert!(!PaymentType::from(77).is_recognized());
}

#[tokio::test]
async fn test_stock_lowered_publishes_order_paid() {
    let bus = bus();
    let script = BillingScript::new();
    TransactionOrchestrator::new(bus.clone(), script.factory())
        .start()
        .unwrap();

    bus.publish(IntegrationEvent::OrderLoweredStock(order_lowered_stock(42, 7)))
        .await
        .unwrap();
    bus.drain().await;

    assert_eq!(
        paid_events(&bus.published().await),
        vec![OrderPaid::new(CustomerId(7), OrderId(42))]
    );
    assert_eq!(script.calls()[0].op, Op::GetTransaction);
    assert!(bus.dead_letters().await.is_empty());
}

#[tokio::test]
async fn test_failed_capture_publishes_nothing() {
    let bus = bus();
    let script = BillingScript::new();
    script.reject(Op::GetTransaction, OrderId(42), "Transaction not found");
    let orchestrator = TransactionOrchestrator::new(bus.clone(), script.factory());

    let err = orchestrator
        .capture_payment(order_lowered_stock(42, 7))
        .await
        .unwrap_err();

    assert!(err.is_domain_violation());
    assert!(err.to_string().contains("42"));
    assert!(bus.published().await.is_empty());
}

#[tokio::test]
async fn test_failed_capture_over_bus_is_dead_lettered() {
    let bus = bus();
    let script = BillingScript::new();
    script.reject(Op::GetTransaction, OrderId(8), "Transaction not found");
    TransactionOrchestrator::new(bus.clone(), script.factory())
        .start()
        .unwrap();

    bus.publish(IntegrationEvent::OrderLoweredStock(order_lowered_stock(8, 3)))
        .await
        .unwrap();
    bus.drain().await;

    assert!(paid_events(&bus.published().await).is_empty());
    let dead_letters = bus.dead_letters().await;
    assert_eq!(dead_letters.len(), 1);
    assert_eq!(dead_letters[0].topic, Topic::UpdateStockOrder);
    assert!(dead_letters[0].error.contains("8"));
    // Every redelivery runs in a fresh scope.
    assert_eq!(script.instances(), 2);
}

#[tokio::test]
async fn test_rejected_cancel_fails_with_order_id() {
    let bus = bus();
    let script = BillingScript::new();
    script.reject(Op::Cancel, OrderId(99), "Transaction not found");
    let orchestrator = TransactionOrchestrator::new(bus.clone(), script.factory());

    let err = orchestrator
        .cancel_transaction(order_canceled(99))
        .await
        .unwrap_err();

    match &err {
        BillingError::DomainViolation { order_id, message } => {
            assert_eq!(*order_id, OrderId(99));
            assert!(message.contains("99"));
        }
        other => panic!("expected a domain violation, got {other:?}"),
    }
    assert!(bus.published().await.is_empty());
}

#[tokio::test]
async fn test_successful_cancel_publishes_nothing() {
    let bus = bus();
    let script = BillingScript::new();
    let orchestrator = TransactionOrchestrator::new(bus.clone(), script.factory());
    orchestrator.start().unwrap();

    bus.publish(IntegrationEvent::OrderCanceled(order_canceled(5)))
        .await
        .unwrap();
    bus.drain().await;

    assert_eq!(bus.published().await.len(), 1);
    assert!(paid_events(&bus.published().await).is_empty());
    assert!(bus.dead_letters().await.is_empty());
    assert_eq!(script.calls()[0].op, Op::Cancel);
}

#[tokio::test]
async fn test_capture_before_authorize_is_not_reordered() {
    // No per-order state machine: the capture is forwarded as delivered.
    let bus = bus();
    let ledger = billing_integration::infrastructure::in_memory_billing::InMemoryLedger::new();
    let orchestrator = TransactionOrchestrator::new(bus.clone(), ledger.factory());

    let early = orchestrator.capture_payment(order_lowered_stock(11, 1)).await;
    assert!(early.unwrap_err().is_domain_violation());

    assert!(orchestrator
        .authorize_transaction(order_initiated(11))
        .await
        .unwrap()
        .is_valid());
    orchestrator
        .capture_payment(order_lowered_stock(11, 1))
        .await
        .unwrap();

    assert_eq!(
        paid_events(&bus.published().await),
        vec![OrderPaid::new(CustomerId(1), OrderId(11))]
    );
}

#[tokio::test]
async fn test_stop_signal_unbinds_handlers() {
    let bus = bus();
    let script = BillingScript::new();
    let orchestrator = TransactionOrchestrator::new(bus.clone(), script.factory());
    let (stop, shutdown) = watch::channel(false);

    let running = tokio::spawn(orchestrator.run(shutdown));
    while !bus.has_responder() {
        tokio::task::yield_now().await;
    }
    assert!(bus.request(order_initiated(1)).await.unwrap().is_valid());

    stop.send(true).unwrap();
    running.await.unwrap().unwrap();

    assert!(bus.request(order_initiated(2)).await.is_err());
    bus.publish(IntegrationEvent::OrderCanceled(order_canceled(2)))
        .await
        .unwrap();
    bus.drain().await;
    assert_eq!(script.calls().len(), 1);
}

#[tokio::test]
async fn test_dropping_stop_sender_also_stops() {
    let bus = bus();
    let script = BillingScript::new();
    let orchestrator = TransactionOrchestrator::new(bus.clone(), script.factory());
    let bindings = orchestrator.start().unwrap();
    let (stop, shutdown) = watch::channel(false);

    drop(stop);
    orchestrator.serve(bindings, shutdown).await;

    assert!(!bus.has_responder());
    assert_eq!(bus.subscriber_count(Topic::UpdateStockOrder), 0);
}

#[tokio::test]
async fn test_scope_released_when_cancel_or_capture_is_rejected() {
    let bus = bus();
    let script = BillingScript::new();
    script.reject(Op::Cancel, OrderId(31), "Transaction not found");
    script.reject(Op::GetTransaction, OrderId(32), "Transaction not found");
    let orchestrator = TransactionOrchestrator::new(bus.clone(), script.factory());

    let canceled = orchestrator.cancel_transaction(order_canceled(31)).await;
    assert!(canceled.unwrap_err().is_domain_violation());
    assert_eq!(script.instances(), 1);
    assert_eq!(script.released(), 1);

    let captured = orchestrator
        .capture_payment(order_lowered_stock(32, 4))
        .await;
    assert!(captured.unwrap_err().is_domain_violation());
    assert_eq!(script.instances(), 2);
    assert_eq!(script.released(), 2);
}

#[tokio::test]
async fn test_rejected_cancel_is_not_redelivered_after_stop() {
    let bus = Arc::new(InMemoryBus::new(BusConfig {
        max_delivery_attempts: 3,
        redelivery_delay: Duration::from_millis(100),
    }));
    let script = BillingScript::new();
    script.reject(Op::Cancel, OrderId(61), "Transaction not found");
    let orchestrator = TransactionOrchestrator::new(bus.clone(), script.factory());
    let bindings = orchestrator.start().unwrap();
    let (stop, shutdown) = watch::channel(false);
    let serving = tokio::spawn({
        let orchestrator = orchestrator.clone();
        async move { orchestrator.serve(bindings, shutdown).await }
    });

    bus.publish(IntegrationEvent::OrderCanceled(order_canceled(61)))
        .await
        .unwrap();
    while script.calls().is_empty() {
        tokio::task::yield_now().await;
    }
    stop.send(true).unwrap();
    serving.await.unwrap();
    bus.drain().await;

    assert_eq!(script.calls().len(), 1);
    let dead_letters = bus.dead_letters().await;
    assert_eq!(dead_letters.len(), 1);
    assert_eq!(dead_letters[0].topic, Topic::OrderCanceled);
    assert_eq!(dead_letters[0].attempts, 1);
}
