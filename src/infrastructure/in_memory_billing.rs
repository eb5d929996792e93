use crate::domain::events::OrderId;
use crate::domain::payment::{Amount, Payment, PaymentType};
use crate::domain::ports::{BillingService, BillingServiceBox, BillingServiceFactory};
use crate::domain::response::ResponseMessage;
use crate::error::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TransactionStatus {
    Authorized,
    Paid,
    Denied,
    Canceled,
}

/// A card transaction recorded against an order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transaction {
    pub order_id: OrderId,
    pub payment_type: PaymentType,
    pub amount: Decimal,
    pub status: TransactionStatus,
}

/// Shared transaction history behind every `InMemoryBillingService`.
///
/// Cards given to [`with_declined_cards`](Self::with_declined_cards) are refused at authorization.
#[derive(Default, Clone)]
pub struct InMemoryLedger {
    transactions: Arc<RwLock<HashMap<OrderId, Vec<Transaction>>>>,
    declined_cards: Arc<HashSet<String>>,
    instances: Arc<AtomicU64>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_declined_cards<I, S>(cards: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            declined_cards: Arc::new(cards.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    pub fn is_declined(&self, number: &str) -> bool {
        self.declined_cards.contains(number)
    }

    /// Factory handing out a new service instance per call, all backed by this ledger.
    pub fn factory(&self) -> BillingServiceFactory {
        let ledger = self.clone();
        Arc::new(move || Box::new(InMemoryBillingService::new(ledger.clone())) as BillingServiceBox)
    }

    /// Number of service instances created through [`factory`](Self::factory).
    pub fn instances_created(&self) -> u64 {
        self.instances.load(Ordering::SeqCst)
    }

    pub async fn transactions(&self, order_id: OrderId) -> Vec<Transaction> {
        self.transactions
            .read()
            .await
            .get(&order_id)
            .cloned()
            .unwrap_or_default()
    }

    async fn record(&self, transaction: Transaction) {
        self.transactions
            .write()
            .await
            .entry(transaction.order_id)
            .or_default()
            .push(transaction);
    }

    /// Moves the authorized transaction of `order_id` to `status`.
    async fn settle(&self, order_id: OrderId, status: TransactionStatus) -> bool {
        let mut transactions = self.transactions.write().await;
        match transactions
            .get_mut(&order_id)
            .and_then(|txs| {
                txs.iter_mut()
                    .find(|tx| tx.status == TransactionStatus::Authorized)
            }) {
            Some(tx) => {
                tx.status = status;
                true
            }
            None => false,
        }
    }
}

/// Billing service resolved per message scope.
pub struct InMemoryBillingService {
    instance: u64,
    ledger: InMemoryLedger,
}

impl InMemoryBillingService {
    pub fn new(ledger: InMemoryLedger) -> Self {
        let instance = ledger.instances.fetch_add(1, Ordering::SeqCst) + 1;
        Self { instance, ledger }
    }
}

#[async_trait]
impl BillingService for InMemoryBillingService {
    async fn authorize(&self, payment: Payment) -> Result<ResponseMessage> {
        if Amount::new(payment.amount).is_err() {
            return Ok(ResponseMessage::rejected("Invalid payment amount"));
        }
        if !payment.payment_type.is_recognized() {
            return Ok(ResponseMessage::rejected("Unsupported payment type"));
        }

        let declined = self.ledger.is_declined(&payment.credit_card.number);
        let status = if declined {
            TransactionStatus::Denied
        } else {
            TransactionStatus::Authorized
        };

        tracing::debug!(
            order_id = %payment.order_id,
            instance = self.instance,
            status = ?status,
            "transaction recorded"
        );
        self.ledger
            .record(Transaction {
                order_id: payment.order_id,
                payment_type: payment.payment_type,
                amount: payment.amount,
                status,
            })
            .await;

        if declined {
            Ok(ResponseMessage::rejected(
                "Payment denied, please try another card",
            ))
        } else {
            Ok(ResponseMessage::ok())
        }
    }

    async fn cancel(&self, order_id: OrderId) -> Result<ResponseMessage> {
        if self
            .ledger
            .settle(order_id, TransactionStatus::Canceled)
            .await
        {
            Ok(ResponseMessage::ok())
        } else {
            Ok(ResponseMessage::rejected(format!(
                "Transaction not found for order {order_id}"
            )))
        }
    }

    async fn get_transaction(&self, order_id: OrderId) -> Result<ResponseMessage> {
        if self.ledger.settle(order_id, TransactionStatus::Paid).await {
            Ok(ResponseMessage::ok())
        } else {
            Ok(ResponseMessage::rejected(format!(
                "Transaction not found for order {order_id}"
            )))
        }
    }
}
