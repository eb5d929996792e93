#![allow(dead_code)]

use async_trait::async_trait;
use billing_integration::domain::events::{
    CustomerId, OrderCanceled, OrderId, OrderInitiated, OrderLoweredStock,
};
use billing_integration::domain::payment::Payment;
use billing_integration::domain::ports::{BillingService, BillingServiceBox, BillingServiceFactory};
use billing_integration::domain::response::ResponseMessage;
use billing_integration::error::Result;
use rand::Rng;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Authorize,
    Cancel,
    GetTransaction,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub instance: u64,
    pub op: Op,
    pub order_id: OrderId,
}

/// Billing double whose verdicts are scripted per operation and order.
/// Unscripted calls succeed.
#[derive(Default)]
pub struct BillingScript {
    verdicts: Mutex<HashMap<(Op, OrderId), ResponseMessage>>,
    calls: Mutex<Vec<Call>>,
    instances: AtomicU64,
    released: AtomicU64,
    /// Instances that were asked about more than one order.
    leaks: AtomicUsize,
    max_jitter_ms: AtomicU64,
}

impl BillingScript {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reject(&self, op: Op, order_id: OrderId, error: &str) {
        self.verdicts
            .lock()
            .unwrap()
            .insert((op, order_id), ResponseMessage::rejected(error));
    }

    pub fn with_jitter(&self, max_ms: u64) {
        self.max_jitter_ms.store(max_ms, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn instances(&self) -> u64 {
        self.instances.load(Ordering::SeqCst)
    }

    /// Instances dropped so far.
    pub fn released(&self) -> u64 {
        self.released.load(Ordering::SeqCst)
    }

    pub fn leaks(&self) -> usize {
        self.leaks.load(Ordering::SeqCst)
    }

    pub fn factory(self: &Arc<Self>) -> BillingServiceFactory {
        let script = self.clone();
        Arc::new(move || {
            let instance = script.instances.fetch_add(1, Ordering::SeqCst) + 1;
            Box::new(ScriptedBilling {
                instance,
                script: script.clone(),
                seen: Mutex::new(Vec::new()),
            }) as BillingServiceBox
        })
    }

    fn verdict(&self, op: Op, order_id: OrderId) -> ResponseMessage {
        self.verdicts
            .lock()
            .unwrap()
            .get(&(op, order_id))
            .cloned()
            .unwrap_or_else(ResponseMessage::ok)
    }
}

pub struct ScriptedBilling {
    instance: u64,
    script: Arc<BillingScript>,
    /// Per-instance state; must only ever hold the order of the scope that owns it.
    seen: Mutex<Vec<OrderId>>,
}

impl ScriptedBilling {
    async fn handle(&self, op: Op, order_id: OrderId) -> Result<ResponseMessage> {
        {
            let mut seen = self.seen.lock().unwrap();
            seen.push(order_id);
            if seen.iter().any(|other| *other != order_id) {
                self.script.leaks.fetch_add(1, Ordering::SeqCst);
            }
        }

        let max_jitter = self.script.max_jitter_ms.load(Ordering::SeqCst);
        if max_jitter > 0 {
            let delay = rand::thread_rng().gen_range(0..=max_jitter);
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        self.script.calls.lock().unwrap().push(Call {
            instance: self.instance,
            op,
            order_id,
        });
        Ok(self.script.verdict(op, order_id))
    }
}

impl Drop for ScriptedBilling {
    fn drop(&mut self) {
        self.script.released.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl BillingService for ScriptedBilling {
    async fn authorize(&self, payment: Payment) -> Result<ResponseMessage> {
        self.handle(Op::Authorize, payment.order_id).await
    }

    async fn cancel(&self, order_id: OrderId) -> Result<ResponseMessage> {
        self.handle(Op::Cancel, order_id).await
    }

    async fn get_transaction(&self, order_id: OrderId) -> Result<ResponseMessage> {
        self.handle(Op::GetTransaction, order_id).await
    }
}

pub fn order_initiated(order_id: u64) -> OrderInitiated {
    OrderInitiated {
        order_id: OrderId(order_id),
        customer_id: CustomerId(7),
        payment_type: 1,
        amount: dec!(150.00),
        holder: "A B".to_string(),
        card_number: "4111111111111111".to_string(),
        expiration_date: "12/28".to_string(),
        security_code: "123".to_string(),
    }
}

pub fn order_canceled(order_id: u64) -> OrderCanceled {
    OrderCanceled {
        order_id: OrderId(order_id),
        customer_id: CustomerId(7),
    }
}

pub fn order_lowered_stock(order_id: u64, customer_id: u64) -> OrderLoweredStock {
    OrderLoweredStock {
        order_id: OrderId(order_id),
        customer_id: CustomerId(customer_id),
    }
}
