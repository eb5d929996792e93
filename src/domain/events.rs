use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(pub u64);

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CustomerId(pub u64);

impl fmt::Display for CustomerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Raised by the ordering side when a customer submits an order and payment must be authorized.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderInitiated {
    pub order_id: OrderId,
    pub customer_id: CustomerId,
    /// Raw wire value, interpreted by `PaymentType::from`.
    pub payment_type: i32,
    pub amount: Decimal,
    pub holder: String,
    pub card_number: String,
    pub expiration_date: String,
    pub security_code: String,
}

// Card fields stay out of logs.
impl fmt::Debug for OrderInitiated {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrderInitiated")
            .field("order_id", &self.order_id)
            .field("customer_id", &self.customer_id)
            .field("payment_type", &self.payment_type)
            .field("amount", &self.amount)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCanceled {
    pub order_id: OrderId,
    pub customer_id: CustomerId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderLoweredStock {
    pub order_id: OrderId,
    pub customer_id: CustomerId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderPaid {
    pub customer_id: CustomerId,
    pub order_id: OrderId,
}

impl OrderPaid {
    pub fn new(customer_id: CustomerId, order_id: OrderId) -> Self {
        Self {
            customer_id,
            order_id,
        }
    }
}

/// Named pub/sub topics. Names must match the other services exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Topic {
    OrderCanceled,
    UpdateStockOrder,
    OrderPaid,
}

impl Topic {
    pub fn name(&self) -> &'static str {
        match self {
            Topic::OrderCanceled => "OrderCanceled",
            Topic::UpdateStockOrder => "UpdateStockOrder",
            Topic::OrderPaid => "OrderPaid",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Every payload that crosses the bus between ordering and billing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum IntegrationEvent {
    OrderInitiated(OrderInitiated),
    OrderCanceled(OrderCanceled),
    OrderLoweredStock(OrderLoweredStock),
    OrderPaid(OrderPaid),
}

impl IntegrationEvent {
    pub fn order_id(&self) -> OrderId {
        match self {
            IntegrationEvent::OrderInitiated(e) => e.order_id,
            IntegrationEvent::OrderCanceled(e) => e.order_id,
            IntegrationEvent::OrderLoweredStock(e) => e.order_id,
            IntegrationEvent::OrderPaid(e) => e.order_id,
        }
    }

    /// `OrderInitiated` travels over the typed request/response channel and has no topic.
    pub fn topic(&self) -> Option<Topic> {
        match self {
            IntegrationEvent::OrderInitiated(_) => None,
            IntegrationEvent::OrderCanceled(_) => Some(Topic::OrderCanceled),
            IntegrationEvent::OrderLoweredStock(_) => Some(Topic::UpdateStockOrder),
            IntegrationEvent::OrderPaid(_) => Some(Topic::OrderPaid),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            IntegrationEvent::OrderInitiated(_) => "OrderInitiated",
            IntegrationEvent::OrderCanceled(_) => "OrderCanceled",
            IntegrationEvent::OrderLoweredStock(_) => "OrderLoweredStock",
            IntegrationEvent::OrderPaid(_) => "OrderPaid",
        }
    }
}
