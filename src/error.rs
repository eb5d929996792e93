use crate::domain::events::OrderId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BillingError {
    /// A billing rule rejected the operation for this order.
    #[error("Domain violation: {message}")]
    DomainViolation { order_id: OrderId, message: String },
    /// The billing facade could not be reached or failed internally.
    #[error("Dependency failure: {0}")]
    Dependency(String),
    #[error("Bus error: {0}")]
    Bus(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl BillingError {
    pub fn domain_violation(order_id: OrderId, message: impl Into<String>) -> Self {
        Self::DomainViolation {
            order_id,
            message: message.into(),
        }
    }

    pub fn is_domain_violation(&self) -> bool {
        matches!(self, Self::DomainViolation { .. })
    }
}

pub type Result<T> = std::result::Result<T, BillingError>;
