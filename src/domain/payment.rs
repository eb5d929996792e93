use crate::domain::events::{OrderId, OrderInitiated};
use crate::error::BillingError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Represents a positive monetary amount to be charged.
///
/// Ensures that payment amounts are always positive.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Amount(Decimal);

impl Amount {
    pub fn new(value: Decimal) -> Result<Self, BillingError> {
        if value > Decimal::ZERO {
            Ok(Self(value))
        } else {
            Err(BillingError::Validation(
                "Amount must be positive".to_string(),
            ))
        }
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = BillingError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentType {
    CreditCard,
    DebitCard,
    /// A wire value no billing method is known for. Kept so the billing side can reject it.
    Unrecognized(i32),
}

impl PaymentType {
    pub fn is_recognized(&self) -> bool {
        !matches!(self, PaymentType::Unrecognized(_))
    }
}

impl From<i32> for PaymentType {
    fn from(value: i32) -> Self {
        match value {
            1 => PaymentType::CreditCard,
            2 => PaymentType::DebitCard,
            other => PaymentType::Unrecognized(other),
        }
    }
}

#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditCard {
    pub holder: String,
    pub number: String,
    pub expiration: String,
    pub security_code: String,
}

impl CreditCard {
    pub fn new(
        holder: impl Into<String>,
        number: impl Into<String>,
        expiration: impl Into<String>,
        security_code: impl Into<String>,
    ) -> Self {
        Self {
            holder: holder.into(),
            number: number.into(),
            expiration: expiration.into(),
            security_code: security_code.into(),
        }
    }
}

impl fmt::Debug for CreditCard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CreditCard")
            .field("holder", &self.holder)
            .field("number", &"****")
            .field("expiration", &self.expiration)
            .field("security_code", &"***")
            .finish()
    }
}

/// A payment request handed to the billing facade.
///
/// Built per message from an `OrderInitiated` event and discarded once the
/// facade has answered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub order_id: OrderId,
    pub payment_type: PaymentType,
    pub amount: Decimal,
    pub credit_card: CreditCard,
}

impl From<&OrderInitiated> for Payment {
    fn from(event: &OrderInitiated) -> Self {
        Self {
            order_id: event.order_id,
            payment_type: PaymentType::from(event.payment_type),
            amount: event.amount,
            credit_card: CreditCard::new(
                event.holder.clone(),
                event.card_number.clone(),
                event.expiration_date.clone(),
                event.security_code.clone(),
            ),
        }
    }
}
