//! Card payment processor seam.
//!
//! Handlers talk to [`PaymentGateway`]; production wires in
//! [`stripe::StripeClient`], tests substitute an in-memory fake.

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use rust_decimal::{Decimal, RoundingStrategy, prelude::ToPrimitive};
use serde::Deserialize;
use uuid::Uuid;

pub mod stripe;
pub mod webhook;

/// Intent status reported by the processor once the charge went through.
pub const INTENT_SUCCEEDED: &str = "succeeded";

#[derive(Debug, Clone)]
pub struct CreateIntent {
    /// Amount in minor units (cents).
    pub amount: i64,
    pub currency: String,
    pub order_id: Uuid,
    pub user_id: Uuid,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    pub client_secret: Option<String>,
    pub status: String,
    #[serde(default)]
    pub amount: i64,
    #[serde(default)]
    pub currency: String,
}

impl PaymentIntent {
    pub fn is_succeeded(&self) -> bool {
        self.status == INTENT_SUCCEEDED
    }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_intent(&self, request: CreateIntent) -> Result<PaymentIntent>;

    async fn retrieve_intent(&self, intent_id: &str) -> Result<PaymentIntent>;
}

/// Convert a decimal amount into minor units, rounding half away from zero.
pub fn to_minor_units(amount: Decimal) -> Result<i64> {
    (amount * Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .ok_or_else(|| anyhow!("amount {amount} does not fit in minor units"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn converts_to_cents() {
        assert_eq!(to_minor_units(Decimal::from_str("24.99").unwrap()).unwrap(), 2499);
        assert_eq!(to_minor_units(Decimal::from(10)).unwrap(), 1000);
    }

    #[test]
    fn rounds_half_cents_up() {
        assert_eq!(to_minor_units(Decimal::from_str("0.005").unwrap()).unwrap(), 1);
        assert_eq!(to_minor_units(Decimal::from_str("19.994").unwrap()).unwrap(), 1999);
    }

    #[test]
    fn succeeded_status_is_exact() {
        let intent = PaymentIntent {
            id: "pi_1".into(),
            client_secret: None,
            status: "requires_payment_method".into(),
            amount: 100,
            currency: "usd".into(),
        };
        assert!(!intent.is_succeeded());
        let intent = PaymentIntent {
            status: INTENT_SUCCEEDED.into(),
            ..intent
        };
        assert!(intent.is_succeeded());
    }
}
