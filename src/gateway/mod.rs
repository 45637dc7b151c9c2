//! Payment gateway abstraction.
//!
//! [`PaymentGateway`] is the seam between checkout services and the
//! processor; [`stripe::StripeGateway`] talks to the Stripe REST API and
//! [`webhook`] verifies and decodes its signed event notifications.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::errors::ServiceError;

pub mod stripe;
pub mod webhook;

pub use stripe::StripeGateway;

/// Metadata key linking an intent to the customer placing the order
pub const METADATA_USER_ID: &str = "userId";
/// Metadata key linking an intent to a pending order
pub const METADATA_ORDER_ID: &str = "orderId";
/// Value recorded for `userId` on anonymous checkouts
pub const GUEST_USER: &str = "guest";

/// Parameters for a new payment intent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateIntentRequest {
    /// Amount in the currency's minor unit
    pub amount_minor: i64,
    /// Lowercase ISO 4217 code
    pub currency: String,
    pub metadata: HashMap<String, String>,
}

/// Processor-side lifecycle of an intent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum IntentStatus {
    RequiresPaymentMethod,
    RequiresConfirmation,
    RequiresAction,
    Processing,
    RequiresCapture,
    Canceled,
    Succeeded,
    #[serde(other)]
    Unknown,
}

/// Payment intent as reported by the gateway
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    #[serde(default)]
    pub amount: i64,
    #[serde(default)]
    pub currency: String,
    pub status: IntentStatus,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl PaymentIntent {
    pub fn is_succeeded(&self) -> bool {
        self.status == IntentStatus::Succeeded
    }

    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Creates a card payment intent for the given amount
    async fn create_intent(
        &self,
        request: CreateIntentRequest,
    ) -> Result<PaymentIntent, ServiceError>;

    /// Fetches the current state of an intent
    async fn retrieve_intent(&self, intent_id: &str) -> Result<PaymentIntent, ServiceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_statuses_do_not_fail_decoding() {
        let intent: PaymentIntent = serde_json::from_value(serde_json::json!({
            "id": "pi_1",
            "amount": 1000,
            "currency": "usd",
            "status": "some_future_status"
        }))
        .unwrap();
        assert_eq!(intent.status, IntentStatus::Unknown);
        assert!(!intent.is_succeeded());
    }

    #[test]
    fn empty_metadata_values_are_ignored() {
        let mut intent: PaymentIntent = serde_json::from_value(serde_json::json!({
            "id": "pi_1",
            "status": "succeeded",
            "metadata": { "orderId": "" }
        }))
        .unwrap();
        assert!(intent.metadata_value(METADATA_ORDER_ID).is_none());
        intent
            .metadata
            .insert(METADATA_ORDER_ID.into(), "abc".into());
        assert_eq!(intent.metadata_value(METADATA_ORDER_ID), Some("abc"));
        assert_eq!(IntentStatus::RequiresPaymentMethod.to_string(), "requires_payment_method");
    }
}
