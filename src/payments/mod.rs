//! Port to the external payment processor.
//!
//! Amounts are integer minor units and currency codes are lower-case ISO 4217.

pub mod sandbox;
pub mod stripe;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use crate::circuit_breaker::CircuitBreakerMetrics;

pub use sandbox::SandboxGateway;
pub use stripe::{StripeConfig, StripeGateway};

/// How the guest pays: redirected to a provider-hosted page, or through a form embedded in our page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum CheckoutFlow {
    #[default]
    Hosted,
    Embedded,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PaymentError {
    #[error("payment provider unreachable: {0}")]
    Unavailable(String),
    #[error("payment provider circuit is open")]
    CircuitOpen,
    #[error("payment request rejected: {0}")]
    Rejected(String),
    #[error("unexpected payment provider response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentLineItem {
    pub description: String,
    /// Secondary text shown under the description, when the provider supports it
    pub detail: Option<String>,
    pub unit_price_cents: i64,
    pub quantity: u32,
}

impl PaymentLineItem {
    pub fn total_cents(&self) -> i64 {
        self.unit_price_cents
            .saturating_mul(i64::from(self.quantity))
    }
}

/// Metadata stored on the provider session and read back during verification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PaymentMetadata {
    pub order_id: Option<String>,
    pub customer_name: Option<String>,
    pub customer_phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentRequest {
    pub line_items: Vec<PaymentLineItem>,
    pub currency: String,
    pub metadata: PaymentMetadata,
    pub flow: CheckoutFlow,
    pub customer_email: Option<String>,
    /// Hosted flow only: where the provider sends the guest afterwards
    pub success_url: String,
    pub cancel_url: String,
}

impl PaymentRequest {
    pub fn amount_cents(&self) -> i64 {
        self.line_items
            .iter()
            .fold(0i64, |acc, item| acc.saturating_add(item.total_cents()))
    }
}

/// What the presentation layer needs to continue the payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PaymentReference {
    RedirectUrl(String),
    ClientSecret(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentHandle {
    pub provider_session_id: String,
    pub reference: PaymentReference,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ProviderPaymentStatus {
    Paid,
    Unpaid,
    NoPaymentRequired,
    Other(String),
}

impl ProviderPaymentStatus {
    pub fn from_checkout_status(raw: &str) -> Self {
        match raw {
            "paid" => Self::Paid,
            "unpaid" => Self::Unpaid,
            "no_payment_required" => Self::NoPaymentRequired,
            other => Self::Other(other.to_string()),
        }
    }

    /// Payment intents report `succeeded` once funds are captured.
    pub fn from_intent_status(raw: &str) -> Self {
        match raw {
            "succeeded" => Self::Paid,
            "requires_payment_method" | "requires_confirmation" | "requires_action"
            | "processing" => Self::Unpaid,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn is_paid(&self) -> bool {
        matches!(self, Self::Paid)
    }

    /// The provider will not take payment on this session any more.
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Other(status) if status == "canceled" || status == "expired")
    }
}

/// Provider-side view of a payment session, as returned by `retrieve_session`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderSession {
    pub id: String,
    pub payment_status: ProviderPaymentStatus,
    pub metadata: PaymentMetadata,
    pub amount_total: Option<i64>,
    pub currency: Option<String>,
    pub customer_email: Option<String>,
    pub payment_intent_id: Option<String>,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    fn name(&self) -> &'static str;

    async fn create_payment_request(
        &self,
        request: &PaymentRequest,
    ) -> Result<PaymentHandle, PaymentError>;

    /// `Ok(None)` when the provider has no session with this id.
    async fn retrieve_session(
        &self,
        provider_session_id: &str,
    ) -> Result<Option<ProviderSession>, PaymentError>;

    fn circuit_metrics(&self) -> Option<CircuitBreakerMetrics> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_serializes_as_single_keyed_object() {
        let json = serde_json::to_value(PaymentReference::ClientSecret("pi_1_secret".into())).unwrap();
        assert_eq!(json, serde_json::json!({"client_secret": "pi_1_secret"}));
        let json = serde_json::to_value(PaymentReference::RedirectUrl("https://pay".into())).unwrap();
        assert_eq!(json, serde_json::json!({"redirect_url": "https://pay"}));
    }

    #[test]
    fn provider_statuses() {
        assert!(ProviderPaymentStatus::from_checkout_status("paid").is_paid());
        assert!(!ProviderPaymentStatus::from_checkout_status("unpaid").is_paid());
        assert!(ProviderPaymentStatus::from_intent_status("succeeded").is_paid());
        assert_eq!(
            ProviderPaymentStatus::from_intent_status("canceled"),
            ProviderPaymentStatus::Other("canceled".into())
        );
        assert!(ProviderPaymentStatus::from_intent_status("canceled").is_closed());
        assert!(ProviderPaymentStatus::from_checkout_status("expired").is_closed());
        assert!(!ProviderPaymentStatus::from_intent_status("requires_payment_method").is_closed());
    }

    #[test]
    fn flow_parses_lowercase() {
        let flow: CheckoutFlow = serde_json::from_str("\"embedded\"").unwrap();
        assert_eq!(flow, CheckoutFlow::Embedded);
        assert_eq!(CheckoutFlow::default(), CheckoutFlow::Hosted);
    }
}
