use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;

use super::cart_service::CartService;
use crate::{
    errors::ServiceError,
    orders::{OrderAttempt, OrderAttemptStatus, OrderBook, OrderId, OrderReceipt, TransitionOutcome},
    payments::{CheckoutFlow, PaymentGateway},
};

/// Why a payment could not be confirmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationFailure {
    SessionNotFound,
    OrderMismatch,
    NotPaid,
    PaymentFailed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct Confirmation {
    pub confirmed: bool,
    pub order_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount_total: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<ConfirmationFailure>,
}

impl Confirmation {
    fn rejected(order_id: &str, reason: ConfirmationFailure) -> Self {
        Self {
            confirmed: false,
            order_id: order_id.to_string(),
            customer_name: None,
            amount_total: None,
            currency: None,
            customer_email: None,
            reason: Some(reason),
        }
    }
}

/// Result of the in-page payment form, as reported by the browser.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EmbeddedOutcome {
    Succeeded,
    Failed { message: Option<String> },
}

/// Closes the loop between a payment attempt and the cart.
///
/// The provider is the only source of truth for "paid". A cart is cleared
/// only after the provider confirms the session, the session carries the
/// presented order id, and the attempt moves to `Confirmed` for the first time.
#[derive(Clone)]
pub struct ReconciliationService {
    gateway: Arc<dyn PaymentGateway>,
    orders: Arc<OrderBook>,
    carts: CartService,
}

impl ReconciliationService {
    pub fn new(gateway: Arc<dyn PaymentGateway>, orders: Arc<OrderBook>, carts: CartService) -> Self {
        Self {
            gateway,
            orders,
            carts,
        }
    }

    /// Verifies a redirect-flow return and finalizes the order.
    ///
    /// # Arguments
    ///
    /// * `provider_session_id` - Session reference from the return URL
    /// * `order_id` - Order id the client presented
    ///
    /// # Returns
    ///
    /// * `Ok(Confirmation)` with `confirmed: false` and a reason when verification fails
    /// * `Err(ServiceError::PaymentServiceUnavailable)` - Provider unreachable; nothing changes
    #[instrument(skip(self))]
    pub async fn confirm_and_finalize(
        &self,
        provider_session_id: &str,
        order_id: &str,
    ) -> Result<Confirmation, ServiceError> {
        let order_id = OrderId::parse(order_id)?;
        let order_id = order_id.as_str();
        let provider_session_id = provider_session_id.trim();
        if provider_session_id.is_empty() {
            return Err(ServiceError::ValidationError(
                "provider session id is required".to_string(),
            ));
        }

        let attempt = self.orders.get(order_id);
        if let Some(attempt) = &attempt {
            if attempt.status == OrderAttemptStatus::Confirmed
                && attempt.provider_session_id.as_deref() == Some(provider_session_id)
            {
                info!(order_id, "order already confirmed");
                return Ok(Self::confirmed_from_attempt(attempt));
            }
        }

        let session = self
            .gateway
            .retrieve_session(provider_session_id)
            .await
            .map_err(|e| {
                error!(order_id, gateway = self.gateway.name(), "payment verification failed: {}", e);
                ServiceError::from(e)
            })?;

        let Some(session) = session else {
            warn!(order_id, provider_session_id, "payment session not found");
            return Ok(Confirmation::rejected(order_id, ConfirmationFailure::SessionNotFound));
        };

        if session.metadata.order_id.as_deref() != Some(order_id) {
            warn!(
                order_id,
                session_order_id = ?session.metadata.order_id,
                "payment session belongs to a different order"
            );
            let bound_here = attempt
                .as_ref()
                .and_then(|a| a.provider_session_id.as_deref())
                == Some(provider_session_id);
            if bound_here {
                if let Err(e) = self.orders.fail(order_id, "provider session order id mismatch") {
                    warn!(order_id, "could not mark attempt failed: {}", e);
                }
            }
            return Ok(Confirmation::rejected(order_id, ConfirmationFailure::OrderMismatch));
        }

        if !session.payment_status.is_paid() {
            info!(order_id, status = ?session.payment_status, "payment not completed");
            return Ok(Confirmation::rejected(order_id, ConfirmationFailure::NotPaid));
        }

        self.finalize(order_id).await?;

        Ok(Confirmation {
            confirmed: true,
            order_id: order_id.to_string(),
            customer_name: session
                .metadata
                .customer_name
                .or_else(|| attempt.as_ref().map(|a| a.contact.name.clone())),
            amount_total: session.amount_total,
            currency: session.currency,
            customer_email: session.customer_email,
            reason: None,
        })
    }

    /// Records the result of the embedded payment form.
    ///
    /// Both outcomes are verified with the provider before the attempt changes.
    #[instrument(skip(self))]
    pub async fn confirm_embedded(
        &self,
        order_id: &str,
        outcome: EmbeddedOutcome,
    ) -> Result<Confirmation, ServiceError> {
        let order_id = OrderId::parse(order_id)?;
        let attempt = self
            .orders
            .get(order_id.as_str())
            .ok_or_else(|| ServiceError::NotFound(format!("order {order_id}")))?;
        if attempt.flow != CheckoutFlow::Embedded {
            return Err(ServiceError::InvalidOperation(format!(
                "order {order_id} was not placed with the embedded payment form"
            )));
        }

        match outcome {
            EmbeddedOutcome::Succeeded => {
                let provider_session_id = attempt.provider_session_id.as_deref().ok_or_else(|| {
                    ServiceError::InvalidOperation(format!(
                        "order {order_id} has no payment session"
                    ))
                })?;
                self.confirm_and_finalize(provider_session_id, order_id.as_str())
                    .await
            }
            EmbeddedOutcome::Failed { message } => {
                let reason = message.unwrap_or_else(|| "payment failed".to_string());
                self.record_embedded_failure(&attempt, &reason).await
            }
        }
    }

    /// A decline reported by the browser is checked against the provider. The intent stays
    /// open for another card unless the provider has closed it, and a later successful
    /// retry must still be able to confirm the order.
    async fn record_embedded_failure(
        &self,
        attempt: &OrderAttempt,
        reason: &str,
    ) -> Result<Confirmation, ServiceError> {
        let order_id = attempt.order_id.as_str();
        let Some(provider_session_id) = attempt.provider_session_id.as_deref() else {
            let (_, attempt) = self.orders.fail(order_id, reason)?;
            info!(order_id, status = ?attempt.status, "embedded payment failed before a session existed");
            return Ok(Confirmation::rejected(order_id, ConfirmationFailure::PaymentFailed));
        };

        let session = self
            .gateway
            .retrieve_session(provider_session_id)
            .await
            .map_err(|e| {
                error!(order_id, gateway = self.gateway.name(), "payment verification failed: {}", e);
                ServiceError::from(e)
            })?;

        match session {
            Some(session)
                if session.payment_status.is_paid()
                    && session.metadata.order_id.as_deref() == Some(order_id) =>
            {
                info!(order_id, "failure reported but provider shows the order paid");
                self.confirm_and_finalize(provider_session_id, order_id).await
            }
            Some(session) if session.payment_status.is_closed() => {
                let (_, attempt) = self.orders.fail(order_id, reason)?;
                info!(order_id, status = ?attempt.status, "embedded payment failed");
                Ok(Confirmation::rejected(order_id, ConfirmationFailure::PaymentFailed))
            }
            _ => {
                self.orders.note_failure(order_id, reason)?;
                info!(order_id, "embedded payment declined, awaiting retry");
                Ok(Confirmation::rejected(order_id, ConfirmationFailure::PaymentFailed))
            }
        }
    }

    /// Guest came back from the cancel URL. The cart is left as it was.
    #[instrument(skip(self))]
    pub async fn abandon(&self, order_id: &str) -> Result<OrderReceipt, ServiceError> {
        let order_id = OrderId::parse(order_id)?;
        let (outcome, attempt) = self
            .orders
            .transition(order_id.as_str(), OrderAttemptStatus::Abandoned)?;
        if outcome == TransitionOutcome::Applied {
            info!(order_id = %order_id, "order attempt abandoned");
        }
        Ok(attempt.receipt(Utc::now()))
    }

    pub async fn order_status(&self, order_id: &str) -> Result<OrderReceipt, ServiceError> {
        let order_id = OrderId::parse(order_id)?;
        self.orders
            .get(order_id.as_str())
            .map(|a| a.receipt(Utc::now()))
            .ok_or_else(|| ServiceError::NotFound(format!("order {order_id}")))
    }

    /// Moves the attempt to `Confirmed` and clears its cart the first time only.
    async fn finalize(&self, order_id: &str) -> Result<(), ServiceError> {
        match self.orders.transition(order_id, OrderAttemptStatus::Confirmed) {
            Ok((TransitionOutcome::Applied, attempt)) => {
                info!(order_id, session = %attempt.session_id, "order confirmed");
                if let Err(e) = self.carts.clear(&attempt.session_id).await {
                    warn!(order_id, "order confirmed but cart could not be cleared: {}", e);
                }
                Ok(())
            }
            Ok((TransitionOutcome::AlreadyInState, _)) => Ok(()),
            // Paid at the provider but unknown here, e.g. after a restart.
            Err(ServiceError::NotFound(_)) => {
                warn!(order_id, "paid session for an order this process does not know");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn confirmed_from_attempt(attempt: &OrderAttempt) -> Confirmation {
        Confirmation {
            confirmed: true,
            order_id: attempt.order_id.to_string(),
            customer_name: Some(attempt.contact.name.clone()),
            amount_total: Some(attempt.totals.grand_total_cents),
            currency: None,
            customer_email: attempt.contact.email.clone(),
            reason: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cart::{MemoryCartStorage, TaxRate};
    use crate::catalog::{CatalogLookup, StaticCatalog};
    use crate::orders::ContactInfo;
    use crate::payments::{ProviderPaymentStatus, SandboxGateway};
    use crate::services::commerce::cart_service::AddLineInput;
    use crate::services::commerce::checkout_service::{
        CheckoutService, CheckoutSettings, SubmitOrderInput,
    };
    use crate::cart::TipPercent;

    const SESSION: &str = "session-recon";

    struct Harness {
        carts: CartService,
        checkout: CheckoutService,
        recon: ReconciliationService,
        gateway: Arc<SandboxGateway>,
        orders: Arc<OrderBook>,
    }

    fn harness(flow: CheckoutFlow) -> Harness {
        let catalog: Arc<dyn CatalogLookup> = Arc::new(StaticCatalog::haveli());
        let carts = CartService::new(
            Arc::clone(&catalog),
            Arc::new(MemoryCartStorage::new()),
            TaxRate::DEFAULT,
        );
        let gateway = Arc::new(SandboxGateway::default());
        let orders = Arc::new(OrderBook::new());
        let checkout = CheckoutService::new(
            catalog,
            carts.clone(),
            gateway.clone(),
            Arc::clone(&orders),
            CheckoutSettings {
                flow,
                ..CheckoutSettings::default()
            },
        );
        let recon = ReconciliationService::new(gateway.clone(), Arc::clone(&orders), carts.clone());
        Harness {
            carts,
            checkout,
            recon,
            gateway,
            orders,
        }
    }

    async fn submit(h: &Harness) -> (String, String) {
        h.carts
            .add_line(
                SESSION,
                AddLineInput {
                    item_id: "butter-chicken".into(),
                    quantity: Some(1),
                    spice_level: None,
                    special_instructions: None,
                },
            )
            .await
            .unwrap();
        let submitted = h
            .checkout
            .submit_order(
                SESSION,
                SubmitOrderInput {
                    contact: ContactInfo {
                        name: "Asha".into(),
                        phone: "555-0100".into(),
                        email: None,
                    },
                    tip_percent: None,
                    pickup: None,
                    notes: None,
                },
            )
            .await
            .unwrap();
        (submitted.provider_session_id, submitted.order_id.to_string())
    }

    async fn cart_len(h: &Harness) -> usize {
        h.carts.get_cart(SESSION, TipPercent::NONE).await.unwrap().lines.len()
    }

    #[tokio::test]
    async fn unpaid_session_is_not_confirmed() {
        let h = harness(CheckoutFlow::Hosted);
        let (psid, order_id) = submit(&h).await;
        let result = h.recon.confirm_and_finalize(&psid, &order_id).await.unwrap();
        assert!(!result.confirmed);
        assert_eq!(result.reason, Some(ConfirmationFailure::NotPaid));
        assert_eq!(cart_len(&h).await, 1);
        assert_eq!(
            h.orders.get(&order_id).unwrap().status,
            OrderAttemptStatus::AwaitingPayment
        );
    }

    #[tokio::test]
    async fn provider_outage_fails_closed() {
        let h = harness(CheckoutFlow::Hosted);
        let (psid, order_id) = submit(&h).await;
        h.gateway.mark_paid(&psid);
        h.gateway.set_offline(true);
        let err = h.recon.confirm_and_finalize(&psid, &order_id).await.unwrap_err();
        assert!(matches!(err, ServiceError::PaymentServiceUnavailable(_)));
        assert_eq!(cart_len(&h).await, 1);
    }

    #[tokio::test]
    async fn abandoned_attempt_keeps_cart() {
        let h = harness(CheckoutFlow::Hosted);
        let (_, order_id) = submit(&h).await;
        let receipt = h.recon.abandon(&order_id).await.unwrap();
        assert_eq!(receipt.status, OrderAttemptStatus::Abandoned);
        assert_eq!(cart_len(&h).await, 1);
    }

    #[tokio::test]
    async fn embedded_success_is_verified_with_provider() {
        let h = harness(CheckoutFlow::Embedded);
        let (psid, order_id) = submit(&h).await;

        let early = h
            .recon
            .confirm_embedded(&order_id, EmbeddedOutcome::Succeeded)
            .await
            .unwrap();
        assert!(!early.confirmed);

        h.gateway.mark_paid(&psid);
        let confirmed = h
            .recon
            .confirm_embedded(&order_id, EmbeddedOutcome::Succeeded)
            .await
            .unwrap();
        assert!(confirmed.confirmed);
        assert_eq!(cart_len(&h).await, 0);
    }

    #[tokio::test]
    async fn embedded_decline_keeps_attempt_open_for_retry() {
        let h = harness(CheckoutFlow::Embedded);
        let (psid, order_id) = submit(&h).await;
        let result = h
            .recon
            .confirm_embedded(
                &order_id,
                EmbeddedOutcome::Failed {
                    message: Some("card_declined".into()),
                },
            )
            .await
            .unwrap();
        assert_eq!(result.reason, Some(ConfirmationFailure::PaymentFailed));
        let attempt = h.orders.get(&order_id).unwrap();
        assert_eq!(attempt.status, OrderAttemptStatus::AwaitingPayment);
        assert_eq!(attempt.failure_reason.as_deref(), Some("card_declined"));
        assert_eq!(cart_len(&h).await, 1);

        h.gateway.mark_paid(&psid);
        let confirmed = h
            .recon
            .confirm_embedded(&order_id, EmbeddedOutcome::Succeeded)
            .await
            .unwrap();
        assert!(confirmed.confirmed);
        assert_eq!(cart_len(&h).await, 0);
        assert!(h.orders.get(&order_id).unwrap().failure_reason.is_none());
    }

    #[tokio::test]
    async fn embedded_failure_on_canceled_intent_is_terminal() {
        let h = harness(CheckoutFlow::Embedded);
        let (psid, order_id) = submit(&h).await;
        h.gateway
            .set_status(&psid, ProviderPaymentStatus::Other("canceled".into()));
        h.recon
            .confirm_embedded(&order_id, EmbeddedOutcome::Failed { message: None })
            .await
            .unwrap();
        let attempt = h.orders.get(&order_id).unwrap();
        assert_eq!(attempt.status, OrderAttemptStatus::Failed);
        assert_eq!(attempt.failure_reason.as_deref(), Some("payment failed"));
        assert_eq!(cart_len(&h).await, 1);
    }

    #[tokio::test]
    async fn embedded_result_rejected_for_hosted_orders() {
        let h = harness(CheckoutFlow::Hosted);
        let (_, order_id) = submit(&h).await;
        let err = h
            .recon
            .confirm_embedded(&order_id, EmbeddedOutcome::Succeeded)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidOperation(_)));
    }
}
