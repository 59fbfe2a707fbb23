mod common;

use assert_matches::assert_matches;
use common::{guest_order, Services};
use haveli_api::{
    errors::ServiceError,
    orders::OrderAttemptStatus,
    payments::{CheckoutFlow, PaymentMetadata, ProviderPaymentStatus, ProviderSession},
    services::commerce::{ConfirmationFailure, EmbeddedOutcome},
};

const SESSION: &str = "session-reconcile-1";

async fn submitted(services: &Services) -> (String, String) {
    services.add(SESSION, "chicken-biryani", 2).await;
    services.add(SESSION, "garlic-naan", 1).await;
    let order = services
        .checkout
        .submit_order(SESSION, guest_order(None))
        .await
        .expect("submission should succeed");
    (order.order_id.to_string(), order.provider_session_id)
}

#[tokio::test]
async fn unpaid_session_leaves_cart_and_order_untouched() {
    let services = Services::new(CheckoutFlow::Hosted);
    let (order_id, session_id) = submitted(&services).await;

    let confirmation = services
        .reconciliation
        .confirm_and_finalize(&session_id, &order_id)
        .await
        .unwrap();

    assert!(!confirmation.confirmed);
    assert_eq!(confirmation.reason, Some(ConfirmationFailure::NotPaid));
    assert_eq!(services.carts.lines(SESSION).await.unwrap().len(), 2);
    assert_eq!(
        services.orders.get(&order_id).unwrap().status,
        OrderAttemptStatus::AwaitingPayment
    );
}

#[tokio::test]
async fn confirmation_is_idempotent_and_clears_the_cart_once() {
    let services = Services::new(CheckoutFlow::Hosted);
    let (order_id, session_id) = submitted(&services).await;
    assert!(services.gateway.mark_paid(&session_id));

    let first = services
        .reconciliation
        .confirm_and_finalize(&session_id, &order_id)
        .await
        .unwrap();
    assert!(first.confirmed);
    assert_eq!(first.customer_name.as_deref(), Some("Asha Patel"));
    assert!(services.carts.lines(SESSION).await.unwrap().is_empty());

    // The guest starts a new order in the same browser session.
    services.add(SESSION, "garlic-naan", 3).await;

    let again = services
        .reconciliation
        .confirm_and_finalize(&session_id, &order_id)
        .await
        .unwrap();
    assert!(again.confirmed);
    assert_eq!(again.order_id, order_id);

    let lines = services.carts.lines(SESSION).await.unwrap();
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].quantity, 3);
}

#[tokio::test]
async fn paid_total_matches_what_was_charged() {
    let services = Services::new(CheckoutFlow::Hosted);
    let (order_id, session_id) = submitted(&services).await;
    services.gateway.mark_paid(&session_id);

    let confirmation = services
        .reconciliation
        .confirm_and_finalize(&session_id, &order_id)
        .await
        .unwrap();

    let attempt = services.orders.get(&order_id).unwrap();
    assert_eq!(attempt.status, OrderAttemptStatus::Confirmed);
    assert!(attempt.confirmed_at.is_some());
    assert_eq!(confirmation.amount_total, Some(attempt.totals.grand_total_cents));
    assert_eq!(confirmation.currency.as_deref(), Some("usd"));
}

#[tokio::test]
async fn order_mismatch_fails_the_attempt_and_keeps_the_cart() {
    let services = Services::new(CheckoutFlow::Hosted);
    let (order_id, session_id) = submitted(&services).await;
    services.gateway.mark_paid(&session_id);
    assert!(services
        .gateway
        .overwrite_order_id(&session_id, "HAVELI-SOMEONE-ELSE"));

    let confirmation = services
        .reconciliation
        .confirm_and_finalize(&session_id, &order_id)
        .await
        .unwrap();

    assert!(!confirmation.confirmed);
    assert_eq!(confirmation.reason, Some(ConfirmationFailure::OrderMismatch));
    assert_eq!(
        services.orders.get(&order_id).unwrap().status,
        OrderAttemptStatus::Failed
    );
    assert_eq!(services.carts.lines(SESSION).await.unwrap().len(), 2);
}

#[tokio::test]
async fn presenting_another_orders_session_does_not_touch_either_order() {
    let services = Services::new(CheckoutFlow::Hosted);
    let (first_order, first_session) = submitted(&services).await;
    let second = services
        .checkout
        .submit_order(SESSION, guest_order(Some(10)))
        .await
        .unwrap();
    services.gateway.mark_paid(&first_session);

    let confirmation = services
        .reconciliation
        .confirm_and_finalize(&first_session, second.order_id.as_str())
        .await
        .unwrap();

    assert_eq!(confirmation.reason, Some(ConfirmationFailure::OrderMismatch));
    assert_eq!(
        services.orders.get(&first_order).unwrap().status,
        OrderAttemptStatus::AwaitingPayment
    );
    assert_eq!(
        services.orders.get(second.order_id.as_str()).unwrap().status,
        OrderAttemptStatus::AwaitingPayment
    );
}

#[tokio::test]
async fn unknown_provider_session_is_reported() {
    let services = Services::new(CheckoutFlow::Hosted);
    let (order_id, _) = submitted(&services).await;

    let confirmation = services
        .reconciliation
        .confirm_and_finalize("cs_sandbox_999", &order_id)
        .await
        .unwrap();

    assert_eq!(confirmation.reason, Some(ConfirmationFailure::SessionNotFound));
    assert_eq!(services.carts.lines(SESSION).await.unwrap().len(), 2);
}

#[tokio::test]
async fn provider_outage_is_an_error_and_changes_nothing() {
    let services = Services::new(CheckoutFlow::Hosted);
    let (order_id, session_id) = submitted(&services).await;
    services.gateway.mark_paid(&session_id);
    services.gateway.set_offline(true);

    let result = services
        .reconciliation
        .confirm_and_finalize(&session_id, &order_id)
        .await;

    assert_matches!(result, Err(ServiceError::PaymentServiceUnavailable(_)));
    assert_eq!(services.carts.lines(SESSION).await.unwrap().len(), 2);
    assert_eq!(
        services.orders.get(&order_id).unwrap().status,
        OrderAttemptStatus::AwaitingPayment
    );

    // Retrying once the provider is back confirms normally.
    services.gateway.set_offline(false);
    let confirmation = services
        .reconciliation
        .confirm_and_finalize(&session_id, &order_id)
        .await
        .unwrap();
    assert!(confirmation.confirmed);
}

#[tokio::test]
async fn malformed_inputs_are_rejected_before_calling_the_provider() {
    let services = Services::new(CheckoutFlow::Hosted);
    services.gateway.set_offline(true);

    let bad_order = services
        .reconciliation
        .confirm_and_finalize("cs_sandbox_1", "../etc/passwd")
        .await;
    assert_matches!(bad_order, Err(ServiceError::ValidationError(_)));

    let blank_session = services
        .reconciliation
        .confirm_and_finalize("   ", "HAVELI-ABC-1234")
        .await;
    assert_matches!(blank_session, Err(ServiceError::ValidationError(_)));
}

#[tokio::test]
async fn paid_session_for_an_order_this_process_never_saw_is_confirmed() {
    let services = Services::new(CheckoutFlow::Hosted);
    services.add(SESSION, "garlic-naan", 1).await;
    services.gateway.insert_session(ProviderSession {
        id: "cs_restored_1".to_string(),
        payment_status: ProviderPaymentStatus::Paid,
        metadata: PaymentMetadata {
            order_id: Some("HAVELI-LOST-0001".to_string()),
            customer_name: Some("Dev".to_string()),
            customer_phone: None,
        },
        amount_total: Some(1200),
        currency: Some("usd".to_string()),
        customer_email: None,
        payment_intent_id: None,
    });

    let confirmation = services
        .reconciliation
        .confirm_and_finalize("cs_restored_1", "HAVELI-LOST-0001")
        .await
        .unwrap();

    assert!(confirmation.confirmed);
    assert_eq!(confirmation.customer_name.as_deref(), Some("Dev"));
    assert_eq!(confirmation.amount_total, Some(1200));
    // No attempt points at this cart, so it stays.
    assert_eq!(services.carts.lines(SESSION).await.unwrap().len(), 1);
}

#[tokio::test]
async fn abandoned_order_can_still_be_confirmed_when_paid() {
    let services = Services::new(CheckoutFlow::Hosted);
    let (order_id, session_id) = submitted(&services).await;

    let receipt = services.reconciliation.abandon(&order_id).await.unwrap();
    assert_eq!(receipt.status, OrderAttemptStatus::Abandoned);
    assert_eq!(services.carts.lines(SESSION).await.unwrap().len(), 2);

    services.gateway.mark_paid(&session_id);
    let confirmation = services
        .reconciliation
        .confirm_and_finalize(&session_id, &order_id)
        .await
        .unwrap();
    assert!(confirmation.confirmed);
    assert!(services.carts.lines(SESSION).await.unwrap().is_empty());
}

#[tokio::test]
async fn declined_card_then_successful_retry_confirms_the_order() {
    let services = Services::new(CheckoutFlow::Embedded);
    let (order_id, session_id) = submitted(&services).await;

    let declined = services
        .reconciliation
        .confirm_embedded(
            &order_id,
            EmbeddedOutcome::Failed {
                message: Some("card declined".to_string()),
            },
        )
        .await
        .unwrap();
    assert_eq!(declined.reason, Some(ConfirmationFailure::PaymentFailed));

    let attempt = services.orders.get(&order_id).unwrap();
    assert_eq!(attempt.status, OrderAttemptStatus::AwaitingPayment);
    assert_eq!(attempt.failure_reason.as_deref(), Some("card declined"));
    assert_eq!(services.carts.lines(SESSION).await.unwrap().len(), 2);

    // Second card on the same intent goes through.
    services.gateway.mark_paid(&session_id);
    let confirmation = services
        .reconciliation
        .confirm_embedded(&order_id, EmbeddedOutcome::Succeeded)
        .await
        .unwrap();
    assert!(confirmation.confirmed);
    assert!(services.carts.lines(SESSION).await.unwrap().is_empty());
    assert_eq!(
        services.orders.get(&order_id).unwrap().status,
        OrderAttemptStatus::Confirmed
    );
}

#[tokio::test]
async fn failure_report_for_a_paid_intent_confirms_instead() {
    let services = Services::new(CheckoutFlow::Embedded);
    let (order_id, session_id) = submitted(&services).await;
    services.gateway.mark_paid(&session_id);

    let confirmation = services
        .reconciliation
        .confirm_embedded(&order_id, EmbeddedOutcome::Failed { message: None })
        .await
        .unwrap();
    assert!(confirmation.confirmed);
    assert!(services.carts.lines(SESSION).await.unwrap().is_empty());
}

#[tokio::test]
async fn canceled_embedded_payment_is_terminal() {
    let services = Services::new(CheckoutFlow::Embedded);
    let (order_id, session_id) = submitted(&services).await;
    services
        .gateway
        .set_status(&session_id, ProviderPaymentStatus::Other("canceled".into()));

    services
        .reconciliation
        .confirm_embedded(
            &order_id,
            EmbeddedOutcome::Failed {
                message: Some("card declined".to_string()),
            },
        )
        .await
        .unwrap();
    assert_eq!(
        services.orders.get(&order_id).unwrap().status,
        OrderAttemptStatus::Failed
    );

    services.gateway.mark_paid(&session_id);
    let late = services
        .reconciliation
        .confirm_and_finalize(&session_id, &order_id)
        .await;
    assert_matches!(late, Err(ServiceError::InvalidOperation(_)));
    assert_eq!(services.carts.lines(SESSION).await.unwrap().len(), 2);
}

#[tokio::test]
async fn failure_report_is_not_applied_while_provider_is_down() {
    let services = Services::new(CheckoutFlow::Embedded);
    let (order_id, _) = submitted(&services).await;
    services.gateway.set_offline(true);

    let result = services
        .reconciliation
        .confirm_embedded(&order_id, EmbeddedOutcome::Failed { message: None })
        .await;
    assert_matches!(result, Err(ServiceError::PaymentServiceUnavailable(_)));
    let attempt = services.orders.get(&order_id).unwrap();
    assert_eq!(attempt.status, OrderAttemptStatus::AwaitingPayment);
    assert!(attempt.failure_reason.is_none());
}

#[tokio::test]
async fn embedded_result_is_only_accepted_for_embedded_orders() {
    let services = Services::new(CheckoutFlow::Hosted);
    let (order_id, _) = submitted(&services).await;

    let result = services
        .reconciliation
        .confirm_embedded(&order_id, EmbeddedOutcome::Succeeded)
        .await;
    assert_matches!(result, Err(ServiceError::InvalidOperation(_)));

    let unknown = services
        .reconciliation
        .confirm_embedded("HAVELI-NOPE-0000", EmbeddedOutcome::Succeeded)
        .await;
    assert_matches!(unknown, Err(ServiceError::NotFound(_)));
}
