mod common;

use std::sync::Arc;

use assert_matches::assert_matches;
use async_trait::async_trait;
use common::{guest_order, test_catalog, Services};
use haveli_api::{
    cart::{CartStorage, MemoryCartStorage, SpiceLevel, TaxRate},
    catalog::CatalogLookup,
    errors::ServiceError,
    orders::{OrderAttemptStatus, OrderBook, PickupTime},
    payments::{
        CheckoutFlow, PaymentError, PaymentGateway, PaymentHandle, PaymentReference,
        PaymentRequest, ProviderSession, SandboxGateway,
    },
    services::commerce::{AddLineInput, CartService, CheckoutService, CheckoutSettings, SubmissionLine},
};
use test_case::test_case;
use tokio::sync::Notify;

const SESSION: &str = "session-checkout-1";

#[tokio::test]
async fn cart_prices_are_recomputed_from_the_menu() {
    let storage = Arc::new(MemoryCartStorage::new());
    storage.put_raw(
        SESSION,
        r#"{"schema_version":2,"lines":{"15:chicken-biryani|-|-":{"item_id":"chicken-biryani","display_name":"Chicken Biryani","unit_price_cents":1,"quantity":2,"spice_level":null,"special_instructions":null}}}"#,
    );
    let services = Services::with_storage(CheckoutFlow::Hosted, storage);
    assert_eq!(services.carts.lines(SESSION).await.unwrap()[0].unit_price_cents, 1);

    let order = services
        .checkout
        .submit_order(SESSION, guest_order(None))
        .await
        .unwrap();

    assert_eq!(order.totals.subtotal_cents, 1998);
    assert_eq!(order.totals.tax_cents, 150);
    assert_eq!(order.totals.grand_total_cents, 2148);

    let request = services.gateway.last_request().unwrap();
    assert_eq!(request.line_items[0].unit_price_cents, 999);
    assert_eq!(request.amount_cents(), 2148);
}

#[tokio::test]
async fn payment_request_itemizes_tax_and_tip() {
    let services = Services::new(CheckoutFlow::Hosted);
    services
        .carts
        .add_line(
            SESSION,
            AddLineInput {
                item_id: "chicken-biryani".to_string(),
                quantity: Some(1),
                spice_level: Some(SpiceLevel::Mild),
                special_instructions: Some("no onions".to_string()),
            },
        )
        .await
        .unwrap();

    let order = services
        .checkout
        .submit_order(SESSION, guest_order(Some(20)))
        .await
        .unwrap();
    let request = services.gateway.last_request().unwrap();

    let descriptions: Vec<&str> = request
        .line_items
        .iter()
        .map(|item| item.description.as_str())
        .collect();
    assert_eq!(
        descriptions,
        ["Chicken Biryani (mild spice) - no onions", "Sales Tax", "Tip"]
    );
    assert_eq!(request.line_items[1].detail.as_deref(), Some("7.5% sales tax"));
    assert_eq!(request.line_items[1].unit_price_cents, 75);
    assert_eq!(request.line_items[2].unit_price_cents, 200);
    assert_eq!(request.currency, "usd");
    assert_eq!(request.customer_email.as_deref(), Some("asha@example.com"));

    let order_id = order.order_id.to_string();
    assert_eq!(request.metadata.order_id.as_deref(), Some(order_id.as_str()));
    assert_eq!(request.metadata.customer_phone.as_deref(), Some("555-0100"));
    assert!(request
        .success_url
        .starts_with("http://haveli.test/order/status?session_id={CHECKOUT_SESSION_ID}"));
    assert!(request.success_url.ends_with(&order_id));
    assert!(request.cancel_url.contains(&order_id));
}

#[tokio::test]
async fn submission_never_touches_the_cart() {
    let services = Services::new(CheckoutFlow::Hosted);
    services.add(SESSION, "garlic-naan", 2).await;

    let order = services
        .checkout
        .submit_order(SESSION, guest_order(None))
        .await
        .unwrap();

    assert_matches!(order.payment, PaymentReference::RedirectUrl(url) if url.contains("/sandbox/checkout/"));
    assert_eq!(services.carts.lines(SESSION).await.unwrap().len(), 1);
    let attempt = services.orders.get(order.order_id.as_str()).unwrap();
    assert_eq!(attempt.status, OrderAttemptStatus::AwaitingPayment);
    assert_eq!(attempt.session_id, SESSION);
    assert_eq!(attempt.provider_session_id.as_deref(), Some(order.provider_session_id.as_str()));
}

#[tokio::test]
async fn embedded_flow_returns_a_client_secret() {
    let services = Services::new(CheckoutFlow::Embedded);
    services.add(SESSION, "garlic-naan", 1).await;

    let order = services
        .checkout
        .submit_order(SESSION, guest_order(None))
        .await
        .unwrap();

    assert_eq!(order.flow, CheckoutFlow::Embedded);
    assert_matches!(order.payment, PaymentReference::ClientSecret(secret) if secret.ends_with("_secret_sandbox"));
}

#[tokio::test]
async fn explicit_lines_are_merged_and_priced() {
    let services = Services::new(CheckoutFlow::Hosted);
    let naan = SubmissionLine {
        item_id: "garlic-naan".to_string(),
        quantity: 1,
        spice_level: None,
        special_instructions: Some(" extra butter ".to_string()),
    };
    let lines = vec![
        naan.clone(),
        SubmissionLine {
            special_instructions: Some("extra butter".to_string()),
            quantity: 2,
            ..naan
        },
    ];

    let order = services
        .checkout
        .submit_lines(SESSION, &lines, guest_order(None))
        .await
        .unwrap();

    let attempt = services.orders.get(order.order_id.as_str()).unwrap();
    assert_eq!(attempt.lines.len(), 1);
    assert_eq!(attempt.lines[0].quantity, 3);
    assert_eq!(order.totals.subtotal_cents, 1050);
}

#[tokio::test]
async fn one_unknown_item_aborts_the_whole_order() {
    let services = Services::new(CheckoutFlow::Hosted);
    let lines = vec![
        SubmissionLine {
            item_id: "garlic-naan".to_string(),
            quantity: 1,
            spice_level: None,
            special_instructions: None,
        },
        SubmissionLine {
            item_id: "lamb-vindaloo".to_string(),
            quantity: 1,
            spice_level: None,
            special_instructions: None,
        },
    ];

    let result = services
        .checkout
        .submit_lines(SESSION, &lines, guest_order(None))
        .await;

    assert_matches!(result, Err(ServiceError::ItemNotFound(id)) if id == "lamb-vindaloo");
    assert_eq!(services.gateway.request_count(), 0);
    assert!(services.orders.is_empty());
}

#[tokio::test]
async fn empty_cart_cannot_be_submitted() {
    let services = Services::new(CheckoutFlow::Hosted);

    let result = services
        .checkout
        .submit_order(SESSION, guest_order(Some(20)))
        .await;

    assert_matches!(result, Err(ServiceError::InvalidAmount(_)));
    assert_eq!(services.gateway.request_count(), 0);
}

#[test_case(None => Ok(0) ; "no tip")]
#[test_case(Some(10) => Ok(10) ; "ten percent")]
#[test_case(Some(15) => Ok(15) ; "fifteen percent")]
#[test_case(Some(20) => Ok(20) ; "twenty percent")]
#[test_case(Some(12) => Err(()) ; "off menu tip")]
#[test_case(Some(150) => Err(()) ; "over one hundred")]
#[tokio::test]
async fn only_listed_tips_are_accepted(tip: Option<u32>) -> Result<u8, ()> {
    let services = Services::new(CheckoutFlow::Hosted);
    services.add(SESSION, "chicken-biryani", 1).await;

    match services.checkout.submit_order(SESSION, guest_order(tip)).await {
        Ok(order) => {
            let attempt = services.orders.get(order.order_id.as_str()).unwrap();
            Ok(attempt.tip_percent)
        }
        Err(ServiceError::ValidationError(_)) => {
            assert_eq!(services.gateway.request_count(), 0);
            Err(())
        }
        Err(other) => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn guest_details_are_validated_and_trimmed() {
    let services = Services::new(CheckoutFlow::Hosted);
    services.add(SESSION, "garlic-naan", 1).await;

    let mut blank_name = guest_order(None);
    blank_name.contact.name = "   ".to_string();
    assert_matches!(
        services.checkout.submit_order(SESSION, blank_name).await,
        Err(ServiceError::ValidationError(msg)) if msg.contains("name")
    );

    let mut bad_email = guest_order(None);
    bad_email.contact.email = Some("not-an-email".to_string());
    assert_matches!(
        services.checkout.submit_order(SESSION, bad_email).await,
        Err(ServiceError::ValidationError(_))
    );

    let mut padded = guest_order(None);
    padded.contact.name = "  Asha Patel ".to_string();
    padded.contact.email = Some("   ".to_string());
    padded.pickup = Some(PickupTime::In30);
    padded.notes = Some("  ring the bell  ".to_string());
    let order = services.checkout.submit_order(SESSION, padded).await.unwrap();

    let attempt = services.orders.get(order.order_id.as_str()).unwrap();
    assert_eq!(attempt.contact.name, "Asha Patel");
    assert_eq!(attempt.contact.email, None);
    assert_eq!(attempt.pickup, PickupTime::In30);
    assert_eq!(attempt.notes.as_deref(), Some("ring the bell"));
}

#[tokio::test]
async fn provider_failure_marks_the_attempt_failed() {
    let services = Services::new(CheckoutFlow::Hosted);
    services.add(SESSION, "garlic-naan", 1).await;
    services.gateway.set_offline(true);

    let result = services
        .checkout
        .submit_order(SESSION, guest_order(None))
        .await;

    assert_matches!(result, Err(ServiceError::PaymentServiceUnavailable(_)));
    assert_eq!(services.orders.len(), 1);
    assert_eq!(services.carts.lines(SESSION).await.unwrap().len(), 1);
}

/// Holds `create_payment_request` open until released.
struct GatedGateway {
    inner: SandboxGateway,
    started: Notify,
    release: Notify,
}

#[async_trait]
impl PaymentGateway for GatedGateway {
    fn name(&self) -> &'static str {
        "gated"
    }

    async fn create_payment_request(
        &self,
        request: &PaymentRequest,
    ) -> Result<PaymentHandle, PaymentError> {
        self.started.notify_one();
        self.release.notified().await;
        self.inner.create_payment_request(request).await
    }

    async fn retrieve_session(
        &self,
        provider_session_id: &str,
    ) -> Result<Option<ProviderSession>, PaymentError> {
        self.inner.retrieve_session(provider_session_id).await
    }
}

#[tokio::test]
async fn concurrent_submissions_for_one_cart_are_refused() {
    let catalog: Arc<dyn CatalogLookup> = Arc::new(test_catalog());
    let storage: Arc<dyn CartStorage> = Arc::new(MemoryCartStorage::new());
    let carts = CartService::new(Arc::clone(&catalog), storage, TaxRate::DEFAULT);
    let gateway = Arc::new(GatedGateway {
        inner: SandboxGateway::new("http://haveli.test"),
        started: Notify::new(),
        release: Notify::new(),
    });
    let checkout = CheckoutService::new(
        catalog,
        carts.clone(),
        gateway.clone() as Arc<dyn PaymentGateway>,
        Arc::new(OrderBook::new()),
        CheckoutSettings::default(),
    );
    carts
        .add_line(
            SESSION,
            AddLineInput {
                item_id: "garlic-naan".to_string(),
                quantity: Some(1),
                spice_level: None,
                special_instructions: None,
            },
        )
        .await
        .unwrap();

    let first = {
        let checkout = checkout.clone();
        tokio::spawn(async move { checkout.submit_order(SESSION, guest_order(None)).await })
    };
    gateway.started.notified().await;

    let second = checkout.submit_order(SESSION, guest_order(None)).await;
    assert_matches!(second, Err(ServiceError::SubmissionInProgress));

    gateway.release.notify_one();
    let first = first.await.unwrap();
    assert!(first.is_ok());

    // The slot is released once the first submission finishes.
    let third = {
        let checkout = checkout.clone();
        tokio::spawn(async move { checkout.submit_order(SESSION, guest_order(None)).await })
    };
    gateway.started.notified().await;
    gateway.release.notify_one();
    assert!(third.await.unwrap().is_ok());
}
