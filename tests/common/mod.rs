#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use haveli_api::{
    build_router,
    cart::{CartStorage, MemoryCartStorage, TaxRate},
    catalog::{CatalogLookup, MenuCategory, MenuItem, StaticCatalog},
    config::{AppConfig, PaymentProviderKind},
    middleware_helpers::CART_SESSION_HEADER,
    notifications::MemoryMailer,
    orders::{ContactInfo, OrderBook},
    payments::{CheckoutFlow, PaymentGateway, SandboxGateway},
    services::{
        commerce::{
            AddLineInput, CartService, CartView, CheckoutService, CheckoutSettings,
            ReconciliationService, SubmitOrderInput,
        },
        factory::ServiceFactory,
    },
    AppState,
};
use serde_json::Value;
use tower::ServiceExt;

/// A small catalog with round prices, used where exact totals matter.
pub fn test_catalog() -> StaticCatalog {
    StaticCatalog::from_items(vec![
        MenuItem::new(
            "chicken-biryani",
            "Chicken Biryani",
            "Basmati rice layered with spiced chicken.",
            999,
            MenuCategory::EntreesChicken,
        ),
        MenuItem::new(
            "garlic-naan",
            "Garlic Naan",
            "Tandoor bread brushed with garlic butter.",
            350,
            MenuCategory::Breads,
        )
        .vegetarian(),
    ])
}

pub fn test_config(flow: CheckoutFlow) -> AppConfig {
    let mut cfg = AppConfig::new("127.0.0.1".to_string(), 18_080, "development".to_string());
    cfg.payment_provider = PaymentProviderKind::Sandbox;
    cfg.checkout_flow = flow;
    cfg.public_base_url = "http://haveli.test".to_string();
    cfg.email_to = Some("kitchen@haveli.test".to_string());
    cfg.send_contact_email = true;
    cfg.send_catering_email = true;
    cfg
}

/// Application wired to the sandbox provider, in-memory storage and a recording mailer.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub gateway: Arc<SandboxGateway>,
    pub storage: Arc<MemoryCartStorage>,
    pub mailer: Arc<MemoryMailer>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(test_config(CheckoutFlow::Hosted))
    }

    pub fn embedded() -> Self {
        Self::with_config(test_config(CheckoutFlow::Embedded))
    }

    pub fn with_config(cfg: AppConfig) -> Self {
        Self::build(cfg, Arc::new(test_catalog()))
    }

    pub fn build(cfg: AppConfig, catalog: Arc<dyn CatalogLookup>) -> Self {
        let gateway = Arc::new(SandboxGateway::new(cfg.public_base_url.clone()));
        let storage = Arc::new(MemoryCartStorage::new());
        let mailer = Arc::new(MemoryMailer::new());

        let factory = ServiceFactory::new(cfg)
            .with_catalog(catalog)
            .with_gateway(gateway.clone())
            .with_storage(storage.clone() as Arc<dyn CartStorage>)
            .with_mailer(mailer.clone());
        let state = AppState::from_factory(factory).expect("failed to build services");
        let router =
            build_router(state.clone(), state.health_state()).expect("failed to build router");

        Self {
            router,
            state,
            gateway,
            storage,
            mailer,
        }
    }

    /// Send a request against the router with an optional cart session header.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        session: Option<&str>,
    ) -> axum::response::Response {
        let mut builder = Request::builder().method(method).uri(uri);

        if let Some(session) = session {
            builder = builder.header(CART_SESSION_HEADER, session);
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    /// Same as [`TestApp::request`], returning the status and parsed JSON body.
    pub async fn json(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        session: Option<&str>,
    ) -> (StatusCode, Value) {
        let response = self.request(method, uri, body, session).await;
        let status = response.status();
        (status, response_json(response).await)
    }
}

pub async fn response_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("failed to read response body");
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(&bytes).expect("response body is not JSON")
}

/// Services wired directly, without the HTTP layer.
pub struct Services {
    pub carts: CartService,
    pub checkout: CheckoutService,
    pub reconciliation: ReconciliationService,
    pub orders: Arc<OrderBook>,
    pub gateway: Arc<SandboxGateway>,
    pub storage: Arc<MemoryCartStorage>,
}

impl Services {
    pub fn new(flow: CheckoutFlow) -> Self {
        Self::with_storage(flow, Arc::new(MemoryCartStorage::new()))
    }

    pub fn with_storage(flow: CheckoutFlow, storage: Arc<MemoryCartStorage>) -> Self {
        let catalog: Arc<dyn CatalogLookup> = Arc::new(test_catalog());
        let gateway = Arc::new(SandboxGateway::new("http://haveli.test"));
        let orders = Arc::new(OrderBook::new());
        let carts = CartService::new(
            Arc::clone(&catalog),
            storage.clone() as Arc<dyn CartStorage>,
            TaxRate::DEFAULT,
        );
        let settings = CheckoutSettings {
            flow,
            public_base_url: "http://haveli.test".to_string(),
            ..CheckoutSettings::default()
        };
        let checkout = CheckoutService::new(
            catalog,
            carts.clone(),
            gateway.clone() as Arc<dyn PaymentGateway>,
            Arc::clone(&orders),
            settings,
        );
        let reconciliation = ReconciliationService::new(
            gateway.clone() as Arc<dyn PaymentGateway>,
            Arc::clone(&orders),
            carts.clone(),
        );

        Self {
            carts,
            checkout,
            reconciliation,
            orders,
            gateway,
            storage,
        }
    }

    pub async fn add(&self, session: &str, item_id: &str, quantity: u32) -> CartView {
        let input = AddLineInput {
            item_id: item_id.to_string(),
            quantity: Some(quantity),
            spice_level: None,
            special_instructions: None,
        };
        let (_, view) = self
            .carts
            .add_line(session, input)
            .await
            .expect("failed to add line");
        view
    }
}

pub fn guest_order(tip_percent: Option<u32>) -> SubmitOrderInput {
    SubmitOrderInput {
        contact: ContactInfo {
            name: "Asha Patel".to_string(),
            phone: "555-0100".to_string(),
            email: Some("asha@example.com".to_string()),
        },
        tip_percent,
        pickup: None,
        notes: None,
    }
}
