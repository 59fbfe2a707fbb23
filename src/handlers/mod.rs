pub mod commerce;
pub mod common;
pub mod inquiries;
pub mod orders;
pub mod payments;

use std::sync::Arc;

use crate::{
    cart::CartStorage,
    catalog::{CatalogLookup, CateringMenu, OpeningHours},
    orders::OrderBook,
    payments::PaymentGateway,
    services::commerce::{CartService, CheckoutService, InquiryService, ReconciliationService},
};

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub catalog: Arc<dyn CatalogLookup>,
    pub catering: Arc<CateringMenu>,
    pub hours: Arc<OpeningHours>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub storage: Arc<dyn CartStorage>,
    pub orders: Arc<OrderBook>,
    pub cart: Arc<CartService>,
    pub checkout: Arc<CheckoutService>,
    pub reconciliation: Arc<ReconciliationService>,
    pub inquiries: Arc<InquiryService>,
}
