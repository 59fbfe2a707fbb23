use std::sync::Arc;

use tracing::{info, warn};

use crate::{
    cart::{CartStorage, FileCartStorage, MemoryCartStorage, TaxRate},
    catalog::{CatalogLookup, CateringMenu, OpeningHours, StaticCatalog},
    config::{AppConfig, CartStorageKind, PaymentProviderKind},
    errors::ServiceError,
    handlers::AppServices,
    notifications::{Mailer, NotificationService},
    orders::OrderBook,
    payments::{PaymentGateway, SandboxGateway, StripeConfig, StripeGateway},
    services::commerce::{
        CartService, CheckoutService, CheckoutSettings, InquiryService, InquirySettings,
        ReconciliationService,
    },
};

/// Factory for creating service instances with shared dependencies.
///
/// Collaborators default to what the configuration names; tests swap in
/// fakes with the `with_*` methods before calling [`ServiceFactory::build`].
pub struct ServiceFactory {
    config: AppConfig,
    catalog: Option<Arc<dyn CatalogLookup>>,
    storage: Option<Arc<dyn CartStorage>>,
    gateway: Option<Arc<dyn PaymentGateway>>,
    mailer: Option<Arc<dyn Mailer>>,
}

impl ServiceFactory {
    /// Creates a new service factory for the given configuration
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            catalog: None,
            storage: None,
            gateway: None,
            mailer: None,
        }
    }

    pub fn with_catalog(mut self, catalog: Arc<dyn CatalogLookup>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn with_storage(mut self, storage: Arc<dyn CartStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn with_gateway(mut self, gateway: Arc<dyn PaymentGateway>) -> Self {
        self.gateway = Some(gateway);
        self
    }

    pub fn with_mailer(mut self, mailer: Arc<dyn Mailer>) -> Self {
        self.mailer = Some(mailer);
        self
    }

    /// Gets a reference to the configuration
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    fn cart_storage(&self) -> Arc<dyn CartStorage> {
        match self.config.cart_storage {
            CartStorageKind::Memory => Arc::new(MemoryCartStorage::new()),
            CartStorageKind::File => {
                let dir = self.config.cart_storage_path();
                info!(dir = %dir.display(), "persisting carts to disk");
                Arc::new(FileCartStorage::new(dir))
            }
        }
    }

    fn payment_gateway(&self) -> Result<Arc<dyn PaymentGateway>, ServiceError> {
        match self.config.payment_provider {
            PaymentProviderKind::Stripe => {
                let gateway = StripeGateway::new(StripeConfig::from_app_config(&self.config)?)?;
                Ok(Arc::new(gateway))
            }
            PaymentProviderKind::Sandbox => {
                if self.config.is_production() {
                    warn!("sandbox payment provider configured in production; no real payments will be taken");
                }
                Ok(Arc::new(SandboxGateway::new(self.config.public_base_url.clone())))
            }
        }
    }

    /// Builds every service.
    pub fn build(self) -> Result<AppServices, ServiceError> {
        let tax_rate = TaxRate::new(self.config.tax_rate)?;
        let catalog = match &self.catalog {
            Some(catalog) => Arc::clone(catalog),
            None => Arc::new(StaticCatalog::haveli()) as Arc<dyn CatalogLookup>,
        };
        let storage = match &self.storage {
            Some(storage) => Arc::clone(storage),
            None => self.cart_storage(),
        };
        let gateway = match &self.gateway {
            Some(gateway) => Arc::clone(gateway),
            None => self.payment_gateway()?,
        };
        let notifications = match &self.mailer {
            Some(mailer) => NotificationService::new(Arc::clone(mailer)),
            None => NotificationService::from_config(&self.config)?,
        };
        let mailer_name = notifications.mailer_name();

        let public_base_url = self.config.public_base_url.trim_end_matches('/').to_string();
        let currency = self.config.currency_code();
        let orders = Arc::new(OrderBook::new());
        let catering = Arc::new(CateringMenu::haveli());

        let cart = CartService::new(Arc::clone(&catalog), Arc::clone(&storage), tax_rate);
        let checkout = CheckoutService::new(
            Arc::clone(&catalog),
            cart.clone(),
            Arc::clone(&gateway),
            Arc::clone(&orders),
            CheckoutSettings {
                flow: self.config.checkout_flow,
                currency: currency.clone(),
                tax_rate,
                public_base_url: public_base_url.clone(),
            },
        );
        let reconciliation =
            ReconciliationService::new(Arc::clone(&gateway), Arc::clone(&orders), cart.clone());
        let inquiries = InquiryService::new(
            notifications,
            Arc::clone(&gateway),
            Arc::clone(&catering),
            InquirySettings {
                staff_inbox: self.config.email_to.clone(),
                send_contact_email: self.config.send_contact_email,
                send_catering_email: self.config.send_catering_email,
                deposit_enabled: self.config.catering_deposit_enabled,
                deposit_cents: self.config.catering_deposit_cents,
                currency,
                public_base_url,
            },
        );

        info!(
            gateway = gateway.name(),
            mailer = mailer_name,
            flow = ?self.config.checkout_flow,
            storage = ?self.config.cart_storage,
            "services initialized"
        );

        Ok(AppServices {
            catalog,
            catering,
            hours: Arc::new(OpeningHours::haveli_with_offset_minutes(
                self.config.restaurant_utc_offset_minutes,
            )),
            gateway,
            storage,
            orders,
            cart: Arc::new(cart),
            checkout: Arc::new(checkout),
            reconciliation: Arc::new(reconciliation),
            inquiries: Arc::new(inquiries),
        })
    }
}
