use std::sync::Arc;

use dashmap::DashSet;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;

use super::cart_service::CartService;
use crate::{
    cart::{normalize_instructions, OrderLine, SpiceLevel, TaxRate, TipPercent, Totals},
    catalog::CatalogLookup,
    errors::ServiceError,
    orders::{normalize_notes, ContactInfo, OrderAttempt, OrderBook, OrderId, PickupTime},
    payments::{
        CheckoutFlow, PaymentGateway, PaymentLineItem, PaymentMetadata, PaymentReference,
        PaymentRequest,
    },
};

/// Placeholder the provider replaces with its own session id on redirect.
pub const CHECKOUT_SESSION_PLACEHOLDER: &str = "{CHECKOUT_SESSION_ID}";

/// Settings that do not change per request.
#[derive(Debug, Clone)]
pub struct CheckoutSettings {
    pub flow: CheckoutFlow,
    /// Lower-case ISO 4217
    pub currency: String,
    pub tax_rate: TaxRate,
    /// Base for success/cancel URLs, without trailing slash
    pub public_base_url: String,
}

impl Default for CheckoutSettings {
    fn default() -> Self {
        Self {
            flow: CheckoutFlow::Hosted,
            currency: "usd".to_string(),
            tax_rate: TaxRate::DEFAULT,
            public_base_url: "http://localhost:3000".to_string(),
        }
    }
}

/// One cart line as submitted for payment. Prices are never taken from the client.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, ToSchema)]
pub struct SubmissionLine {
    pub item_id: String,
    pub quantity: u32,
    pub spice_level: Option<SpiceLevel>,
    pub special_instructions: Option<String>,
}

impl From<&OrderLine> for SubmissionLine {
    fn from(line: &OrderLine) -> Self {
        Self {
            item_id: line.item_id.clone(),
            quantity: line.quantity,
            spice_level: line.spice_level,
            special_instructions: line.special_instructions.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct SubmitOrderInput {
    pub contact: ContactInfo,
    /// 0, 10, 15 or 20
    pub tip_percent: Option<u32>,
    pub pickup: Option<PickupTime>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct SubmittedOrder {
    #[schema(value_type = String)]
    pub order_id: OrderId,
    pub flow: CheckoutFlow,
    /// `redirect_url` for hosted checkout, `client_secret` for the embedded form
    #[serde(flatten)]
    pub payment: PaymentReference,
    pub totals: Totals,
    #[serde(skip)]
    pub provider_session_id: String,
}

/// Releases the per-session submission slot on every exit path.
#[derive(Debug)]
struct InFlightGuard {
    sessions: Arc<DashSet<String>>,
    session: String,
}

impl InFlightGuard {
    fn acquire(sessions: &Arc<DashSet<String>>, session: &str) -> Result<Self, ServiceError> {
        if !sessions.insert(session.to_string()) {
            return Err(ServiceError::SubmissionInProgress);
        }
        Ok(Self {
            sessions: Arc::clone(sessions),
            session: session.to_string(),
        })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.sessions.remove(&self.session);
    }
}

/// Turns a cart snapshot and guest details into exactly one payment request.
///
/// Prices and tax are recomputed from the catalog; whatever the client last
/// displayed is not trusted. The cart itself is never modified here.
#[derive(Clone)]
pub struct CheckoutService {
    catalog: Arc<dyn CatalogLookup>,
    carts: CartService,
    gateway: Arc<dyn PaymentGateway>,
    orders: Arc<OrderBook>,
    settings: CheckoutSettings,
    in_flight: Arc<DashSet<String>>,
}

impl CheckoutService {
    pub fn new(
        catalog: Arc<dyn CatalogLookup>,
        carts: CartService,
        gateway: Arc<dyn PaymentGateway>,
        orders: Arc<OrderBook>,
        settings: CheckoutSettings,
    ) -> Self {
        Self {
            catalog,
            carts,
            gateway,
            orders,
            settings,
            in_flight: Arc::new(DashSet::new()),
        }
    }

    pub fn flow(&self) -> CheckoutFlow {
        self.settings.flow
    }

    /// Submits the session's current cart.
    ///
    /// # Arguments
    ///
    /// * `session` - Cart session id
    /// * `input` - Guest contact details, tip and pickup preferences
    ///
    /// # Returns
    ///
    /// * `Ok(SubmittedOrder)` - Order id and the reference needed to continue payment
    /// * `Err(ServiceError::SubmissionInProgress)` - Another submission for this cart is running
    /// * `Err(ServiceError::InvalidAmount)` - Nothing to charge
    #[instrument(skip(self, input))]
    pub async fn submit_order(
        &self,
        session: &str,
        input: SubmitOrderInput,
    ) -> Result<SubmittedOrder, ServiceError> {
        let _guard = InFlightGuard::acquire(&self.in_flight, session)?;
        let lines: Vec<SubmissionLine> = self
            .carts
            .lines(session)
            .await?
            .iter()
            .map(SubmissionLine::from)
            .collect();
        self.submit_locked(session, &lines, input).await
    }

    /// Submits an explicit line list on behalf of `session`.
    #[instrument(skip(self, lines, input), fields(lines = lines.len()))]
    pub async fn submit_lines(
        &self,
        session: &str,
        lines: &[SubmissionLine],
        input: SubmitOrderInput,
    ) -> Result<SubmittedOrder, ServiceError> {
        let _guard = InFlightGuard::acquire(&self.in_flight, session)?;
        self.submit_locked(session, lines, input).await
    }

    async fn submit_locked(
        &self,
        session: &str,
        lines: &[SubmissionLine],
        input: SubmitOrderInput,
    ) -> Result<SubmittedOrder, ServiceError> {
        let contact = input.contact.normalized()?;
        let tip = TipPercent::checkout_choice(input.tip_percent.unwrap_or(0))?;
        let notes = normalize_notes(input.notes.as_deref())?;
        let pickup = input.pickup.unwrap_or_default();

        let priced = self.reprice(lines)?;
        let totals = Totals::for_lines(&priced, self.settings.tax_rate, tip);
        if totals.grand_total_cents <= 0 {
            return Err(ServiceError::InvalidAmount(format!(
                "order total must be positive, got {} cents",
                totals.grand_total_cents
            )));
        }

        let order_id = OrderId::generate();
        let request = self.payment_request(&order_id, &priced, &totals, &contact)?;
        self.orders.insert(OrderAttempt::new(
            order_id.clone(),
            session,
            self.settings.flow,
            priced,
            totals,
            tip.value(),
            contact,
            pickup,
            notes,
        ))?;

        let handle = match self.gateway.create_payment_request(&request).await {
            Ok(handle) => handle,
            Err(e) => {
                error!(order_id = %order_id, gateway = self.gateway.name(), "payment request failed: {}", e);
                if let Err(fail_err) = self.orders.fail(order_id.as_str(), &e.to_string()) {
                    warn!(order_id = %order_id, "could not mark attempt failed: {}", fail_err);
                }
                return Err(e.into());
            }
        };

        self.orders
            .await_payment(order_id.as_str(), &handle.provider_session_id)?;
        info!(
            order_id = %order_id,
            provider_session_id = %handle.provider_session_id,
            total_cents = totals.grand_total_cents,
            "order submitted for payment"
        );

        Ok(SubmittedOrder {
            order_id,
            flow: self.settings.flow,
            payment: handle.reference,
            totals,
            provider_session_id: handle.provider_session_id,
        })
    }

    /// Rebuilds every line from the catalog. One unknown item aborts the whole order.
    fn reprice(&self, lines: &[SubmissionLine]) -> Result<Vec<OrderLine>, ServiceError> {
        let mut priced: Vec<OrderLine> = Vec::with_capacity(lines.len());
        for line in lines {
            if line.quantity == 0 {
                return Err(ServiceError::ValidationError(format!(
                    "quantity for `{}` must be at least 1",
                    line.item_id
                )));
            }
            let item = self
                .catalog
                .lookup(&line.item_id)
                .ok_or_else(|| ServiceError::ItemNotFound(line.item_id.clone()))?;
            let instructions = normalize_instructions(line.special_instructions.as_deref())?;
            let candidate = OrderLine {
                item_id: item.id.clone(),
                display_name: item.name.clone(),
                unit_price_cents: item.price_cents,
                quantity: line.quantity,
                spice_level: line.spice_level,
                special_instructions: instructions,
            };

            let key = candidate.key();
            match priced.iter_mut().find(|existing| existing.key() == key) {
                Some(existing) => {
                    existing.quantity = existing.quantity.saturating_add(candidate.quantity)
                }
                None => priced.push(candidate),
            }
        }
        Ok(priced)
    }

    fn payment_request(
        &self,
        order_id: &OrderId,
        lines: &[OrderLine],
        totals: &Totals,
        contact: &ContactInfo,
    ) -> Result<PaymentRequest, ServiceError> {
        let mut line_items: Vec<PaymentLineItem> = lines
            .iter()
            .map(|line| PaymentLineItem {
                description: line.payment_description(),
                detail: self
                    .catalog
                    .lookup(&line.item_id)
                    .map(|item| item.description.clone())
                    .filter(|d| !d.is_empty()),
                unit_price_cents: line.unit_price_cents,
                quantity: line.quantity,
            })
            .collect();

        if totals.tax_cents > 0 {
            let percent = (self.settings.tax_rate.as_decimal() * Decimal::ONE_HUNDRED).normalize();
            line_items.push(PaymentLineItem {
                description: "Sales Tax".to_string(),
                detail: Some(format!("{percent}% sales tax")),
                unit_price_cents: totals.tax_cents,
                quantity: 1,
            });
        }
        if totals.tip_cents > 0 {
            line_items.push(PaymentLineItem {
                description: "Tip".to_string(),
                detail: None,
                unit_price_cents: totals.tip_cents,
                quantity: 1,
            });
        }

        let request = PaymentRequest {
            line_items,
            currency: self.settings.currency.clone(),
            metadata: PaymentMetadata {
                order_id: Some(order_id.to_string()),
                customer_name: Some(contact.name.clone()),
                customer_phone: Some(contact.phone.clone()),
            },
            flow: self.settings.flow,
            customer_email: contact.email.clone(),
            success_url: format!(
                "{}/order/status?session_id={}&order_id={}",
                self.settings.public_base_url, CHECKOUT_SESSION_PLACEHOLDER, order_id
            ),
            cancel_url: format!(
                "{}/order/cancel?order_id={}",
                self.settings.public_base_url, order_id
            ),
        };

        if request.amount_cents() != totals.grand_total_cents {
            return Err(ServiceError::InternalError(format!(
                "payment lines sum to {} but order total is {}",
                request.amount_cents(),
                totals.grand_total_cents
            )));
        }
        Ok(request)
    }
}
