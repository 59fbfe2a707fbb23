use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{info, instrument, warn};

use super::{
    CheckoutFlow, PaymentError, PaymentGateway, PaymentHandle, PaymentMetadata, PaymentReference,
    PaymentRequest, ProviderPaymentStatus, ProviderSession,
};
use crate::circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitBreakerMetrics,
};
use crate::config::AppConfig;
use crate::errors::ServiceError;

/// Stripe metadata keys, shared with the storefront's earlier checkout code.
const META_ORDER_ID: &str = "orderId";
const META_CUSTOMER_NAME: &str = "customerName";
const META_CUSTOMER_PHONE: &str = "customerPhone";

/// Stripe configuration
#[derive(Clone)]
pub struct StripeConfig {
    pub secret_key: String,
    pub api_base: String,
    pub timeout: Duration,
    pub breaker: CircuitBreakerConfig,
}

impl std::fmt::Debug for StripeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeConfig")
            .field("secret_key", &"<redacted>")
            .field("api_base", &self.api_base)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl StripeConfig {
    pub fn from_app_config(config: &AppConfig) -> Result<Self, ServiceError> {
        let secret_key = config.stripe_secret().ok_or_else(|| {
            ServiceError::Configuration("stripe_secret_key is not set".to_string())
        })?;
        Ok(Self {
            secret_key: secret_key.to_string(),
            api_base: config.stripe_api_base.trim_end_matches('/').to_string(),
            timeout: config.payment_timeout(),
            breaker: CircuitBreakerConfig {
                failure_threshold: config.circuit_breaker_failure_threshold,
                timeout: Duration::from_secs(config.circuit_breaker_timeout_secs),
                success_threshold: config.circuit_breaker_success_threshold,
            },
        })
    }
}

/// Stripe REST client for Checkout Sessions (hosted) and Payment Intents (embedded).
pub struct StripeGateway {
    config: StripeConfig,
    client: reqwest::Client,
    breaker: CircuitBreaker,
}

struct RawResponse {
    status: StatusCode,
    body: String,
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetail,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetail {
    message: Option<String>,
    code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CheckoutSessionObject {
    id: String,
    url: Option<String>,
    payment_status: Option<String>,
    #[serde(default)]
    metadata: HashMap<String, String>,
    amount_total: Option<i64>,
    currency: Option<String>,
    customer_email: Option<String>,
    customer_details: Option<CustomerDetails>,
    payment_intent: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CustomerDetails {
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PaymentIntentObject {
    id: String,
    client_secret: Option<String>,
    status: String,
    amount: Option<i64>,
    currency: Option<String>,
    #[serde(default)]
    metadata: HashMap<String, String>,
    receipt_email: Option<String>,
}

fn metadata_from(map: &HashMap<String, String>) -> PaymentMetadata {
    PaymentMetadata {
        order_id: map.get(META_ORDER_ID).cloned(),
        customer_name: map.get(META_CUSTOMER_NAME).cloned(),
        customer_phone: map.get(META_CUSTOMER_PHONE).cloned(),
    }
}

fn push_metadata(params: &mut Vec<(String, String)>, prefix: &str, metadata: &PaymentMetadata) {
    let entries = [
        (META_ORDER_ID, &metadata.order_id),
        (META_CUSTOMER_NAME, &metadata.customer_name),
        (META_CUSTOMER_PHONE, &metadata.customer_phone),
    ];
    for (key, value) in entries {
        if let Some(value) = value {
            params.push((format!("{prefix}[{key}]"), value.clone()));
        }
    }
}

/// Form fields for `POST /v1/checkout/sessions`.
fn checkout_session_params(request: &PaymentRequest) -> Vec<(String, String)> {
    let currency = request.currency.to_lowercase();
    let mut params = vec![
        ("mode".to_string(), "payment".to_string()),
        ("success_url".to_string(), request.success_url.clone()),
        ("cancel_url".to_string(), request.cancel_url.clone()),
        ("billing_address_collection".to_string(), "auto".to_string()),
    ];
    for (i, item) in request.line_items.iter().enumerate() {
        let prefix = format!("line_items[{i}]");
        params.push((format!("{prefix}[price_data][currency]"), currency.clone()));
        params.push((
            format!("{prefix}[price_data][product_data][name]"),
            item.description.clone(),
        ));
        if let Some(detail) = &item.detail {
            params.push((
                format!("{prefix}[price_data][product_data][description]"),
                detail.clone(),
            ));
        }
        params.push((
            format!("{prefix}[price_data][unit_amount]"),
            item.unit_price_cents.to_string(),
        ));
        params.push((format!("{prefix}[quantity]"), item.quantity.to_string()));
    }
    push_metadata(&mut params, "metadata", &request.metadata);
    if let Some(email) = &request.customer_email {
        params.push(("customer_email".to_string(), email.clone()));
    }
    params
}

/// Form fields for `POST /v1/payment_intents`.
fn payment_intent_params(request: &PaymentRequest) -> Vec<(String, String)> {
    let mut params = vec![
        ("amount".to_string(), request.amount_cents().to_string()),
        ("currency".to_string(), request.currency.to_lowercase()),
        (
            "automatic_payment_methods[enabled]".to_string(),
            "true".to_string(),
        ),
    ];
    if let Some(order_id) = &request.metadata.order_id {
        params.push(("description".to_string(), format!("Haveli order {order_id}")));
    }
    push_metadata(&mut params, "metadata", &request.metadata);
    if let Some(email) = &request.customer_email {
        params.push(("receipt_email".to_string(), email.clone()));
    }
    params
}

/// Provider ids are path segments; anything else cannot name a session.
fn is_plausible_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 255
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

impl StripeGateway {
    pub fn new(config: StripeConfig) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ServiceError::Configuration(format!("failed to build HTTP client: {e}")))?;
        let breaker = CircuitBreaker::new("stripe", config.breaker.clone());
        Ok(Self {
            config,
            client,
            breaker,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_base, path)
    }

    /// Sends through the circuit breaker. Transport errors, 5xx and 429 count against the
    /// provider; every other status is returned for the caller to interpret.
    async fn send(&self, request: reqwest::RequestBuilder) -> Result<RawResponse, PaymentError> {
        let request = request.basic_auth(&self.config.secret_key, Some(""));
        self.breaker
            .call(|| async move {
                let response = request
                    .send()
                    .await
                    .map_err(|e| PaymentError::Unavailable(format!("Stripe API error: {e}")))?;
                let status = response.status();
                let body = response
                    .text()
                    .await
                    .map_err(|e| PaymentError::Unavailable(format!("Stripe API error: {e}")))?;
                if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
                    return Err(PaymentError::Unavailable(format!("Stripe returned {status}")));
                }
                Ok(RawResponse { status, body })
            })
            .await
            .map_err(|e| match e {
                CircuitBreakerError::CircuitOpen => PaymentError::CircuitOpen,
                CircuitBreakerError::ServiceFailure(inner) => inner,
            })
    }

    fn rejection(raw: &RawResponse) -> PaymentError {
        let detail = serde_json::from_str::<StripeErrorBody>(&raw.body)
            .ok()
            .map(|b| match (b.error.code, b.error.message) {
                (Some(code), Some(message)) => format!("{code}: {message}"),
                (None, Some(message)) => message,
                (Some(code), None) => code,
                (None, None) => raw.status.to_string(),
            })
            .unwrap_or_else(|| raw.status.to_string());
        warn!(status = %raw.status, "Stripe rejected request: {}", detail);
        PaymentError::Rejected(detail)
    }

    fn parse<T: for<'de> Deserialize<'de>>(raw: &RawResponse) -> Result<T, PaymentError> {
        serde_json::from_str(&raw.body).map_err(|e| {
            PaymentError::InvalidResponse(format!("Failed to parse Stripe response: {e}"))
        })
    }

    async fn create_checkout_session(
        &self,
        request: &PaymentRequest,
    ) -> Result<PaymentHandle, PaymentError> {
        let raw = self
            .send(
                self.client
                    .post(self.url("/v1/checkout/sessions"))
                    .form(&checkout_session_params(request)),
            )
            .await?;
        if !raw.status.is_success() {
            return Err(Self::rejection(&raw));
        }
        let session: CheckoutSessionObject = Self::parse(&raw)?;
        let url = session.url.ok_or_else(|| {
            PaymentError::InvalidResponse("checkout session has no url".to_string())
        })?;
        info!(session_id = %session.id, "Checkout session created");
        Ok(PaymentHandle {
            provider_session_id: session.id,
            reference: PaymentReference::RedirectUrl(url),
        })
    }

    async fn create_payment_intent(
        &self,
        request: &PaymentRequest,
    ) -> Result<PaymentHandle, PaymentError> {
        let raw = self
            .send(
                self.client
                    .post(self.url("/v1/payment_intents"))
                    .form(&payment_intent_params(request)),
            )
            .await?;
        if !raw.status.is_success() {
            return Err(Self::rejection(&raw));
        }
        let intent: PaymentIntentObject = Self::parse(&raw)?;
        let secret = intent.client_secret.ok_or_else(|| {
            PaymentError::InvalidResponse("payment intent has no client_secret".to_string())
        })?;
        info!(payment_intent = %intent.id, "PaymentIntent created");
        Ok(PaymentHandle {
            provider_session_id: intent.id,
            reference: PaymentReference::ClientSecret(secret),
        })
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    fn name(&self) -> &'static str {
        "stripe"
    }

    #[instrument(skip(self, request), fields(order_id = ?request.metadata.order_id, flow = ?request.flow))]
    async fn create_payment_request(
        &self,
        request: &PaymentRequest,
    ) -> Result<PaymentHandle, PaymentError> {
        match request.flow {
            CheckoutFlow::Hosted => self.create_checkout_session(request).await,
            CheckoutFlow::Embedded => self.create_payment_intent(request).await,
        }
    }

    #[instrument(skip(self))]
    async fn retrieve_session(
        &self,
        provider_session_id: &str,
    ) -> Result<Option<ProviderSession>, PaymentError> {
        if !is_plausible_id(provider_session_id) {
            return Ok(None);
        }
        let is_intent = provider_session_id.starts_with("pi_");
        let path = if is_intent {
            format!("/v1/payment_intents/{provider_session_id}")
        } else {
            format!("/v1/checkout/sessions/{provider_session_id}")
        };

        let raw = self.send(self.client.get(self.url(&path))).await?;
        if raw.status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !raw.status.is_success() {
            return Err(Self::rejection(&raw));
        }

        let session = if is_intent {
            let intent: PaymentIntentObject = Self::parse(&raw)?;
            ProviderSession {
                payment_status: ProviderPaymentStatus::from_intent_status(&intent.status),
                metadata: metadata_from(&intent.metadata),
                amount_total: intent.amount,
                currency: intent.currency,
                customer_email: intent.receipt_email,
                payment_intent_id: Some(intent.id.clone()),
                id: intent.id,
            }
        } else {
            let session: CheckoutSessionObject = Self::parse(&raw)?;
            ProviderSession {
                payment_status: ProviderPaymentStatus::from_checkout_status(
                    session.payment_status.as_deref().unwrap_or("unpaid"),
                ),
                metadata: metadata_from(&session.metadata),
                amount_total: session.amount_total,
                currency: session.currency,
                customer_email: session
                    .customer_details
                    .and_then(|d| d.email)
                    .or(session.customer_email),
                payment_intent_id: session.payment_intent,
                id: session.id,
            }
        };
        Ok(Some(session))
    }

    fn circuit_metrics(&self) -> Option<CircuitBreakerMetrics> {
        Some(self.breaker.metrics())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payments::PaymentLineItem;

    fn request(flow: CheckoutFlow) -> PaymentRequest {
        PaymentRequest {
            line_items: vec![
                PaymentLineItem {
                    description: "Butter Naan".into(),
                    detail: Some("Soft tandoor-baked leavened bread.".into()),
                    unit_price_cents: 399,
                    quantity: 2,
                },
                PaymentLineItem {
                    description: "Sales Tax".into(),
                    detail: None,
                    unit_price_cents: 60,
                    quantity: 1,
                },
            ],
            currency: "USD".into(),
            metadata: PaymentMetadata {
                order_id: Some("HAVELI-1-ABCD".into()),
                customer_name: Some("Asha".into()),
                customer_phone: None,
            },
            flow,
            customer_email: None,
            success_url: "http://localhost:3000/order/status?session_id={CHECKOUT_SESSION_ID}"
                .into(),
            cancel_url: "http://localhost:3000/order/cancel".into(),
        }
    }

    fn has(params: &[(String, String)], key: &str, value: &str) -> bool {
        params.iter().any(|(k, v)| k == key && v == value)
    }

    #[test]
    fn checkout_session_form_fields() {
        let params = checkout_session_params(&request(CheckoutFlow::Hosted));
        assert!(has(&params, "mode", "payment"));
        assert!(has(&params, "line_items[0][price_data][currency]", "usd"));
        assert!(has(&params, "line_items[0][price_data][unit_amount]", "399"));
        assert!(has(&params, "line_items[0][quantity]", "2"));
        assert!(has(&params, "line_items[1][price_data][product_data][name]", "Sales Tax"));
        assert!(has(&params, "metadata[orderId]", "HAVELI-1-ABCD"));
        assert!(!params.iter().any(|(k, _)| k == "metadata[customerPhone]"));
    }

    #[test]
    fn payment_intent_charges_the_sum_of_lines() {
        let params = payment_intent_params(&request(CheckoutFlow::Embedded));
        assert!(has(&params, "amount", "858"));
        assert!(has(&params, "automatic_payment_methods[enabled]", "true"));
        assert!(has(&params, "description", "Haveli order HAVELI-1-ABCD"));
    }

    #[test]
    fn implausible_ids_are_not_looked_up() {
        assert!(is_plausible_id("cs_test_a1B2"));
        assert!(!is_plausible_id("../v1/customers"));
        assert!(!is_plausible_id(""));
    }
}
