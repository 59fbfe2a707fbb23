use axum::{
    extract::{Json, State},
    response::IntoResponse,
    routing::post,
    Router,
};
use serde::Deserialize;
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    errors::ApiError,
    handlers::common::{map_service_error, success_response, validate_input},
    services::commerce::{Confirmation, EmbeddedOutcome},
    AppState,
};

/// Creates the router for payment confirmation endpoints
pub fn payments_routes() -> Router<AppState> {
    Router::new()
        .route("/verify", post(verify_payment))
        .route("/embedded-result", post(embedded_result))
}

/// Query values the hosted checkout appends to the success URL
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct VerifyPaymentRequest {
    /// Provider session id (`session_id` on the return URL)
    #[validate(length(min = 1, max = 255))]
    pub session_id: String,
    #[validate(length(min = 1, max = 64))]
    pub order_id: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct EmbeddedResultRequest {
    #[validate(length(min = 1, max = 64))]
    pub order_id: String,
    /// Whether the in-page payment form reported success
    pub succeeded: bool,
    /// Provider error message when it did not
    #[validate(length(max = 500))]
    pub message: Option<String>,
}

/// Verify a hosted checkout return and finalize the order
#[utoipa::path(
    post,
    path = "/api/v1/payments/verify",
    summary = "Verify payment",
    description = "Confirms with the payment provider that the session exists, belongs to the presented order \
        and is paid. Only then is the order confirmed and its cart cleared. Repeating a successful \
        verification returns the same result without side effects.",
    request_body = VerifyPaymentRequest,
    responses(
        (status = 200, description = "Verification result; `confirmed: false` carries a reason", body = Confirmation),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse),
        (status = 503, description = "Payment provider unavailable; nothing was changed", body = crate::errors::ErrorResponse),
    ),
    tag = "Payments"
)]
pub async fn verify_payment(
    State(state): State<AppState>,
    Json(payload): Json<VerifyPaymentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    let confirmation = state
        .services
        .reconciliation
        .confirm_and_finalize(&payload.session_id, &payload.order_id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(confirmation))
}

/// Report the outcome of the embedded payment form
#[utoipa::path(
    post,
    path = "/api/v1/payments/embedded-result",
    summary = "Embedded payment result",
    request_body = EmbeddedResultRequest,
    responses(
        (status = 200, description = "Order confirmation state", body = Confirmation),
        (status = 400, description = "Order was not placed with the embedded form", body = crate::errors::ErrorResponse),
        (status = 404, description = "Unknown order", body = crate::errors::ErrorResponse),
        (status = 503, description = "Payment provider unavailable", body = crate::errors::ErrorResponse),
    ),
    tag = "Payments"
)]
pub async fn embedded_result(
    State(state): State<AppState>,
    Json(payload): Json<EmbeddedResultRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    let outcome = if payload.succeeded {
        EmbeddedOutcome::Succeeded
    } else {
        EmbeddedOutcome::Failed {
            message: payload.message,
        }
    };
    let confirmation = state
        .services
        .reconciliation
        .confirm_embedded(&payload.order_id, outcome)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(confirmation))
}
