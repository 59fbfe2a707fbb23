use axum::{
    extract::{Json, State},
    response::IntoResponse,
    routing::post,
    Router,
};

use crate::{
    errors::ApiError,
    handlers::common::{map_service_error, see_other_response, success_response, validate_input},
    services::commerce::{CateringRequest, ContactRequest, FormReceipt},
    AppState,
};

/// Creates the router for guest forms
pub fn inquiries_routes() -> Router<AppState> {
    Router::new()
        .route("/contact", post(submit_contact))
        .route("/catering/requests", post(submit_catering_request))
        .route("/catering/deposit", post(start_catering_deposit))
}

/// Contact form
#[utoipa::path(
    post,
    path = "/api/v1/contact",
    summary = "Send contact message",
    description = "Acknowledged immediately; the staff email is sent in the background.",
    request_body = ContactRequest,
    responses(
        (status = 200, description = "Message received", body = FormReceipt),
        (status = 400, description = "Invalid form", body = crate::errors::ErrorResponse),
    ),
    tag = "Inquiries"
)]
pub async fn submit_contact(
    State(state): State<AppState>,
    Json(payload): Json<ContactRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    let receipt = state
        .services
        .inquiries
        .submit_contact(payload)
        .map_err(map_service_error)?;
    Ok(success_response(receipt))
}

/// Catering request form
#[utoipa::path(
    post,
    path = "/api/v1/catering/requests",
    summary = "Request catering",
    request_body = CateringRequest,
    responses(
        (status = 200, description = "Request received", body = FormReceipt),
        (status = 400, description = "Invalid form", body = crate::errors::ErrorResponse),
        (status = 422, description = "Unknown package", body = crate::errors::ErrorResponse),
    ),
    tag = "Inquiries"
)]
pub async fn submit_catering_request(
    State(state): State<AppState>,
    Json(payload): Json<CateringRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    let receipt = state
        .services
        .inquiries
        .submit_catering(payload)
        .map_err(map_service_error)?;
    Ok(success_response(receipt))
}

/// Start a hosted checkout for the catering deposit
#[utoipa::path(
    post,
    path = "/api/v1/catering/deposit",
    summary = "Pay catering deposit",
    responses(
        (status = 303, description = "Redirect to the hosted checkout page"),
        (status = 400, description = "Deposits are disabled", body = crate::errors::ErrorResponse),
        (status = 503, description = "Payment provider unavailable", body = crate::errors::ErrorResponse),
    ),
    tag = "Inquiries"
)]
pub async fn start_catering_deposit(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let checkout = state
        .services
        .inquiries
        .start_catering_deposit()
        .await
        .map_err(map_service_error)?;
    Ok(see_other_response(&checkout.redirect_url))
}
