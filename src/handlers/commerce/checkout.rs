use crate::handlers::common::{created_response, map_service_error};
use crate::{
    errors::ApiError,
    middleware_helpers::CartSession,
    services::commerce::{SubmitOrderInput, SubmittedOrder},
    AppState,
};
use axum::{
    extract::{Json, State},
    response::IntoResponse,
    routing::post,
    Router,
};
use tracing::info;

/// Creates the router for checkout endpoints
pub fn checkout_routes() -> Router<AppState> {
    Router::new().route("/", post(submit_order))
}

/// Submit the session cart for payment
#[utoipa::path(
    post,
    path = "/api/v1/checkout",
    summary = "Submit order",
    description = "Reprices the cart from the menu, records an order attempt and opens a payment with the provider. \
        The response carries either `redirect_url` (hosted checkout) or `client_secret` (embedded form). \
        The cart is left untouched until payment is confirmed.",
    request_body = SubmitOrderInput,
    params(("x-cart-session" = String, Header, description = "Cart session id")),
    responses(
        (status = 201, description = "Payment opened", body = SubmittedOrder),
        (status = 400, description = "Missing contact details or unsupported tip", body = crate::errors::ErrorResponse),
        (status = 402, description = "Payment provider rejected the request", body = crate::errors::ErrorResponse),
        (status = 409, description = "A submission for this cart is already running", body = crate::errors::ErrorResponse),
        (status = 422, description = "Empty cart or unknown menu item", body = crate::errors::ErrorResponse),
        (status = 503, description = "Payment provider unavailable, retry later", body = crate::errors::ErrorResponse),
    ),
    tag = "Checkout"
)]
pub async fn submit_order(
    State(state): State<AppState>,
    session: CartSession,
    Json(payload): Json<SubmitOrderInput>,
) -> Result<impl IntoResponse, ApiError> {
    let submitted = state
        .services
        .checkout
        .submit_order(session.as_str(), payload)
        .await
        .map_err(map_service_error)?;

    info!(order_id = %submitted.order_id, flow = ?submitted.flow, "checkout started");
    Ok(created_response(submitted))
}
