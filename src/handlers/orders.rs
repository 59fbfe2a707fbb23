use axum::{
    extract::{Path, State},
    response::IntoResponse,
    routing::{get, post},
    Router,
};

use crate::{
    errors::ApiError,
    handlers::common::{map_service_error, success_response},
    orders::OrderReceipt,
    AppState,
};

/// Creates the router for order status endpoints
pub fn orders_routes() -> Router<AppState> {
    Router::new()
        .route("/:order_id", get(get_order))
        .route("/:order_id/abandon", post(abandon_order))
}

/// Order status for the confirmation page
#[utoipa::path(
    get,
    path = "/api/v1/orders/{order_id}",
    summary = "Get order",
    description = "Display snapshot of an order attempt with kitchen progress. Not proof of payment.",
    params(("order_id" = String, Path, description = "Order id, e.g. HAVELI-M1ZK3QF2-7XQ4")),
    responses(
        (status = 200, description = "Order receipt", body = OrderReceipt),
        (status = 404, description = "Unknown order", body = crate::errors::ErrorResponse),
    ),
    tag = "Orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let receipt = state
        .services
        .reconciliation
        .order_status(&order_id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(receipt))
}

/// The guest left the payment page without paying
#[utoipa::path(
    post,
    path = "/api/v1/orders/{order_id}/abandon",
    summary = "Abandon order attempt",
    params(("order_id" = String, Path, description = "Order id")),
    responses(
        (status = 200, description = "Attempt abandoned; the cart is unchanged", body = OrderReceipt),
        (status = 400, description = "Attempt already confirmed or failed", body = crate::errors::ErrorResponse),
        (status = 404, description = "Unknown order", body = crate::errors::ErrorResponse),
    ),
    tag = "Orders"
)]
pub async fn abandon_order(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let receipt = state
        .services
        .reconciliation
        .abandon(&order_id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(receipt))
}
