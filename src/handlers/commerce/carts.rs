use crate::handlers::common::{created_response, map_service_error, success_response, validate_input};
use crate::{
    cart::TipPercent,
    errors::ApiError,
    middleware_helpers::CartSession,
    services::commerce::{AddLineInput, CartView, SetQuantityInput},
    AppState,
};
use axum::{
    extract::{Json, Path, Query, State},
    response::IntoResponse,
    routing::{get, post, put},
    Router,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

/// Creates the router for cart endpoints. The cart is chosen by the `x-cart-session` header.
pub fn carts_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(get_cart))
        .route("/items", post(add_to_cart))
        .route(
            "/items/:line_key",
            put(update_cart_line).delete(remove_cart_line),
        )
        .route("/clear", post(clear_cart))
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct CartQuery {
    /// Whole percent applied to the subtotal for display
    pub tip_percent: Option<u32>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AddToCartResponse {
    /// Key of the line that was created or merged into
    pub line_key: String,
    pub cart: CartView,
}

/// Get the session cart with totals
#[utoipa::path(
    get,
    path = "/api/v1/cart",
    summary = "Get cart",
    params(
        CartQuery,
        ("x-cart-session" = String, Header, description = "Cart session id"),
    ),
    responses(
        (status = 200, description = "Lines and totals", body = CartView),
        (status = 400, description = "Missing or malformed session header", body = crate::errors::ErrorResponse),
    ),
    tag = "Cart"
)]
pub async fn get_cart(
    State(state): State<AppState>,
    session: CartSession,
    Query(query): Query<CartQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let tip = TipPercent::new(query.tip_percent.unwrap_or(0)).map_err(map_service_error)?;
    let cart = state
        .services
        .cart
        .get_cart(session.as_str(), tip)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(cart))
}

/// Add an item to the cart
#[utoipa::path(
    post,
    path = "/api/v1/cart/items",
    summary = "Add item",
    description = "Adds a dish. An identical dish (same spice level and instructions) is merged by summing quantities.",
    request_body = AddLineInput,
    params(("x-cart-session" = String, Header, description = "Cart session id")),
    responses(
        (status = 201, description = "Line added or merged", body = AddToCartResponse),
        (status = 400, description = "Invalid input", body = crate::errors::ErrorResponse),
        (status = 422, description = "Unknown menu item", body = crate::errors::ErrorResponse),
    ),
    tag = "Cart"
)]
pub async fn add_to_cart(
    State(state): State<AppState>,
    session: CartSession,
    Json(payload): Json<AddLineInput>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;

    let (line_key, cart) = state
        .services
        .cart
        .add_line(session.as_str(), payload)
        .await
        .map_err(map_service_error)?;

    Ok(created_response(AddToCartResponse {
        line_key: line_key.to_string(),
        cart,
    }))
}

/// Set a line's quantity; zero or less removes it
#[utoipa::path(
    put,
    path = "/api/v1/cart/items/{line_key}",
    summary = "Set quantity",
    request_body = SetQuantityInput,
    params(
        ("line_key" = String, Path, description = "Canonical line key, URL-encoded"),
        ("x-cart-session" = String, Header, description = "Cart session id"),
    ),
    responses(
        (status = 200, description = "Updated cart", body = CartView),
        (status = 400, description = "Malformed line key", body = crate::errors::ErrorResponse),
    ),
    tag = "Cart"
)]
pub async fn update_cart_line(
    State(state): State<AppState>,
    session: CartSession,
    Path(line_key): Path<String>,
    Json(payload): Json<SetQuantityInput>,
) -> Result<impl IntoResponse, ApiError> {
    let cart = state
        .services
        .cart
        .set_quantity(session.as_str(), &line_key, payload.quantity)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(cart))
}

/// Remove a line; unknown keys are ignored
#[utoipa::path(
    delete,
    path = "/api/v1/cart/items/{line_key}",
    summary = "Remove line",
    params(
        ("line_key" = String, Path, description = "Canonical line key, URL-encoded"),
        ("x-cart-session" = String, Header, description = "Cart session id"),
    ),
    responses(
        (status = 200, description = "Updated cart", body = CartView),
        (status = 400, description = "Malformed line key", body = crate::errors::ErrorResponse),
    ),
    tag = "Cart"
)]
pub async fn remove_cart_line(
    State(state): State<AppState>,
    session: CartSession,
    Path(line_key): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let cart = state
        .services
        .cart
        .remove_line(session.as_str(), &line_key)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(cart))
}

/// Clear all lines from the cart
#[utoipa::path(
    post,
    path = "/api/v1/cart/clear",
    summary = "Clear cart",
    params(("x-cart-session" = String, Header, description = "Cart session id")),
    responses((status = 200, description = "Empty cart", body = CartView)),
    tag = "Cart"
)]
pub async fn clear_cart(
    State(state): State<AppState>,
    session: CartSession,
) -> Result<impl IntoResponse, ApiError> {
    let cart = state
        .services
        .cart
        .clear(session.as_str())
        .await
        .map_err(map_service_error)?;
    Ok(success_response(cart))
}
