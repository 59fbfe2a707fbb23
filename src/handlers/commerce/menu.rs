use std::str::FromStr;

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::{
    catalog::{hours::DaySchedule, CateringMenu, MenuCategory, MenuItem, OpenStatus},
    errors::ApiError,
    handlers::common::{map_service_error, success_response, validate_input},
    services::commerce::CateringQuoteInput,
    AppState,
};

/// Creates the router for menu, hours and catering information
pub fn menu_routes() -> Router<AppState> {
    Router::new()
        .route("/menu", get(list_menu))
        .route("/menu/:item_id", get(get_menu_item))
        .route("/hours", get(get_hours))
        .route("/catering/packages", get(list_catering_packages))
        .route("/catering/quote", post(quote_catering))
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct MenuQuery {
    /// Display name of a category, e.g. `Breads` or `Appetizers Veg`
    pub category: Option<String>,
    /// Only featured dishes
    #[serde(default)]
    pub featured: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HoursResponse {
    pub status: OpenStatus,
    pub schedule: Vec<DaySchedule>,
}

/// List menu items
#[utoipa::path(
    get,
    path = "/api/v1/menu",
    summary = "List menu",
    params(MenuQuery),
    responses(
        (status = 200, description = "Menu items in display order", body = [MenuItem]),
        (status = 400, description = "Unknown category", body = crate::errors::ErrorResponse),
    ),
    tag = "Menu"
)]
pub async fn list_menu(
    State(state): State<AppState>,
    Query(query): Query<MenuQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let catalog = &state.services.catalog;
    let mut items: Vec<&MenuItem> = match query.category.as_deref() {
        Some(raw) => {
            let category = MenuCategory::from_str(raw.trim()).map_err(|_| ApiError::BadRequest {
                message: format!("unknown menu category `{raw}`"),
                error_code: Some("unknown_category".to_string()),
            })?;
            catalog.by_category(category)
        }
        None => catalog.items().iter().collect(),
    };
    if query.featured {
        items.retain(|item| item.featured);
    }
    Ok(success_response(items))
}

/// Get one menu item
#[utoipa::path(
    get,
    path = "/api/v1/menu/{item_id}",
    summary = "Get menu item",
    params(("item_id" = String, Path, description = "Menu item id, e.g. `butter-chicken`")),
    responses(
        (status = 200, description = "Menu item", body = MenuItem),
        (status = 404, description = "No such item", body = crate::errors::ErrorResponse),
    ),
    tag = "Menu"
)]
pub async fn get_menu_item(
    State(state): State<AppState>,
    Path(item_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let item = state
        .services
        .catalog
        .lookup(&item_id)
        .ok_or_else(|| ApiError::NotFound(format!("menu item {item_id}")))?;
    Ok(success_response(item))
}

/// Opening status right now plus the weekly schedule
#[utoipa::path(
    get,
    path = "/api/v1/hours",
    summary = "Opening hours",
    responses((status = 200, description = "Current status and weekly schedule", body = HoursResponse)),
    tag = "Menu"
)]
pub async fn get_hours(State(state): State<AppState>) -> impl IntoResponse {
    let hours = &state.services.hours;
    Json(HoursResponse {
        status: hours.status_now(),
        schedule: hours.weekly_schedule(),
    })
}

/// Catering packages and add-ons
#[utoipa::path(
    get,
    path = "/api/v1/catering/packages",
    summary = "Catering packages",
    responses((status = 200, description = "Packages and add-ons", body = CateringMenu)),
    tag = "Catering"
)]
pub async fn list_catering_packages(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.services.catering.as_ref().clone())
}

/// Estimate a catering order
#[utoipa::path(
    post,
    path = "/api/v1/catering/quote",
    summary = "Catering quote",
    request_body = CateringQuoteInput,
    responses(
        (status = 200, description = "Informational estimate", body = crate::catalog::CateringQuote),
        (status = 400, description = "Below the package minimum", body = crate::errors::ErrorResponse),
        (status = 422, description = "Unknown package or add-on", body = crate::errors::ErrorResponse),
    ),
    tag = "Catering"
)]
pub async fn quote_catering(
    State(state): State<AppState>,
    Json(payload): Json<CateringQuoteInput>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    let quote = state
        .services
        .inquiries
        .quote(&payload)
        .map_err(map_service_error)?;
    Ok(success_response(quote))
}
