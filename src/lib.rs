//! Haveli API Library
//!
//! Menu, session cart, checkout and payment confirmation core for the Haveli restaurant
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod cart;
pub mod catalog;
pub mod circuit_breaker;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod health;
pub mod middleware_helpers;
pub mod notifications;
pub mod openapi;
pub mod orders;
pub mod payments;
pub mod services;
pub mod tracing;

use std::{sync::Arc, time::Duration};

use axum::{
    http::{header, HeaderName, HeaderValue, Method},
    response::Json,
    routing::get,
    Router,
};
use serde_json::{json, Value};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
};

use crate::{
    errors::ServiceError,
    health::{health_routes, HealthState},
    services::factory::ServiceFactory,
};

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub config: config::AppConfig,
    pub services: handlers::AppServices,
}

impl AppState {
    pub fn new(config: config::AppConfig, services: handlers::AppServices) -> Self {
        Self { config, services }
    }

    /// Builds every service the configuration names
    pub fn from_factory(factory: ServiceFactory) -> Result<Self, ServiceError> {
        let config = factory.config().clone();
        let services = factory.build()?;
        Ok(Self::new(config, services))
    }

    /// Health state probing this app's payment provider and cart storage
    pub fn health_state(&self) -> Arc<HealthState> {
        Arc::new(HealthState::new(
            Arc::clone(&self.services.gateway),
            Arc::clone(&self.services.storage),
        ))
    }
}

// API routes function
pub fn api_v1_routes() -> Router<AppState> {
    Router::new()
        .merge(handlers::commerce::menu_routes())
        .merge(handlers::inquiries::inquiries_routes())
        .nest("/cart", handlers::commerce::carts_routes())
        .nest("/checkout", handlers::commerce::checkout_routes())
        .nest("/payments", handlers::payments::payments_routes())
        .nest("/orders", handlers::orders::orders_routes())
}

/// Builds the CORS layer from configuration.
///
/// Explicit origins win; otherwise permissive CORS is only allowed in development
/// or when `cors_allow_any_origin` is set.
pub fn cors_layer(cfg: &config::AppConfig) -> Result<CorsLayer, ServiceError> {
    let configured_origins: Option<Vec<HeaderValue>> = cfg
        .cors_allowed_origins
        .as_ref()
        .map(|raw| {
            raw.split(',')
                .filter_map(|origin| {
                    let trimmed = origin.trim();
                    if trimmed.is_empty() {
                        None
                    } else {
                        HeaderValue::from_str(trimmed).ok()
                    }
                })
                .collect::<Vec<_>>()
        })
        .filter(|origins| !origins.is_empty());

    if let Some(origins) = configured_origins {
        let layer = CorsLayer::new().allow_origin(origins);
        // Wildcards are rejected once credentials are allowed
        Ok(if cfg.cors_allow_credentials {
            layer
                .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
                .allow_headers([
                    header::CONTENT_TYPE,
                    HeaderName::from_static(middleware_helpers::CART_SESSION_HEADER),
                    HeaderName::from_static(middleware_helpers::REQUEST_ID_HEADER),
                ])
                .allow_credentials(true)
        } else {
            layer.allow_methods(Any).allow_headers(Any)
        })
    } else if cfg.should_allow_permissive_cors() {
        ::tracing::info!(
            "Using permissive CORS because explicit origins were not configured ({})",
            if cfg.is_development() {
                "development environment"
            } else {
                "explicit override enabled"
            }
        );
        Ok(CorsLayer::permissive())
    } else {
        Err(ServiceError::Configuration(
            "missing CORS configuration: set APP__CORS_ALLOWED_ORIGINS or APP__CORS_ALLOW_ANY_ORIGIN=true"
                .to_string(),
        ))
    }
}

async fn root_status() -> Json<Value> {
    Json(json!({
        "service": "haveli-api",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "up",
    }))
}

/// Assembles the full HTTP application: API, health, Swagger UI and middleware
pub fn build_router(state: AppState, health: Arc<HealthState>) -> Result<Router, ServiceError> {
    let cors = cors_layer(&state.config)?;
    let timeout = state.config.request_timeout();

    Ok(Router::<AppState>::new()
        .route("/", get(root_status))
        .nest("/api/v1", api_v1_routes())
        .with_state(state)
        .nest("/health", health_routes(health))
        .merge(openapi::swagger_ui())
        // HTTP tracing layer for consistent request/response telemetry
        .layer(crate::tracing::configure_http_tracing())
        .layer(TimeoutLayer::new(timeout.max(Duration::from_secs(1))))
        .layer(CompressionLayer::new())
        .layer(cors)
        // Ensure every request carries a request id for traceability
        .layer(axum::middleware::from_fn(
            middleware_helpers::request_id_middleware,
        )))
}
