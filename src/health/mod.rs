/*!
 * # Health Check Module
 *
 * Endpoints for monitoring the Haveli API:
 *
 * - Basic health check (`/health`) - Simple up/down status
 * - Readiness check (`/health/ready`) - Payment provider circuit and cart storage
 * - Liveness check (`/health/live`) - Process is alive
 */

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::{
    cart::CartStorage,
    circuit_breaker::{CircuitBreakerMetrics, CircuitState},
    payments::PaymentGateway,
};

/// Session id used to probe cart storage; never written.
const STORAGE_PROBE_SESSION: &str = "health-probe";

/// Basic health status
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Up,
    Down,
    Degraded,
}

impl HealthStatus {
    fn status_code(self) -> StatusCode {
        match self {
            HealthStatus::Up | HealthStatus::Degraded => StatusCode::OK,
            HealthStatus::Down => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

/// Health check detail
#[derive(Serialize, Debug, Clone)]
pub struct HealthDetail {
    pub status: HealthStatus,
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub circuit: Option<CircuitBreakerMetrics>,
    pub timestamp: DateTime<Utc>,
}

/// Overall health information
#[derive(Serialize, Debug, Clone)]
pub struct HealthInfo {
    pub status: HealthStatus,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub uptime_seconds: u64,
    pub details: BTreeMap<String, HealthDetail>,
}

/// Health check state
#[derive(Clone)]
pub struct HealthState {
    gateway: Arc<dyn PaymentGateway>,
    storage: Arc<dyn CartStorage>,
    health_cache: Arc<RwLock<HealthInfo>>,
    start_time: Instant,
}

impl HealthState {
    pub fn new(gateway: Arc<dyn PaymentGateway>, storage: Arc<dyn CartStorage>) -> Self {
        Self {
            gateway,
            storage,
            health_cache: Arc::new(RwLock::new(HealthInfo {
                status: HealthStatus::Up,
                version: env!("CARGO_PKG_VERSION").to_string(),
                timestamp: Utc::now(),
                uptime_seconds: 0,
                details: BTreeMap::new(),
            })),
            start_time: Instant::now(),
        }
    }

    /// Calculate system uptime
    pub fn uptime(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    fn gateway_detail(&self) -> HealthDetail {
        let metrics = self.gateway.circuit_metrics();
        let (status, message) = match metrics.as_ref().map(|m| m.state) {
            Some(CircuitState::Open) => (
                HealthStatus::Down,
                Some(format!("{} circuit open", self.gateway.name())),
            ),
            Some(CircuitState::HalfOpen) => (
                HealthStatus::Degraded,
                Some(format!("{} circuit probing", self.gateway.name())),
            ),
            Some(CircuitState::Closed) | None => (HealthStatus::Up, None),
        };
        HealthDetail {
            status,
            message,
            circuit: metrics,
            timestamp: Utc::now(),
        }
    }

    async fn storage_detail(&self) -> HealthDetail {
        let (status, message) = match self.storage.load(STORAGE_PROBE_SESSION).await {
            Ok(_) => (HealthStatus::Up, None),
            Err(e) => {
                error!("Cart storage health check failed: {}", e);
                (HealthStatus::Down, Some("cart storage unreadable".to_string()))
            }
        };
        HealthDetail {
            status,
            message,
            circuit: None,
            timestamp: Utc::now(),
        }
    }

    /// Update health status
    pub async fn update_health(&self) -> HealthInfo {
        let gateway = self.gateway_detail();
        let storage = self.storage_detail().await;

        let mut health = self.health_cache.write().await;
        health.timestamp = Utc::now();
        health.uptime_seconds = self.uptime();
        health.details.insert("payment_gateway".to_string(), gateway);
        health.details.insert("cart_storage".to_string(), storage);

        let any_down = health
            .details
            .values()
            .any(|detail| detail.status == HealthStatus::Down);
        let any_degraded = health
            .details
            .values()
            .any(|detail| detail.status == HealthStatus::Degraded);

        health.status = if any_down {
            HealthStatus::Down
        } else if any_degraded {
            HealthStatus::Degraded
        } else {
            HealthStatus::Up
        };
        health.clone()
    }
}

/// Basic health check endpoint
pub async fn health_check(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    debug!("Health check endpoint called");

    let health = state.health_cache.read().await;
    (
        health.status.status_code(),
        Json(json!({
            "status": health.status,
            "version": health.version,
            "timestamp": health.timestamp,
        })),
    )
}

/// Readiness check endpoint
pub async fn readiness_check(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    let health = state.update_health().await;
    (health.status.status_code(), Json(health))
}

/// Liveness check endpoint
pub async fn liveness_check(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "alive": true,
            "uptime_seconds": state.uptime(),
            "timestamp": Utc::now(),
        })),
    )
}

/// Run periodic health checks
pub async fn run_health_checker(state: Arc<HealthState>, every: Duration) {
    info!("Starting periodic health checker");

    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;
        let health = state.update_health().await;
        if health.status != HealthStatus::Up {
            warn!("System health is not optimal: {:?}", health.status);
            for (name, detail) in &health.details {
                if detail.status != HealthStatus::Up {
                    warn!("Component {name} is not healthy: {:?}", detail.status);
                }
            }
        }
    }
}

/// Creates router with health check endpoints
pub fn health_routes(state: Arc<HealthState>) -> Router {
    Router::new()
        .route("/", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/live", get(liveness_check))
        .with_state(state)
}
