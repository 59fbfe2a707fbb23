use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use tokio::signal;
use tracing::{info, warn};

use haveli_api as api;

const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = api::config::load_config().context("failed to load configuration")?;
    api::config::init_tracing(cfg.log_level(), cfg.log_json);

    if cfg.is_production() && cfg.email_to.is_none() {
        warn!("APP__EMAIL_TO is not set; contact and catering forms will not reach staff");
    }

    // Compose shared app state
    let app_state =
        api::AppState::from_factory(api::services::factory::ServiceFactory::new(cfg.clone()))
            .context("failed to build services")?;

    // Keep the readiness snapshot warm for /health
    let health = app_state.health_state();
    tokio::spawn(api::health::run_health_checker(
        health.clone(),
        HEALTH_CHECK_INTERVAL,
    ));

    // Bound per-session memory; storage keeps evicted carts
    tokio::spawn(api::services::sweeper::run_session_sweeper(
        Arc::clone(&app_state.services.cart),
        Arc::clone(&app_state.services.orders),
        api::services::sweeper::SweepPolicy {
            every: cfg.session_sweep_interval(),
            cart_idle: cfg.cart_idle(),
            order_retention: cfg.order_retention(),
        },
    ));

    let app = api::build_router(app_state, health).context("failed to build router")?;

    // Bind and serve
    let addr: SocketAddr = format!("{}:{}", cfg.host, cfg.port)
        .parse()
        .with_context(|| format!("invalid bind address {}:{}", cfg.host, cfg.port))?;
    info!("haveli-api listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("haveli-api stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
