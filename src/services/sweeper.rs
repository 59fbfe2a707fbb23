use std::{sync::Arc, time::Duration};

use tracing::info;

use crate::{orders::OrderBook, services::commerce::CartService};

/// What to sweep and how old it has to be.
#[derive(Debug, Clone, Copy)]
pub struct SweepPolicy {
    pub every: Duration,
    pub cart_idle: Duration,
    pub order_retention: chrono::Duration,
}

/// Swept counts from one pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub carts_evicted: usize,
    pub orders_pruned: usize,
}

pub fn sweep_once(carts: &CartService, orders: &OrderBook, policy: &SweepPolicy) -> SweepReport {
    SweepReport {
        carts_evicted: carts.evict_idle(policy.cart_idle),
        orders_pruned: orders.prune_older_than(policy.order_retention),
    }
}

/// Keeps per-session memory bounded by dropping idle saved carts and old order attempts.
pub async fn run_session_sweeper(
    carts: Arc<CartService>,
    orders: Arc<OrderBook>,
    policy: SweepPolicy,
) {
    info!(every = ?policy.every, "Starting session sweeper");

    let mut interval = tokio::time::interval(policy.every);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        sweep_once(&carts, &orders, &policy);
    }
}
