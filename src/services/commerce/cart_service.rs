use std::{
    sync::{Arc, Mutex, MutexGuard},
    time::{Duration, Instant},
};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex as AsyncMutex, OnceCell};
use tracing::{debug, info, instrument, warn};
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    cart::{
        CartEngine, CartStorage, HydrationOutcome, LineKey, OrderLine, SpiceLevel, TaxRate,
        TipPercent, Totals,
    },
    catalog::CatalogLookup,
    errors::ServiceError,
};

/// Session-scoped carts backed by a [`CartStorage`].
///
/// Each session gets one [`CartEngine`]. The first request for a session
/// loads the persisted snapshot; mutations that arrive while that load is in
/// flight are queued by the engine and replayed on top of it. Every change to
/// a hydrated cart is written back through the storage port.
///
/// Reads for a session that has nothing in memory or storage are answered
/// with an empty cart without keeping anything around, and
/// [`CartService::evict_idle`] drops idle carts whose state is already saved.
///
/// # Examples
///
/// ```ignore
/// let carts = CartService::new(catalog, storage, TaxRate::DEFAULT);
/// let (key, view) = carts.add_line("guest-session-1", AddLineInput {
///     item_id: "naan".into(),
///     quantity: Some(2),
///     spice_level: None,
///     special_instructions: None,
/// }).await?;
/// ```
#[derive(Clone)]
pub struct CartService {
    catalog: Arc<dyn CatalogLookup>,
    storage: Arc<dyn CartStorage>,
    carts: Arc<DashMap<String, Arc<SessionCart>>>,
    tax_rate: TaxRate,
}

struct SessionCart {
    engine: Mutex<CartEngine>,
    hydrated: OnceCell<()>,
    /// Revision last written to storage
    persisted_revision: AsyncMutex<u64>,
    last_access: Mutex<Instant>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl SessionCart {
    fn new() -> Self {
        Self {
            engine: Mutex::new(CartEngine::new()),
            hydrated: OnceCell::new(),
            persisted_revision: AsyncMutex::new(0),
            last_access: Mutex::new(Instant::now()),
        }
    }

    fn engine(&self) -> MutexGuard<'_, CartEngine> {
        lock(&self.engine)
    }

    fn touch(&self) {
        *lock(&self.last_access) = Instant::now();
    }

    fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(*lock(&self.last_access))
    }

    /// Hydrated, with every change written to storage and no save in progress.
    fn is_settled(&self) -> bool {
        let Ok(persisted) = self.persisted_revision.try_lock() else {
            return false;
        };
        let engine = self.engine();
        self.hydrated.initialized() && engine.is_hydrated() && engine.revision() <= *persisted
    }
}

/// Request body for adding an item
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct AddLineInput {
    #[validate(length(min = 1, max = 64))]
    pub item_id: String,
    /// Defaults to 1
    #[validate(range(min = 1, max = 999))]
    pub quantity: Option<u32>,
    pub spice_level: Option<SpiceLevel>,
    pub special_instructions: Option<String>,
}

/// Request body for changing a line's quantity. Zero or less removes the line.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct SetQuantityInput {
    pub quantity: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct CartLineView {
    /// Canonical line key; use it (URL-encoded) to address the line
    pub line_key: String,
    pub item_id: String,
    pub display_name: String,
    pub unit_price_cents: i64,
    pub quantity: u32,
    pub spice_level: Option<SpiceLevel>,
    pub special_instructions: Option<String>,
    pub line_total_cents: i64,
}

impl From<&OrderLine> for CartLineView {
    fn from(line: &OrderLine) -> Self {
        Self {
            line_key: line.key().to_string(),
            item_id: line.item_id.clone(),
            display_name: line.display_name.clone(),
            unit_price_cents: line.unit_price_cents,
            quantity: line.quantity,
            spice_level: line.spice_level,
            special_instructions: line.special_instructions.clone(),
            line_total_cents: line.line_total_cents(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct CartView {
    pub lines: Vec<CartLineView>,
    pub item_count: u64,
    pub tip_percent: u8,
    pub totals: Totals,
}

impl CartService {
    /// Creates a new `CartService`.
    ///
    /// # Arguments
    ///
    /// * `catalog` - Source of item names and prices
    /// * `storage` - Where cart snapshots are persisted
    /// * `tax_rate` - Rate used for displayed totals
    pub fn new(
        catalog: Arc<dyn CatalogLookup>,
        storage: Arc<dyn CartStorage>,
        tax_rate: TaxRate,
    ) -> Self {
        Self {
            catalog,
            storage,
            carts: Arc::new(DashMap::new()),
            tax_rate,
        }
    }

    pub fn tax_rate(&self) -> TaxRate {
        self.tax_rate
    }

    /// Number of sessions with a cart in memory.
    pub fn active_sessions(&self) -> usize {
        self.carts.len()
    }

    /// Drops carts idle for at least `max_idle` whose state is fully saved and that no
    /// request is using. The next request for such a session hydrates from storage again.
    ///
    /// # Returns
    ///
    /// Number of carts dropped
    pub fn evict_idle(&self, max_idle: Duration) -> usize {
        let now = Instant::now();
        let mut evicted = 0;
        self.carts.retain(|_, cart| {
            let keep = Arc::strong_count(cart) > 1
                || cart.idle_for(now) < max_idle
                || !cart.is_settled();
            if !keep {
                evicted += 1;
            }
            keep
        });
        if evicted > 0 {
            debug!(evicted, remaining = self.carts.len(), "evicted idle carts");
        }
        evicted
    }

    fn session_cart(&self, session: &str) -> Arc<SessionCart> {
        let cart = self
            .carts
            .entry(session.to_string())
            .or_insert_with(|| Arc::new(SessionCart::new()))
            .value()
            .clone();
        cart.touch();
        cart
    }

    /// Cart for a read. `None` when the session has nothing in memory or in storage; no
    /// entry is created in that case.
    async fn existing_cart(&self, session: &str) -> Option<Arc<SessionCart>> {
        let known = self.carts.get(session).map(|entry| Arc::clone(entry.value()));
        if let Some(cart) = known {
            cart.touch();
            self.ensure_hydrated(session, &cart).await;
            return Some(cart);
        }

        let raw = self.load(session).await?;
        let cart = self.session_cart(session);
        cart.hydrated
            .get_or_init(|| self.hydrate(session, &cart, Some(raw)))
            .await;
        Some(cart)
    }

    async fn load(&self, session: &str) -> Option<String> {
        match self.storage.load(session).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(session, "failed to load cart, starting empty: {}", e);
                None
            }
        }
    }

    /// Loads the persisted snapshot once per session.
    async fn ensure_hydrated(&self, session: &str, cart: &SessionCart) {
        cart.hydrated
            .get_or_init(|| async {
                let raw = self.load(session).await;
                self.hydrate(session, cart, raw).await
            })
            .await;
    }

    async fn hydrate(&self, session: &str, cart: &SessionCart, raw: Option<String>) {
        let (outcome, revision) = {
            let mut engine = cart.engine();
            let outcome = engine.hydrate(raw.as_deref());
            (outcome, engine.revision())
        };

        match &outcome {
            HydrationOutcome::Corrupt { reason, replayed } => {
                warn!(session, replayed, "persisted cart is corrupt, starting empty: {}", reason)
            }
            HydrationOutcome::Restored { lines, replayed } => {
                debug!(session, lines, replayed, "cart restored")
            }
            HydrationOutcome::Empty { replayed } => {
                debug!(session, replayed, "no persisted cart")
            }
            HydrationOutcome::AlreadyHydrated => {}
        }

        if !outcome.needs_save() {
            let mut persisted = cart.persisted_revision.lock().await;
            *persisted = (*persisted).max(revision);
        }
    }

    /// Writes the cart if it changed since the last save. Saves for one session are serialized
    /// and never go backwards.
    async fn persist(&self, session: &str, cart: &SessionCart) -> Result<(), ServiceError> {
        let mut persisted = cart.persisted_revision.lock().await;
        let (revision, payload) = {
            let engine = cart.engine();
            if !engine.is_hydrated() || engine.revision() <= *persisted {
                return Ok(());
            }
            (engine.revision(), engine.snapshot()?)
        };

        self.storage.save(session, &payload).await.map_err(|e| {
            warn!(session, "failed to persist cart: {}", e);
            match e {
                ServiceError::StorageError(_) => e,
                other => ServiceError::StorageError(other.to_string()),
            }
        })?;
        *persisted = revision;
        Ok(())
    }

    /// Applies a mutation, then hydrates and persists. The mutation is queued if hydration
    /// has not finished yet.
    async fn mutate<T>(
        &self,
        session: &str,
        op: impl FnOnce(&mut CartEngine) -> Result<T, ServiceError>,
    ) -> Result<T, ServiceError> {
        let cart = self.session_cart(session);
        let result = {
            let mut engine = cart.engine();
            op(&mut engine)?
        };
        self.ensure_hydrated(session, &cart).await;
        self.persist(session, &cart).await?;
        Ok(result)
    }

    fn view(&self, engine: &CartEngine, tip: TipPercent) -> CartView {
        CartView {
            lines: engine.lines().iter().map(CartLineView::from).collect(),
            item_count: engine.item_count(),
            tip_percent: tip.value(),
            totals: engine.totals(self.tax_rate, tip),
        }
    }

    async fn current_view(&self, session: &str, tip: TipPercent) -> CartView {
        match self.existing_cart(session).await {
            Some(cart) => {
                let engine = cart.engine();
                self.view(&engine, tip)
            }
            None => self.view(&CartEngine::hydrated(), tip),
        }
    }

    /// Lines and totals for a session.
    #[instrument(skip(self))]
    pub async fn get_cart(&self, session: &str, tip: TipPercent) -> Result<CartView, ServiceError> {
        Ok(self.current_view(session, tip).await)
    }

    /// Current lines, in insertion order.
    pub async fn lines(&self, session: &str) -> Result<Vec<OrderLine>, ServiceError> {
        let lines = match self.existing_cart(session).await {
            Some(cart) => cart.engine().lines().to_vec(),
            None => Vec::new(),
        };
        Ok(lines)
    }

    /// Adds an item, merging with an identical line.
    ///
    /// # Returns
    ///
    /// * `Ok((LineKey, CartView))` - Key of the affected line and the updated cart
    /// * `Err(ServiceError::ItemNotFound)` - Unknown item id
    /// * `Err(ServiceError::ValidationError)` - Zero quantity or over-long instructions
    #[instrument(skip(self, input), fields(item_id = %input.item_id))]
    pub async fn add_line(
        &self,
        session: &str,
        input: AddLineInput,
    ) -> Result<(LineKey, CartView), ServiceError> {
        let catalog = Arc::clone(&self.catalog);
        let key = self
            .mutate(session, |engine| {
                engine.add_line(
                    catalog.as_ref(),
                    &input.item_id,
                    input.quantity.unwrap_or(1),
                    input.spice_level,
                    input.special_instructions.as_deref(),
                )
            })
            .await?;
        info!(session, line_key = %key, "item added to cart");
        Ok((key, self.current_view(session, TipPercent::NONE).await))
    }

    /// `line_key` is the canonical text form; malformed keys are a validation error,
    /// unknown ones a no-op.
    #[instrument(skip(self))]
    pub async fn set_quantity(
        &self,
        session: &str,
        line_key: &str,
        quantity: i64,
    ) -> Result<CartView, ServiceError> {
        let key: LineKey = line_key.parse()?;
        self.mutate(session, |engine| {
            engine.set_quantity(&key, quantity);
            Ok(())
        })
        .await?;
        Ok(self.current_view(session, TipPercent::NONE).await)
    }

    #[instrument(skip(self))]
    pub async fn remove_line(&self, session: &str, line_key: &str) -> Result<CartView, ServiceError> {
        let key: LineKey = line_key.parse()?;
        self.mutate(session, |engine| {
            engine.remove_line(&key);
            Ok(())
        })
        .await?;
        Ok(self.current_view(session, TipPercent::NONE).await)
    }

    #[instrument(skip(self))]
    pub async fn clear(&self, session: &str) -> Result<CartView, ServiceError> {
        self.mutate(session, |engine| {
            engine.clear();
            Ok(())
        })
        .await?;
        info!(session, "cart cleared");
        Ok(self.current_view(session, TipPercent::NONE).await)
    }
}
