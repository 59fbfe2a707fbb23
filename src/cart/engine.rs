use std::fmt;

use serde::{
    de::{MapAccess, Visitor},
    ser::SerializeMap,
    Deserialize, Deserializer, Serialize, Serializer,
};

use super::{
    line::{normalize_instructions, OrderLine, SpiceLevel, MAX_INSTRUCTIONS_CHARS},
    line_key::LineKey,
    totals::{TaxRate, TipPercent, Totals},
};
use crate::{catalog::CatalogLookup, errors::ServiceError};

/// Version written into every persisted cart. Version 1 was the id-keyed cart.
pub const CART_SCHEMA_VERSION: u32 = 2;

/// A cart mutation, recorded so it can be replayed over a late-loaded snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CartOp {
    /// Line carrying the catalog snapshot taken when the guest added it.
    Add(OrderLine),
    SetQuantity(LineKey, i64),
    Remove(LineKey),
    Clear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CartPhase {
    Uninitialized,
    Hydrated,
}

/// What `hydrate` found in storage and how many queued mutations it replayed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HydrationOutcome {
    Restored { lines: usize, replayed: usize },
    Empty { replayed: usize },
    Corrupt { reason: String, replayed: usize },
    AlreadyHydrated,
}

impl HydrationOutcome {
    pub fn replayed(&self) -> usize {
        match self {
            Self::Restored { replayed, .. }
            | Self::Empty { replayed }
            | Self::Corrupt { replayed, .. } => *replayed,
            Self::AlreadyHydrated => 0,
        }
    }

    /// Storage no longer reflects memory: ops were replayed or a corrupt record should be replaced.
    pub fn needs_save(&self) -> bool {
        matches!(self, Self::Corrupt { .. }) || self.replayed() > 0
    }

    pub fn as_error(&self) -> Option<ServiceError> {
        match self {
            Self::Corrupt { reason, .. } => Some(ServiceError::PersistedStateCorrupt(reason.clone())),
            _ => None,
        }
    }
}

/// Order lines for one guest, plus the pre-hydration delta queue.
///
/// Lines keep insertion order. No two lines share a key and every quantity is
/// at least 1; every public mutation preserves both.
#[derive(Debug, Clone)]
pub struct CartEngine {
    lines: Vec<OrderLine>,
    pending: Vec<CartOp>,
    phase: CartPhase,
    revision: u64,
}

impl Default for CartEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl CartEngine {
    /// A cart whose persisted state has not been loaded yet.
    pub fn new() -> Self {
        Self {
            lines: Vec::new(),
            pending: Vec::new(),
            phase: CartPhase::Uninitialized,
            revision: 0,
        }
    }

    /// An empty cart with nothing to load.
    pub fn hydrated() -> Self {
        Self {
            phase: CartPhase::Hydrated,
            ..Self::new()
        }
    }

    pub fn phase(&self) -> CartPhase {
        self.phase
    }

    pub fn is_hydrated(&self) -> bool {
        self.phase == CartPhase::Hydrated
    }

    /// Bumped on every state change; used to order saves.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn pending_ops(&self) -> usize {
        self.pending.len()
    }

    /// Adds `quantity` of a catalog item, merging into an existing line with the same key.
    ///
    /// # Arguments
    /// * `catalog` - Source of the name and price snapshot
    /// * `item_id` - Menu item identifier
    /// * `quantity` - Units to add, at least 1
    /// * `spice_level` - Optional heat level
    /// * `instructions` - Optional free text, trimmed, at most 200 characters
    ///
    /// # Returns
    /// The key of the line that now holds the item.
    pub fn add_line(
        &mut self,
        catalog: &dyn CatalogLookup,
        item_id: &str,
        quantity: u32,
        spice_level: Option<SpiceLevel>,
        instructions: Option<&str>,
    ) -> Result<LineKey, ServiceError> {
        if quantity == 0 {
            return Err(ServiceError::ValidationError(
                "quantity must be at least 1".to_string(),
            ));
        }
        let item = catalog
            .lookup(item_id)
            .ok_or_else(|| ServiceError::ItemNotFound(item_id.to_string()))?;
        let special_instructions = normalize_instructions(instructions)?;

        let line = OrderLine {
            item_id: item.id.clone(),
            display_name: item.name.clone(),
            unit_price_cents: item.price_cents,
            quantity,
            spice_level,
            special_instructions,
        };
        let key = line.key();
        self.record(CartOp::Add(line));
        Ok(key)
    }

    /// Removing an unknown key is a no-op.
    pub fn remove_line(&mut self, key: &LineKey) {
        self.record(CartOp::Remove(key.clone()));
    }

    /// Non-positive quantities remove the line. Unknown keys are ignored.
    pub fn set_quantity(&mut self, key: &LineKey, quantity: i64) {
        self.record(CartOp::SetQuantity(key.clone(), quantity));
    }

    pub fn clear(&mut self) {
        self.record(CartOp::Clear);
    }

    pub fn lines(&self) -> &[OrderLine] {
        &self.lines
    }

    pub fn line(&self, key: &LineKey) -> Option<&OrderLine> {
        self.position(key).map(|idx| &self.lines[idx])
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Total units across all lines.
    pub fn item_count(&self) -> u64 {
        self.lines.iter().map(|l| u64::from(l.quantity)).sum()
    }

    pub fn totals(&self, tax_rate: TaxRate, tip: TipPercent) -> Totals {
        Totals::for_lines(&self.lines, tax_rate, tip)
    }

    /// Loads the persisted snapshot as the base and replays anything queued before it arrived.
    ///
    /// Unreadable or incompatible payloads yield an empty base; the reason is
    /// carried in the returned outcome rather than failing.
    pub fn hydrate(&mut self, persisted: Option<&str>) -> HydrationOutcome {
        if self.is_hydrated() {
            return HydrationOutcome::AlreadyHydrated;
        }

        let (base, corrupt) = match persisted.map(decode_snapshot) {
            None => (Vec::new(), None),
            Some(Ok(lines)) => (lines, None),
            Some(Err(reason)) => (Vec::new(), Some(reason)),
        };
        let restored = base.len();

        let pending = std::mem::take(&mut self.pending);
        let replayed = pending.len();
        self.lines = base;
        for op in &pending {
            self.apply(op);
        }
        self.phase = CartPhase::Hydrated;
        self.revision += 1;

        match corrupt {
            Some(reason) => HydrationOutcome::Corrupt { reason, replayed },
            None if restored > 0 => HydrationOutcome::Restored {
                lines: restored,
                replayed,
            },
            None => HydrationOutcome::Empty { replayed },
        }
    }

    /// Serialized lines in insertion order. Totals are never persisted.
    pub fn snapshot(&self) -> Result<String, ServiceError> {
        serde_json::to_string(&PersistedCartRef {
            schema_version: CART_SCHEMA_VERSION,
            lines: LinesRef(&self.lines),
        })
        .map_err(|e| ServiceError::InternalError(format!("failed to serialize cart: {e}")))
    }

    fn record(&mut self, op: CartOp) {
        let changed = self.apply(&op);
        if !self.is_hydrated() {
            self.pending.push(op);
            self.revision += 1;
        } else if changed {
            self.revision += 1;
        }
    }

    fn position(&self, key: &LineKey) -> Option<usize> {
        self.lines.iter().position(|line| &line.key() == key)
    }

    fn apply(&mut self, op: &CartOp) -> bool {
        match op {
            CartOp::Add(line) => {
                match self.position(&line.key()) {
                    Some(idx) => {
                        let existing = &mut self.lines[idx];
                        existing.quantity = existing.quantity.saturating_add(line.quantity);
                    }
                    None => self.lines.push(line.clone()),
                }
                true
            }
            CartOp::SetQuantity(key, quantity) => match self.position(key) {
                Some(idx) if *quantity <= 0 => {
                    self.lines.remove(idx);
                    true
                }
                Some(idx) => {
                    let quantity = u32::try_from(*quantity).unwrap_or(u32::MAX);
                    let line = &mut self.lines[idx];
                    let changed = line.quantity != quantity;
                    line.quantity = quantity;
                    changed
                }
                None => false,
            },
            CartOp::Remove(key) => match self.position(key) {
                Some(idx) => {
                    self.lines.remove(idx);
                    true
                }
                None => false,
            },
            CartOp::Clear => {
                let changed = !self.lines.is_empty();
                self.lines.clear();
                changed
            }
        }
    }
}

#[derive(Serialize)]
struct PersistedCartRef<'a> {
    schema_version: u32,
    lines: LinesRef<'a>,
}

struct LinesRef<'a>(&'a [OrderLine]);

impl Serialize for LinesRef<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for line in self.0 {
            map.serialize_entry(&line.key().to_string(), line)?;
        }
        map.end()
    }
}

#[derive(Deserialize)]
struct VersionProbe {
    schema_version: Option<u32>,
}

#[derive(Deserialize)]
struct PersistedCart {
    lines: PersistedLines,
}

/// Keeps document order, which serde_json's own map type does not.
struct PersistedLines(Vec<(String, OrderLine)>);

impl<'de> Deserialize<'de> for PersistedLines {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct LinesVisitor;

        impl<'de> Visitor<'de> for LinesVisitor {
            type Value = PersistedLines;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of line keys to order lines")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some(entry) = access.next_entry::<String, OrderLine>()? {
                    entries.push(entry);
                }
                Ok(PersistedLines(entries))
            }
        }

        deserializer.deserialize_map(LinesVisitor)
    }
}

fn decode_snapshot(raw: &str) -> Result<Vec<OrderLine>, String> {
    let probe: VersionProbe =
        serde_json::from_str(raw).map_err(|e| format!("unreadable cart payload: {e}"))?;
    match probe.schema_version {
        Some(CART_SCHEMA_VERSION) => {}
        Some(other) => return Err(format!("unsupported cart schema version {other}")),
        None => return Err("cart payload has no schema version".to_string()),
    }

    let cart: PersistedCart =
        serde_json::from_str(raw).map_err(|e| format!("malformed cart lines: {e}"))?;

    let mut lines: Vec<OrderLine> = Vec::with_capacity(cart.lines.0.len());
    for (raw_key, line) in cart.lines.0 {
        let key: LineKey = raw_key
            .parse()
            .map_err(|e| format!("bad line key `{raw_key}`: {e}"))?;
        if key != line.key() {
            return Err(format!("line key `{raw_key}` does not match its line"));
        }
        if line.quantity == 0 {
            return Err(format!("line `{raw_key}` has zero quantity"));
        }
        if line.unit_price_cents < 0 {
            return Err(format!("line `{raw_key}` has a negative price"));
        }
        let instructions_ok = line.special_instructions.as_deref().map_or(true, |text| {
            !text.trim().is_empty()
                && text.trim() == text
                && text.chars().count() <= MAX_INSTRUCTIONS_CHARS
        });
        if !instructions_ok {
            return Err(format!("line `{raw_key}` has invalid instructions"));
        }
        if lines.iter().any(|existing| existing.key() == key) {
            return Err(format!("duplicate line key `{raw_key}`"));
        }
        lines.push(line);
    }
    Ok(lines)
}
