//! Cart engine: order lines keyed by item and customization, derived totals,
//! and the persisted snapshot format.

pub mod engine;
pub mod line;
pub mod line_key;
pub mod storage;
pub mod totals;

pub use engine::{CartEngine, CartOp, CartPhase, HydrationOutcome, CART_SCHEMA_VERSION};
pub use line::{normalize_instructions, OrderLine, SpiceLevel, MAX_INSTRUCTIONS_CHARS};
pub use line_key::{LineKey, LineKeyParseError};
pub use storage::{CartStorage, FileCartStorage, MemoryCartStorage};
pub use totals::{round_cents, TaxRate, TipPercent, Totals};
