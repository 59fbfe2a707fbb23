//! Read-only catalog of what the restaurant sells.
//!
//! The menu is static data owned by the process; carts and checkout only ever
//! see it through [`CatalogLookup`], so tests can swap in their own items.

pub mod catering;
pub mod hours;
pub mod menu;

pub use catering::{CateringAddOn, CateringMenu, CateringPackage, CateringQuote};
pub use hours::{OpenStatus, OpeningHours};
pub use menu::{haveli_menu, MenuCategory, MenuItem};

use std::collections::HashMap;

/// Synchronous lookup of menu items by identifier.
pub trait CatalogLookup: Send + Sync {
    /// Returns the item with this id, or `None` when the catalog has no such item.
    fn lookup(&self, item_id: &str) -> Option<&MenuItem>;

    /// All items in display order.
    fn items(&self) -> &[MenuItem];

    fn by_category(&self, category: MenuCategory) -> Vec<&MenuItem> {
        self.items()
            .iter()
            .filter(|item| item.category == category)
            .collect()
    }

    fn featured(&self) -> Vec<&MenuItem> {
        self.items().iter().filter(|item| item.featured).collect()
    }
}

/// In-memory catalog built once at startup.
#[derive(Debug, Clone)]
pub struct StaticCatalog {
    items: Vec<MenuItem>,
    index: HashMap<String, usize>,
}

impl StaticCatalog {
    /// Catalog holding the house menu.
    pub fn haveli() -> Self {
        Self::from_items(haveli_menu())
    }

    /// Builds a catalog from arbitrary items. Later duplicates of an id are ignored.
    pub fn from_items(items: Vec<MenuItem>) -> Self {
        let mut kept = Vec::with_capacity(items.len());
        let mut index = HashMap::with_capacity(items.len());
        for item in items {
            if index.contains_key(&item.id) {
                continue;
            }
            index.insert(item.id.clone(), kept.len());
            kept.push(item);
        }
        Self { items: kept, index }
    }
}

impl Default for StaticCatalog {
    fn default() -> Self {
        Self::haveli()
    }
}

impl CatalogLookup for StaticCatalog {
    fn lookup(&self, item_id: &str) -> Option<&MenuItem> {
        self.index.get(item_id).map(|&pos| &self.items[pos])
    }

    fn items(&self) -> &[MenuItem] {
        &self.items
    }
}
