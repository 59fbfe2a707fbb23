use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::errors::ServiceError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CateringPackage {
    pub id: String,
    pub name: String,
    pub price_per_person_cents: i64,
    pub min_guests: u32,
    pub inclusions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CateringAddOn {
    pub id: String,
    pub name: String,
    pub price_cents: i64,
}

/// Priced estimate for a catering enquiry. Informational only; nothing is charged from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CateringQuote {
    pub package_id: String,
    pub guests: u32,
    pub per_person_cents: i64,
    pub food_cents: i64,
    pub add_on_ids: Vec<String>,
    pub add_ons_cents: i64,
    pub total_cents: i64,
}

/// Catering packages and add-ons offered for events.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CateringMenu {
    pub packages: Vec<CateringPackage>,
    pub add_ons: Vec<CateringAddOn>,
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

impl CateringMenu {
    pub fn haveli() -> Self {
        Self {
            packages: vec![
                CateringPackage {
                    id: "classic".into(),
                    name: "Classic Haveli".into(),
                    price_per_person_cents: 1599,
                    min_guests: 25,
                    inclusions: strings(&["2 Appetizers", "2 Entrees", "Rice", "Naan", "Salad"]),
                },
                CateringPackage {
                    id: "premium".into(),
                    name: "Premium Feast".into(),
                    price_per_person_cents: 2199,
                    min_guests: 25,
                    inclusions: strings(&[
                        "3 Appetizers",
                        "3 Entrees",
                        "Rice",
                        "Naan",
                        "Dessert",
                        "Salad",
                    ]),
                },
            ],
            add_ons: vec![
                CateringAddOn {
                    id: "chaat-station".into(),
                    name: "Chaat Station".into(),
                    price_cents: 29999,
                },
                CateringAddOn {
                    id: "gulab-jamun".into(),
                    name: "Gulab Jamun Tray".into(),
                    price_cents: 4999,
                },
                CateringAddOn {
                    id: "samosa-tray".into(),
                    name: "Samosa Tray".into(),
                    price_cents: 3999,
                },
            ],
        }
    }

    pub fn package(&self, id: &str) -> Option<&CateringPackage> {
        self.packages.iter().find(|p| p.id == id)
    }

    pub fn add_on(&self, id: &str) -> Option<&CateringAddOn> {
        self.add_ons.iter().find(|a| a.id == id)
    }

    /// Prices a package for a guest count plus any add-ons.
    ///
    /// # Arguments
    /// * `package_id` - Identifier of the catering package
    /// * `guests` - Headcount, at least the package minimum
    /// * `add_on_ids` - Add-on identifiers; each is charged once however often it is listed
    ///
    /// # Returns
    /// The quote, or `ItemNotFound` for unknown package or add-on ids and
    /// `ValidationError` when the headcount is below the package minimum.
    pub fn quote(
        &self,
        package_id: &str,
        guests: u32,
        add_on_ids: &[String],
    ) -> Result<CateringQuote, ServiceError> {
        let package = self
            .package(package_id)
            .ok_or_else(|| ServiceError::ItemNotFound(format!("catering package {package_id}")))?;

        if guests < package.min_guests {
            return Err(ServiceError::ValidationError(format!(
                "{} requires at least {} guests",
                package.name, package.min_guests
            )));
        }

        let mut chosen: Vec<String> = Vec::new();
        let mut add_ons_cents: i64 = 0;
        for id in add_on_ids {
            if chosen.iter().any(|c| c == id) {
                continue;
            }
            let add_on = self
                .add_on(id)
                .ok_or_else(|| ServiceError::ItemNotFound(format!("catering add-on {id}")))?;
            add_ons_cents = add_ons_cents.saturating_add(add_on.price_cents);
            chosen.push(add_on.id.clone());
        }

        let food_cents = package
            .price_per_person_cents
            .saturating_mul(i64::from(guests));

        Ok(CateringQuote {
            package_id: package.id.clone(),
            guests,
            per_person_cents: package.price_per_person_cents,
            food_cents,
            add_on_ids: chosen,
            add_ons_cents,
            total_cents: food_cents.saturating_add(add_ons_cents),
        })
    }
}

impl Default for CateringMenu {
    fn default() -> Self {
        Self::haveli()
    }
}
