use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};
use utoipa::ToSchema;

use super::line_key::LineKey;
use crate::errors::ServiceError;

/// Longest special-instructions text accepted on a line, in characters.
pub const MAX_INSTRUCTIONS_CHARS: usize = 200;

/// Heat level a guest can pick for a dish.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    ToSchema,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum SpiceLevel {
    Mild,
    Medium,
    Spicy,
    /// Older clients send `indian-spicy`.
    #[serde(alias = "indian-spicy")]
    #[strum(to_string = "extra-hot", serialize = "indian-spicy")]
    ExtraHot,
}

/// Trims instructions and enforces the length bound. Blank text means no instructions.
pub fn normalize_instructions(raw: Option<&str>) -> Result<Option<String>, ServiceError> {
    let Some(text) = raw.map(str::trim).filter(|t| !t.is_empty()) else {
        return Ok(None);
    };
    if text.chars().count() > MAX_INSTRUCTIONS_CHARS {
        return Err(ServiceError::ValidationError(format!(
            "special instructions must be at most {MAX_INSTRUCTIONS_CHARS} characters"
        )));
    }
    Ok(Some(text.to_string()))
}

/// One distinct purchasable configuration in a cart.
///
/// `display_name` and `unit_price_cents` are captured from the catalog when the
/// line is first added and are not refreshed afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct OrderLine {
    pub item_id: String,
    pub display_name: String,
    pub unit_price_cents: i64,
    pub quantity: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spice_level: Option<SpiceLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub special_instructions: Option<String>,
}

impl OrderLine {
    pub fn key(&self) -> LineKey {
        LineKey::new(
            self.item_id.clone(),
            self.spice_level,
            self.special_instructions.clone(),
        )
    }

    pub fn line_total_cents(&self) -> i64 {
        self.unit_price_cents
            .saturating_mul(i64::from(self.quantity))
    }

    /// Text used for this line on payment pages, e.g. `Chicken Biryani (mild spice) - no onions`.
    pub fn payment_description(&self) -> String {
        let mut description = self.display_name.clone();
        if let Some(spice) = self.spice_level {
            description.push_str(&format!(" ({spice} spice)"));
        }
        if let Some(notes) = &self.special_instructions {
            description.push_str(" - ");
            description.push_str(notes);
        }
        description
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn spice_levels_use_kebab_case() {
        assert_eq!(SpiceLevel::ExtraHot.to_string(), "extra-hot");
        assert_eq!(SpiceLevel::from_str("medium").ok(), Some(SpiceLevel::Medium));
        assert_eq!(
            SpiceLevel::from_str("indian-spicy").ok(),
            Some(SpiceLevel::ExtraHot)
        );
        let parsed: SpiceLevel = serde_json::from_str("\"indian-spicy\"").unwrap();
        assert_eq!(parsed, SpiceLevel::ExtraHot);
        assert_eq!(
            serde_json::to_string(&SpiceLevel::ExtraHot).unwrap(),
            "\"extra-hot\""
        );
    }

    #[test]
    fn instructions_are_trimmed_and_bounded() {
        assert_eq!(normalize_instructions(None).unwrap(), None);
        assert_eq!(normalize_instructions(Some("   ")).unwrap(), None);
        assert_eq!(
            normalize_instructions(Some("  no onions ")).unwrap().as_deref(),
            Some("no onions")
        );
        let long = "x".repeat(MAX_INSTRUCTIONS_CHARS + 1);
        assert!(matches!(
            normalize_instructions(Some(&long)),
            Err(ServiceError::ValidationError(_))
        ));
        let exact = "é".repeat(MAX_INSTRUCTIONS_CHARS);
        assert!(normalize_instructions(Some(&exact)).is_ok());
    }

    #[test]
    fn payment_description_mentions_customizations() {
        let line = OrderLine {
            item_id: "biryani".into(),
            display_name: "Chicken Biryani".into(),
            unit_price_cents: 1899,
            quantity: 2,
            spice_level: Some(SpiceLevel::Mild),
            special_instructions: Some("no onions".into()),
        };
        assert_eq!(
            line.payment_description(),
            "Chicken Biryani (mild spice) - no onions"
        );
        assert_eq!(line.line_total_cents(), 3798);
    }
}
