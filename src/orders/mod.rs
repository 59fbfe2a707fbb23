//! Order attempts: identity, guest contact details, and the payment lifecycle.

pub mod attempt;
pub mod book;

pub use attempt::{
    KitchenProgress, OrderAttempt, OrderAttemptStatus, OrderReceipt, TransitionOutcome,
};
pub use book::OrderBook;

use std::fmt;

use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::errors::ServiceError;

/// Longest kitchen note accepted with an order, in characters.
pub const MAX_ORDER_NOTES_CHARS: usize = 300;

const BASE36: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

fn base36(mut value: u64) -> String {
    if value == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while value > 0 {
        digits.push(BASE36[(value % 36) as usize]);
        value /= 36;
    }
    digits.reverse();
    String::from_utf8_lossy(&digits).into_owned()
}

/// Identifier of a single checkout attempt, e.g. `HAVELI-M1ZK3QF2-7XQ4`.
///
/// Time plus four random base-36 characters keeps collisions negligible even
/// for attempts created in the same millisecond.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct OrderId(String);

impl OrderId {
    pub fn generate() -> Self {
        Self::with_prefix("HAVELI")
    }

    pub fn with_prefix(prefix: &str) -> Self {
        let millis = u64::try_from(Utc::now().timestamp_millis()).unwrap_or_default();
        let mut rng = rand::thread_rng();
        let suffix: String = (0..4)
            .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
            .collect();
        Self(format!("{prefix}-{}-{suffix}", base36(millis)))
    }

    /// Accepts an id presented by a client. Shape only; existence is checked elsewhere.
    pub fn parse(raw: &str) -> Result<Self, ServiceError> {
        let raw = raw.trim();
        let valid = !raw.is_empty()
            && raw.len() <= 64
            && raw
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
        if !valid {
            return Err(ServiceError::ValidationError(format!(
                "invalid order id `{raw}`"
            )));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Guest contact details for an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ContactInfo {
    pub name: String,
    pub phone: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl ContactInfo {
    /// Trims every field; name and phone must remain non-empty and email, when given, well formed.
    pub fn normalized(&self) -> Result<Self, ServiceError> {
        let name = self.name.trim();
        let phone = self.phone.trim();
        let mut missing = Vec::new();
        if name.is_empty() {
            missing.push("name");
        }
        if phone.is_empty() {
            missing.push("phone");
        }
        if !missing.is_empty() {
            return Err(ServiceError::ValidationError(format!(
                "customer {} required",
                missing.join(" and ")
            )));
        }

        let email = self
            .email
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty());
        if let Some(email) = email {
            if !validator::validate_email(email) {
                return Err(ServiceError::ValidationError(
                    "customer email is not a valid address".to_string(),
                ));
            }
        }

        Ok(Self {
            name: name.to_string(),
            phone: phone.to_string(),
            email: email.map(str::to_string),
        })
    }
}

/// When the guest wants to collect the order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum PickupTime {
    #[default]
    #[serde(rename = "asap")]
    Asap,
    #[serde(rename = "in-15")]
    In15,
    #[serde(rename = "in-30")]
    In30,
}

/// Trims kitchen notes and enforces the length bound.
pub fn normalize_notes(raw: Option<&str>) -> Result<Option<String>, ServiceError> {
    let Some(notes) = raw.map(str::trim).filter(|n| !n.is_empty()) else {
        return Ok(None);
    };
    if notes.chars().count() > MAX_ORDER_NOTES_CHARS {
        return Err(ServiceError::ValidationError(format!(
            "order notes must be at most {MAX_ORDER_NOTES_CHARS} characters"
        )));
    }
    Ok(Some(notes.to_string()))
}
