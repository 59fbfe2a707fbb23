//! Composite identity of a cart line.
//!
//! The canonical text form is length-prefixed so free-text instructions can
//! never be confused with the field separators:
//!
//! ```text
//! <len>:<item_id>|<spice or ->|<len>:<instructions>   (or `-` for no instructions)
//! 4:naan|-|-
//! 7:biryani|mild|9:no onions
//! ```

use std::{fmt, str::FromStr};

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use super::line::SpiceLevel;
use crate::errors::ServiceError;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LineKey {
    item_id: String,
    spice_level: Option<SpiceLevel>,
    instructions: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LineKeyParseError {
    #[error("line key is missing a length prefix")]
    MissingLength,
    #[error("line key length prefix is invalid")]
    InvalidLength,
    #[error("line key is truncated")]
    Truncated,
    #[error("line key is missing a field separator")]
    MissingSeparator,
    #[error("unknown spice level `{0}`")]
    UnknownSpice(String),
    #[error("line key is not in canonical form")]
    NotCanonical,
}

impl From<LineKeyParseError> for ServiceError {
    fn from(err: LineKeyParseError) -> Self {
        ServiceError::ValidationError(format!("invalid line key: {err}"))
    }
}

impl LineKey {
    /// Expects already-normalized parts; see [`super::line::normalize_instructions`].
    pub fn new(
        item_id: impl Into<String>,
        spice_level: Option<SpiceLevel>,
        instructions: Option<String>,
    ) -> Self {
        Self {
            item_id: item_id.into(),
            spice_level,
            instructions,
        }
    }

    pub fn item_id(&self) -> &str {
        &self.item_id
    }

    pub fn spice_level(&self) -> Option<SpiceLevel> {
        self.spice_level
    }

    pub fn instructions(&self) -> Option<&str> {
        self.instructions.as_deref()
    }
}

impl fmt::Display for LineKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}|", self.item_id.len(), self.item_id)?;
        match self.spice_level {
            Some(spice) => write!(f, "{spice}|")?,
            None => f.write_str("-|")?,
        }
        match &self.instructions {
            Some(text) => write!(f, "{}:{}", text.len(), text),
            None => f.write_str("-"),
        }
    }
}

/// Splits `<len>:<bytes>` off the front of `input`.
fn take_prefixed(input: &str) -> Result<(&str, &str), LineKeyParseError> {
    let (len, rest) = input
        .split_once(':')
        .ok_or(LineKeyParseError::MissingLength)?;
    if len.is_empty() || !len.bytes().all(|b| b.is_ascii_digit()) {
        return Err(LineKeyParseError::InvalidLength);
    }
    let len: usize = len.parse().map_err(|_| LineKeyParseError::InvalidLength)?;
    let value = rest.get(..len).ok_or(LineKeyParseError::Truncated)?;
    Ok((value, &rest[len..]))
}

impl FromStr for LineKey {
    type Err = LineKeyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (item_id, rest) = take_prefixed(s)?;
        if item_id.is_empty() {
            return Err(LineKeyParseError::InvalidLength);
        }
        let rest = rest
            .strip_prefix('|')
            .ok_or(LineKeyParseError::MissingSeparator)?;
        let (spice, rest) = rest
            .split_once('|')
            .ok_or(LineKeyParseError::MissingSeparator)?;
        let spice_level = match spice {
            "-" => None,
            other => Some(
                SpiceLevel::from_str(other)
                    .map_err(|_| LineKeyParseError::UnknownSpice(other.to_string()))?,
            ),
        };
        let instructions = if rest == "-" {
            None
        } else {
            let (text, tail) = take_prefixed(rest)?;
            if !tail.is_empty() {
                return Err(LineKeyParseError::NotCanonical);
            }
            Some(text.to_string())
        };

        let key = LineKey::new(item_id, spice_level, instructions);
        // Aliases, leading zeros and untrimmed text all have another spelling.
        if key.to_string() != s {
            return Err(LineKeyParseError::NotCanonical);
        }
        Ok(key)
    }
}

impl Serialize for LineKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for LineKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}
