//! Target and observing-season identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

crate::define_id_type!(u32, Season);

/// Identifier of a star within a mission catalog.
///
/// Catalog numbers (e.g. K2 EPIC ids) are kept numeric; anything that does not
/// parse as an unsigned integer is kept as a name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TargetId {
    Number(u64),
    Name(String),
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetId::Number(n) => write!(f, "{}", n),
            TargetId::Name(name) => write!(f, "{}", name),
        }
    }
}

impl From<u64> for TargetId {
    fn from(value: u64) -> Self {
        TargetId::Number(value)
    }
}

impl From<u32> for TargetId {
    fn from(value: u32) -> Self {
        TargetId::Number(value as u64)
    }
}

impl From<&str> for TargetId {
    fn from(value: &str) -> Self {
        // Infallible: non-numeric input becomes a name
        value.parse().unwrap_or_else(|_| TargetId::Name(value.trim().to_string()))
    }
}

impl From<String> for TargetId {
    fn from(value: String) -> Self {
        TargetId::from(value.as_str())
    }
}

impl FromStr for TargetId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Ok(match trimmed.parse::<u64>() {
            Ok(n) => TargetId::Number(n),
            Err(_) => TargetId::Name(trimmed.to_string()),
        })
    }
}
