//! Case-normalized account addresses
//!
//! Every address in the system is a 20-byte hex account identifier
//! (`0x` + 40 hex chars). Addresses are lowercased on construction so
//! equality and uniqueness checks never depend on caller casing.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// A validated, lowercase account address
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    /// Parse and normalize an address, rejecting anything that is not
    /// `0x` followed by exactly 40 hex characters
    pub fn parse(raw: &str) -> Result<Self, Error> {
        let trimmed = raw.trim();
        let hex = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .ok_or_else(|| Error::InvalidAddress(raw.to_string()))?;
        if hex.len() != 40 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(Error::InvalidAddress(raw.to_string()));
        }
        Ok(Address(format!("0x{}", hex.to_ascii_lowercase())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Case-insensitive comparison against an unnormalized string,
    /// used when checking oracle payloads against stored addresses
    pub fn matches(&self, other: &str) -> bool {
        self.0.eq_ignore_ascii_case(other.trim())
    }
}

impl FromStr for Address {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Address::parse(s)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// Deserialize through parse so snapshots and API payloads are validated too
impl<'de> Deserialize<'de> for Address {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Address::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Set-equality of two signer lists, ignoring order
pub fn same_signer_set(a: &[Address], b: &[Address]) -> bool {
    a.len() == b.len() && a.iter().all(|addr| b.contains(addr))
}
