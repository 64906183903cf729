//! Shared types for the chainhouse analytics API.
//!
//! This crate holds the wire payloads exchanged with callers, the canonical
//! request model that cache keys are derived from, and the fingerprinting
//! that turns a canonical request into a stable cache key.

use serde::{Deserialize, Serialize};

pub mod canonical;
pub mod fingerprint;
pub mod http;

/// A data partition that can be queried independently.
///
/// Each chain lives in its own database in the warehouse, so requests
/// spanning several chains fan out into one sub-query per chain.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum SupportedChain {
    Bsc,
    Ethereum,
}

impl SupportedChain {
    /// Parse a chain identifier, returning `None` for unsupported chains.
    ///
    /// Unsupported chains are not an error: the normalizer drops them
    /// silently, treating them as "no data requested".
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "bsc" => Some(Self::Bsc),
            "ethereum" => Some(Self::Ethereum),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bsc => "bsc",
            Self::Ethereum => "ethereum",
        }
    }
}

impl std::fmt::Display for SupportedChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
