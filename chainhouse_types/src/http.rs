//! Wire payloads for the analytics API.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::SupportedChain;

#[derive(Debug, Clone, Copy, Error)]
pub enum ValidationError {
    #[error("'contracts' must be a non-empty list")]
    EmptyContracts,

    #[error("'startTimestamp' must be a positive epoch-seconds value")]
    InvalidStartTimestamp,

    #[error("'endTimestamp' must be a positive epoch-seconds value")]
    InvalidEndTimestamp,
}

/// One `{partition, identifier}` pair as sent by the caller.
///
/// The chain is kept as a raw string here so that unsupported chains can be
/// dropped during normalization instead of failing deserialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractEntry {
    pub chain: String,
    pub address: String,
}

/// Inbound request shape shared by all analytics adapters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsRequest {
    pub contracts: Vec<ContractEntry>,
    /// In epoch seconds.
    pub start_timestamp: i64,
    /// In epoch seconds.
    pub end_timestamp: i64,
}

impl AnalyticsRequest {
    /// Check the request before it is allowed near the cache/queue core.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.contracts.is_empty() {
            return Err(ValidationError::EmptyContracts);
        }
        if self.start_timestamp <= 0 {
            return Err(ValidationError::InvalidStartTimestamp);
        }
        if self.end_timestamp <= 0 {
            return Err(ValidationError::InvalidEndTimestamp);
        }
        Ok(())
    }
}

/// One aggregated value for a single chain, e.g. `{"chain":"bsc","txs":42}`.
///
/// The name of the value field differs per adapter (`gasUsage`, `txs`,
/// `users`), so the total entries are built dynamically.
pub fn chain_total(
    chain: SupportedChain,
    value_field: &str,
    value: f64,
) -> serde_json::Value {
    serde_json::json!({ "chain": chain, value_field: value })
}

/// Aggregated response: one entry per chain plus the (bucket-rounded)
/// interval echoed back.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsResponse {
    pub total: Vec<serde_json::Value>,
    /// In epoch seconds, rounded down to the bucket grid.
    pub start_timestamp: i64,
    /// In epoch seconds, rounded down to the bucket grid.
    pub end_timestamp: i64,
}

/// JSON error body returned by the HTTP layer.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorMessage {
    pub error: String,
}
