//! Canonicalization of inbound requests.
//!
//! Two logically-equivalent raw requests (differing only in target order,
//! identifier casing, or sub-bucket timestamp jitter) must normalize to
//! byte-identical canonical forms, because the canonical serialization is
//! what gets fingerprinted into the cache key.

use serde::Serialize;

use crate::{
    http::AnalyticsRequest,
    SupportedChain,
};

/// Default width of the time bucket grid, in seconds (30 minutes).
pub const DEFAULT_BUCKET_SECONDS: i64 = 1800;

/// One normalized `(partition, identifier)` target.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct CanonicalTarget {
    pub chain: SupportedChain,
    /// Contract address, lowercased.
    pub address: String,
}

/// A normalized, immutable analytics request.
///
/// Field order matters: the struct serializes in declaration order and the
/// serialized bytes feed the fingerprinter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalRequest {
    /// Sorted by `(chain, address)`, deduplicated.
    pub contracts: Vec<CanonicalTarget>,
    /// In epoch seconds, floored to the bucket grid.
    pub start_timestamp: i64,
    /// In epoch seconds, floored to the bucket grid.
    pub end_timestamp: i64,
}

impl CanonicalRequest {
    /// Split into independent per-chain sub-requests for parallel fan-out.
    ///
    /// Target order within each group is preserved, so the groups are
    /// themselves canonical and safe to fingerprint.
    pub fn split_by_chain(&self) -> Vec<CanonicalRequest> {
        let mut groups: Vec<CanonicalRequest> = Vec::new();
        for target in &self.contracts {
            match groups.last_mut() {
                Some(group) if group.contracts[0].chain == target.chain => {
                    group.contracts.push(target.clone());
                }
                _ => groups.push(CanonicalRequest {
                    contracts: vec![target.clone()],
                    start_timestamp: self.start_timestamp,
                    end_timestamp: self.end_timestamp,
                }),
            }
        }
        groups
    }

    /// The chain shared by all targets of a per-chain group.
    pub fn chain(&self) -> Option<SupportedChain> {
        self.contracts.first().map(|t| t.chain)
    }
}

/// Floor `t` to the bucket grid.
fn bucket(t: i64, bucket_seconds: i64) -> i64 {
    t.div_euclid(bucket_seconds) * bucket_seconds
}

/// Turn a raw request into its canonical form.
///
/// Unsupported chains are dropped silently; addresses are lowercased;
/// targets are deduplicated and sorted; timestamps are floored to the
/// bucket grid. Pure and idempotent.
pub fn normalize(raw: &AnalyticsRequest, bucket_seconds: i64) -> CanonicalRequest {
    let mut contracts: Vec<CanonicalTarget> = raw
        .contracts
        .iter()
        .filter_map(|entry| {
            SupportedChain::parse(&entry.chain.to_lowercase()).map(|chain| CanonicalTarget {
                chain,
                address: entry.address.to_lowercase(),
            })
        })
        .collect();
    contracts.sort();
    contracts.dedup();

    CanonicalRequest {
        contracts,
        start_timestamp: bucket(raw.start_timestamp, bucket_seconds),
        end_timestamp: bucket(raw.end_timestamp, bucket_seconds),
    }
}
