//! Analytics adapters.
//!
//! One adapter per metric, all behind [`AnalyticsAdapter`] so the server
//! can run a single generic pipeline instead of one hand-copied handler
//! per metric.

use std::{fmt::Debug, sync::Arc};

use async_trait::async_trait;
use chrono::DateTime;
use serde::{Deserialize, Serialize};

use chainhouse_types::{canonical::CanonicalRequest, SupportedChain};

use crate::{DynWarehouse, WarehouseError};

pub mod gas_usage;
pub mod total_txs;
pub mod total_unique_users;

pub use gas_usage::GasUsageAdapter;
pub use total_txs::TotalTxsAdapter;
pub use total_unique_users::TotalUniqueUsersAdapter;

/// One aggregated value for one chain. This is the unit that gets cached:
/// its canonical JSON serialization is the payload stored under the
/// per-chain cache key.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartitionResult {
    pub chain: SupportedChain,
    pub value: f64,
    /// In epoch seconds, bucket-rounded.
    pub start_timestamp: i64,
    /// In epoch seconds, bucket-rounded.
    pub end_timestamp: i64,
}

/// A metric computed per chain against the warehouse.
#[async_trait]
pub trait AnalyticsAdapter: Debug + Send + Sync + 'static {
    /// Stable adapter name, used in cache keys. Must never change across
    /// deploys or all cached results for the adapter are orphaned.
    fn name(&self) -> &'static str;

    /// HTTP route serving this adapter.
    fn route(&self) -> &'static str;

    /// Name of the per-chain value field in responses
    /// (`gasUsage`, `txs`, `users`).
    fn value_field(&self) -> &'static str;

    /// Run the warehouse query for one per-chain group.
    ///
    /// Must be idempotent and side-effect free: the coalescing queue may
    /// call this up to its retry limit.
    async fn compute(&self, group: &CanonicalRequest) -> Result<PartitionResult, WarehouseError>;
}

/// All production adapters, wired to the given warehouse.
pub fn all_adapters(warehouse: DynWarehouse) -> Vec<Arc<dyn AnalyticsAdapter>> {
    vec![
        Arc::new(GasUsageAdapter::new(Arc::clone(&warehouse))),
        Arc::new(TotalTxsAdapter::new(Arc::clone(&warehouse))),
        Arc::new(TotalUniqueUsersAdapter::new(warehouse)),
    ]
}

/// The chain shared by the group, plus its quoted address list and the
/// `BETWEEN` bounds, ready for interpolation.
pub(crate) fn group_sql_parts(
    group: &CanonicalRequest,
) -> Result<(SupportedChain, String, String, String), WarehouseError> {
    let chain = group.chain().ok_or(WarehouseError::EmptyGroup)?;
    let addresses = group
        .contracts
        .iter()
        .map(|t| format!("'{}'", t.address.replace('\'', "''")))
        .collect::<Vec<_>>()
        .join(", ");
    Ok((
        chain,
        addresses,
        format_timestamp(group.start_timestamp)?,
        format_timestamp(group.end_timestamp)?,
    ))
}

/// Render epoch seconds as `YYYY-MM-DD HH:MM:SS` UTC, the literal format
/// the warehouse compares `block_timestamp` against.
fn format_timestamp(secs: i64) -> Result<String, WarehouseError> {
    let dt = DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| WarehouseError::BadResponse(format!("timestamp out of range: {secs}")))?;
    Ok(dt.format("%Y-%m-%d %H:%M:%S").to_string())
}

/// Pull a numeric aggregate out of the first result row.
///
/// ClickHouse renders some aggregates as JSON numbers and some (e.g.
/// `COUNT(*)`) as decimal strings; an empty result set counts as zero.
pub(crate) fn first_row_value(
    rows: &[serde_json::Value],
    column: &str,
) -> Result<f64, WarehouseError> {
    let Some(cell) = rows.first().and_then(|row| row.get(column)) else {
        return Ok(0.0);
    };
    match cell {
        serde_json::Value::Number(n) => n.as_f64().ok_or_else(|| {
            WarehouseError::BadResponse(format!("non-finite value in column {column}"))
        }),
        serde_json::Value::String(s) => s.parse().map_err(|_| {
            WarehouseError::BadResponse(format!("unparseable value in column {column}: {s:?}"))
        }),
        serde_json::Value::Null => Ok(0.0),
        other => Err(WarehouseError::BadResponse(format!(
            "unexpected value in column {column}: {other}"
        ))),
    }
}
