//! Warehouse access for the chainhouse analytics API.
//!
//! The [`Warehouse`] trait is the boundary to the external columnar store
//! (ClickHouse in production). Adapters in [`adapters`] turn a per-chain
//! canonical request into one SQL query and one aggregated number; they
//! must be idempotent and side-effect free, since the coalescing queue may
//! invoke them up to its retry limit.

use std::{fmt::Debug, sync::Arc};

use async_trait::async_trait;
use thiserror::Error;

pub mod adapters;
pub mod client;
pub mod test_util;

pub use adapters::{all_adapters, AnalyticsAdapter, PartitionResult};
pub use client::{ClickhouseClient, ClickhouseConfig};

#[derive(Debug, Clone, Error)]
pub enum WarehouseError {
    /// The warehouse could not be reached or refused the query.
    #[error("warehouse unavailable: {0}")]
    Unavailable(String),

    /// The warehouse answered, but not in the shape the adapter expects.
    #[error("malformed warehouse response: {0}")]
    BadResponse(String),

    /// A per-chain group with no targets reached an adapter. The fan-out
    /// layer never produces these.
    #[error("partition group has no targets")]
    EmptyGroup,
}

/// Read-only SQL access to the columnar warehouse.
#[async_trait]
pub trait Warehouse: Debug + Send + Sync + 'static {
    /// Run `sql` and return its result rows as JSON objects
    /// (`FORMAT JSONEachRow` on the wire).
    async fn query_rows(&self, sql: &str) -> Result<Vec<serde_json::Value>, WarehouseError>;
}

/// Object-safe alias used throughout the server.
pub type DynWarehouse = Arc<dyn Warehouse>;
