//! Distinct sender count for a set of contracts on one chain.

use async_trait::async_trait;

use chainhouse_types::canonical::CanonicalRequest;

use crate::{
    adapters::{first_row_value, group_sql_parts, AnalyticsAdapter, PartitionResult},
    DynWarehouse, WarehouseError,
};

#[derive(Debug)]
pub struct TotalUniqueUsersAdapter {
    warehouse: DynWarehouse,
}

impl TotalUniqueUsersAdapter {
    pub fn new(warehouse: DynWarehouse) -> Self {
        Self { warehouse }
    }
}

#[async_trait]
impl AnalyticsAdapter for TotalUniqueUsersAdapter {
    fn name(&self) -> &'static str {
        "contracts:total-unique-users"
    }

    fn route(&self) -> &'static str {
        "/contracts/total-unique-users"
    }

    fn value_field(&self) -> &'static str {
        "users"
    }

    async fn compute(&self, group: &CanonicalRequest) -> Result<PartitionResult, WarehouseError> {
        let (chain, addresses, start, end) = group_sql_parts(group)?;

        let query = format!(
            "SELECT \
               COUNT(DISTINCT bt.from_address) AS total_unique_users \
             FROM {chain}.base_transactions bt \
             WHERE bt.to_address IN ({addresses}) \
               AND bt.block_timestamp BETWEEN '{start}' AND '{end}'"
        );

        let rows = self.warehouse.query_rows(&query).await?;
        Ok(PartitionResult {
            chain,
            value: first_row_value(&rows, "total_unique_users")?,
            start_timestamp: group.start_timestamp,
            end_timestamp: group.end_timestamp,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::test_util::MockWarehouse;
    use chainhouse_types::{canonical::CanonicalTarget, SupportedChain};

    #[tokio::test]
    async fn queries_distinct_senders() {
        let warehouse = Arc::new(MockWarehouse::default());
        warehouse.mock_next(Ok(vec![
            serde_json::json!({"total_unique_users": "57"}),
        ]));
        let adapter = TotalUniqueUsersAdapter::new(Arc::clone(&warehouse) as _);

        let group = CanonicalRequest {
            contracts: vec![CanonicalTarget {
                chain: SupportedChain::Ethereum,
                address: "0xabc".to_string(),
            }],
            start_timestamp: 1_700_000_000,
            end_timestamp: 1_700_003_600,
        };
        let result = adapter.compute(&group).await.unwrap();
        assert_eq!(result.value, 57.0);
        assert!(warehouse.queries()[0].contains("COUNT(DISTINCT bt.from_address)"));
    }
}
