//! Transaction count for a set of contracts on one chain.

use async_trait::async_trait;

use chainhouse_types::canonical::CanonicalRequest;

use crate::{
    adapters::{first_row_value, group_sql_parts, AnalyticsAdapter, PartitionResult},
    DynWarehouse, WarehouseError,
};

#[derive(Debug)]
pub struct TotalTxsAdapter {
    warehouse: DynWarehouse,
}

impl TotalTxsAdapter {
    pub fn new(warehouse: DynWarehouse) -> Self {
        Self { warehouse }
    }
}

#[async_trait]
impl AnalyticsAdapter for TotalTxsAdapter {
    fn name(&self) -> &'static str {
        "contracts:total-txs"
    }

    fn route(&self) -> &'static str {
        "/contracts/total-txs"
    }

    fn value_field(&self) -> &'static str {
        "txs"
    }

    async fn compute(&self, group: &CanonicalRequest) -> Result<PartitionResult, WarehouseError> {
        let (chain, addresses, start, end) = group_sql_parts(group)?;

        let query = format!(
            "SELECT \
               COUNT(*) AS total_txs \
             FROM {chain}.base_transactions bt \
             WHERE bt.to_address IN ({addresses}) \
               AND bt.block_timestamp BETWEEN '{start}' AND '{end}'"
        );

        let rows = self.warehouse.query_rows(&query).await?;
        Ok(PartitionResult {
            chain,
            value: first_row_value(&rows, "total_txs")?,
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
    async fn counts_arrive_as_decimal_strings() {
        let warehouse = Arc::new(MockWarehouse::default());
        // COUNT(*) is a UInt64, rendered as a string in JSONEachRow
        warehouse.mock_next(Ok(vec![serde_json::json!({"total_txs": "1234"})]));
        let adapter = TotalTxsAdapter::new(Arc::clone(&warehouse) as _);

        let group = CanonicalRequest {
            contracts: vec![CanonicalTarget {
                chain: SupportedChain::Bsc,
                address: "0xabc".to_string(),
            }],
            start_timestamp: 1_700_000_000,
            end_timestamp: 1_700_003_600,
        };
        let result = adapter.compute(&group).await.unwrap();
        assert_eq!(result.value, 1234.0);
        assert!(warehouse.queries()[0].contains("FROM bsc.base_transactions"));
        assert!(warehouse.queries()[0].contains("COUNT(*) AS total_txs"));
    }
}
