//! Total gas usage (in native units) for a set of contracts on one chain.

use async_trait::async_trait;

use chainhouse_types::canonical::CanonicalRequest;

use crate::{
    adapters::{first_row_value, group_sql_parts, AnalyticsAdapter, PartitionResult},
    DynWarehouse, WarehouseError,
};

#[derive(Debug)]
pub struct GasUsageAdapter {
    warehouse: DynWarehouse,
}

impl GasUsageAdapter {
    pub fn new(warehouse: DynWarehouse) -> Self {
        Self { warehouse }
    }
}

#[async_trait]
impl AnalyticsAdapter for GasUsageAdapter {
    fn name(&self) -> &'static str {
        "contracts:gas-usage"
    }

    fn route(&self) -> &'static str {
        "/contracts/gas-usage"
    }

    fn value_field(&self) -> &'static str {
        "gasUsage"
    }

    async fn compute(&self, group: &CanonicalRequest) -> Result<PartitionResult, WarehouseError> {
        let (chain, addresses, start, end) = group_sql_parts(group)?;

        let query = format!(
            "SELECT \
               SUM(bt.gas_used * bt.gas_price / 1e18) AS total_gas_usage \
             FROM {chain}.base_transactions bt \
             WHERE bt.to_address IN ({addresses}) \
               AND bt.block_timestamp BETWEEN '{start}' AND '{end}'"
        );

        let rows = self.warehouse.query_rows(&query).await?;
        Ok(PartitionResult {
            chain,
            value: first_row_value(&rows, "total_gas_usage")?,
            start_timestamp: group.start_timestamp,
            end_timestamp: group.end_timestamp,
        })
    }
}
