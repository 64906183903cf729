//! Warehouse test double.

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::{Warehouse, WarehouseError};

/// A [`Warehouse`] that replays mocked row sets and records every query.
///
/// Responses are consumed in FIFO order; a query with no mocked response
/// left fails with [`WarehouseError::Unavailable`], which doubles as a
/// convenient way to simulate an unreachable warehouse.
#[derive(Debug, Default)]
pub struct MockWarehouse {
    responses: Mutex<Vec<Result<Vec<serde_json::Value>, WarehouseError>>>,
    queries: Mutex<Vec<String>>,
}

impl MockWarehouse {
    /// Mock the next query's outcome.
    pub fn mock_next(&self, response: Result<Vec<serde_json::Value>, WarehouseError>) {
        self.responses.lock().push(response);
    }

    /// All queries issued so far, in order.
    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().clone()
    }

    /// Number of queries issued so far.
    pub fn query_count(&self) -> usize {
        self.queries.lock().len()
    }
}

#[async_trait]
impl Warehouse for MockWarehouse {
    async fn query_rows(&self, sql: &str) -> Result<Vec<serde_json::Value>, WarehouseError> {
        self.queries.lock().push(sql.to_string());

        let mut responses = self.responses.lock();
        if responses.is_empty() {
            return Err(WarehouseError::Unavailable(
                "no mocked response left".to_string(),
            ));
        }
        responses.remove(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn replays_responses_in_order() {
        let warehouse = MockWarehouse::default();
        warehouse.mock_next(Ok(vec![serde_json::json!({"v": 1})]));
        warehouse.mock_next(Err(WarehouseError::Unavailable("down".to_string())));

        assert_eq!(
            warehouse.query_rows("SELECT 1").await.unwrap(),
            vec![serde_json::json!({"v": 1})]
        );
        assert!(warehouse.query_rows("SELECT 2").await.is_err());
        assert!(warehouse.query_rows("SELECT 3").await.is_err());
        assert_eq!(warehouse.query_count(), 3);
    }
}
