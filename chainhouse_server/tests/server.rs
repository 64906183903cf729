//! End-to-end tests driving the server over a real TCP socket.

use std::{net::TcpListener, sync::Arc};

use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;

use chainhouse_cache::{time::SystemProvider, CoalescingQueue, MemoryResultStore, QueueConfig};
use chainhouse_server::{
    auth::{AllOrNothingAuthorizer, Authorizer, NoAuthAuthorizer},
    serve_listener, HttpApi, PipelineConfig, QueryPipeline,
};
use chainhouse_warehouse::{all_adapters, test_util::MockWarehouse};

struct TestServer {
    base_url: String,
    warehouse: Arc<MockWarehouse>,
    client: reqwest::Client,
    shutdown: CancellationToken,
}

impl TestServer {
    fn spawn(authorizer: Arc<dyn Authorizer>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
        let addr = listener.local_addr().expect("listener has an address");

        let warehouse = Arc::new(MockWarehouse::default());
        let store = Arc::new(MemoryResultStore::new(Arc::new(SystemProvider::new())));
        let queue = Arc::new(CoalescingQueue::new(
            Arc::clone(&store) as _,
            QueueConfig::default(),
        ));
        let pipeline = QueryPipeline::new(
            Arc::clone(&store) as _,
            queue,
            PipelineConfig::default(),
        );
        let api = Arc::new(HttpApi::new(
            pipeline,
            all_adapters(Arc::clone(&warehouse) as _),
            authorizer,
        ));

        let shutdown = CancellationToken::new();
        tokio::spawn(serve_listener(listener, api, shutdown.clone()));

        Self {
            base_url: format!("http://{addr}"),
            warehouse,
            client: reqwest::Client::new(),
            shutdown,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

fn analytics_body() -> serde_json::Value {
    serde_json::json!({
        "contracts": [
            {"chain": "ethereum", "address": "0xDEF"},
            {"chain": "bsc", "address": "0xABC"},
        ],
        "startTimestamp": 1_700_000_000,
        "endTimestamp": 1_700_003_600,
    })
}

#[test_log::test(tokio::test)]
async fn full_round_trip_with_auth() {
    let server = TestServer::spawn(Arc::new(AllOrNothingAuthorizer::new("secret")));

    // liveness works without a token
    let response = server
        .client
        .get(server.url("/health"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    // analytics does not
    let response = server
        .client
        .post(server.url("/contracts/gas-usage"))
        .json(&analytics_body())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);

    // both chain groups race for the mocked responses, so the values must
    // not depend on which group queries first
    for _ in 0..2 {
        server
            .warehouse
            .mock_next(Ok(vec![serde_json::json!({"total_gas_usage": 1.25})]));
    }

    let response = server
        .client
        .post(server.url("/contracts/gas-usage"))
        .bearer_auth("secret")
        .json(&analytics_body())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let json: serde_json::Value = response.json().await.unwrap();
    assert_eq!(
        json["total"],
        serde_json::json!([
            {"chain": "bsc", "gasUsage": 1.25},
            {"chain": "ethereum", "gasUsage": 1.25},
        ])
    );
    assert_eq!(json["startTimestamp"], 1_699_999_200);
    assert_eq!(json["endTimestamp"], 1_700_002_800);
}

#[test_log::test(tokio::test)]
async fn equivalent_requests_hit_the_cache() {
    let server = TestServer::spawn(Arc::new(NoAuthAuthorizer));

    server
        .warehouse
        .mock_next(Ok(vec![serde_json::json!({"total_txs": "42"})]));

    let first: serde_json::Value = server
        .client
        .post(server.url("/contracts/total-txs"))
        .json(&serde_json::json!({
            "contracts": [{"chain": "bsc", "address": "0xABC"}],
            "startTimestamp": 1_700_000_000,
            "endTimestamp": 1_700_003_600,
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    // same request modulo casing and sub-bucket jitter
    let second: serde_json::Value = server
        .client
        .post(server.url("/contracts/total-txs"))
        .json(&serde_json::json!({
            "contracts": [{"chain": "bsc", "address": "0xabc"}],
            "startTimestamp": 1_700_000_100,
            "endTimestamp": 1_700_003_700,
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(first["total"], second["total"]);
    assert_eq!(server.warehouse.query_count(), 1);
}

#[test_log::test(tokio::test)]
async fn invalid_requests_are_rejected_with_details() {
    let server = TestServer::spawn(Arc::new(NoAuthAuthorizer));

    let response = server
        .client
        .post(server.url("/contracts/total-unique-users"))
        .json(&serde_json::json!({
            "contracts": [],
            "startTimestamp": 1_700_000_000,
            "endTimestamp": 1_700_003_600,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);

    let json: serde_json::Value = response.json().await.unwrap();
    assert_eq!(json["error"], "'contracts' must be a non-empty list");

    let response = server
        .client
        .post(server.url("/unknown/route"))
        .json(&analytics_body())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
}

#[test_log::test(tokio::test)]
async fn admin_invalidate_busts_the_cache() {
    let server = TestServer::spawn(Arc::new(NoAuthAuthorizer));
    let body = serde_json::json!({
        "contracts": [{"chain": "ethereum", "address": "0xDEF"}],
        "startTimestamp": 1_700_000_000,
        "endTimestamp": 1_700_003_600,
    });

    server
        .warehouse
        .mock_next(Ok(vec![serde_json::json!({"total_unique_users": 5})]));
    server
        .client
        .post(server.url("/contracts/total-unique-users"))
        .json(&body)
        .send()
        .await
        .unwrap();

    let mut invalidate = body.clone();
    invalidate["adapter"] = serde_json::json!("contracts:total-unique-users");
    let response = server
        .client
        .post(server.url("/admin/invalidate"))
        .json(&invalidate)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let json: serde_json::Value = response.json().await.unwrap();
    assert_eq!(json["invalidated"], 1);

    server
        .warehouse
        .mock_next(Ok(vec![serde_json::json!({"total_unique_users": 6})]));
    let json: serde_json::Value = server
        .client
        .post(server.url("/contracts/total-unique-users"))
        .json(&body)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(json["total"][0]["users"], 6.0);
    assert_eq!(server.warehouse.query_count(), 2);
}
