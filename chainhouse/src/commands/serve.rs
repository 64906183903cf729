//! Entrypoint for the chainhouse analytics server

use std::{net::SocketAddr, sync::Arc, time::Duration};

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use chainhouse_cache::{time::SystemProvider, CoalescingQueue, MemoryResultStore, QueueConfig};
use chainhouse_server::{
    auth::{AllOrNothingAuthorizer, Authorizer, NoAuthAuthorizer},
    serve, HttpApi, PipelineConfig, QueryPipeline,
};
use chainhouse_warehouse::{all_adapters, ClickhouseClient, ClickhouseConfig};

/// The default bind address for the HTTP API.
pub(crate) const DEFAULT_HTTP_BIND_ADDR: &str = "0.0.0.0:8181";

#[derive(Debug, Error)]
pub(crate) enum Error {
    #[error("a bearer token is required unless --without-auth is set")]
    MissingToken,

    #[error("server error: {0}")]
    Server(#[from] chainhouse_server::Error),
}

pub(crate) type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, clap::Parser)]
pub(crate) struct Config {
    /// Address the HTTP API listens on.
    #[clap(
        long = "http-bind",
        env = "CHAINHOUSE_HTTP_BIND_ADDR",
        default_value = DEFAULT_HTTP_BIND_ADDR,
        action
    )]
    pub(crate) http_bind_addr: SocketAddr,

    /// URL of the ClickHouse HTTP endpoint, e.g. `http://localhost:8123`.
    #[clap(long = "clickhouse-url", env = "CHAINHOUSE_CLICKHOUSE_URL", action)]
    pub(crate) clickhouse_url: String,

    /// ClickHouse username. Leave empty to send no credentials.
    #[clap(
        long = "clickhouse-username",
        env = "CHAINHOUSE_CLICKHOUSE_USERNAME",
        default_value = "",
        action
    )]
    pub(crate) clickhouse_username: String,

    /// ClickHouse password.
    #[clap(
        long = "clickhouse-password",
        env = "CHAINHOUSE_CLICKHOUSE_PASSWORD",
        default_value = "",
        action
    )]
    pub(crate) clickhouse_password: String,

    /// bearer token to be set for requests
    #[clap(long = "bearer-token", env = "CHAINHOUSE_BEARER_TOKEN", action)]
    pub(crate) bearer_token: Option<String>,

    /// Run without authentication. Not recommended outside development.
    #[clap(long = "without-auth", action)]
    pub(crate) without_auth: bool,

    /// Width of the time bucket grid applied to request timestamps, in
    /// seconds. Changing this orphans previously cached results.
    #[clap(
        long = "bucket-seconds",
        env = "CHAINHOUSE_BUCKET_SECONDS",
        default_value = "1800",
        action
    )]
    pub(crate) bucket_seconds: i64,

    /// How long computed results stay cached.
    #[clap(
        long = "result-ttl",
        env = "CHAINHOUSE_RESULT_TTL",
        default_value = "24h",
        value_parser = humantime::parse_duration,
        action
    )]
    pub(crate) result_ttl: Duration,

    /// Upper bound on concurrently executing warehouse computations.
    #[clap(
        long = "queue-concurrency",
        env = "CHAINHOUSE_QUEUE_CONCURRENCY",
        default_value = "20",
        action
    )]
    pub(crate) queue_concurrency: usize,

    /// Attempts per computation before its failure is surfaced to callers.
    #[clap(
        long = "queue-attempts",
        env = "CHAINHOUSE_QUEUE_ATTEMPTS",
        default_value = "3",
        action
    )]
    pub(crate) queue_attempts: usize,

    /// Bound on how long a request waits for a coalesced result, e.g. `30s`.
    /// Unset means requests wait as long as the computation takes.
    #[clap(
        long = "wait-timeout",
        env = "CHAINHOUSE_WAIT_TIMEOUT",
        value_parser = humantime::parse_duration,
        action
    )]
    pub(crate) wait_timeout: Option<Duration>,
}

pub(crate) async fn command(config: Config) -> Result<()> {
    let authorizer: Arc<dyn Authorizer> = if config.without_auth {
        warn!("serving without authentication");
        Arc::new(NoAuthAuthorizer)
    } else {
        let token = config.bearer_token.as_deref().ok_or(Error::MissingToken)?;
        Arc::new(AllOrNothingAuthorizer::new(token))
    };

    let store = Arc::new(MemoryResultStore::new(Arc::new(SystemProvider::new())));
    let queue = Arc::new(CoalescingQueue::new(
        Arc::clone(&store) as _,
        QueueConfig {
            concurrency: config.queue_concurrency,
            attempts: config.queue_attempts,
            result_ttl: config.result_ttl,
        },
    ));

    let warehouse = Arc::new(ClickhouseClient::new(ClickhouseConfig {
        url: config.clickhouse_url,
        username: config.clickhouse_username,
        password: config.clickhouse_password,
    }));

    let pipeline = QueryPipeline::new(
        Arc::clone(&store) as _,
        queue,
        PipelineConfig {
            bucket_seconds: config.bucket_seconds,
            wait_timeout: config.wait_timeout,
        },
    );
    let api = Arc::new(HttpApi::new(
        pipeline,
        all_adapters(warehouse as _),
        authorizer,
    ));

    let frontend_shutdown = CancellationToken::new();
    let signal_shutdown = frontend_shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for shutdown signal");
            return;
        }
        info!("shutdown signal received");
        signal_shutdown.cancel();
    });

    info!(addr = %config.http_bind_addr, "starting chainhouse server");
    serve(config.http_bind_addr, api, frontend_shutdown).await?;
    Ok(())
}
