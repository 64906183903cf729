//! The chainhouse analytics server.
//!
//! Request flow:
//!
//! ```text
//! HTTP request
//!   -> auth (bearer token)
//!   -> validation
//!   -> normalization (lowercase, dedupe, sort, bucket timestamps)
//!   -> per-chain fan-out
//!        -> fingerprint -> result store -> coalescing queue -> warehouse
//!   -> merge per-chain totals into one response
//! ```
//!
//! The interesting machinery lives in `chainhouse_cache` (result store and
//! single-flight queue) and `chainhouse_warehouse` (adapters and the
//! ClickHouse client); this crate supplies the HTTP surface around them.

use std::{net::SocketAddr, sync::Arc};

use hyper::{
    server::conn::AddrIncoming,
    service::{make_service_fn, service_fn},
};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub mod auth;
pub mod http;
pub mod pipeline;

pub use crate::http::{route_request, HttpApi};
pub use crate::pipeline::{PipelineConfig, QueryPipeline};

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: hyper::Error,
    },

    #[error("http server error: {0}")]
    Hyper(#[from] hyper::Error),

    #[error("failed to prepare listener: {0}")]
    Listener(std::io::Error),
}

/// Serve the API on `addr` until `shutdown` is cancelled.
pub async fn serve(
    addr: SocketAddr,
    api: Arc<HttpApi>,
    shutdown: CancellationToken,
) -> Result<(), Error> {
    let builder = hyper::Server::try_bind(&addr).map_err(|source| Error::Bind { addr, source })?;
    info!(%addr, "serving analytics API");
    run(builder, api, shutdown).await
}

/// Like [`serve`], but on an already-bound listener. Lets callers bind port
/// zero and discover the ephemeral port before the server starts.
pub async fn serve_listener(
    listener: std::net::TcpListener,
    api: Arc<HttpApi>,
    shutdown: CancellationToken,
) -> Result<(), Error> {
    listener.set_nonblocking(true).map_err(Error::Listener)?;
    let builder = hyper::Server::from_tcp(listener)?;
    run(builder, api, shutdown).await
}

async fn run(
    builder: hyper::server::Builder<AddrIncoming>,
    api: Arc<HttpApi>,
    shutdown: CancellationToken,
) -> Result<(), Error> {
    let service = make_service_fn(move |_conn| {
        let api = Arc::clone(&api);
        async move {
            Ok::<_, std::convert::Infallible>(service_fn(move |req| {
                route_request(Arc::clone(&api), req)
            }))
        }
    });

    builder
        .serve(service)
        .with_graceful_shutdown(async move {
            shutdown.cancelled().await;
            info!("shutting down");
        })
        .await?;
    Ok(())
}
