//! HTTP API service for the analytics engine.

use std::{convert::Infallible, sync::Arc};

use hyper::{
    header::{AUTHORIZATION, CONTENT_TYPE},
    Body, Method, Request, Response, StatusCode,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error};

use chainhouse_cache::QueueError;
use chainhouse_types::http::{AnalyticsRequest, ErrorMessage};
use chainhouse_warehouse::AnalyticsAdapter;

use crate::{
    auth::{AuthError, Authorizer},
    pipeline::{PipelineError, QueryPipeline},
};

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid request body: {0}")]
    InvalidRequestBody(serde_json::Error),

    #[error("failed to read request body: {0}")]
    ReadingBody(#[from] hyper::Error),

    #[error("failed to serialize response: {0}")]
    SerializingResponse(serde_json::Error),

    #[error("unknown adapter: {0}")]
    UnknownAdapter(String),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("route not found")]
    NoHandler,

    #[error("method not allowed")]
    MethodNotAllowed,
}

impl Error {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequestBody(_)
            | Self::ReadingBody(_)
            | Self::UnknownAdapter(_)
            | Self::Pipeline(PipelineError::Validation(_)) => StatusCode::BAD_REQUEST,
            Self::Auth(AuthError::Unauthenticated) => StatusCode::UNAUTHORIZED,
            Self::Pipeline(PipelineError::Queue(QueueError::WaitTimeout)) => {
                StatusCode::GATEWAY_TIMEOUT
            }
            Self::Pipeline(_) | Self::SerializingResponse(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::NoHandler => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
        }
    }

    /// Convert into the JSON error response sent to the client.
    fn into_response(self) -> Response<Body> {
        let status = self.status_code();
        if status.is_server_error() {
            error!(error = %self, "request failed");
        } else {
            debug!(error = %self, "request rejected");
        }
        let body = ErrorMessage {
            error: self.to_string(),
        };
        json_response(status, &body).unwrap_or_else(|_| {
            Response::builder()
                .status(StatusCode::INTERNAL_SERVER_ERROR)
                .body(Body::empty())
                .expect("status-only response is valid")
        })
    }
}

/// Cache-busting request accepted on `/admin/invalidate`.
#[derive(Debug, Serialize, Deserialize)]
pub struct InvalidateRequest {
    /// Adapter name as reported by `name()`, e.g. `contracts:gas-usage`.
    pub adapter: String,
    #[serde(flatten)]
    pub request: AnalyticsRequest,
}

/// Count of per-chain cache keys dropped by an invalidation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct InvalidateResponse {
    pub invalidated: usize,
}

#[derive(Debug)]
pub struct HttpApi {
    pipeline: QueryPipeline,
    adapters: Vec<Arc<dyn AnalyticsAdapter>>,
    authorizer: Arc<dyn Authorizer>,
}

impl HttpApi {
    pub fn new(
        pipeline: QueryPipeline,
        adapters: Vec<Arc<dyn AnalyticsAdapter>>,
        authorizer: Arc<dyn Authorizer>,
    ) -> Self {
        Self {
            pipeline,
            adapters,
            authorizer,
        }
    }

    fn authenticate(&self, req: &Request<Body>) -> Result<(), Error> {
        let token = req
            .headers()
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "));
        self.authorizer.authorize(token)?;
        Ok(())
    }

    async fn analytics(
        &self,
        adapter: &Arc<dyn AnalyticsAdapter>,
        req: Request<Body>,
    ) -> Result<Response<Body>, Error> {
        let request: AnalyticsRequest = read_body_json(req).await?;
        let response = self.pipeline.execute(adapter, &request).await?;
        json_response(StatusCode::OK, &response)
    }

    async fn invalidate(&self, req: Request<Body>) -> Result<Response<Body>, Error> {
        let invalidate: InvalidateRequest = read_body_json(req).await?;
        let adapter = self
            .adapters
            .iter()
            .find(|a| a.name() == invalidate.adapter)
            .ok_or_else(|| Error::UnknownAdapter(invalidate.adapter.clone()))?;

        let invalidated = self
            .pipeline
            .invalidate(adapter, &invalidate.request)
            .await?;
        json_response(StatusCode::OK, &InvalidateResponse { invalidated })
    }

    fn health(&self) -> Response<Body> {
        Response::new(Body::from("OK"))
    }
}

/// Top-level entry point wired into hyper's `service_fn`.
pub async fn route_request(
    api: Arc<HttpApi>,
    req: Request<Body>,
) -> Result<Response<Body>, Infallible> {
    debug!(method = %req.method(), path = req.uri().path(), "handling request");

    let response = match perform_routing(&api, req).await {
        Ok(response) => response,
        Err(e) => e.into_response(),
    };
    Ok(response)
}

async fn perform_routing(api: &HttpApi, req: Request<Body>) -> Result<Response<Body>, Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    // liveness endpoints stay reachable without a token
    match (&method, path.as_str()) {
        (&Method::GET | &Method::POST, "/health" | "/ping") => return Ok(api.health()),
        _ => {}
    }

    api.authenticate(&req)?;

    if let Some(adapter) = api.adapters.iter().find(|a| a.route() == path) {
        return match method {
            Method::POST => api.analytics(adapter, req).await,
            _ => Err(Error::MethodNotAllowed),
        };
    }

    match (method, path.as_str()) {
        (Method::POST, "/admin/invalidate") => api.invalidate(req).await,
        (_, "/admin/invalidate") => Err(Error::MethodNotAllowed),
        _ => Err(Error::NoHandler),
    }
}

async fn read_body_json<T: serde::de::DeserializeOwned>(req: Request<Body>) -> Result<T, Error> {
    let bytes = hyper::body::to_bytes(req.into_body()).await?;
    serde_json::from_slice(&bytes).map_err(Error::InvalidRequestBody)
}

fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Result<Response<Body>, Error> {
    let bytes = serde_json::to_vec(body).map_err(Error::SerializingResponse)?;
    Ok(Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(bytes))
        .expect("json response is valid"))
}
