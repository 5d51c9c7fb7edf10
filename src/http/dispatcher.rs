//! Per-request orchestration.
//!
//! # Request Flow
//! ```text
//! handle(client, request)
//!     → LoadBalancer::next_server        (None → 503, nothing touched)
//!     → Backend::acquire                 (in-flight count +1, released on drop)
//!     → build outbound request           (error → 503, not a backend failure)
//!     → client.request with timeout      (error/timeout → record_forwarding_failure, 503)
//!     → record_response_time, relay status/headers/body
//!     → body relay under the same deadline (error/timeout → record_forwarding_failure)
//! ```
//!
//! No retry on another backend: a failure on the chosen backend is reported
//! to the caller.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    http::{Request, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use futures_util::{stream, StreamExt};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use thiserror::Error;
use tokio::time;

use crate::config::TimeoutConfig;
use crate::http::headers::strip_hop_by_hop;
use crate::http::request::request_id;
use crate::load_balancer::{backend::BackendConnectionGuard, pool::Pool, LoadBalancer};
use crate::observability::metrics;

/// Request-path failures. All surface to the caller as 503.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Selection found nothing eligible.
    #[error("no eligible backend")]
    NoEligibleBackend,

    /// The outbound request could not be constructed. Not a backend fault.
    #[error("failed to build upstream request: {0}")]
    UpstreamBuild(String),

    /// The proxied call failed (dial, reset, protocol error).
    #[error("upstream {address} failed: {message}")]
    UpstreamTransport { address: String, message: String },

    /// The proxied call exceeded the request timeout.
    #[error("upstream {address} timed out after {timeout:?}")]
    UpstreamTimeout { address: String, timeout: Duration },
}

impl DispatchError {
    /// Backend involved in the failure, if one was chosen.
    pub fn backend(&self) -> Option<&str> {
        match self {
            DispatchError::UpstreamTransport { address, .. }
            | DispatchError::UpstreamTimeout { address, .. } => Some(address),
            _ => None,
        }
    }

    /// Whether this failure counts against the backend's breaker.
    pub fn is_backend_failure(&self) -> bool {
        matches!(
            self,
            DispatchError::UpstreamTransport { .. } | DispatchError::UpstreamTimeout { .. }
        )
    }
}

impl IntoResponse for DispatchError {
    fn into_response(self) -> Response {
        let message = match self {
            DispatchError::NoEligibleBackend => "No healthy backends",
            DispatchError::UpstreamBuild(_) => "Failed to build upstream request",
            DispatchError::UpstreamTransport { .. } | DispatchError::UpstreamTimeout { .. } => {
                "Upstream request failed"
            }
        };
        (StatusCode::SERVICE_UNAVAILABLE, message).into_response()
    }
}

/// Routes requests to backends chosen by the active strategy.
#[derive(Debug)]
pub struct Dispatcher {
    pool: Arc<Pool>,
    strategy: Box<dyn LoadBalancer>,
    client: Client<HttpConnector, Body>,
    request_timeout: Duration,
}

impl Dispatcher {
    pub fn new(pool: Arc<Pool>, strategy: Box<dyn LoadBalancer>, timeouts: &TimeoutConfig) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(Duration::from_secs(timeouts.connect_secs)));
        let client = Client::builder(TokioExecutor::new()).build(connector);

        Self {
            pool,
            strategy,
            client,
            request_timeout: Duration::from_secs(timeouts.request_secs),
        }
    }

    pub fn pool(&self) -> &Arc<Pool> {
        &self.pool
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    /// Forward one request and produce the response for the caller.
    pub async fn handle(&self, client: SocketAddr, request: Request<Body>) -> Response {
        let start = Instant::now();
        let method = request.method().to_string();
        let request_id = request_id(&request);

        tracing::debug!(
            request_id = %request_id,
            client = %client,
            method = %method,
            uri = %request.uri(),
            "Dispatching request"
        );

        match self.dispatch(client, request).await {
            Ok((backend, response)) => {
                metrics::record_request(&method, response.status().as_u16(), &backend, start);
                response
            }
            Err(e) => {
                match &e {
                    DispatchError::NoEligibleBackend => {
                        tracing::warn!(request_id = %request_id, "No eligible backend");
                    }
                    other => {
                        tracing::warn!(request_id = %request_id, error = %other, "Upstream error");
                    }
                }
                metrics::record_request(
                    &method,
                    StatusCode::SERVICE_UNAVAILABLE.as_u16(),
                    e.backend().unwrap_or("none"),
                    start,
                );
                e.into_response()
            }
        }
    }

    async fn dispatch(
        &self,
        client: SocketAddr,
        request: Request<Body>,
    ) -> Result<(String, Response), DispatchError> {
        // Hash on the IP only so a client keeps its backend across connections.
        let key = client.ip().to_string();
        let backend = self
            .strategy
            .next_server(&self.pool, Some(&key))
            .ok_or(DispatchError::NoEligibleBackend)?;

        let guard = backend.acquire();
        let address = guard.address().to_string();
        let start = Instant::now();
        // One budget covers the response head and the whole relayed body.
        let deadline = time::Instant::now() + self.request_timeout;

        let outbound = build_upstream_request(&address, request)?;

        let response = match time::timeout_at(deadline, self.client.request(outbound)).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => Err(DispatchError::UpstreamTransport {
                address: address.clone(),
                message: e.to_string(),
            }),
            Err(_) => Err(DispatchError::UpstreamTimeout {
                address: address.clone(),
                timeout: self.request_timeout,
            }),
        };
        let response = response.inspect_err(|e| {
            if e.is_backend_failure() {
                guard.record_forwarding_failure();
            }
        })?;

        guard.record_response_time(start.elapsed());

        let (mut parts, body) = response.into_parts();
        strip_hop_by_hop(&mut parts.headers);
        let body = guarded_body(Body::new(body), guard, deadline, self.request_timeout);
        Ok((address, Response::from_parts(parts, body)))
    }
}

/// Rewrite the inbound request to target `address`, keeping method, path,
/// query, headers and body.
fn build_upstream_request(address: &str, request: Request<Body>) -> Result<Request<Body>, DispatchError> {
    let (parts, body) = request.into_parts();
    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");

    let uri: Uri = format!("{}{}", address, path_and_query)
        .parse()
        .map_err(|e: axum::http::uri::InvalidUri| DispatchError::UpstreamBuild(e.to_string()))?;

    let mut headers = parts.headers;
    strip_hop_by_hop(&mut headers);

    let mut outbound = Request::builder()
        .method(parts.method)
        .uri(uri)
        .body(body)
        .map_err(|e| DispatchError::UpstreamBuild(e.to_string()))?;
    *outbound.headers_mut() = headers;
    Ok(outbound)
}

/// Relay `body` while holding the connection guard until it ends.
///
/// A chunk that fails or does not arrive before `deadline` counts as a
/// forwarding failure; the stream then ends with that error and the guard
/// is released.
fn guarded_body(
    body: Body,
    guard: BackendConnectionGuard,
    deadline: time::Instant,
    budget: Duration,
) -> Body {
    let stream = stream::unfold(
        (body.into_data_stream(), Some(guard)),
        move |(mut chunks, guard)| async move {
            let guard = guard?;
            let error = match time::timeout_at(deadline, chunks.next()).await {
                Ok(Some(Ok(chunk))) => return Some((Ok(chunk), (chunks, Some(guard)))),
                Ok(None) => return None,
                Ok(Some(Err(e))) => DispatchError::UpstreamTransport {
                    address: guard.address().to_string(),
                    message: e.to_string(),
                },
                Err(_) => DispatchError::UpstreamTimeout {
                    address: guard.address().to_string(),
                    timeout: budget,
                },
            };
            tracing::warn!(error = %error, "Upstream body relay failed");
            guard.record_forwarding_failure();
            Some((Err(error), (chunks, None)))
        },
    );
    Body::from_stream(stream)
}
