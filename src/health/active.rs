//! Active health checking.
//!
//! # Responsibilities
//! - Periodically probe every backend, including ones with an open breaker
//! - Feed outcomes into the backend's liveness and circuit breaker
//!
//! A probe succeeds iff `GET {address}{path}` completes within the timeout
//! and returns exactly 200. Probes run concurrently; a slow backend only
//! delays its own result.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use futures_util::future::join_all;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use tokio::sync::broadcast;
use tokio::time::{self, MissedTickBehavior};

use crate::config::HealthCheckConfig;
use crate::load_balancer::{backend::Backend, pool::Pool};

/// Why a probe failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeFailure {
    /// The probe request could not be built from the backend address.
    InvalidRequest(String),
    /// Connection refused, reset, or another transport error.
    Transport(String),
    /// No response within the configured timeout.
    Timeout(Duration),
    /// The backend answered with something other than 200.
    Status(StatusCode),
}

pub struct HealthMonitor {
    pool: Arc<Pool>,
    config: HealthCheckConfig,
    client: Client<HttpConnector, Body>,
}

impl HealthMonitor {
    pub fn new(pool: Arc<Pool>, config: HealthCheckConfig) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(config.timeout()));
        let client = Client::builder(TokioExecutor::new()).build(connector);

        Self {
            pool,
            config,
            client,
        }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        if !self.config.enabled {
            tracing::info!("Active health checks disabled");
            return;
        }

        tracing::info!(
            interval = self.config.interval_secs,
            path = %self.config.path,
            "Health monitor starting"
        );

        let mut ticker = time::interval(self.config.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.check_all().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Health monitor received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// Probe every registered backend concurrently and record the outcomes.
    pub async fn check_all(&self) {
        // Clone the list so the pool lock is not held across the probes.
        let backends = self.pool.backends();
        join_all(backends.iter().map(|backend| self.check(backend))).await;
    }

    async fn check(&self, backend: &Backend) {
        match self.probe(backend.address()).await {
            Ok(()) => {
                backend.record_probe_success();
            }
            Err(failure) => {
                tracing::warn!(
                    backend = %backend.address(),
                    reason = ?failure,
                    "Health check failed"
                );
                backend.record_probe_failure();
            }
        }
    }

    /// Issue one probe against `address`.
    pub async fn probe(&self, address: &str) -> Result<(), ProbeFailure> {
        let uri = format!("{}{}", address, self.config.path);
        let request = Request::builder()
            .method("GET")
            .uri(uri)
            .header("user-agent", "pool-balancer-health-check")
            .body(Body::empty())
            .map_err(|e| ProbeFailure::InvalidRequest(e.to_string()))?;

        let timeout = self.config.timeout();
        match time::timeout(timeout, self.client.request(request)).await {
            Ok(Ok(response)) if response.status() == StatusCode::OK => Ok(()),
            Ok(Ok(response)) => Err(ProbeFailure::Status(response.status())),
            Ok(Err(e)) => Err(ProbeFailure::Transport(e.to_string())),
            Err(_) => Err(ProbeFailure::Timeout(timeout)),
        }
    }
}
