//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Build the pool, strategy and dispatcher from configuration
//! - Create the Axum router and wire up middleware (tracing, request ID)
//! - Spawn the health monitor, weight adapter and admin API
//! - Serve until the shutdown signal fires

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::Request,
    response::Response,
    routing::any,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::admin::{setup_admin_router, AdminState};
use crate::config::ProxyConfig;
use crate::health::HealthMonitor;
use crate::http::dispatcher::Dispatcher;
use crate::http::request::MakeRequestUuid;
use crate::lifecycle::shutdown;
use crate::load_balancer::{build_strategy, Pool, WeightAdapter};

/// HTTP server for the load balancer.
pub struct HttpServer {
    router: Router,
    config: ProxyConfig,
    dispatcher: Arc<Dispatcher>,
}

impl HttpServer {
    /// Create a new HTTP server with the given (validated) configuration.
    pub fn new(config: ProxyConfig) -> Self {
        let pool = Arc::new(Pool::from_config(&config.backends, &config.circuit_breaker));
        let strategy = build_strategy(&config.balancer);

        tracing::info!(
            strategy = strategy.name(),
            strict_eligibility = config.balancer.strict_eligibility,
            backends = pool.size(),
            "Backend pool ready"
        );

        let dispatcher = Arc::new(Dispatcher::new(pool, strategy, &config.timeouts));
        let router = Self::build_router(dispatcher.clone());

        Self {
            router,
            config,
            dispatcher,
        }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(dispatcher: Arc<Dispatcher>) -> Router {
        Router::new()
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .with_state(dispatcher)
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                    .layer(TraceLayer::new_for_http())
                    .layer(PropagateRequestIdLayer::x_request_id()),
            )
    }

    /// Run the server, accepting connections on the given listener.
    ///
    /// Background tasks subscribe to the same shutdown signal and exit with it.
    pub async fn run(
        self,
        listener: TcpListener,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let pool = self.dispatcher.pool().clone();

        let monitor = HealthMonitor::new(pool.clone(), self.config.health_check.clone());
        tokio::spawn(monitor.run(shutdown_rx.resubscribe()));

        let adapter = WeightAdapter::new(pool, self.config.weights.clone());
        tokio::spawn(adapter.run(shutdown_rx.resubscribe()));

        if self.config.admin.enabled {
            let state = AdminState::new(self.dispatcher.clone(), &self.config.admin.api_key);
            let admin_listener = TcpListener::bind(&self.config.admin.bind_address).await?;
            tracing::info!(address = %admin_listener.local_addr()?, "Admin API listening");
            let admin_shutdown = shutdown_rx.resubscribe();
            tokio::spawn(async move {
                if let Err(e) = axum::serve(admin_listener, setup_admin_router(state))
                    .with_graceful_shutdown(shutdown::wait(admin_shutdown))
                    .await
                {
                    tracing::error!(error = %e, "Admin API stopped with error");
                }
            });
        }

        let app = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();

        // Serve with graceful shutdown
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown::wait(shutdown_rx))
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Shared backend pool, for inspection.
    pub fn pool(&self) -> Arc<Pool> {
        self.dispatcher.pool().clone()
    }
}

/// Main proxy handler: every path and method goes through the dispatcher.
async fn proxy_handler(
    State(dispatcher): State<Arc<Dispatcher>>,
    ConnectInfo(client): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response {
    dispatcher.handle(client, request).await
}
