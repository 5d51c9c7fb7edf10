//! pool-balancer
//!
//! An HTTP load balancer built with Tokio and Axum.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client ──▶ http::server ──▶ http::dispatcher ──▶ LoadBalancer::next_server
//!                                      │                      │
//!                                      │                      ▼
//!                                      │              load_balancer::pool
//!                                      ▼                      ▲
//!     Client ◀── relayed response ◀── backend                 │
//!                                                             │
//!     health::HealthMonitor ── probes ──▶ liveness + circuit breaker
//!     load_balancer::WeightAdapter ── latency + load ──▶ weights
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use pool_balancer::config::{loader::load_config, BackendConfig, ProxyConfig, Strategy};
use pool_balancer::lifecycle::signals::wait_for_signal;
use pool_balancer::observability::{logging, metrics};
use pool_balancer::{HttpServer, Shutdown};

#[derive(Parser, Debug)]
#[command(name = "pool-balancer", version, about = "HTTP load balancer", long_about = None)]
struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Backend base URL; repeat to add several (appended to configured backends)
    #[arg(short, long = "backend")]
    backends: Vec<String>,

    /// Selection strategy
    #[arg(short, long)]
    strategy: Option<Strategy>,

    /// Listener bind address
    #[arg(long)]
    bind: Option<String>,
}

impl Args {
    fn apply(self, config: &mut ProxyConfig) {
        config
            .backends
            .extend(self.backends.into_iter().map(BackendConfig::new));
        if let Some(strategy) = self.strategy {
            config.balancer.strategy = strategy;
        }
        if let Some(bind) = self.bind {
            config.listener.bind_address = bind;
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = Args::parse();
    let path = args.config.take();

    let config = match load_config(path.as_deref(), |config| args.apply(config)) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("pool-balancer: {}", e);
            std::process::exit(2);
        }
    };

    logging::init(&config.observability)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        bind_address = %config.listener.bind_address,
        strategy = %config.balancer.strategy,
        backends = config.backends.len(),
        "pool-balancer starting"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let shutdown_rx = shutdown.subscribe();
    tokio::spawn(async move {
        wait_for_signal().await;
        shutdown.trigger();
    });

    HttpServer::new(config).run(listener, shutdown_rx).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
