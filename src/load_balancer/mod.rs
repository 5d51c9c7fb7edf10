//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Dispatcher
//!     → LoadBalancer::next_server(pool, client)
//!         - round_robin.rs (rotate through backends via the pool cursor)
//!         - weighted.rs (weighted random draw over eligible backends)
//!         - least_conn.rs (pick eligible backend with fewest connections)
//!         - ip_hash.rs (client address → fixed slot)
//!     → backend.rs (acquire connection guard)
//!     → Return backend or None
//!
//! adapter.rs (background): latency + load → backend weight
//! ```
//!
//! # Design Decisions
//! - Strategies are stateless; the pool owns the cursor, backends own counters
//! - One strategy per dispatcher, chosen by configuration
//! - Weighted and least-connections filter ineligible backends; round robin
//!   and IP hash only do so in strict mode

use std::fmt::Debug;
use std::sync::Arc;

use crate::config::{BalancerConfig, Strategy};

pub mod adapter;
pub mod backend;
pub mod ip_hash;
pub mod least_conn;
pub mod pool;
pub mod round_robin;
pub mod weighted;

pub use adapter::WeightAdapter;
pub use backend::{Backend, BackendConnectionGuard, BackendSnapshot};
pub use pool::Pool;

/// A backend selection algorithm.
pub trait LoadBalancer: Debug + Send + Sync {
    /// Strategy name for logs and the admin API.
    fn name(&self) -> &'static str;

    /// Choose a backend, or `None` when nothing is eligible.
    ///
    /// `client` is the caller's address; only IP hash uses it.
    fn next_server(&self, pool: &Pool, client: Option<&str>) -> Option<Arc<Backend>>;
}

/// Build the configured strategy.
pub fn build_strategy(config: &BalancerConfig) -> Box<dyn LoadBalancer> {
    match (config.strategy, config.strict_eligibility) {
        (Strategy::RoundRobin, false) => Box::new(round_robin::RoundRobin::new()),
        (Strategy::RoundRobin, true) => Box::new(round_robin::RoundRobin::strict()),
        (Strategy::WeightedRoundRobin, _) => Box::new(weighted::WeightedRoundRobin::new()),
        (Strategy::LeastConnections, _) => Box::new(least_conn::LeastConnections::new()),
        (Strategy::IpHash, false) => Box::new(ip_hash::IpHash::new()),
        (Strategy::IpHash, true) => Box::new(ip_hash::IpHash::strict()),
    }
}
