//! Least Connections load balancing strategy.

use std::sync::Arc;

use crate::load_balancer::{backend::Backend, pool::Pool, LoadBalancer};

/// Least connections selector.
/// Selects the eligible backend with the minimum number of in-flight connections.
#[derive(Debug, Default)]
pub struct LeastConnections;

impl LeastConnections {
    pub fn new() -> Self {
        Self
    }
}

impl LoadBalancer for LeastConnections {
    fn name(&self) -> &'static str {
        "least-connections"
    }

    fn next_server(&self, pool: &Pool, _client: Option<&str>) -> Option<Arc<Backend>> {
        // In case of tie, the first registered one is selected (stability)
        pool.with_backends(|backends| {
            backends
                .iter()
                .filter(|b| b.is_eligible())
                .min_by_key(|b| b.connection_count())
                .cloned()
        })
    }
}
