//! Round-robin load balancing strategy.

use std::sync::Arc;

use crate::load_balancer::{backend::Backend, pool::Pool, LoadBalancer};

/// Round-robin selector.
/// Rotates through backends using the pool's cursor.
///
/// By default every registered backend gets its turn, live or not. With
/// `strict` set, ineligible backends are skipped by walking forward from
/// the cursor.
#[derive(Debug, Default)]
pub struct RoundRobin {
    strict: bool,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn strict() -> Self {
        Self { strict: true }
    }
}

impl LoadBalancer for RoundRobin {
    fn name(&self) -> &'static str {
        "round-robin"
    }

    fn next_server(&self, pool: &Pool, _client: Option<&str>) -> Option<Arc<Backend>> {
        pool.advance(|backends, cursor| {
            let len = backends.len();
            if len == 0 {
                return None;
            }
            if !self.strict {
                return Some(backends[cursor % len].clone());
            }

            // Loop bounded by pool size in case every backend is ineligible
            (0..len)
                .map(|i| &backends[cursor.wrapping_add(i) % len])
                .find(|b| b.is_eligible())
                .cloned()
        })
    }
}
