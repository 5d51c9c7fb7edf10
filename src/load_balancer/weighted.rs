//! Weighted round-robin load balancing strategy.
//!
//! Draws a uniform value in `[0, total_weight)` over eligible backends and
//! walks them in registration order, subtracting each weight until the
//! remainder reaches zero. Backend `i` is picked with probability
//! `weight_i / total_weight`.

use std::sync::Arc;

use rand::Rng;

use crate::load_balancer::{backend::Backend, pool::Pool, LoadBalancer};

/// Weighted random selector over eligible backends.
#[derive(Debug, Default)]
pub struct WeightedRoundRobin;

impl WeightedRoundRobin {
    pub fn new() -> Self {
        Self
    }
}

/// Walk `candidates` with a draw in `[0, total)`.
///
/// Zero-weight backends are never returned.
fn pick(candidates: &[(&Arc<Backend>, f64)], draw: f64) -> Option<Arc<Backend>> {
    let mut remainder = draw;
    let mut last = None;
    for (backend, weight) in candidates.iter().filter(|(_, w)| *w > 0.0) {
        remainder -= weight;
        last = Some(*backend);
        if remainder <= 0.0 {
            return Some((*backend).clone());
        }
    }
    // Floating point drift can leave a tiny positive remainder
    last.cloned()
}

impl LoadBalancer for WeightedRoundRobin {
    fn name(&self) -> &'static str {
        "weighted-round-robin"
    }

    fn next_server(&self, pool: &Pool, _client: Option<&str>) -> Option<Arc<Backend>> {
        pool.weighted_view(|candidates, total| {
            if total <= 0.0 || !total.is_finite() {
                return None;
            }

            let draw = rand::thread_rng().gen_range(0.0..total);
            pick(candidates, draw)
        })
    }
}
