//! Periodic weight adaptation.
//!
//! # Responsibilities
//! - Recompute each eligible backend's weight on a fixed interval
//! - Slower or busier backends receive less weighted traffic
//!
//! ```text
//! weight = exp(-max(response_ms, 1) / 1000) / (1 + connections)
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::{self, MissedTickBehavior};

use crate::config::WeightConfig;
use crate::load_balancer::pool::Pool;

/// Latency floor applied before the computation.
const MIN_RESPONSE_MS: f64 = 1.0;

/// Weight for a backend with the given latency and in-flight load.
pub fn compute_weight(response_time: Duration, connections: usize) -> f64 {
    let millis = (response_time.as_secs_f64() * 1000.0).max(MIN_RESPONSE_MS);
    (-millis / 1000.0).exp() / (1.0 + connections as f64)
}

pub struct WeightAdapter {
    pool: Arc<Pool>,
    config: WeightConfig,
}

impl WeightAdapter {
    pub fn new(pool: Arc<Pool>, config: WeightConfig) -> Self {
        Self { pool, config }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        if !self.config.enabled {
            tracing::info!("Weight adaptation disabled");
            return;
        }

        tracing::info!(interval = self.config.interval_secs, "Weight adapter starting");

        let mut ticker = time::interval(self.config.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; keep configured weights for one interval.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.adjust_all();
                }
                _ = shutdown.recv() => {
                    tracing::info!("Weight adapter received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// Recompute weights for every eligible backend. Ineligible ones keep theirs.
    pub fn adjust_all(&self) {
        self.pool.with_backends(|backends| {
            for backend in backends.iter().filter(|b| b.is_eligible()) {
                let weight = compute_weight(backend.response_time(), backend.connection_count());
                backend.set_weight(weight);
                tracing::debug!(
                    backend = %backend.address(),
                    weight,
                    "Weight recomputed"
                );
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load_balancer::backend::test_support::pool_of;

    #[test]
    fn test_weight_formula() {
        let w = compute_weight(Duration::from_millis(1000), 0);
        assert!((w - (-1.0f64).exp()).abs() < 1e-12);

        let busy = compute_weight(Duration::from_millis(1000), 3);
        assert!((busy - w / 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_latency_floor() {
        let zero = compute_weight(Duration::ZERO, 0);
        let one_ms = compute_weight(Duration::from_millis(1), 0);
        assert_eq!(zero, one_ms);
        assert!(zero < 1.0);
    }

    #[test]
    fn test_slower_and_busier_get_less() {
        let fast = compute_weight(Duration::from_millis(20), 0);
        let slow = compute_weight(Duration::from_millis(800), 0);
        let busy = compute_weight(Duration::from_millis(20), 5);
        assert!(fast > slow);
        assert!(fast > busy);
    }

    #[test]
    fn test_adjust_only_eligible() {
        let pool = Arc::new(pool_of(&["http://a:1", "http://b:2"]));
        let backends = pool.backends();
        backends[0].record_response_time(Duration::from_millis(500));
        backends[1].record_probe_failure();

        WeightAdapter::new(pool.clone(), WeightConfig::default()).adjust_all();

        assert!((backends[0].weight() - (-0.5f64).exp()).abs() < 1e-12);
        assert_eq!(backends[1].weight(), 1.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_adjusts_and_stops_on_shutdown() {
        let pool = Arc::new(pool_of(&["http://a:1"]));
        let (tx, rx) = broadcast::channel(1);
        let config = WeightConfig {
            enabled: true,
            interval_secs: 10,
        };
        let handle = tokio::spawn(WeightAdapter::new(pool.clone(), config).run(rx));

        time::sleep(Duration::from_secs(11)).await;
        let expected = compute_weight(Duration::ZERO, 0);
        assert_eq!(pool.backends()[0].weight(), expected);

        tx.send(()).unwrap();
        handle.await.unwrap();
    }
}
