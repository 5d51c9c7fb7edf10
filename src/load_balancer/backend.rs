//! Backend abstraction.
//!
//! # Responsibilities
//! - Represent a single backend server
//! - Track in-flight connections (for Least Connections LB)
//! - Track liveness, breaker, latency and weight
//!
//! # Synchronization
//! - `connections` is an atomic counter; every request touches it
//! - Liveness, breaker, response time and weight sit behind one `RwLock`
//!   so alive + breaker + failure count change together
//! - The lock is never held across an await point

use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::config::CircuitBreakerConfig;
use crate::observability::metrics;
use crate::resilience::{BreakerState, CircuitBreaker, Transition};

/// Mutable health and performance state of a backend.
#[derive(Debug)]
struct BackendState {
    alive: bool,
    breaker: CircuitBreaker,
    response_time: Duration,
    weight: f64,
}

/// A single backend server.
#[derive(Debug)]
pub struct Backend {
    /// Base URL without trailing slash, e.g. `http://127.0.0.1:8081`.
    address: String,
    /// Number of requests currently routed to this backend.
    connections: AtomicUsize,
    state: RwLock<BackendState>,
}

/// Point-in-time view of a backend, used by the admin API.
#[derive(Debug, Clone, Serialize)]
pub struct BackendSnapshot {
    pub address: String,
    pub alive: bool,
    pub breaker: BreakerState,
    pub failure_count: u32,
    pub connections: usize,
    pub response_time_ms: f64,
    pub weight: f64,
    pub eligible: bool,
}

impl Backend {
    /// Create a new backend. It starts alive with a closed breaker.
    pub fn new(address: impl Into<String>, weight: f64, breaker: &CircuitBreakerConfig) -> Self {
        let address = address.into().trim_end_matches('/').to_string();
        Self {
            address,
            connections: AtomicUsize::new(0),
            state: RwLock::new(BackendState {
                alive: true,
                breaker: CircuitBreaker::new(breaker.failure_threshold, breaker.reset_after()),
                response_time: Duration::ZERO,
                weight: weight.max(0.0),
            }),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    fn read(&self) -> RwLockReadGuard<'_, BackendState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, BackendState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    // --- Connection accounting ---

    /// Get the current number of in-flight connections.
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::Relaxed)
    }

    /// Increment the in-flight count and return a guard that releases it on drop.
    pub fn acquire(self: &Arc<Self>) -> BackendConnectionGuard {
        let active = self.connections.fetch_add(1, Ordering::Relaxed) + 1;
        metrics::record_active_connections(&self.address, active);
        BackendConnectionGuard {
            backend: self.clone(),
        }
    }

    /// Decrement the in-flight count, never below zero.
    fn release(&self) {
        let prev = self
            .connections
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
            .unwrap_or(0);
        metrics::record_active_connections(&self.address, prev.saturating_sub(1));
    }

    // --- Health Logic ---

    /// Last probe outcome.
    pub fn is_alive(&self) -> bool {
        self.read().alive
    }

    pub fn breaker_state(&self) -> BreakerState {
        self.read().breaker.state()
    }

    pub fn failure_count(&self) -> u32 {
        self.read().breaker.failure_count()
    }

    /// Alive and breaker closed.
    pub fn is_eligible(&self) -> bool {
        let state = self.read();
        state.alive && state.breaker.is_closed()
    }

    pub fn record_probe_success(&self) -> Option<Transition> {
        self.record_probe_success_at(Instant::now())
    }

    pub fn record_probe_success_at(&self, now: Instant) -> Option<Transition> {
        let (transition, eligible) = {
            let mut state = self.write();
            state.alive = true;
            let transition = state.breaker.record_success(now);
            (transition, state.breaker.is_closed())
        };
        self.publish(transition, eligible);
        transition
    }

    pub fn record_probe_failure(&self) -> Option<Transition> {
        self.record_probe_failure_at(Instant::now())
    }

    pub fn record_probe_failure_at(&self, now: Instant) -> Option<Transition> {
        self.record_failure(now)
    }

    /// Count a transport-level failure of a proxied request.
    ///
    /// Shares the counter and trip condition with probe failures.
    pub fn record_forwarding_failure(&self) -> Option<Transition> {
        self.record_forwarding_failure_at(Instant::now())
    }

    pub fn record_forwarding_failure_at(&self, now: Instant) -> Option<Transition> {
        self.record_failure(now)
    }

    fn record_failure(&self, now: Instant) -> Option<Transition> {
        let transition = {
            let mut state = self.write();
            state.alive = false;
            state.breaker.record_failure(now)
        };
        self.publish(transition, false);
        transition
    }

    /// Log any breaker transition and refresh the health gauge.
    fn publish(&self, transition: Option<Transition>, eligible: bool) {
        metrics::record_backend_health(&self.address, eligible);
        match transition {
            Some(Transition::Tripped { failures }) => {
                tracing::warn!(backend = %self.address, failures, "Circuit breaker opened");
                metrics::record_breaker_transition(&self.address, BreakerState::Open);
            }
            Some(Transition::Reset) => {
                tracing::info!(backend = %self.address, "Circuit breaker closed");
                metrics::record_breaker_transition(&self.address, BreakerState::Closed);
            }
            None => {}
        }
    }

    // --- Performance ---

    pub fn response_time(&self) -> Duration {
        self.read().response_time
    }

    /// Store the latest observed end-to-end latency.
    pub fn record_response_time(&self, elapsed: Duration) {
        self.write().response_time = elapsed;
    }

    pub fn weight(&self) -> f64 {
        self.read().weight
    }

    pub fn set_weight(&self, weight: f64) {
        let weight = if weight.is_finite() { weight.max(0.0) } else { 0.0 };
        self.write().weight = weight;
        metrics::record_backend_weight(&self.address, weight);
    }

    pub fn snapshot(&self) -> BackendSnapshot {
        let state = self.read();
        BackendSnapshot {
            address: self.address.clone(),
            alive: state.alive,
            breaker: state.breaker.state(),
            failure_count: state.breaker.failure_count(),
            connections: self.connection_count(),
            response_time_ms: state.response_time.as_secs_f64() * 1000.0,
            weight: state.weight,
            eligible: state.alive && state.breaker.is_closed(),
        }
    }
}

/// A RAII guard that manages the in-flight connection count.
#[derive(Debug)]
pub struct BackendConnectionGuard {
    pub backend: Arc<Backend>,
}

impl Deref for BackendConnectionGuard {
    type Target = Backend;
    fn deref(&self) -> &Self::Target {
        &self.backend
    }
}

impl Drop for BackendConnectionGuard {
    fn drop(&mut self) {
        self.backend.release();
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn test_new_backend_is_eligible() {
        let b = backend("http://127.0.0.1:8080/");
        assert_eq!(b.address(), "http://127.0.0.1:8080");
        assert!(b.is_alive());
        assert!(b.is_eligible());
        assert_eq!(b.breaker_state(), BreakerState::Closed);
        assert_eq!(b.weight(), 1.0);
    }

    #[test]
    fn test_connection_guard_releases() {
        let b = backend("http://127.0.0.1:8080");
        {
            let _g1 = b.acquire();
            let _g2 = b.acquire();
            assert_eq!(b.connection_count(), 2);
        }
        assert_eq!(b.connection_count(), 0);
    }

    #[test]
    fn test_release_never_goes_below_zero() {
        let b = backend("http://127.0.0.1:8080");
        b.release();
        assert_eq!(b.connection_count(), 0);
    }

    #[test]
    fn test_probe_failure_marks_dead_and_counts() {
        let b = backend("http://127.0.0.1:8080");
        assert_eq!(b.record_probe_failure(), None);
        assert!(!b.is_alive());
        assert!(!b.is_eligible());
        assert_eq!(b.failure_count(), 1);

        assert_eq!(b.record_probe_success(), None);
        assert!(b.is_eligible());
    }

    #[test]
    fn test_forwarding_and_probe_failures_share_counter() {
        let b = backend("http://127.0.0.1:8080");
        let t0 = Instant::now();
        for _ in 0..2 {
            b.record_probe_failure_at(t0);
        }
        for _ in 0..2 {
            b.record_forwarding_failure_at(t0);
        }
        assert_eq!(b.breaker_state(), BreakerState::Closed);
        assert_eq!(
            b.record_forwarding_failure_at(t0),
            Some(Transition::Tripped { failures: 5 })
        );
        assert_eq!(b.breaker_state(), BreakerState::Open);
    }

    #[test]
    fn test_open_backend_alive_but_ineligible_until_reset() {
        let b = backend("http://127.0.0.1:8080");
        let t0 = Instant::now();
        for _ in 0..5 {
            b.record_probe_failure_at(t0);
        }
        b.record_probe_success_at(t0 + Duration::from_secs(30));
        assert!(b.is_alive());
        assert!(!b.is_eligible());

        assert_eq!(
            b.record_probe_success_at(t0 + Duration::from_secs(61)),
            Some(Transition::Reset)
        );
        assert!(b.is_eligible());
        assert_eq!(b.failure_count(), 0);
    }

    #[test]
    fn test_weight_is_clamped() {
        let b = backend("http://127.0.0.1:8080");
        b.set_weight(-3.0);
        assert_eq!(b.weight(), 0.0);
        b.set_weight(f64::NAN);
        assert_eq!(b.weight(), 0.0);
        b.set_weight(0.25);
        assert_eq!(b.weight(), 0.25);
    }

    #[test]
    fn test_snapshot() {
        let b = backend("http://127.0.0.1:8080");
        let _g = b.acquire();
        b.record_response_time(Duration::from_millis(15));
        let snap = b.snapshot();
        assert_eq!(snap.connections, 1);
        assert_eq!(snap.response_time_ms, 15.0);
        assert!(snap.eligible);
        assert_eq!(snap.breaker, BreakerState::Closed);
    }

    #[test]
    fn test_concurrent_failures_trip_once() {
        let b = backend("http://127.0.0.1:8080");
        let trips = AtomicUsize::new(0);

        std::thread::scope(|s| {
            for _ in 0..16 {
                s.spawn(|| {
                    for _ in 0..10 {
                        if let Some(Transition::Tripped { .. }) = b.record_forwarding_failure() {
                            trips.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                });
            }
        });

        assert_eq!(trips.load(Ordering::SeqCst), 1);
        assert_eq!(b.failure_count(), 160);
        assert_eq!(b.breaker_state(), BreakerState::Open);
        assert!(!b.is_alive());
    }

    mod health_gauge {
        use super::*;
        use ::metrics::{
            Counter, Gauge, GaugeFn, Histogram, Key, KeyName, Metadata, Recorder, SharedString,
            Unit,
        };
        use std::sync::Mutex;

        /// Keeps every value written to `proxy_backend_health`.
        #[derive(Default)]
        struct Values(Mutex<Vec<f64>>);

        impl GaugeFn for Values {
            fn increment(&self, _: f64) {}
            fn decrement(&self, _: f64) {}
            fn set(&self, value: f64) {
                self.0.lock().unwrap().push(value);
            }
        }

        #[derive(Default)]
        struct HealthRecorder {
            values: Arc<Values>,
        }

        impl Recorder for HealthRecorder {
            fn describe_counter(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}
            fn describe_gauge(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}
            fn describe_histogram(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}

            fn register_counter(&self, _: &Key, _: &Metadata<'_>) -> Counter {
                Counter::noop()
            }

            fn register_gauge(&self, key: &Key, _: &Metadata<'_>) -> Gauge {
                if key.name() == "proxy_backend_health" {
                    Gauge::from_arc(self.values.clone())
                } else {
                    Gauge::noop()
                }
            }

            fn register_histogram(&self, _: &Key, _: &Metadata<'_>) -> Histogram {
                Histogram::noop()
            }
        }

        #[test]
        fn test_forwarding_trip_and_reset_update_gauge() {
            let recorder = HealthRecorder::default();
            let b = backend("http://127.0.0.1:8080");
            let t0 = Instant::now();

            ::metrics::with_local_recorder(&recorder, || {
                for _ in 0..5 {
                    b.record_forwarding_failure_at(t0);
                }
                // Alive again but still open.
                b.record_probe_success_at(t0 + Duration::from_secs(1));
                b.record_probe_success_at(t0 + Duration::from_secs(61));
            });

            let values = recorder.values.0.lock().unwrap().clone();
            assert_eq!(values, vec![0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0]);
        }
    }
}
