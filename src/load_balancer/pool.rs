//! Backend pool management.
//!
//! # Responsibilities
//! - Hold backends in fixed registration order
//! - Own the round-robin cursor
//! - Provide shared (read) and exclusive (cursor-advancing) views for strategies
//!
//! The pool-wide lock guards only the backend sequence and the cursor.
//! Per-backend state has its own synchronization (see backend.rs).

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::config::{BackendConfig, CircuitBreakerConfig};
use crate::load_balancer::backend::{Backend, BackendSnapshot};

#[derive(Debug, Default)]
struct PoolInner {
    backends: Vec<Arc<Backend>>,
    cursor: usize,
}

/// Ordered registry of backends shared by the dispatcher and background tasks.
#[derive(Debug, Default)]
pub struct Pool {
    inner: RwLock<PoolInner>,
}

impl Pool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a pool from configuration, registering backends in order.
    pub fn from_config(backends: &[BackendConfig], breaker: &CircuitBreakerConfig) -> Self {
        let pool = Self::new();
        for config in backends {
            pool.register(Backend::new(config.address.as_str(), config.weight, breaker));
        }
        pool
    }

    fn read(&self) -> RwLockReadGuard<'_, PoolInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, PoolInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a backend. Takes exclusive access.
    pub fn register(&self, backend: Backend) -> Arc<Backend> {
        let backend = Arc::new(backend);
        let mut inner = self.write();
        inner.backends.push(backend.clone());
        tracing::info!(
            backend = %backend.address(),
            position = inner.backends.len() - 1,
            "Backend registered"
        );
        backend
    }

    pub fn size(&self) -> usize {
        self.read().backends.len()
    }

    /// Run `f` over the backend sequence under shared access.
    pub fn with_backends<R>(&self, f: impl FnOnce(&[Arc<Backend>]) -> R) -> R {
        let inner = self.read();
        f(&inner.backends)
    }

    /// Run `f` with the current cursor under exclusive access, then advance it.
    pub fn advance<R>(&self, f: impl FnOnce(&[Arc<Backend>], usize) -> R) -> R {
        let mut inner = self.write();
        let cursor = inner.cursor;
        inner.cursor = cursor.wrapping_add(1);
        f(&inner.backends, cursor)
    }

    /// Clone of the backend sequence, for callers that go on to do I/O.
    pub fn backends(&self) -> Vec<Arc<Backend>> {
        self.with_backends(|backends| backends.to_vec())
    }

    /// Backends currently eligible for selection, in registration order.
    pub fn eligible(&self) -> Vec<Arc<Backend>> {
        self.with_backends(|backends| {
            backends.iter().filter(|b| b.is_eligible()).cloned().collect()
        })
    }

    /// Eligible backends paired with their weights, and the sum of those
    /// weights, all read under one shared lock.
    pub fn weighted_view<R>(&self, f: impl FnOnce(&[(&Arc<Backend>, f64)], f64) -> R) -> R {
        self.with_backends(|backends| {
            let candidates: Vec<(&Arc<Backend>, f64)> = backends
                .iter()
                .filter(|b| b.is_eligible())
                .map(|b| (b, b.weight()))
                .collect();
            let total = candidates.iter().map(|(_, w)| w).sum();
            f(&candidates, total)
        })
    }

    /// Sum of weights over eligible backends.
    pub fn total_weight(&self) -> f64 {
        self.weighted_view(|_, total| total)
    }

    pub fn snapshot(&self) -> Vec<BackendSnapshot> {
        self.with_backends(|backends| backends.iter().map(|b| b.snapshot()).collect())
    }
}
