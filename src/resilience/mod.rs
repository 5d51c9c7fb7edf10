//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Probe outcome (health/active.rs) or forwarding failure (http/dispatcher.rs)
//!     → backend.rs (liveness + breaker updated under one lock)
//!     → circuit_breaker.rs (count failures, trip at threshold, time-gated reset)
//! ```
//!
//! # Design Decisions
//! - Per-backend circuit breaker (not global)
//! - Probe and forwarding failures share one counter and one trip condition
//! - Every outbound call carries a deadline (see TimeoutConfig)
//! - No cross-backend retry; failures are reported to the caller

pub mod circuit_breaker;

pub use circuit_breaker::{BreakerState, CircuitBreaker, Transition};
