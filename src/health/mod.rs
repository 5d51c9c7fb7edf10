//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Active health checks (active.rs):
//!     Periodic timer
//!     → Probe each backend (concurrently, with a timeout)
//!     → Backend::record_probe_success / record_probe_failure
//!
//! Passive failure detection (http/dispatcher.rs):
//!     Proxied request fails at the transport level
//!     → Backend::record_forwarding_failure
//!
//! State machine (resilience/circuit_breaker.rs):
//!     Closed → Open at the failure threshold
//!     Open → Closed on a success after the reset window
//! ```
//!
//! # Design Decisions
//! - Active and passive failures share one counter per backend
//! - Open backends are still probed
//! - Health state is per-backend, not per-pool

pub mod active;

pub use active::{HealthMonitor, ProbeFailure};
