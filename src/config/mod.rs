//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → command-line overrides (main.rs)
//!     → validation.rs (semantic checks)
//!     → ProxyConfig (validated, immutable)
//!     → consumed as plain values by the pool, monitor, adapter and dispatcher
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; the pool is rebuilt on every start
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use schema::{
    AdminConfig, BackendConfig, BalancerConfig, CircuitBreakerConfig, HealthCheckConfig,
    ListenerConfig, ObservabilityConfig, ProxyConfig, Strategy, TimeoutConfig, WeightConfig,
};
