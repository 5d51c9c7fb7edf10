//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs):
//!     Load config → Validate → Build pool → Spawn background tasks → Listen
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop accepting → Background tasks exit at next tick
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then core, then listeners
//! - In-flight requests are not cancelled; only new ones stop arriving

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
