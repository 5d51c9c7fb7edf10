//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, tracing)
//!     → dispatcher.rs (select backend, track connection, forward)
//!     → headers.rs (strip hop-by-hop headers both ways)
//!     → Send backend response to client
//! ```

pub mod dispatcher;
pub mod headers;
pub mod request;
pub mod server;

pub use dispatcher::{DispatchError, Dispatcher};
pub use request::X_REQUEST_ID;
pub use server::HttpServer;
