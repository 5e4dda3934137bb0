//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, route table, request ID + trace layers)
//!     → routing (resolve service, split sub-path)
//!     → forwarder.rs (filter headers, send to backend, read response)
//!     → response.rs (rewrite HTML / Location, recompute Content-Length)
//!     → Send to client
//! ```

pub mod forwarder;
pub mod request;
pub mod response;
pub mod server;

pub use forwarder::{Forwarder, ProxiedRequest};
pub use request::{MakeRequestUuidV4, X_REQUEST_ID};
pub use response::ProxiedResponse;
pub use server::HttpServer;
