//! Backend liveness subsystem.
//!
//! # Data Flow
//! ```text
//! GET /api/proxy/status
//!     → active.rs (TCP connect probe per service, bounded)
//!     → state.rs (ServiceStatus rows)
//!     → JSON to client
//! ```
//!
//! # Design Decisions
//! - Probes run on demand only; no background task
//! - Results never affect forwarding (one fixed backend per service)

pub mod active;
pub mod state;

pub use state::ServiceStatus;
