//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Request to backend:
//!     → timeouts.rs (one deadline over request + response body)
//!     → On expiry: 504, exchange dropped
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every backend call has a deadline
//! - No retries: backends are same-host, a failure means the service is down

pub mod timeouts;
