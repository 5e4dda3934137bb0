//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Client request:
//!     → headers.rs (strip hop-by-hop, set X-Forwarded-*)
//!     → Forward to loopback backend
//!
//! Backend response:
//!     → headers.rs (strip framing headers)
//!     → Rewrite, recompute Content-Length
//! ```
//!
//! # Design Decisions
//! - Backends are loopback only; enforced at config validation
//! - No trust in client-supplied X-Forwarded-* values

pub mod headers;
