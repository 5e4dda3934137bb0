//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (raw path)
//!     → router.rs (split /<service>/<sub-path>)
//!     → registry.rs (resolve service → ServiceTarget)
//!     → Return: target, or UnknownService before any network I/O
//!
//! Registry Compilation (at startup):
//!     ServiceConfig[]
//!     → Parse method sets
//!     → Freeze as immutable ServiceRegistry
//! ```
//!
//! # Design Decisions
//! - Registry compiled at startup, immutable at runtime
//! - Ports re-read from the environment on each resolve
//! - Deterministic: same input always resolves the same service

pub mod registry;
pub mod router;

pub use registry::{ServiceRegistry, ServiceTarget};
