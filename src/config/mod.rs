//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ProxyConfig (validated, immutable)
//!     → shared via Arc to all subsystems
//!
//! Per request:
//!     ServiceRegistry::resolve reads <SERVICE>_PORT from the environment
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; only backend ports are re-read per call
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    HealthConfig, ListenerConfig, ObservabilityConfig, ProxyConfig, SecurityConfig,
    ServiceConfig, ServicesConfig, TimeoutConfig,
};
