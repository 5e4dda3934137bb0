//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Methods every service accepts unless it declares its own set.
pub const DEFAULT_METHODS: &[&str] = &["GET", "POST", "PUT", "DELETE", "OPTIONS", "HEAD", "PATCH"];

/// Extra methods a WebDAV backend needs on top of [`DEFAULT_METHODS`].
pub const WEBDAV_METHODS: &[&str] = &["PROPFIND", "PROPPATCH", "MKCOL", "COPY", "MOVE", "LOCK", "UNLOCK"];

/// Root configuration for the proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Backend services exposed under `/<name>`.
    pub services: ServicesConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Body size limits.
    pub security: SecurityConfig,

    /// Liveness probe settings for the status endpoint.
    pub health: HealthConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// The list of proxied services.
///
/// Wrapped in its own type so that an absent `[[services.entries]]` table
/// still yields the three known services.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServicesConfig {
    pub entries: Vec<ServiceConfig>,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            entries: vec![
                ServiceConfig::new("db-browser", 8081, true),
                ServiceConfig::new("backup-manager", 8082, false),
                ServiceConfig {
                    methods: DEFAULT_METHODS
                        .iter()
                        .chain(WEBDAV_METHODS)
                        .map(|m| m.to_string())
                        .collect(),
                    ..ServiceConfig::new("webdav", 8083, false)
                },
            ],
        }
    }
}

/// A single backend service.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
    /// Service name; also the mount path segment.
    pub name: String,

    /// Backend host. Must be a loopback address.
    #[serde(default = "default_host")]
    pub host: String,

    /// Default backend port, used when no override is set in the environment.
    pub port: u16,

    /// Environment variable that overrides `port` at request time.
    /// Defaults to `<NAME>_PORT` with dashes turned into underscores.
    #[serde(default)]
    pub port_env: Option<String>,

    /// Rewrite site-root URLs in HTML bodies and redirects.
    #[serde(default)]
    pub rewrite_urls: bool,

    /// Allowed HTTP methods.
    #[serde(default = "default_methods")]
    pub methods: Vec<String>,
}

impl ServiceConfig {
    pub fn new(name: impl Into<String>, port: u16, rewrite_urls: bool) -> Self {
        Self {
            name: name.into(),
            host: default_host(),
            port,
            port_env: None,
            rewrite_urls,
            methods: default_methods(),
        }
    }

    /// Name of the environment variable consulted for a port override.
    pub fn port_env_var(&self) -> String {
        self.port_env.clone().unwrap_or_else(|| {
            format!("{}_PORT", self.name.to_uppercase().replace('-', "_"))
        })
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_methods() -> Vec<String> {
    DEFAULT_METHODS.iter().map(|m| m.to_string()).collect()
}

/// Timeout configuration for backend calls.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Budget for the whole backend exchange (request + body) in seconds.
    pub request_secs: u64,

    /// Idle pooled connection timeout in seconds.
    pub idle_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            request_secs: 30,
            idle_secs: 60,
        }
    }
}

/// Body size limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Maximum inbound request body size in bytes.
    pub max_body_size: usize,
    /// Maximum backend response body size in bytes.
    pub max_response_size: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_body_size: 256 * 1024 * 1024,
            max_response_size: 256 * 1024 * 1024,
        }
    }
}

/// Liveness probe configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthConfig {
    /// TCP connect timeout for one probe, in milliseconds.
    pub probe_timeout_ms: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            probe_timeout_ms: 500,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` wins when set.
    pub log_level: String,

    /// Emit JSON log lines instead of the human-readable format.
    pub json_logs: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
