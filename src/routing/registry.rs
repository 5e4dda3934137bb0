//! Service registry: mount name → backend target.
//!
//! # Responsibilities
//! - Hold the static service table compiled from configuration
//! - Resolve a name into a [`ServiceTarget`] per request
//! - Re-read the port override from the environment on every resolve
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - O(1) lookup via HashMap
//! - Unknown names fail before any network I/O

use std::collections::{BTreeMap, HashMap};

use axum::http::Method;

use crate::config::ServiceConfig;
use crate::error::ProxyError;

/// Static per-service settings, fixed for the process lifetime.
#[derive(Debug, Clone)]
struct ServiceEntry {
    host: String,
    default_port: u16,
    port_env: String,
    rewrite_urls: bool,
    methods: Vec<Method>,
}

/// A resolved backend for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceTarget {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub rewrite_urls: bool,
    pub methods: Vec<Method>,
}

impl ServiceTarget {
    /// Path prefix the service is exposed under, e.g. `/db-browser`.
    pub fn mount_path(&self) -> String {
        format!("/{}", self.name)
    }

    /// `host:port` authority used for the backend URL.
    pub fn authority(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    pub fn allows(&self, method: &Method) -> bool {
        self.methods.contains(method)
    }
}

/// Immutable lookup table of proxied services.
#[derive(Debug, Clone, Default)]
pub struct ServiceRegistry {
    services: HashMap<String, ServiceEntry>,
}

impl ServiceRegistry {
    /// Build the registry from validated service configs.
    pub fn from_config(configs: &[ServiceConfig]) -> Self {
        let services = configs
            .iter()
            .map(|cfg| {
                let methods = cfg
                    .methods
                    .iter()
                    .filter_map(|m| Method::from_bytes(m.as_bytes()).ok())
                    .collect();
                let entry = ServiceEntry {
                    host: cfg.host.clone(),
                    default_port: cfg.port,
                    port_env: cfg.port_env_var(),
                    rewrite_urls: cfg.rewrite_urls,
                    methods,
                };
                (cfg.name.clone(), entry)
            })
            .collect();
        Self { services }
    }

    /// Resolve `name` into a target, reading the port override now.
    pub fn resolve(&self, name: &str) -> Result<ServiceTarget, ProxyError> {
        let entry = self
            .services
            .get(name)
            .ok_or_else(|| ProxyError::UnknownService(name.to_string()))?;

        Ok(ServiceTarget {
            name: name.to_string(),
            host: entry.host.clone(),
            port: port_override(&entry.port_env).unwrap_or(entry.default_port),
            rewrite_urls: entry.rewrite_urls,
            methods: entry.methods.clone(),
        })
    }

    /// Every service name with its mount path, sorted by name.
    pub fn mount_paths(&self) -> BTreeMap<String, String> {
        self.services
            .keys()
            .map(|name| (name.clone(), format!("/{name}")))
            .collect()
    }

    /// Every service resolved with current ports, sorted by name.
    pub fn targets(&self) -> Vec<ServiceTarget> {
        let mut names: Vec<_> = self.services.keys().collect();
        names.sort();
        names
            .into_iter()
            .filter_map(|name| self.resolve(name).ok())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

fn port_override(var: &str) -> Option<u16> {
    let raw = std::env::var(var).ok()?;
    match raw.trim().parse::<u16>() {
        Ok(port) if port != 0 => Some(port),
        _ => {
            tracing::warn!(variable = %var, value = %raw, "Ignoring invalid port override");
            None
        }
    }
}
