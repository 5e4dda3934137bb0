//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Backend hosts are loopback only
//! - Service names are unique, non-empty, single path segments
//! - Value ranges (timeouts > 0, ports valid, methods parse)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr};

use axum::http::Method;
use thiserror::Error;

use crate::config::schema::ProxyConfig;

/// Path segments the proxy serves itself and a service may not claim.
const RESERVED_NAMES: &[&str] = &["api"];

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid bind address `{0}`")]
    BindAddress(String),
    #[error("service name `{0}` must be a non-empty single path segment")]
    ServiceName(String),
    #[error("service name `{0}` is reserved")]
    ReservedName(String),
    #[error("service `{0}` is declared more than once")]
    DuplicateService(String),
    #[error("service `{service}` host `{host}` is not a loopback address")]
    NonLoopbackHost { service: String, host: String },
    #[error("service `{0}` has port 0")]
    ZeroPort(String),
    #[error("service `{service}` lists invalid method `{method}`")]
    InvalidMethod { service: String, method: String },
    #[error("timeout `{0}` must be greater than zero")]
    ZeroTimeout(&'static str),
}

/// Whether `host` names the local machine.
pub fn is_loopback_host(host: &str) -> bool {
    let trimmed = host.trim_start_matches('[').trim_end_matches(']');
    if trimmed.eq_ignore_ascii_case("localhost") {
        return true;
    }
    trimmed
        .parse::<IpAddr>()
        .map(|ip| ip.is_loopback())
        .unwrap_or(false)
}

/// Check every semantic rule and collect all failures.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress(config.listener.bind_address.clone()));
    }

    let mut seen = HashSet::new();
    for service in &config.services.entries {
        let name = &service.name;
        if name.is_empty() || name.contains('/') || name.contains('?') || name.contains('#') {
            errors.push(ValidationError::ServiceName(name.clone()));
        }
        if RESERVED_NAMES.contains(&name.as_str()) {
            errors.push(ValidationError::ReservedName(name.clone()));
        }
        if !seen.insert(name.as_str()) {
            errors.push(ValidationError::DuplicateService(name.clone()));
        }
        if !is_loopback_host(&service.host) {
            errors.push(ValidationError::NonLoopbackHost {
                service: name.clone(),
                host: service.host.clone(),
            });
        }
        if service.port == 0 {
            errors.push(ValidationError::ZeroPort(name.clone()));
        }
        for method in &service.methods {
            if Method::from_bytes(method.as_bytes()).is_err() {
                errors.push(ValidationError::InvalidMethod {
                    service: name.clone(),
                    method: method.clone(),
                });
            }
        }
    }

    if config.timeouts.connect_secs == 0 {
        errors.push(ValidationError::ZeroTimeout("connect_secs"));
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::ZeroTimeout("request_secs"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
