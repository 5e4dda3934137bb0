//! On-demand liveness probing.
//!
//! # Responsibilities
//! - Probe each registered backend with a bounded TCP connect
//! - Report host, port and running state per service

use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time;

use crate::health::state::ServiceStatus;
use crate::routing::{ServiceRegistry, ServiceTarget};

/// Whether something accepts TCP connections on the target's address.
pub async fn is_running(target: &ServiceTarget, timeout: Duration) -> bool {
    let addr = target.authority();
    match time::timeout(timeout, TcpStream::connect(addr.as_str())).await {
        Ok(Ok(_)) => true,
        Ok(Err(e)) => {
            tracing::debug!(service = %target.name, addr = %addr, error = %e, "Liveness probe refused");
            false
        }
        Err(_) => {
            tracing::debug!(service = %target.name, addr = %addr, "Liveness probe timed out");
            false
        }
    }
}

/// Probe every service, resolving ports as they are right now.
pub async fn probe_all(registry: &ServiceRegistry, timeout: Duration) -> Vec<ServiceStatus> {
    let mut statuses = Vec::with_capacity(registry.len());
    for target in registry.targets() {
        let running = is_running(&target, timeout).await;
        statuses.push(ServiceStatus::new(&target, running));
    }
    statuses
}
