//! Service liveness report.

use serde::Serialize;

use crate::routing::ServiceTarget;

/// One row of `GET /api/proxy/status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceStatus {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub mount_path: String,
    pub running: bool,
}

impl ServiceStatus {
    pub fn new(target: &ServiceTarget, running: bool) -> Self {
        Self {
            name: target.name.clone(),
            host: target.host.clone(),
            port: target.port,
            mount_path: target.mount_path(),
            running,
        }
    }
}
