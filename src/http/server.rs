//! HTTP server setup and route table.
//!
//! # Responsibilities
//! - Create the Axum Router with all handlers
//! - Wire up middleware (request ID, tracing)
//! - Bind `/{service}`, `/{service}/` and `/{service}/{*rest}` to the forwarder
//! - Serve the proxy descriptor and liveness endpoints
//! - Resolve the service (404) and check the method (405) before any backend I/O

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::Request,
    response::{IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::config::ProxyConfig;
use crate::error::ProxyError;
use crate::health::{active::probe_all, ServiceStatus};
use crate::http::forwarder::{Forwarder, ProxiedRequest};
use crate::http::request::{request_id, MakeRequestUuidV4};
use crate::lifecycle::shutdown::ShutdownSignal;
use crate::observability::metrics;
use crate::routing::router::{mount_segment, sub_path};
use crate::routing::ServiceRegistry;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ServiceRegistry>,
    pub forwarder: Forwarder,
    pub probe_timeout: Duration,
}

/// HTTP server for the proxy.
pub struct HttpServer {
    router: Router,
    config: ProxyConfig,
}

/// Body of `GET /api/proxy/config`.
#[derive(Debug, Serialize)]
pub struct ProxyDescriptor {
    pub services: BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
struct IndexBody {
    name: &'static str,
    version: &'static str,
    services: BTreeMap<String, String>,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: ProxyConfig) -> Self {
        let state = AppState {
            registry: Arc::new(ServiceRegistry::from_config(&config.services.entries)),
            forwarder: Forwarder::new(&config.timeouts, &config.security),
            probe_timeout: Duration::from_millis(config.health.probe_timeout_ms),
        };

        let router = Self::build_router(state);
        Self { router, config }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(state: AppState) -> Router {
        Router::new()
            .route("/", get(index_handler))
            .route("/api/proxy/config", get(config_handler))
            .route("/api/proxy/status", get(status_handler))
            .route("/{service}", any(proxy_handler))
            .route("/{service}/", any(proxy_handler))
            .route("/{service}/{*rest}", any(proxy_handler))
            .with_state(state)
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuidV4))
    }

    /// The router, for serving on a custom transport or driving in tests.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server until `shutdown` fires, then drain in-flight requests.
    pub async fn run(self, listener: TcpListener, shutdown: ShutdownSignal) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            services = self.config.services.entries.len(),
            "HTTP server starting"
        );

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown.recv())
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

async fn index_handler(State(state): State<AppState>) -> Json<IndexBody> {
    Json(IndexBody {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        services: state.registry.mount_paths(),
    })
}

async fn config_handler(State(state): State<AppState>) -> Json<ProxyDescriptor> {
    Json(ProxyDescriptor {
        services: state.registry.mount_paths(),
    })
}

async fn status_handler(State(state): State<AppState>) -> Json<Vec<ServiceStatus>> {
    Json(probe_all(&state.registry, state.probe_timeout).await)
}

/// Resolve the mount, then hand the request to the forwarder.
async fn proxy_handler(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response {
    let start = Instant::now();
    let (parts, body) = request.into_parts();
    let request_id = request_id(&parts.headers).to_string();
    let method = parts.method.clone();
    let path = parts.uri.path();
    let service = mount_segment(path);

    let target = match state.registry.resolve(service) {
        Ok(target) => target,
        Err(e) => {
            tracing::warn!(request_id = %request_id, path = %path, "No service mounted at path");
            metrics::record_request("none", method.as_str(), e.status().as_u16(), start);
            return e.into_response();
        }
    };

    if !target.allows(&method) {
        let err = ProxyError::MethodNotAllowed {
            service: target.name.clone(),
            method: method.clone(),
            allowed: target.methods.clone(),
        };
        tracing::warn!(request_id = %request_id, error = %err, "Rejected method");
        metrics::record_request(&target.name, method.as_str(), err.status().as_u16(), start);
        return err.into_response();
    }

    let request = ProxiedRequest {
        method: method.clone(),
        sub_path: sub_path(path, service).unwrap_or_default().to_string(),
        query: parts.uri.query().map(str::to_string),
        scheme: parts.uri.scheme_str().unwrap_or("http").to_string(),
        headers: parts.headers,
        body,
        client_addr: addr.ip(),
    };

    tracing::debug!(
        request_id = %request_id,
        service = %target.name,
        method = %method,
        sub_path = %request.sub_path,
        "Proxying request"
    );

    let response = match state.forwarder.forward(&target, request).await {
        Ok(response) => response,
        Err(e) => {
            tracing::error!(request_id = %request_id, service = %target.name, error = %e, "Proxy request failed");
            e.into_response()
        }
    };

    metrics::record_request(&target.name, method.as_str(), response.status().as_u16(), start);
    response
}
