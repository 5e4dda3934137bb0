//! Proxy error taxonomy and its mapping onto HTTP responses.
//!
//! Every failure in a proxied exchange ends up here and is turned into a
//! short, fixed client-visible message. Backend details only go to the log.

use std::time::Duration;

use axum::{
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProxyError {
    /// The mount path does not name a registered service.
    #[error("unknown service `{0}`")]
    UnknownService(String),

    /// The service does not accept this method.
    #[error("method {method} not allowed for service `{service}`")]
    MethodNotAllowed {
        service: String,
        method: Method,
        allowed: Vec<Method>,
    },

    /// Inbound body exceeds the configured limit.
    #[error("request body exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },

    /// Inbound request could not be turned into a backend request.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Backend did not answer within the exchange budget.
    #[error("service `{service}` timed out after {after:?}")]
    BackendTimeout { service: String, after: Duration },

    /// Connection refused or reset while connecting.
    #[error("service `{service}` unreachable: {reason}")]
    BackendUnreachable { service: String, reason: String },

    /// Any other transport or protocol failure.
    #[error("service `{service}` transport error: {reason}")]
    Transport { service: String, reason: String },
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::UnknownService(_) => StatusCode::NOT_FOUND,
            ProxyError::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            ProxyError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ProxyError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ProxyError::BackendTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            ProxyError::BackendUnreachable { .. } | ProxyError::Transport { .. } => {
                StatusCode::BAD_GATEWAY
            }
        }
    }

    /// Text sent to the client. Never includes backend addresses or error chains.
    fn client_message(&self) -> &'static str {
        match self {
            ProxyError::UnknownService(_) => "Unknown service",
            ProxyError::MethodNotAllowed { .. } => "Method not allowed",
            ProxyError::PayloadTooLarge { .. } => "Request body too large",
            ProxyError::BadRequest(_) => "Bad request",
            ProxyError::BackendTimeout { .. } => "Upstream service timed out",
            ProxyError::BackendUnreachable { .. } => "Upstream service unavailable",
            ProxyError::Transport { .. } => "Upstream request failed",
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let mut response = (self.status(), self.client_message()).into_response();
        if let ProxyError::MethodNotAllowed { allowed, .. } = &self {
            let allow = allowed
                .iter()
                .map(Method::as_str)
                .collect::<Vec<_>>()
                .join(", ");
            if let Ok(value) = HeaderValue::from_str(&allow) {
                response.headers_mut().insert(header::ALLOW, value);
            }
        }
        response
    }
}
