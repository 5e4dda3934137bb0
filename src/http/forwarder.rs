//! One proxied exchange.
//!
//! # Responsibilities
//! - Build the backend URI from the target, raw sub-path and query
//! - Filter inbound headers and add forwarding metadata
//! - Send the request with the original method, never following redirects
//! - Read the backend response head under the exchange deadline
//! - Filter outbound headers, rewrite, and assemble the client response
//!
//! # Design Decisions
//! - Exactly one outbound request per inbound request, no retries
//! - Request bodies are buffered and size-bounded
//! - Response bodies stream through, except HTML from a rewriting service,
//!   which is buffered up to `max_response_size`
//! - A streamed body fails if the backend stalls longer than the request
//!   timeout between frames
//! - Transport failures are mapped to 502/504 here and nowhere else

use std::error::Error as StdError;
use std::io;
use std::net::IpAddr;
use std::time::Duration;

use axum::{
    body::Body,
    http::{header, HeaderMap, Method, Request, Uri},
    response::Response,
};
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use tokio::time::Instant;
use tower_http::timeout::TimeoutBody;

use crate::config::{SecurityConfig, TimeoutConfig};
use crate::error::ProxyError;
use crate::http::response::{apply_rewrites, is_html, rewrite_redirect, ProxiedResponse};
use crate::resilience::timeouts::with_deadline;
use crate::routing::ServiceTarget;
use crate::security::headers::{add_forwarding_metadata, filter_inbound, filter_outbound};

/// Inbound request handed to the forwarder by the route table.
#[derive(Debug)]
pub struct ProxiedRequest {
    pub method: Method,
    /// Raw path after the mount prefix, without a leading slash.
    pub sub_path: String,
    /// Raw query string, forwarded unchanged.
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Body,
    pub client_addr: IpAddr,
    pub scheme: String,
}

/// Sends proxied requests to loopback backends.
#[derive(Clone)]
pub struct Forwarder {
    client: Client<HttpConnector, Body>,
    timeout: Duration,
    max_body_size: usize,
    max_response_size: usize,
}

impl Forwarder {
    pub fn new(timeouts: &TimeoutConfig, limits: &SecurityConfig) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(Duration::from_secs(timeouts.connect_secs)));
        connector.set_nodelay(true);

        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(Duration::from_secs(timeouts.idle_secs))
            .build(connector);

        Self {
            client,
            timeout: Duration::from_secs(timeouts.request_secs),
            max_body_size: limits.max_body_size,
            max_response_size: limits.max_response_size,
        }
    }

    /// Forward `request` to `target` and assemble the client response.
    pub async fn forward(
        &self,
        target: &ServiceTarget,
        request: ProxiedRequest,
    ) -> Result<Response, ProxyError> {
        let ProxiedRequest {
            method,
            sub_path,
            query,
            headers: inbound,
            body,
            client_addr,
            scheme,
        } = request;

        let uri = backend_uri(target, &sub_path, query.as_deref())?;

        let mut headers = add_forwarding_metadata(
            filter_inbound(&inbound),
            client_addr,
            &scheme,
            inbound.get(header::HOST),
        );
        if target.rewrite_urls {
            // The rewriter only reads identity-encoded bodies.
            headers.remove(header::ACCEPT_ENCODING);
        }

        let body = self.read_request_body(&inbound, body).await?;

        let mut outbound = Request::builder()
            .method(method.clone())
            .uri(uri.clone())
            .body(Body::from(body))
            .map_err(|e| ProxyError::BadRequest(e.to_string()))?;
        *outbound.headers_mut() = headers;

        tracing::debug!(service = %target.name, method = %method, uri = %uri, "Forwarding request");

        let started = Instant::now();
        let response = with_deadline(&target.name, self.timeout, async {
            self.client
                .request(outbound)
                .await
                .map_err(|e| classify_client_error(&target.name, &e))
        })
        .await?;
        let (parts, incoming) = response.into_parts();

        if !(target.rewrite_urls && is_html(&parts.headers)) {
            let mut headers = filter_outbound(&parts.headers);
            if let Some(length) = parts.headers.get(header::CONTENT_LENGTH) {
                headers.insert(header::CONTENT_LENGTH, length.clone());
            }
            rewrite_redirect(parts.status, &mut headers, target);

            let mut response = Response::new(Body::new(TimeoutBody::new(self.timeout, incoming)));
            *response.status_mut() = parts.status;
            *response.headers_mut() = headers;
            return Ok(response);
        }

        let remaining = self.timeout.saturating_sub(started.elapsed());
        let body = with_deadline(&target.name, remaining, async {
            Limited::new(incoming, self.max_response_size)
                .collect()
                .await
                .map(|collected| collected.to_bytes())
                .map_err(|e| ProxyError::Transport {
                    service: target.name.clone(),
                    reason: format!("reading response body: {e}"),
                })
        })
        .await?;

        let mut proxied = ProxiedResponse {
            status: parts.status,
            headers: filter_outbound(&parts.headers),
            body,
        };
        apply_rewrites(&mut proxied, target);

        let mut response = proxied.into_response();
        if method == Method::HEAD {
            // No body was read, so the backend's declared length still holds.
            match parts.headers.get(header::CONTENT_LENGTH) {
                Some(length) => {
                    response.headers_mut().insert(header::CONTENT_LENGTH, length.clone());
                }
                None => {
                    response.headers_mut().remove(header::CONTENT_LENGTH);
                }
            }
        }
        Ok(response)
    }

    async fn read_request_body(
        &self,
        headers: &HeaderMap,
        body: Body,
    ) -> Result<axum::body::Bytes, ProxyError> {
        let declared = headers
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<usize>().ok());
        if declared.is_some_and(|len| len > self.max_body_size) {
            return Err(ProxyError::PayloadTooLarge {
                limit: self.max_body_size,
            });
        }

        match Limited::new(body, self.max_body_size).collect().await {
            Ok(collected) => Ok(collected.to_bytes()),
            Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
                Err(ProxyError::PayloadTooLarge {
                    limit: self.max_body_size,
                })
            }
            Err(e) => Err(ProxyError::BadRequest(format!("reading request body: {e}"))),
        }
    }
}

/// `http://{host}:{port}/{sub_path}[?query]`.
pub fn backend_uri(
    target: &ServiceTarget,
    sub_path: &str,
    query: Option<&str>,
) -> Result<Uri, ProxyError> {
    let mut uri = format!("http://{}/{}", target.authority(), sub_path);
    if let Some(query) = query {
        uri.push('?');
        uri.push_str(query);
    }
    uri.parse::<Uri>()
        .map_err(|e| ProxyError::BadRequest(format!("invalid backend uri: {e}")))
}

fn io_error_kind(err: &(dyn StdError + 'static)) -> Option<io::ErrorKind> {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(io) = e.downcast_ref::<io::Error>() {
            return Some(io.kind());
        }
        current = e.source();
    }
    None
}

fn classify_client_error(service: &str, err: &hyper_util::client::legacy::Error) -> ProxyError {
    let reset = matches!(
        io_error_kind(err),
        Some(io::ErrorKind::ConnectionRefused | io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionAborted)
    );

    if err.is_connect() || reset {
        tracing::error!(service = %service, error = %err, "Backend unreachable");
        ProxyError::BackendUnreachable {
            service: service.to_string(),
            reason: err.to_string(),
        }
    } else {
        tracing::error!(service = %service, error = ?err, "Backend request failed");
        ProxyError::Transport {
            service: service.to_string(),
            reason: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(port: u16, rewrite_urls: bool) -> ServiceTarget {
        ServiceTarget {
            name: "db-browser".into(),
            host: "127.0.0.1".into(),
            port,
            rewrite_urls,
            methods: vec![Method::GET],
        }
    }

    fn request(method: Method) -> ProxiedRequest {
        ProxiedRequest {
            method,
            sub_path: "index".into(),
            query: None,
            headers: HeaderMap::new(),
            body: Body::empty(),
            client_addr: "127.0.0.1".parse().unwrap(),
            scheme: "http".into(),
        }
    }

    #[test]
    fn builds_backend_uri() {
        let t = target(8081, true);
        assert_eq!(
            backend_uri(&t, "table/5", Some("page=2&sort=name%20asc")).unwrap(),
            "http://127.0.0.1:8081/table/5?page=2&sort=name%20asc"
        );
        assert_eq!(backend_uri(&t, "", None).unwrap(), "http://127.0.0.1:8081/");
        assert_eq!(
            backend_uri(&t, "a%2Fb", None).unwrap().path(),
            "/a%2Fb"
        );
    }

    #[tokio::test]
    async fn refused_connection_is_unreachable() {
        // Bind then drop to get a port with no listener.
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let forwarder = Forwarder::new(&TimeoutConfig::default(), &SecurityConfig::default());
        let err = forwarder.forward(&target(port, false), request(Method::GET)).await.unwrap_err();
        assert!(matches!(err, ProxyError::BackendUnreachable { .. }), "{err:?}");
    }

    #[tokio::test]
    async fn oversized_declared_body_is_rejected() {
        let limits = SecurityConfig {
            max_body_size: 4,
            ..SecurityConfig::default()
        };
        let forwarder = Forwarder::new(&TimeoutConfig::default(), &limits);
        let mut req = request(Method::POST);
        req.headers.insert(header::CONTENT_LENGTH, "10".parse().unwrap());
        req.body = Body::from("0123456789");

        let err = forwarder.forward(&target(1, false), req).await.unwrap_err();
        assert!(matches!(err, ProxyError::PayloadTooLarge { limit: 4 }));
    }

    #[tokio::test]
    async fn oversized_streamed_body_is_rejected() {
        let limits = SecurityConfig {
            max_body_size: 4,
            ..SecurityConfig::default()
        };
        let forwarder = Forwarder::new(&TimeoutConfig::default(), &limits);
        let mut req = request(Method::POST);
        req.body = Body::from("0123456789");

        let err = forwarder.forward(&target(1, false), req).await.unwrap_err();
        assert!(matches!(err, ProxyError::PayloadTooLarge { .. }));
    }
}
