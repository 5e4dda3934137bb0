//! Header manipulation for the proxy boundary.
//!
//! # Responsibilities
//! - Strip hop-by-hop headers in both directions
//! - Set X-Forwarded-For, X-Forwarded-Proto, X-Forwarded-Host
//! - Drop backend framing headers so the body length is recomputed
//!
//! # Design Decisions
//! - Name sets are constants, not configuration
//! - X-Forwarded-* are overwritten, never appended (single hop)
//! - Functions borrow their input and return a filtered copy

use std::net::IpAddr;

use axum::http::{header, HeaderMap, HeaderName, HeaderValue};

pub static X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
pub static X_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");
pub static X_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");

/// Removed from client requests before they reach a backend.
pub static INBOUND_EXCLUDED: [HeaderName; 9] = [
    header::HOST,
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::TRANSFER_ENCODING,
    header::TE,
    header::TRAILER,
    header::UPGRADE,
    header::PROXY_AUTHORIZATION,
    header::PROXY_AUTHENTICATE,
];

/// Removed from backend responses before they reach the client.
pub static OUTBOUND_EXCLUDED: [HeaderName; 4] = [
    header::TRANSFER_ENCODING,
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::CONTENT_LENGTH,
];

fn without(headers: &HeaderMap, excluded: &[HeaderName]) -> HeaderMap {
    let mut filtered = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        // HeaderName is already lowercase, so this compare is case-insensitive.
        if !excluded.contains(name) {
            filtered.append(name.clone(), value.clone());
        }
    }
    filtered
}

/// Copy of a client request's headers without hop-by-hop entries.
pub fn filter_inbound(headers: &HeaderMap) -> HeaderMap {
    without(headers, &INBOUND_EXCLUDED)
}

/// Copy of a backend response's headers without framing entries.
pub fn filter_outbound(headers: &HeaderMap) -> HeaderMap {
    without(headers, &OUTBOUND_EXCLUDED)
}

/// Overwrite the three `X-Forwarded-*` headers.
pub fn add_forwarding_metadata(
    mut headers: HeaderMap,
    client_addr: IpAddr,
    scheme: &str,
    original_host: Option<&HeaderValue>,
) -> HeaderMap {
    if let Ok(value) = HeaderValue::from_str(&client_addr.to_string()) {
        headers.insert(X_FORWARDED_FOR.clone(), value);
    }
    let proto = HeaderValue::from_str(scheme).unwrap_or_else(|_| HeaderValue::from_static("http"));
    headers.insert(X_FORWARDED_PROTO.clone(), proto);
    headers.insert(
        X_FORWARDED_HOST.clone(),
        original_host.cloned().unwrap_or_else(|| HeaderValue::from_static("")),
    );
    headers
}
