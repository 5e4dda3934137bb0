//! Response handling and transformation.
//!
//! # Responsibilities
//! - Hold an assembled backend response ([`ProxiedResponse`])
//! - Prefix site-root URLs in HTML attributes with the mount path
//! - Rewrite `Location` on redirects so they resolve through the proxy
//! - Recompute Content-Length from the final body
//!
//! # Design Decisions
//! - Pattern-based, not an HTML parser: only `href`/`src`/`action` values
//!   with a small fixed set of prefixes are touched
//! - Rewrites fail open: any decoding problem returns the original bytes
//! - Path-relative and foreign-host redirects pass through untouched

use std::borrow::Cow;
use std::sync::LazyLock;

use axum::{
    body::{Body, Bytes},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::Response,
};
use regex::{Captures, Regex};
use thiserror::Error;
use url::Url;

use crate::config::validation::is_loopback_host;
use crate::observability::metrics;
use crate::routing::ServiceTarget;

/// `href="/..."`, `src = '/...'`, `action="/..."` as a standalone attribute.
/// Group 1 is the name, group 2 a double-quoted value, group 3 a
/// single-quoted one. The leading whitespace keeps `data-src=` out.
static URL_ATTR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?:^|\s)(href|src|action)\s*=\s*(?:"(/[^"]*)"|'(/[^']*)')"#).unwrap()
});

/// Site-root prefixes the backend's own pages link to.
static ROOTED_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^/(?:static/|(?:query|table|index|row|import|export|sql)\b)").unwrap()
});

const REDIRECT_STATUSES: [u16; 5] = [301, 302, 303, 307, 308];

/// Why an HTML rewrite was skipped.
#[derive(Debug, Error)]
pub enum RewriteError {
    #[error("unsupported charset `{0}`")]
    UnsupportedCharset(String),
    #[error("body is content-encoded as `{0}`")]
    Encoded(String),
    #[error("body is not valid UTF-8: {0}")]
    Decode(#[from] std::str::Utf8Error),
}

/// A completed backend exchange, owned by one forward call.
#[derive(Debug, Clone)]
pub struct ProxiedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ProxiedResponse {
    /// Build the client response, declaring the body's actual length.
    pub fn into_response(self) -> Response {
        let mut headers = self.headers;
        if carries_length(self.status) {
            headers.insert(header::CONTENT_LENGTH, HeaderValue::from(self.body.len()));
        } else {
            headers.remove(header::CONTENT_LENGTH);
        }

        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = headers;
        response
    }
}

fn carries_length(status: StatusCode) -> bool {
    !(status.is_informational() || status == StatusCode::NO_CONTENT || status == StatusCode::NOT_MODIFIED)
}

pub fn is_redirect(status: StatusCode) -> bool {
    REDIRECT_STATUSES.contains(&status.as_u16())
}

fn content_type(headers: &HeaderMap) -> Option<&str> {
    headers.get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok())
}

pub fn is_html(headers: &HeaderMap) -> bool {
    content_type(headers)
        .map(|ct| ct.to_ascii_lowercase().contains("text/html"))
        .unwrap_or(false)
}

/// Lowercased `charset` parameter of a Content-Type value.
fn charset(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|param| {
        let (key, value) = param.split_once('=')?;
        key.trim()
            .eq_ignore_ascii_case("charset")
            .then(|| value.trim().trim_matches('"').to_ascii_lowercase())
    })
}

fn should_prefix(attr: &str, value: &str, mount_path: &str) -> bool {
    if attr == "action" {
        let already_mounted = value == mount_path
            || value
                .strip_prefix(mount_path)
                .is_some_and(|rest| rest.starts_with(['/', '?']));
        return !value.starts_with("//") && !already_mounted;
    }
    ROOTED_PREFIX.is_match(value)
}

/// Prefix matching attribute URLs in `html` with `mount_path`.
pub fn rewrite_html<'a>(html: &'a str, mount_path: &str) -> Cow<'a, str> {
    URL_ATTR.replace_all(html, |caps: &Captures| {
        let whole = &caps[0];
        let Some(value) = caps.get(2).or_else(|| caps.get(3)) else {
            return whole.to_string();
        };
        if !should_prefix(&caps[1], value.as_str(), mount_path) {
            return whole.to_string();
        }
        // Splice the prefix in front of the value, keeping spacing and quotes.
        let at = value.start() - caps.get(0).map_or(0, |m| m.start());
        format!("{}{mount_path}{}", &whole[..at], &whole[at..])
    })
}

/// Decode, rewrite and re-encode an HTML body.
///
/// Returns `Ok(None)` when nothing changed.
pub fn rewrite_html_body(
    headers: &HeaderMap,
    body: &[u8],
    mount_path: &str,
) -> Result<Option<Bytes>, RewriteError> {
    if let Some(encoding) = headers
        .get(header::CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .filter(|e| !e.trim().eq_ignore_ascii_case("identity"))
    {
        return Err(RewriteError::Encoded(encoding.to_string()));
    }

    if let Some(cs) = content_type(headers).and_then(charset) {
        if !matches!(cs.as_str(), "utf-8" | "utf8" | "us-ascii" | "ascii") {
            return Err(RewriteError::UnsupportedCharset(cs));
        }
    }

    let text = std::str::from_utf8(body)?;
    match rewrite_html(text, mount_path) {
        Cow::Borrowed(_) => Ok(None),
        Cow::Owned(rewritten) if rewritten == text => Ok(None),
        Cow::Owned(rewritten) => Ok(Some(Bytes::from(rewritten))),
    }
}

fn same_host(location_host: &str, backend_host: &str) -> bool {
    let strip = |h: &str| h.trim_start_matches('[').trim_end_matches(']').to_ascii_lowercase();
    strip(location_host) == strip(backend_host)
        || (is_loopback_host(location_host) && is_loopback_host(backend_host))
}

/// Map a backend `Location` value onto the proxy's URL space.
///
/// `None` means the value should be passed through unchanged.
pub fn rewrite_location(location: &str, target: &ServiceTarget) -> Option<String> {
    let mount = target.mount_path();
    if location.starts_with('/') {
        if location.starts_with("//") {
            return None;
        }
        return Some(format!("{mount}{location}"));
    }

    let url = Url::parse(location).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    let host = url.host_str()?;
    if url.port_or_known_default() != Some(target.port) || !same_host(host, &target.host) {
        return None;
    }

    // Swap only `scheme://authority`; the rest is kept byte for byte.
    let (_, after_scheme) = location.split_once("://")?;
    let path_start = after_scheme.find(['/', '?', '#']).unwrap_or(after_scheme.len());
    Some(format!("{mount}{}", &after_scheme[path_start..]))
}

/// Rewrite `Location` on a redirect from a service that opted in.
pub fn rewrite_redirect(status: StatusCode, headers: &mut HeaderMap, target: &ServiceTarget) {
    if !target.rewrite_urls || !is_redirect(status) {
        return;
    }

    let rewritten = headers
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|loc| rewrite_location(loc, target));
    if let Some(location) = rewritten {
        match HeaderValue::from_str(&location) {
            Ok(value) => {
                tracing::debug!(service = %target.name, location = %location, "Rewrote redirect");
                headers.insert(header::LOCATION, value);
            }
            Err(e) => {
                tracing::warn!(service = %target.name, error = %e, "Rewritten Location is not a valid header");
            }
        }
    }
}

/// Run both rewrites on a buffered `response` for a service that opted in.
pub fn apply_rewrites(response: &mut ProxiedResponse, target: &ServiceTarget) {
    if !target.rewrite_urls {
        return;
    }

    rewrite_redirect(response.status, &mut response.headers, target);

    if is_html(&response.headers) {
        match rewrite_html_body(&response.headers, &response.body, &target.mount_path()) {
            Ok(Some(body)) => response.body = body,
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(service = %target.name, error = %e, "HTML rewrite skipped");
                metrics::record_rewrite_failure(&target.name);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db_browser() -> ServiceTarget {
        ServiceTarget {
            name: "db-browser".into(),
            host: "127.0.0.1".into(),
            port: 8081,
            rewrite_urls: true,
            methods: vec![],
        }
    }

    fn html_response(body: &str) -> ProxiedResponse {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/html; charset=utf-8"));
        ProxiedResponse {
            status: StatusCode::OK,
            headers,
            body: Bytes::from(body.to_string()),
        }
    }

    #[test]
    fn prefixes_static_asset() {
        let out = rewrite_html(r#"<script src="/static/app.js"></script><a href="/static/x.css">"#, "/db-browser");
        assert_eq!(
            out,
            r#"<script src="/db-browser/static/app.js"></script><a href="/db-browser/static/x.css">"#
        );
    }

    #[test]
    fn prefixes_known_routes_in_both_quote_styles() {
        let html = r#"<a href="/table/5">t</a><a href='/query?sql=1'>q</a><a href="/index">i</a><a href="/row/3">r</a><a href="/sql">s</a><a href="/import">im</a><a href="/export/csv">ex</a>"#;
        let out = rewrite_html(html, "/db-browser");
        assert_eq!(
            out,
            r#"<a href="/db-browser/table/5">t</a><a href='/db-browser/query?sql=1'>q</a><a href="/db-browser/index">i</a><a href="/db-browser/row/3">r</a><a href="/db-browser/sql">s</a><a href="/db-browser/import">im</a><a href="/db-browser/export/csv">ex</a>"#
        );
    }

    #[test]
    fn word_boundary_excludes_longer_names() {
        let html = r#"<a href="/query2">x</a><a href="/tables">y</a><a href="/rowing">z</a>"#;
        assert_eq!(rewrite_html(html, "/db-browser"), html);
    }

    #[test]
    fn data_attributes_are_not_urls() {
        let html = r#"<img data-src="/static/lazy.png"><a data-href="/table/1">x</a>"#;
        assert_eq!(rewrite_html(html, "/db-browser"), html);
    }

    #[test]
    fn spaced_equals_sign_is_matched() {
        let html = "<a href = \"/table/1\">t</a>\n<img\tsrc= '/static/a.png'>";
        assert_eq!(
            rewrite_html(html, "/db-browser"),
            "<a href = \"/db-browser/table/1\">t</a>\n<img\tsrc= '/db-browser/static/a.png'>"
        );
    }

    #[test]
    fn leaves_other_urls_alone() {
        let html = r#"<a href="/about">a</a><a href="https://example.org/static/x">b</a><img src="static/rel.png"><p>/static/ in text</p>"#;
        assert_eq!(rewrite_html(html, "/db-browser"), html);
    }

    #[test]
    fn bare_form_actions_are_prefixed_once() {
        let html = r#"<form action="/"></form><form action="/save"></form><form action="/db-browser/save"></form><form action="//cdn/x"></form>"#;
        assert_eq!(
            rewrite_html(html, "/db-browser"),
            r#"<form action="/db-browser/"></form><form action="/db-browser/save"></form><form action="/db-browser/save"></form><form action="//cdn/x"></form>"#
        );
    }

    #[test]
    fn body_rewrite_updates_length() {
        let mut response = html_response(r#"<link href="/static/app.js">"#);
        apply_rewrites(&mut response, &db_browser());
        assert_eq!(&response.body[..], br#"<link href="/db-browser/static/app.js">"#);

        let expected = response.body.len();
        let out = response.into_response();
        assert_eq!(out.headers()[header::CONTENT_LENGTH], expected.to_string().as_str());
    }

    #[test]
    fn non_html_is_untouched() {
        let mut response = html_response(r#"{"href":"/static/app.js"}"#);
        response
            .headers
            .insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let before = response.body.clone();
        apply_rewrites(&mut response, &db_browser());
        assert_eq!(response.body, before);
    }

    #[test]
    fn disabled_service_is_untouched() {
        let mut target = db_browser();
        target.rewrite_urls = false;
        let mut response = html_response(r#"<a href="/static/x">"#);
        response.status = StatusCode::FOUND;
        response.headers.insert(header::LOCATION, HeaderValue::from_static("/table/5"));
        let before = response.body.clone();

        apply_rewrites(&mut response, &target);
        assert_eq!(response.body, before);
        assert_eq!(response.headers[header::LOCATION], "/table/5");
    }

    #[test]
    fn invalid_utf8_fails_open() {
        let mut response = html_response("");
        response.body = Bytes::from_static(b"<a href=\"/static/x\">\xff\xfe</a>");
        let before = response.body.clone();
        apply_rewrites(&mut response, &db_browser());
        assert_eq!(response.body, before);
    }

    #[test]
    fn foreign_charset_and_compression_fail_open() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/html; charset=ISO-8859-1"));
        let err = rewrite_html_body(&headers, b"<a href=\"/static/x\">", "/db-browser").unwrap_err();
        assert!(matches!(err, RewriteError::UnsupportedCharset(cs) if cs == "iso-8859-1"));

        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/html"));
        headers.insert(header::CONTENT_ENCODING, HeaderValue::from_static("gzip"));
        let err = rewrite_html_body(&headers, b"\x1f\x8b", "/db-browser").unwrap_err();
        assert!(matches!(err, RewriteError::Encoded(_)));
    }

    #[test]
    fn root_relative_location() {
        assert_eq!(
            rewrite_location("/table/5", &db_browser()).as_deref(),
            Some("/db-browser/table/5")
        );
    }

    #[test]
    fn same_backend_absolute_location() {
        let target = db_browser();
        assert_eq!(
            rewrite_location("http://127.0.0.1:8081/index", &target).as_deref(),
            Some("/db-browser/index")
        );
        assert_eq!(
            rewrite_location("http://localhost:8081/table/1?page=2#top", &target).as_deref(),
            Some("/db-browser/table/1?page=2#top")
        );
    }

    #[test]
    fn absolute_location_keeps_path_verbatim() {
        let target = db_browser();
        assert_eq!(
            rewrite_location("http://127.0.0.1:8081/a/../b", &target).as_deref(),
            Some("/db-browser/a/../b")
        );
        assert_eq!(
            rewrite_location("http://127.0.0.1:8081", &target).as_deref(),
            Some("/db-browser")
        );
        assert_eq!(
            rewrite_location("http://127.0.0.1:8081?next=%2Fx", &target).as_deref(),
            Some("/db-browser?next=%2Fx")
        );
    }

    #[test]
    fn other_locations_pass_through() {
        let target = db_browser();
        assert_eq!(rewrite_location("http://127.0.0.1:9999/index", &target), None);
        assert_eq!(rewrite_location("https://example.org/index", &target), None);
        assert_eq!(rewrite_location("table/5", &target), None);
        assert_eq!(rewrite_location("//evil.example/x", &target), None);
        assert_eq!(rewrite_location("mailto:someone@example.org", &target), None);
    }

    #[test]
    fn redirect_header_rewritten_only_for_redirects() {
        let mut response = ProxiedResponse {
            status: StatusCode::SEE_OTHER,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        };
        response.headers.insert(header::LOCATION, HeaderValue::from_static("/table/5"));
        apply_rewrites(&mut response, &db_browser());
        assert_eq!(response.headers[header::LOCATION], "/db-browser/table/5");

        response.status = StatusCode::CREATED;
        response.headers.insert(header::LOCATION, HeaderValue::from_static("/row/9"));
        apply_rewrites(&mut response, &db_browser());
        assert_eq!(response.headers[header::LOCATION], "/row/9");
    }

    #[test]
    fn no_content_has_no_length() {
        let response = ProxiedResponse {
            status: StatusCode::NO_CONTENT,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
        .into_response();
        assert!(response.headers().get(header::CONTENT_LENGTH).is_none());
    }
}
