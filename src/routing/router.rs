//! Mount path splitting.
//!
//! axum hands the handler a percent-decoded `{service}` segment, but the
//! backend must see the sub-path exactly as the client sent it. The split
//! therefore works on the raw request path.

/// Return the part of `raw_path` after `/<service>`, without its leading
/// slash. `None` when the path is not under that mount.
pub fn sub_path<'a>(raw_path: &'a str, service: &str) -> Option<&'a str> {
    let rest = raw_path.strip_prefix('/')?.strip_prefix(service)?;
    if rest.is_empty() {
        return Some("");
    }
    rest.strip_prefix('/')
}

/// Raw (undecoded) first path segment.
pub fn mount_segment(raw_path: &str) -> &str {
    let trimmed = raw_path.strip_prefix('/').unwrap_or(raw_path);
    trimmed.split('/').next().unwrap_or_default()
}
