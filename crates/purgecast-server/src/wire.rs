//! Outbound wire format.
//!
//! Requests to caches are written in a minimal HTTP/1.1 form:
//!
//! ```text
//! <METHOD> <PATH> HTTP/1.1\r\n
//! Host: <Address>\n
//! <name>: <value>\n        (one line per forwarded x- header)
//! \n
//! ```
//!
//! Note the `\r\n` after the request line versus the bare `\n` everywhere
//! else. Cache servers accept this form and the asymmetry is preserved
//! exactly; the integration tests assert the emitted bytes.
//!
//! Only inbound headers whose name starts with `x-` are forwarded, first
//! value per name. Header names are emitted lower-cased (HTTP header names
//! are case-insensitive on the receiving side).

use axum::http::{HeaderMap, Method};
use purgecast_common::{Cache, PurgecastError, Result};

/// Prefix selecting which inbound headers are forwarded to caches.
const CUSTOM_HEADER_PREFIX: &str = "x-";

/// Per-dispatch request context bound to every job of one broadcast.
///
/// All jobs of a dispatch share one instance behind an `Arc`; the registry's
/// cache entries stay untouched.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    /// Inbound method, forwarded opaquely (PURGE, BAN, GET, ...).
    pub method: Method,
    /// Inbound URL path, forwarded as the request target.
    pub path: String,
    /// Inbound headers; only `x-` prefixed names are written to caches.
    pub headers: HeaderMap,
}

/// Serializes the request for one cache into its wire form.
///
/// # Arguments
/// * `cache` - The target cache; its address becomes the `Host` line
/// * `request` - The inbound method, path and headers
///
/// # Returns
/// The complete wire bytes, blank-line terminated
pub fn serialize_request(cache: &Cache, request: &OutboundRequest) -> String {
    let mut buf = String::new();

    buf.push_str(request.method.as_str());
    buf.push(' ');
    buf.push_str(&request.path);
    buf.push_str(" HTTP/1.1\r\nHost: ");
    buf.push_str(&cache.address);
    buf.push('\n');

    // HeaderName is already lower-cased; keys() yields each name once.
    for name in request.headers.keys() {
        if !name.as_str().starts_with(CUSTOM_HEADER_PREFIX) {
            continue;
        }
        let Some(value) = request.headers.get(name).and_then(|v| v.to_str().ok()) else {
            continue;
        };
        buf.push_str(name.as_str());
        buf.push_str(": ");
        buf.push_str(value);
        buf.push('\n');
    }
    buf.push('\n');

    buf
}

/// Extracts the numeric status code from an HTTP status line.
///
/// The code is the second whitespace-separated token.
///
/// # Arguments
/// * `line` - The status line, trailing line break included or not
///
/// # Errors
/// A protocol error when the second token is missing or not numeric
pub fn parse_status_line(line: &str) -> Result<u16> {
    line.split_whitespace()
        .nth(1)
        .and_then(|token| token.parse().ok())
        .ok_or_else(|| {
            PurgecastError::Protocol(format!("malformed status line {:?}", line.trim_end()))
        })
}
