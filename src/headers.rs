use axum::http::{header, HeaderMap, HeaderValue};
use url::Url;

/// Browser-like identity used when the inbound request carries none.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";
const DEFAULT_ACCEPT: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8";

/// Inbound headers worth forwarding upstream: content negotiation, identity,
/// cookies, range requests. Host and connection-management headers are never
/// forwarded; the client recomputes them for the upstream connection.
const FORWARD_REQUEST_HEADERS: &[&str] = &[
    "user-agent",
    "accept",
    "accept-language",
    "cookie",
    "range",
    "origin",
    "referer",
    "sec-ch-ua",
    "sec-ch-ua-mobile",
    "sec-ch-ua-platform",
];

/// Response headers removed unconditionally. These are the ones that stop a
/// page from loading inside a frame it does not control.
const STRIP_RESPONSE_ALWAYS: &[&str] = &[
    "content-security-policy",
    "content-security-policy-report-only",
    "x-frame-options",
    "x-content-type-options",
];

/// Response headers removed only when the body is rewritten: rewriting
/// invalidates the original byte count and any content encoding. Passthrough
/// responses keep them so range requests and seeking keep working.
const STRIP_RESPONSE_WHEN_REWRITTEN: &[&str] =
    &["content-encoding", "content-length", "transfer-encoding"];

/// Header filtering rules for both directions. Carried as a value so the
/// policy can be constructed and tested on its own.
#[derive(Debug, Clone)]
pub struct HeaderPolicy {
    forward_request: &'static [&'static str],
    strip_always: &'static [&'static str],
    strip_when_rewritten: &'static [&'static str],
}

impl Default for HeaderPolicy {
    fn default() -> Self {
        Self {
            forward_request: FORWARD_REQUEST_HEADERS,
            strip_always: STRIP_RESPONSE_ALWAYS,
            strip_when_rewritten: STRIP_RESPONSE_WHEN_REWRITTEN,
        }
    }
}

impl HeaderPolicy {
    /// Build the header set for the upstream request from the allow-listed
    /// inbound headers. Origin and Referer fall back to the target's own
    /// origin, which defeats simple hot-link protection.
    pub fn upstream_request_headers(&self, inbound: &HeaderMap, target: &Url) -> HeaderMap {
        let mut out = HeaderMap::new();
        for (name, value) in inbound {
            if contains(self.forward_request, name.as_str()) {
                out.append(name.clone(), value.clone());
            }
        }
        if !out.contains_key(header::USER_AGENT) {
            out.insert(header::USER_AGENT, HeaderValue::from_static(DEFAULT_USER_AGENT));
        }
        if !out.contains_key(header::ACCEPT) {
            out.insert(header::ACCEPT, HeaderValue::from_static(DEFAULT_ACCEPT));
        }
        if !out.contains_key(header::ORIGIN) {
            if let Ok(value) = HeaderValue::from_str(&target.origin().ascii_serialization()) {
                out.insert(header::ORIGIN, value);
            }
        }
        if !out.contains_key(header::REFERER) {
            if let Ok(value) = HeaderValue::from_str(target.as_str()) {
                out.insert(header::REFERER, value);
            }
        }
        out
    }

    /// Filter the upstream response headers. `rewritten` selects the extra
    /// strip set for bodies that are re-encoded as text. Set-Cookie values
    /// are rewritten one directive at a time and stay separate directives.
    pub fn response_headers(&self, upstream: &HeaderMap, rewritten: bool) -> HeaderMap {
        let mut out = HeaderMap::new();
        for (name, value) in upstream {
            if contains(self.strip_always, name.as_str()) {
                continue;
            }
            if rewritten && contains(self.strip_when_rewritten, name.as_str()) {
                continue;
            }
            if name == header::SET_COOKIE {
                // A cookie value that is not valid UTF-8 is forwarded as-is.
                if let Some(cleaned) = value
                    .to_str()
                    .ok()
                    .map(rewrite_set_cookie)
                    .and_then(|v| HeaderValue::from_str(&v).ok())
                {
                    out.append(header::SET_COOKIE, cleaned);
                    continue;
                }
            }
            out.append(name.clone(), value.clone());
        }
        out
    }

    /// Permissive cross-origin headers on every proxy response, replacing
    /// whatever the upstream sent, so the embedding page's own scripts are
    /// never blocked by the browser.
    pub fn apply_cors(&self, headers: &mut HeaderMap) {
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        );
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static("GET, POST, PUT, PATCH, DELETE, HEAD, OPTIONS"),
        );
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static("*"),
        );
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
            HeaderValue::from_static("true"),
        );
    }
}

/// Strip the attributes that scope a cookie to the upstream origin so the
/// browser accepts it against the proxy's origin instead. Everything else
/// (Path, Expires, HttpOnly, Max-Age) is kept in order.
pub fn rewrite_set_cookie(value: &str) -> String {
    value
        .split(';')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .filter(|part| {
            let attribute = part.split('=').next().unwrap_or("").trim();
            !(attribute.eq_ignore_ascii_case("domain")
                || attribute.eq_ignore_ascii_case("secure")
                || attribute.eq_ignore_ascii_case("samesite"))
        })
        .collect::<Vec<_>>()
        .join("; ")
}

fn contains(set: &[&str], name: &str) -> bool {
    set.iter().any(|entry| name.eq_ignore_ascii_case(entry))
}
