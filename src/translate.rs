use url::Url;

use crate::error::ProxyError;

/// Query prefix carried by every rewritten reference. Rewritten URLs are
/// proxy-relative so they work behind whatever host the proxy is reachable on.
pub const PROXY_PREFIX: &str = "/proxy?url=";

/// Per-request rewrite context: the final upstream URL, used as the
/// resolution base for every relative reference in the response. Created
/// fresh per request, never shared.
#[derive(Debug, Clone)]
pub struct RewriteContext {
    base: Url,
}

impl RewriteContext {
    pub fn new(base: Url) -> Self {
        Self { base }
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    /// Encode an absolute target URL as a proxy-relative URL.
    pub fn to_proxy_url(&self, target: &Url) -> String {
        format!("{}{}", PROXY_PREFIX, urlencoding::encode(target.as_str()))
    }

    /// Resolve a raw reference against the base and translate it into a
    /// proxy-relative URL. `None` means the reference stays as it is, either
    /// because it must not be proxied (data:, fragments, already proxied) or
    /// because it does not resolve to an http(s) URL. A single bad reference
    /// never fails the surrounding rewrite.
    pub fn rewrite(&self, reference: &str) -> Option<String> {
        let reference = reference.trim();
        if is_unproxied(reference) {
            return None;
        }
        match self.base.join(reference) {
            Ok(resolved) if matches!(resolved.scheme(), "http" | "https") => {
                Some(self.to_proxy_url(&resolved))
            }
            _ => None,
        }
    }
}

// Empty refs, fragment-only refs, non-network schemes, and references that
// already point back at the proxy.
fn is_unproxied(reference: &str) -> bool {
    reference.is_empty()
        || reference.starts_with('#')
        || reference.starts_with("data:")
        || reference.starts_with("blob:")
        || reference.starts_with("about:")
        || reference.starts_with("javascript:")
        || reference.starts_with("mailto:")
        || reference.starts_with(PROXY_PREFIX)
}

/// Parse the raw `url` parameter into a validated absolute target. A
/// schemeless value gets an https:// prefix before validation, the same
/// safeguard the frontend applies before building proxy links. Anything
/// with an explicit non-http(s) scheme is rejected outright.
pub fn parse_target(raw: &str) -> Result<Url, ProxyError> {
    let candidate = match Url::parse(raw) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Some(url),
        // "example.com/page" lands here ("example.com" parses as a scheme or
        // not at all, never as a host).
        _ if !raw.contains("://") => Url::parse(&format!("https://{raw}")).ok(),
        _ => None,
    };
    match candidate {
        Some(url) if url.host_str().is_some() => Ok(url),
        _ => Err(ProxyError::MalformedTarget(raw.to_string())),
    }
}
