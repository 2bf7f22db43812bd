use std::time::Duration;

use axum::body::Bytes;
use axum::http::{HeaderMap, Method};
use url::Url;

use crate::error::ProxyError;
use crate::headers::HeaderPolicy;

/// Outbound HTTP client. Built once per process; reqwest clients are
/// reference-counted and cheap to clone into request tasks.
#[derive(Clone)]
pub struct Fetcher {
    client: reqwest::Client,
    policy: HeaderPolicy,
}

impl Fetcher {
    pub fn new(policy: HeaderPolicy) -> Result<Self, ProxyError> {
        // Redirects are never followed here: a 3xx must reach the browser
        // with its Location translated back into the proxy.
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()?;
        Ok(Self { client, policy })
    }

    /// Issue the upstream request with the curated header subset. The body
    /// is forwarded verbatim for methods that carry one. DNS, connect, and
    /// timeout failures surface as errors, never as partial responses.
    pub async fn fetch(
        &self,
        method: Method,
        target: &Url,
        inbound: &HeaderMap,
        body: Bytes,
    ) -> Result<reqwest::Response, ProxyError> {
        let headers = self.policy.upstream_request_headers(inbound, target);
        let mut request = self
            .client
            .request(method.clone(), target.clone())
            .headers(headers);
        if method != Method::GET && method != Method::HEAD && !body.is_empty() {
            request = request.body(body);
        }
        Ok(request.send().await?)
    }
}
