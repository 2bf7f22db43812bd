use std::collections::HashMap;

use axum::body::{to_bytes, Body};
use axum::extract::{Path, Query, RawQuery, Request, State};
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::Response;
use axum::routing::any;
use axum::Router;
use tracing::{debug, warn};
use url::Url;

use crate::classify::Classification;
use crate::error::ProxyError;
use crate::fetch::Fetcher;
use crate::headers::HeaderPolicy;
use crate::rewrite;
use crate::translate::{parse_target, RewriteContext};

/// Forwarded request bodies are capped; anything larger is rejected rather
/// than silently truncated.
const MAX_REQUEST_BODY: usize = 16 * 1024 * 1024;

/// The proxy endpoint: resolves the target, fetches it upstream, and either
/// rewrites the payload or streams it through untouched.
#[derive(Clone)]
pub struct ProxyService {
    fetcher: Fetcher,
    policy: HeaderPolicy,
}

impl ProxyService {
    pub fn new() -> Result<Self, ProxyError> {
        let policy = HeaderPolicy::default();
        let fetcher = Fetcher::new(policy.clone())?;
        Ok(Self { fetcher, policy })
    }

    pub fn router(self) -> Router {
        Router::new()
            .route("/proxy", any(proxy_query))
            .route("/proxy/*target", any(proxy_path))
            .with_state(self)
    }

    async fn handle(&self, target: Url, req: Request) -> Result<Response, ProxyError> {
        let (parts, body) = req.into_parts();

        // Preflights are answered here; the upstream never sees them.
        if parts.method == Method::OPTIONS
            && parts
                .headers
                .contains_key(header::ACCESS_CONTROL_REQUEST_METHOD)
        {
            let mut response = Response::new(Body::empty());
            *response.status_mut() = StatusCode::NO_CONTENT;
            self.policy.apply_cors(response.headers_mut());
            return Ok(response);
        }

        let body = to_bytes(body, MAX_REQUEST_BODY)
            .await
            .map_err(|_| ProxyError::BodyTooLarge)?;

        debug!(method = %parts.method, %target, "forwarding");
        let upstream = match self
            .fetcher
            .fetch(parts.method, &target, &parts.headers, body)
            .await
        {
            Ok(response) => response,
            Err(err) => {
                warn!(%target, error = %err, "upstream fetch failed");
                return Err(err);
            }
        };

        let status = upstream.status();
        let context = RewriteContext::new(upstream.url().clone());

        // A redirect goes back to the browser with its Location translated
        // into the proxy, never followed here.
        if status.is_redirection() {
            return Ok(self.redirect_response(status, &context, &upstream));
        }

        let content_type = upstream
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let classification =
            Classification::from_content_type(content_type.as_deref(), context.base());

        let mut headers = self
            .policy
            .response_headers(upstream.headers(), classification.is_rewrite());
        self.policy.apply_cors(&mut headers);
        if classification.is_rewrite() {
            // The body is re-encoded from the decoded text.
            normalize_charset(&mut headers);
        }

        let body = match classification {
            Classification::Html => {
                let text = upstream.text().await?;
                Body::from(rewrite::rewrite_html(&text, &context)?)
            }
            Classification::Css => {
                let text = upstream.text().await?;
                Body::from(rewrite::rewrite_css(&text, &context))
            }
            Classification::Hls => {
                let text = upstream.text().await?;
                Body::from(rewrite::rewrite_hls(&text, &context))
            }
            // Everything else streams through without buffering.
            Classification::Passthrough => Body::from_stream(upstream.bytes_stream()),
        };

        let mut response = Response::new(body);
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        Ok(response)
    }

    fn redirect_response(
        &self,
        status: StatusCode,
        context: &RewriteContext,
        upstream: &reqwest::Response,
    ) -> Response {
        // The upstream's redirect body is dropped, so its length and
        // encoding headers must go with it.
        let mut headers = self.policy.response_headers(upstream.headers(), true);
        if let Some(proxied) = upstream
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|location| context.rewrite(location))
            .and_then(|proxied| HeaderValue::from_str(&proxied).ok())
        {
            headers.insert(header::LOCATION, proxied);
        }
        self.policy.apply_cors(&mut headers);
        let mut response = Response::new(Body::empty());
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        response
    }
}

/// Canonical form: `/proxy?url=<percent-encoded-absolute-url>`.
async fn proxy_query(
    State(service): State<ProxyService>,
    Query(params): Query<HashMap<String, String>>,
    req: Request,
) -> Result<Response, ProxyError> {
    let raw = params.get("url").ok_or(ProxyError::MissingTarget)?;
    let target = parse_target(raw)?;
    service.handle(target, req).await
}

/// Older form with the target embedded as a path suffix:
/// `/proxy/https://host/path`. The query string belongs to the target.
async fn proxy_path(
    State(service): State<ProxyService>,
    Path(suffix): Path<String>,
    RawQuery(query): RawQuery,
    req: Request,
) -> Result<Response, ProxyError> {
    let mut raw = suffix;
    if let Some(query) = query {
        raw.push('?');
        raw.push_str(&query);
    }
    // Some clients collapse the double slash after the scheme on the way in.
    for scheme in ["https", "http"] {
        let collapsed = format!("{scheme}:/");
        let full = format!("{scheme}://");
        if raw.starts_with(&collapsed) && !raw.starts_with(&full) {
            raw = format!("{full}{}", &raw[collapsed.len()..]);
            break;
        }
    }
    let target = parse_target(&raw)?;
    service.handle(target, req).await
}

fn normalize_charset(headers: &mut HeaderMap) {
    if let Some(mime) = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.split(';').next().unwrap_or(ct).trim().to_owned())
    {
        if let Ok(value) = HeaderValue::from_str(&format!("{mime}; charset=utf-8")) {
            headers.insert(header::CONTENT_TYPE, value);
        }
    }
}
