use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use thiserror::Error;

/// Request-level failures. A rewrite failure on a single embedded reference
/// never surfaces here; the reference is left untouched instead.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("missing url parameter")]
    MissingTarget,
    #[error("not a valid absolute http(s) url: {0}")]
    MalformedTarget(String),
    #[error("request body exceeds the forwarding limit")]
    BodyTooLarge,
    #[error("upstream request failed: {0}")]
    Upstream(#[from] reqwest::Error),
    #[error("html rewrite failed: {0}")]
    Rewrite(#[from] lol_html::errors::RewritingError),
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MissingTarget | Self::MalformedTarget(_) => StatusCode::BAD_REQUEST,
            Self::BodyTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Upstream(err) if err.is_timeout() => StatusCode::GATEWAY_TIMEOUT,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::Rewrite(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        // The result usually renders inside an iframe, so the diagnostic is
        // a small self-contained document rather than a bare error string.
        let status = self.status();
        let body = format!(
            "<!doctype html><html><head><meta charset=\"utf-8\">\
             <title>Proxy error</title></head>\
             <body style=\"font-family:sans-serif;margin:2rem\">\
             <h1>{status}</h1><p>{}</p></body></html>",
            escape(&self.to_string())
        );
        (status, Html(body)).into_response()
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
