pub mod classify;
pub mod config;
pub mod error;
pub mod fetch;
pub mod headers;
pub mod patch;
pub mod proxy;
pub mod rewrite;
pub mod translate;

use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::error::ProxyError;
use crate::proxy::ProxyService;

/// Build the application router: the proxy endpoint plus the static landing
/// page, with permissive CORS on the static routes. The proxy routes set
/// their own cross-origin headers per response.
pub fn app(config: &Config) -> Result<Router, ProxyError> {
    let service = ProxyService::new()?;
    let static_site = Router::new()
        .fallback_service(
            ServeDir::new(&config.static_dir).append_index_html_on_directories(true),
        )
        .layer(CorsLayer::permissive());
    Ok(service
        .router()
        .merge(static_site)
        .layer(TraceLayer::new_for_http()))
}
