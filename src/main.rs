use std::net::SocketAddr;

use tracing::info;
use tracing_subscriber::EnvFilter;

use frameproxy::config::Config;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("frameproxy=debug,tower_http=info")),
        )
        .init();

    let config = Config::from_env();
    let app = frameproxy::app(&config).expect("failed to build the http client");

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind the listen port");
    info!("proxy listening on http://{addr}");
    axum::serve(listener, app).await.expect("server error");
}
