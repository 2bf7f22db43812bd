//! End-to-end tests: a mock upstream and the proxy run in-process on
//! ephemeral ports, and a redirect-disabled reqwest client plays the
//! browser.

use std::net::SocketAddr;

use axum::body::Body;
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;

use frameproxy::config::Config;

const PAGE: &str = "<html><head></head><body><a href=\"/about\">x</a></body></html>";
const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a, 1, 2, 3, 4];

async fn spawn(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn upstream_app() -> Router {
    Router::new()
        .route("/index.html", get(|| async { Html(PAGE) }))
        .route(
            "/logo.png",
            get(|| async { ([(header::CONTENT_TYPE, "image/png")], PNG).into_response() }),
        )
        .route(
            "/secure",
            get(|| async {
                Response::builder()
                    .status(StatusCode::FOUND)
                    .header(header::LOCATION, "/login")
                    .body(Body::empty())
                    .unwrap()
            }),
        )
        .route(
            "/cookie",
            get(|| async {
                Response::builder()
                    .status(StatusCode::OK)
                    .header(header::CONTENT_TYPE, "text/plain")
                    .header(
                        header::SET_COOKIE,
                        "session=abc; Domain=example.com; Secure; SameSite=Strict",
                    )
                    .header(header::SET_COOKIE, "theme=dark; Path=/")
                    .body(Body::from("ok"))
                    .unwrap()
            }),
        )
        .route(
            "/framed.html",
            get(|| async {
                Response::builder()
                    .status(StatusCode::OK)
                    .header(header::CONTENT_TYPE, "text/html")
                    .header("x-frame-options", "DENY")
                    .header("content-security-policy", "frame-ancestors 'none'")
                    .body(Body::from(PAGE))
                    .unwrap()
            }),
        )
        .route(
            "/live.m3u8",
            get(|| async {
                Response::builder()
                    .status(StatusCode::OK)
                    .header(header::CONTENT_TYPE, "application/vnd.apple.mpegurl")
                    .body(Body::from("#EXTM3U\n#EXTINF:9.0,\nsegment0.ts\n"))
                    .unwrap()
            }),
        )
}

async fn spawn_pair() -> (SocketAddr, SocketAddr) {
    let upstream = spawn(upstream_app()).await;
    let proxy = spawn(frameproxy::app(&Config::default()).unwrap()).await;
    (upstream, proxy)
}

fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap()
}

fn proxied(proxy: SocketAddr, target: &str) -> String {
    format!("http://{proxy}/proxy?url={}", urlencoding::encode(target))
}

#[tokio::test]
async fn html_is_rewritten_and_patched() {
    let (upstream, proxy) = spawn_pair().await;
    let target = format!("http://{upstream}/index.html");

    let res = client().get(proxied(proxy, &target)).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert!(res.headers().get(header::CONTENT_ENCODING).is_none());
    assert!(res.headers().get(header::TRANSFER_ENCODING).is_none());
    let content_type = res.headers()[header::CONTENT_TYPE].to_str().unwrap().to_owned();
    assert!(content_type.contains("charset=utf-8"), "{content_type}");

    let body = res.text().await.unwrap();
    let expected = format!(
        "href=\"/proxy?url={}\"",
        urlencoding::encode(&format!("http://{upstream}/about"))
    );
    assert!(body.contains(&expected), "{body}");
    // The patch sits right at the top of the head.
    assert!(body.contains("<head><script data-frameproxy-patch"), "{body}");
}

#[tokio::test]
async fn binary_passthrough_is_byte_identical() {
    let (upstream, proxy) = spawn_pair().await;
    let target = format!("http://{upstream}/logo.png");

    let res = client().get(proxied(proxy, &target)).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()[header::CONTENT_TYPE], "image/png");
    assert_eq!(
        res.headers()[header::CONTENT_LENGTH],
        PNG.len().to_string().as_str()
    );
    assert_eq!(res.bytes().await.unwrap().as_ref(), PNG);
}

#[tokio::test]
async fn redirect_location_points_back_into_the_proxy() {
    let (upstream, proxy) = spawn_pair().await;
    let target = format!("http://{upstream}/secure");

    let res = client().get(proxied(proxy, &target)).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::FOUND);
    assert_eq!(
        res.headers()[header::LOCATION],
        format!(
            "/proxy?url={}",
            urlencoding::encode(&format!("http://{upstream}/login"))
        )
        .as_str()
    );
}

#[tokio::test]
async fn set_cookie_is_rescoped_and_stays_multiple() {
    let (upstream, proxy) = spawn_pair().await;
    let target = format!("http://{upstream}/cookie");

    let res = client().get(proxied(proxy, &target)).send().await.unwrap();
    let cookies: Vec<_> = res
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|v| v.to_str().unwrap())
        .collect();
    assert_eq!(cookies, ["session=abc", "theme=dark; Path=/"]);
}

#[tokio::test]
async fn framing_headers_are_stripped_and_cors_is_permissive() {
    let (upstream, proxy) = spawn_pair().await;
    let target = format!("http://{upstream}/framed.html");

    let res = client().get(proxied(proxy, &target)).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert!(res.headers().get("x-frame-options").is_none());
    assert!(res.headers().get("content-security-policy").is_none());
    assert_eq!(res.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    assert_eq!(res.headers()[header::ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");
}

#[tokio::test]
async fn hls_manifest_segments_are_rewritten() {
    let (upstream, proxy) = spawn_pair().await;
    let target = format!("http://{upstream}/live.m3u8");

    let res = client().get(proxied(proxy, &target)).send().await.unwrap();
    let body = res.text().await.unwrap();
    assert!(body.contains("#EXTM3U\n"));
    assert!(body.contains(&format!(
        "/proxy?url={}",
        urlencoding::encode(&format!("http://{upstream}/segment0.ts"))
    )));
}

#[tokio::test]
async fn missing_target_is_rejected_before_any_fetch() {
    let (_upstream, proxy) = spawn_pair().await;

    let res = client()
        .get(format!("http://{proxy}/proxy"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body = res.text().await.unwrap();
    assert!(body.contains("url"), "{body}");
}

#[tokio::test]
async fn malformed_target_is_rejected() {
    let (_upstream, proxy) = spawn_pair().await;

    let res = client()
        .get(proxied(proxy, "http://"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn preflight_is_answered_locally() {
    let (upstream, proxy) = spawn_pair().await;
    let target = format!("http://{upstream}/index.html");

    let res = client()
        .request(reqwest::Method::OPTIONS, proxied(proxy, &target))
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .header(header::ORIGIN, "https://app.example")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);
    assert_eq!(res.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
}

#[tokio::test]
async fn path_suffix_form_still_works() {
    let (upstream, proxy) = spawn_pair().await;

    let res = client()
        .get(format!("http://{proxy}/proxy/http://{upstream}/index.html"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = res.text().await.unwrap();
    assert!(body.contains("data-frameproxy-patch"), "{body}");
}

#[tokio::test]
async fn unreachable_upstream_yields_a_diagnostic_page() {
    let (_upstream, proxy) = spawn_pair().await;

    // A port nothing listens on; connection refused, not a timeout.
    let res = client()
        .get(proxied(proxy, "http://127.0.0.1:9/down"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
    let content_type = res.headers()[header::CONTENT_TYPE].to_str().unwrap().to_owned();
    assert!(content_type.starts_with("text/html"));
    let body = res.text().await.unwrap();
    assert!(body.contains("<h1>"), "{body}");
}
