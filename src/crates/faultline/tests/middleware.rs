// Router-level tests for the error page and reporting middlewares

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    extract::Request,
    http::{self, StatusCode},
    middleware::from_fn_with_state,
    routing::get,
    Extension, Router,
};
use faultline::middleware::{error_pages, report_errors, ErrorPages};
use faultline::report::packet::{Level, Packet};
use faultline::report::panic_message;
use faultline::report::transport::Transport;
use faultline::{Environment, ErrorHandlers, HttpError, Reporter, Traced};
use faultline::render::{RequestData, RouteTable};
use futures::FutureExt;
use tokio::sync::mpsc;
use tower::ServiceExt;

struct ChannelTransport(mpsc::UnboundedSender<Packet>);

#[async_trait]
impl Transport for ChannelTransport {
    async fn send(&self, packet: &Packet) -> faultline::Result<()> {
        let _ = self.0.send(packet.clone());
        Ok(())
    }
}

async fn nested_failure() -> Result<&'static str, HttpError> {
    Err(HttpError::internal(Traced::wrap(Traced::msg("inner"), "outer")))
}

async fn boom() -> &'static str {
    panic!("boom")
}

async fn ok() -> &'static str {
    "fine"
}

fn app(pages: ErrorPages, reporter: Reporter) -> Router {
    Router::new()
        .route("/ok", get(ok))
        .route("/fail", get(nested_failure))
        .route("/panic", get(boom))
        .layer(from_fn_with_state(Arc::new(pages), error_pages))
        .layer(from_fn_with_state(Arc::new(reporter), report_errors))
}

fn channel_reporter() -> (Reporter, mpsc::UnboundedReceiver<Packet>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Reporter::new(Arc::new(ChannelTransport(tx))), rx)
}

fn get_request(uri: &str, content_type: &str) -> Request {
    http::Request::builder()
        .uri(uri)
        .header("host", "example.com")
        .header("content-type", content_type)
        .header("authorization", "Bearer secret")
        .body(Body::empty())
        .unwrap()
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn test_json_error_page_is_oldest_first() {
    let response = app(ErrorPages::default(), Reporter::noop())
        .oneshot(get_request("/fail", "application/json"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();

    assert_eq!(body["code"], 500);
    let messages: Vec<&str> = body["errors"]
        .as_array()
        .unwrap()
        .iter()
        .map(|record| record["Msg"].as_str().unwrap())
        .collect();
    assert_eq!(messages, vec!["inner", "outer", "outer"]);
    assert_eq!(body["errors"][0]["HasStack"], true);
}

#[tokio::test]
async fn test_production_page_hides_details() {
    let pages = ErrorPages::default().with_environment(Environment::Production);
    let response = app(pages, Reporter::noop())
        .oneshot(get_request("/fail", "application/json"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_text(response).await;
    assert!(body.contains("We're Sorry!"));
    assert!(!body.contains("inner"));
    assert!(!body.contains("outer"));
}

#[tokio::test]
async fn test_html_debug_page_lists_routes_and_data() {
    let pages = ErrorPages::default().with_routes(RouteTable::new().route("GET", "/fail", "nested_failure"));
    let app = app(pages, Reporter::noop())
        .layer(Extension(RequestData::new().with("tenant", "acme")));

    let response = app.oneshot(get_request("/fail", "text/html")).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_text(response).await;
    assert!(body.contains("faultline-routes-table"));
    assert!(body.contains("nested_failure"));
    assert!(body.contains("tenant"));
    assert!(body.contains("acme"));
    assert!(body.contains("inner"));
}

#[tokio::test]
async fn test_plain_text_page() {
    let response = app(ErrorPages::default(), Reporter::noop())
        .oneshot(get_request("/fail", "text/plain"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_text(response).await;
    assert!(body.starts_with("inner\n"));
}

#[tokio::test]
async fn test_custom_handler_for_status() {
    let handlers = ErrorHandlers::default().register(StatusCode::INTERNAL_SERVER_ERROR, |status, err, _| {
        Ok(axum::response::IntoResponse::into_response((
            status,
            format!("custom: {}", err),
        )))
    });

    let response = app(ErrorPages::new(handlers), Reporter::noop())
        .oneshot(get_request("/fail", "application/json"))
        .await
        .unwrap();

    assert_eq!(body_text(response).await, "custom: outer");
}

#[tokio::test]
async fn test_error_is_reported_once() {
    let (reporter, mut rx) = channel_reporter();
    let app = app(ErrorPages::default(), reporter);

    let response = app.oneshot(get_request("/fail", "application/json")).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let packet = rx.recv().await.unwrap();
    assert_eq!(packet.message, "inner");
    assert_eq!(packet.level, Level::Error);
    assert_eq!(packet.exceptions().len(), 3);

    let request = packet.request.unwrap();
    assert_eq!(request.url, "http://example.com/fail");
    assert!(request.headers.iter().all(|(name, _)| name != "authorization"));

    assert!(rx.recv().await.is_none());
}

#[tokio::test]
async fn test_success_is_not_reported() {
    let (reporter, mut rx) = channel_reporter();
    let response = app(ErrorPages::default(), reporter)
        .oneshot(get_request("/ok", "text/plain"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(rx.recv().await.is_none());
}

#[tokio::test]
async fn test_panics_only_skips_errors() {
    let (reporter, mut rx) = channel_reporter();
    let response = app(ErrorPages::default(), reporter.panics_only(true))
        .oneshot(get_request("/fail", "application/json"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(rx.recv().await.is_none());
}

#[tokio::test]
async fn test_panic_is_reported_and_resumed() {
    let (reporter, mut rx) = channel_reporter();
    let app = app(ErrorPages::default(), reporter);

    let outcome = AssertUnwindSafe(app.oneshot(get_request("/panic", "text/plain")))
        .catch_unwind()
        .await;

    let payload = match outcome {
        Ok(_) => panic!("panic was swallowed"),
        Err(payload) => payload,
    };
    assert_eq!(panic_message(&*payload), "boom");

    let packet = rx.recv().await.unwrap();
    assert_eq!(packet.message, "boom");
    assert_eq!(packet.level, Level::Fatal);
    assert_eq!(packet.exceptions().len(), 1);
    assert!(rx.recv().await.is_none());
}
