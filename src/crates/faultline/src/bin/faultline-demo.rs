//! Demo server
//!
//! Small axum service wired with faultline's error pages and reporting.
//! Configuration comes from `FAULTLINE_*` environment variables; `HOST` and
//! `PORT` pick the listen address.
//!
//! ```text
//! curl -H 'content-type: application/json' http://127.0.0.1:8080/fail
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::Path,
    middleware::from_fn_with_state,
    routing::get,
    Extension, Router,
};
use faultline::config::{ConfigBuilder, EnvReader, FaultlineConfig, DEFAULT_PREFIX};
use faultline::middleware::{error_pages, report_errors, ErrorPages};
use faultline::prelude::*;
use faultline::report::install_panic_hook;
use faultline::ErrorHandlers;
use tower_http::trace::TraceLayer;

async fn index() -> &'static str {
    "faultline demo: try /fail, /widgets/7 or /panic"
}

async fn fail() -> Result<String, HttpError> {
    let catalog = std::fs::read_to_string("/nonexistent/widgets.toml")
        .context("failed to read widget catalog")
        .context("failed to load widgets")
        .http_status(StatusCode::SERVICE_UNAVAILABLE)?;
    Ok(catalog)
}

async fn widget(Path(id): Path<u32>) -> Result<String, HttpError> {
    if id == 7 {
        return Ok("widget 7".to_string());
    }
    Err(HttpError::not_found(Traced::msg(format!("no widget with id {}", id))))
}

async fn panics() -> &'static str {
    panic!("boom")
}

fn routes() -> RouteTable {
    RouteTable::new()
        .route("GET", "/", "index")
        .route("GET", "/fail", "fail")
        .route("GET", "/widgets/:id", "widget")
        .route("GET", "/panic", "panics")
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing/logging
    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt().with_env_filter(rust_log).init();

    let config = FaultlineConfig::load(DEFAULT_PREFIX)?;
    tracing::info!(environment = %config.environment, reporting = config.dsn.is_some(), "Configuration loaded");

    install_panic_hook();
    let reporter = Arc::new(Reporter::from_config(&config)?);
    let pages = Arc::new(ErrorPages::from_config(ErrorHandlers::default(), &config).with_routes(routes()));

    let data = RequestData::new()
        .with("service", "faultline-demo")
        .with("version", faultline::version());

    let app = Router::new()
        .route("/", get(index))
        .route("/fail", get(fail))
        .route("/widgets/:id", get(widget))
        .route("/panic", get(panics))
        .layer(from_fn_with_state(pages, error_pages))
        .layer(Extension(data))
        .layer(from_fn_with_state(reporter, report_errors))
        .layer(TraceLayer::new_for_http());

    let env = EnvReader::new("");
    let host = env.string("host")?.unwrap_or_else(|| "127.0.0.1".to_string());
    let port: u16 = env.parse("port")?.unwrap_or(8080);
    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;

    tracing::info!("Starting faultline demo on {}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}
