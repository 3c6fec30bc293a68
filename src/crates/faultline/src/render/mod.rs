//! Default HTTP error renderer
//!
//! Turns an error and a status code into a response. In production the body
//! is a fixed generic page. Everywhere else the causal chain is rendered with
//! the format chosen by the request's declared `Content-Type`:
//!
//! | Content-Type | Body |
//! |---|---|
//! | `application/json`, `text/json`, `json` | `{"errors": [...], "code": status}` |
//! | `text/plain` | one message per line, stacks indented |
//! | `application/xml`, `text/xml`, `xml` | empty (XML rendering is not implemented) |
//! | anything else | HTML debug page with request context and routes |

pub mod template;

use std::collections::BTreeMap;
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, HeaderMap, Method, Request, StatusCode, Uri},
    response::Response,
};
use serde::{Deserialize, Serialize};

use crate::chain::error_chain;
use crate::logging::log_error_chain;
use crate::trace::TraceBinder;
use crate::Result;

pub use template::{HandlebarsEngine, TemplateEngine, DEV_ERROR_TEMPLATE, PROD_ERROR_TEMPLATE};

/// Status written with the HTML debug page, whatever status was requested
pub const DEBUG_PAGE_STATUS: StatusCode = StatusCode::NOT_FOUND;

/// Runtime environment the service is deployed in
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Errors are hidden behind a generic page
    Production,
    /// Errors are rendered in full
    #[default]
    Development,
}

impl Environment {
    /// `"production"` selects production; any other name selects development
    pub fn from_name(name: &str) -> Self {
        if name == "production" {
            Environment::Production
        } else {
            Environment::Development
        }
    }

    /// Whether error details must be hidden
    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Environment::Production => write!(f, "production"),
            Environment::Development => write!(f, "development"),
        }
    }
}

/// The parts of an inbound request needed to render or report an error
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestInfo {
    /// HTTP method
    pub method: String,
    /// Absolute URL when the host is known, otherwise the path
    pub url: String,
    /// Raw query string, without the leading `?`
    pub query_string: Option<String>,
    /// Request headers in arrival order; values that are not valid UTF-8 are dropped
    pub headers: Vec<(String, String)>,
}

impl RequestInfo {
    /// Build from request components
    pub fn from_parts(method: &Method, uri: &Uri, headers: &HeaderMap) -> Self {
        let url = match (uri.scheme_str(), uri.authority()) {
            (Some(scheme), Some(authority)) => format!("{}://{}{}", scheme, authority, uri.path()),
            _ => match headers.get(header::HOST).and_then(|h| h.to_str().ok()) {
                Some(host) => format!("http://{}{}", host, uri.path()),
                None => uri.path().to_string(),
            },
        };

        let headers = headers
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        Self {
            method: method.as_str().to_string(),
            url,
            query_string: uri.query().map(str::to_string),
            headers,
        }
    }

    /// Build from a request
    pub fn from_request<B>(request: &Request<B>) -> Self {
        Self::from_parts(request.method(), request.uri(), request.headers())
    }

    /// First value of a header, matched case-insensitively
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Declared `Content-Type` of the request body
    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }
}

/// Request-scoped key/value context shown on the debug page
///
/// Insert it as a request extension before the error-page middleware runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct RequestData(BTreeMap<String, serde_json::Value>);

impl RequestData {
    /// Create an empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a value
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.0.insert(key.into(), value.into());
    }

    /// Builder form of [`RequestData::insert`]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Look up a value
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A registered route, listed on the debug page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RouteInfo {
    pub method: String,
    pub path: String,
    pub handler_name: String,
}

/// The application's route table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct RouteTable(Vec<RouteInfo>);

impl RouteTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a route
    pub fn route(
        mut self,
        method: impl Into<String>,
        path: impl Into<String>,
        handler_name: impl Into<String>,
    ) -> Self {
        self.0.push(RouteInfo {
            method: method.into(),
            path: path.into(),
            handler_name: handler_name.into(),
        });
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = &RouteInfo> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Everything the renderer may read about the current request
#[derive(Debug, Clone, Default)]
pub struct RenderContext {
    pub environment: Environment,
    pub request: RequestInfo,
    pub data: RequestData,
    pub routes: Arc<RouteTable>,
}

/// Presentation of one chain member
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DisplayRecord {
    /// Error message
    pub msg: String,
    /// Formatted stack trace, empty when the error carries none
    pub stack: String,
    /// Whether the error carried a stack trace
    pub has_stack: bool,
}

/// Display records for the causal chain of `error`, oldest first
pub fn display_records(error: &(dyn StdError + 'static), binder: &TraceBinder) -> Vec<DisplayRecord> {
    let mut records: Vec<DisplayRecord> = error_chain(error)
        .into_iter()
        .map(|item| {
            let (stack, has_stack) = binder.text_of(item);
            DisplayRecord {
                msg: item.to_string(),
                stack,
                has_stack,
            }
        })
        .collect();

    records.reverse();
    records
}

/// Response format selected from the request's declared content type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Json,
    Xml,
    Text,
    Html,
}

impl ContentKind {
    /// Case-insensitive exact match; anything unrecognized is HTML
    pub fn from_content_type(content_type: Option<&str>) -> Self {
        let content_type = content_type.unwrap_or_default().to_ascii_lowercase();
        match content_type.as_str() {
            "application/json" | "text/json" | "json" => ContentKind::Json,
            "application/xml" | "text/xml" | "xml" => ContentKind::Xml,
            "text/plain" => ContentKind::Text,
            _ => ContentKind::Html,
        }
    }
}

#[derive(Serialize)]
struct JsonErrorBody<'a> {
    errors: &'a [DisplayRecord],
    code: u16,
}

#[derive(Serialize)]
struct DebugPage<'a> {
    routes: &'a RouteTable,
    errors: &'a [DisplayRecord],
    status: u16,
    data: &'a RequestData,
}

/// The default error renderer
#[derive(Clone)]
pub struct ErrorRenderer {
    engine: Arc<dyn TemplateEngine>,
    binder: TraceBinder,
}

impl ErrorRenderer {
    /// Renderer using handlebars and the default trace binder
    pub fn new() -> Self {
        Self::with_engine(Arc::new(HandlebarsEngine::new()))
    }

    /// Renderer using a custom template engine
    pub fn with_engine(engine: Arc<dyn TemplateEngine>) -> Self {
        Self {
            engine,
            binder: TraceBinder::default(),
        }
    }

    /// Use `binder` to find stack traces
    pub fn with_binder(mut self, binder: TraceBinder) -> Self {
        self.binder = binder;
        self
    }

    /// Render `error` for the request described by `ctx`
    ///
    /// Template failures and response construction failures are returned.
    pub fn render(
        &self,
        status: StatusCode,
        error: &(dyn StdError + 'static),
        ctx: &RenderContext,
    ) -> Result<Response> {
        if ctx.environment.is_production() {
            return Ok(Response::builder()
                .status(status)
                .header(header::CONTENT_TYPE, "text/html; charset=utf-8")
                .body(Body::from(PROD_ERROR_TEMPLATE))?);
        }

        log_error_chain(error);
        let records = display_records(error, &self.binder);

        match ContentKind::from_content_type(ctx.request.content_type()) {
            ContentKind::Json => {
                let body = serde_json::to_vec(&JsonErrorBody {
                    errors: &records,
                    code: status.as_u16(),
                })?;
                Ok(Response::builder()
                    .status(status)
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body))?)
            }
            ContentKind::Xml => {
                tracing::warn!(status = status.as_u16(), "XML error rendering is not implemented");
                Ok(Response::builder().status(status).body(Body::empty())?)
            }
            ContentKind::Text => Ok(Response::builder()
                .status(status)
                .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
                .body(Body::from(plain_text(&records)))?),
            ContentKind::Html => {
                let data = serde_json::to_value(DebugPage {
                    routes: &ctx.routes,
                    errors: &records,
                    status: status.as_u16(),
                    data: &ctx.data,
                })?;
                let page = self.engine.render(DEV_ERROR_TEMPLATE, &data)?;
                Ok(Response::builder()
                    .status(DEBUG_PAGE_STATUS)
                    .header(header::CONTENT_TYPE, "text/html; charset=utf-8")
                    .body(Body::from(page))?)
            }
        }
    }
}

impl Default for ErrorRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ErrorRenderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorRenderer")
            .field("binder", &self.binder)
            .finish_non_exhaustive()
    }
}

fn plain_text(records: &[DisplayRecord]) -> String {
    let mut out = String::new();
    for record in records {
        out.push_str(&record.msg);
        out.push('\n');
        if record.has_stack {
            for line in record.stack.lines() {
                out.push_str("    ");
                out.push_str(line);
                out.push('\n');
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http_error::HttpError;
    use crate::trace::Traced;
    use crate::FaultlineError;
    use axum::body::to_bytes;
    use serde_json::json;

    fn ctx_with_content_type(content_type: &str) -> RenderContext {
        RenderContext {
            request: RequestInfo {
                method: "GET".to_string(),
                url: "/widgets".to_string(),
                query_string: None,
                headers: vec![("content-type".to_string(), content_type.to_string())],
            },
            ..Default::default()
        }
    }

    async fn body_string(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn outer_inner() -> Traced {
        let inner = std::io::Error::new(std::io::ErrorKind::Other, "inner");
        Traced::wrap(inner, "outer")
    }

    struct FailingEngine;

    impl TemplateEngine for FailingEngine {
        fn render(&self, _template: &str, _data: &serde_json::Value) -> Result<String> {
            Err(FaultlineError::Template("broken".to_string()))
        }
    }

    #[test]
    fn test_environment_from_name() {
        assert_eq!(Environment::from_name("production"), Environment::Production);
        assert_eq!(Environment::from_name("development"), Environment::Development);
        assert_eq!(Environment::from_name(""), Environment::Development);
        assert_eq!(Environment::from_name("Production"), Environment::Development);
    }

    #[test]
    fn test_content_kind() {
        assert_eq!(ContentKind::from_content_type(Some("application/json")), ContentKind::Json);
        assert_eq!(ContentKind::from_content_type(Some("TEXT/JSON")), ContentKind::Json);
        assert_eq!(ContentKind::from_content_type(Some("json")), ContentKind::Json);
        assert_eq!(ContentKind::from_content_type(Some("text/xml")), ContentKind::Xml);
        assert_eq!(ContentKind::from_content_type(Some("text/plain")), ContentKind::Text);
        assert_eq!(ContentKind::from_content_type(Some("application/json; charset=utf-8")), ContentKind::Html);
        assert_eq!(ContentKind::from_content_type(None), ContentKind::Html);
    }

    #[test]
    fn test_display_records_oldest_first() {
        let err = outer_inner();
        let records = display_records(&err, &TraceBinder::default());

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].msg, "inner");
        assert!(!records[0].has_stack);
        assert!(records[0].stack.is_empty());
        assert_eq!(records[1].msg, "outer");
        assert!(records[1].has_stack);
        assert!(!records[1].stack.is_empty());
    }

    #[test]
    fn test_display_record_keys() {
        let record = DisplayRecord {
            msg: "m".to_string(),
            stack: String::new(),
            has_stack: false,
        };
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value, json!({"Msg": "m", "Stack": "", "HasStack": false}));
    }

    #[test]
    fn test_request_info_from_parts() {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/widgets?page=2")
            .header("Host", "example.com")
            .header("Content-Type", "application/json")
            .body(())
            .unwrap();

        let info = RequestInfo::from_request(&request);
        assert_eq!(info.method, "POST");
        assert_eq!(info.url, "http://example.com/widgets");
        assert_eq!(info.query_string.as_deref(), Some("page=2"));
        assert_eq!(info.content_type(), Some("application/json"));
    }

    #[tokio::test]
    async fn test_production_hides_details() {
        let renderer = ErrorRenderer::new();
        let ctx = RenderContext {
            environment: Environment::Production,
            ..ctx_with_content_type("application/json")
        };
        let err = HttpError::internal("secret database password leaked");

        let response = renderer.render(StatusCode::INTERNAL_SERVER_ERROR, &err, &ctx).unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = body_string(response).await;
        assert_eq!(body, PROD_ERROR_TEMPLATE);
        assert!(!body.contains("secret database password"));
    }

    #[tokio::test]
    async fn test_json_rendering() {
        let renderer = ErrorRenderer::new();
        let err = outer_inner();

        let response = renderer
            .render(StatusCode::INTERNAL_SERVER_ERROR, &err, &ctx_with_content_type("application/json"))
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(body["code"], 500);
        assert_eq!(body["errors"][0]["Msg"], "inner");
        assert_eq!(body["errors"][0]["HasStack"], false);
        assert_eq!(body["errors"][1]["Msg"], "outer");
        assert_eq!(body["errors"][1]["HasStack"], true);
    }

    #[tokio::test]
    async fn test_xml_rendering_is_empty() {
        let renderer = ErrorRenderer::new();
        let err = outer_inner();

        let response = renderer
            .render(StatusCode::BAD_REQUEST, &err, &ctx_with_content_type("application/xml"))
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_string(response).await.is_empty());
    }

    #[tokio::test]
    async fn test_text_rendering() {
        let renderer = ErrorRenderer::new();
        let err = outer_inner();

        let response = renderer
            .render(StatusCode::CONFLICT, &err, &ctx_with_content_type("text/plain"))
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let body = body_string(response).await;
        assert!(body.starts_with("inner\nouter\n"));
        assert!(body.contains("\n    "));
    }

    #[tokio::test]
    async fn test_html_rendering_uses_debug_status() {
        let renderer = ErrorRenderer::new();
        let ctx = RenderContext {
            data: RequestData::new().with("current_user", "ada"),
            routes: Arc::new(RouteTable::new().route("GET", "/widgets", "widgets::list")),
            ..ctx_with_content_type("text/html")
        };
        let err = outer_inner();

        let response = renderer.render(StatusCode::INTERNAL_SERVER_ERROR, &err, &ctx).unwrap();
        assert_eq!(response.status(), DEBUG_PAGE_STATUS);

        let body = body_string(response).await;
        assert!(body.contains("500 - ERROR!"));
        assert!(body.contains("<pre>inner</pre>"));
        assert!(body.contains("<pre>outer</pre>"));
        assert!(body.contains("current_user"));
        assert!(body.contains("<code>widgets::list</code>"));
        assert!(body.find("<pre>inner</pre>") < body.find("<pre>outer</pre>"));
    }

    #[test]
    fn test_template_failure_is_returned() {
        let renderer = ErrorRenderer::with_engine(Arc::new(FailingEngine));
        let err = outer_inner();

        let result = renderer.render(StatusCode::INTERNAL_SERVER_ERROR, &err, &ctx_with_content_type(""));
        assert!(matches!(result, Err(FaultlineError::Template(_))));
    }
}
