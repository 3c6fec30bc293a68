//! axum middleware
//!
//! Two middlewares connect handlers to the rest of the crate:
//!
//! - [`error_pages`] replaces responses produced by an [`HttpError`](crate::HttpError)
//!   with the page its status handler renders.
//! - [`report_errors`] submits handler errors and panics to a [`Reporter`].
//!   Panics are re-raised after reporting.
//!
//! Both find the handler's error through the [`ErrorExtension`] the error
//! leaves in the response. Put `report_errors` outermost so it sees panics
//! from every inner layer.
//!
//! ```rust,ignore
//! let app = Router::new()
//!     .route("/", get(index))
//!     .layer(from_fn_with_state(pages, error_pages))
//!     .layer(from_fn_with_state(reporter, report_errors));
//! ```

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use futures::FutureExt;
use tracing::error;

use crate::config::FaultlineConfig;
use crate::handlers::ErrorHandlers;
use crate::http_error::ErrorExtension;
use crate::render::{Environment, RenderContext, RequestData, RequestInfo, RouteTable};
use crate::report::Reporter;

/// State for the [`error_pages`] middleware
#[derive(Debug, Clone, Default)]
pub struct ErrorPages {
    handlers: ErrorHandlers,
    environment: Environment,
    routes: Arc<RouteTable>,
}

impl ErrorPages {
    pub fn new(handlers: ErrorHandlers) -> Self {
        Self {
            handlers,
            ..Default::default()
        }
    }

    /// Error pages for the environment named in `config`
    pub fn from_config(handlers: ErrorHandlers, config: &FaultlineConfig) -> Self {
        Self::new(handlers).with_environment(config.environment)
    }

    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    /// Route table listed on the debug page
    pub fn with_routes(mut self, routes: RouteTable) -> Self {
        self.routes = Arc::new(routes);
        self
    }

    pub fn environment(&self) -> Environment {
        self.environment
    }
}

/// Render error responses through the registered handlers
///
/// Responses without an [`ErrorExtension`] pass through untouched. The
/// extension is carried over to the rendered response. [`RequestData`] is
/// taken from the response extensions if the handler set it, otherwise from
/// the request extensions.
pub async fn error_pages(
    State(pages): State<Arc<ErrorPages>>,
    request: Request,
    next: Next,
) -> Response {
    let info = RequestInfo::from_request(&request);
    let request_data = request.extensions().get::<RequestData>().cloned();

    let mut response = next.run(request).await;
    let Some(extension) = response.extensions_mut().remove::<ErrorExtension>() else {
        return response;
    };
    let data = response
        .extensions_mut()
        .remove::<RequestData>()
        .or(request_data)
        .unwrap_or_default();

    let status = extension.status();
    let ctx = RenderContext {
        environment: pages.environment,
        request: info,
        data,
        routes: Arc::clone(&pages.routes),
    };

    let handler = pages.handlers.get(status);
    let mut rendered = match handler(status, extension.error(), &ctx) {
        Ok(rendered) => rendered,
        Err(e) => {
            error!(status = status.as_u16(), error = %e, "failed to render error page");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    };

    rendered.extensions_mut().insert(extension);
    rendered
}

/// Report handler errors and panics
///
/// Handler errors are reported unless the reporter is in panics-only mode.
/// A panic is reported and then resumed, so an outer layer or the server
/// still sees it.
pub async fn report_errors(
    State(reporter): State<Arc<Reporter>>,
    request: Request,
    next: Next,
) -> Response {
    let info = RequestInfo::from_request(&request);

    match AssertUnwindSafe(next.run(request)).catch_unwind().await {
        Ok(response) => {
            if !reporter.is_panics_only() {
                if let Some(extension) = response.extensions().get::<ErrorExtension>() {
                    reporter.report_error(extension.error(), &info);
                }
            }
            response
        }
        Err(payload) => {
            reporter.report_panic(&*payload, &info);
            std::panic::resume_unwind(payload)
        }
    }
}
