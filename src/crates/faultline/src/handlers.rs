//! Per-status error handlers
//!
//! An [`ErrorHandlers`] registry maps status codes to handlers. Statuses
//! without a registered handler fall back to the default [`ErrorRenderer`].
//!
//! ```rust,ignore
//! let handlers = ErrorHandlers::default().register(StatusCode::NOT_FOUND, |status, _err, _ctx| {
//!     Ok((status, "nothing here").into_response())
//! });
//! ```

use std::collections::HashMap;
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use axum::{http::StatusCode, response::Response};

use crate::render::{ErrorRenderer, RenderContext};
use crate::Result;

/// Handles an error for a specific status code
pub type ErrorHandler =
    Arc<dyn Fn(StatusCode, &(dyn StdError + 'static), &RenderContext) -> Result<Response> + Send + Sync>;

/// Registry of error handlers keyed by status code
#[derive(Clone)]
pub struct ErrorHandlers {
    handlers: HashMap<StatusCode, ErrorHandler>,
    fallback: ErrorHandler,
}

impl ErrorHandlers {
    /// Registry whose fallback is `renderer`
    pub fn new(renderer: ErrorRenderer) -> Self {
        let fallback: ErrorHandler = Arc::new(
            move |status: StatusCode, err: &(dyn StdError + 'static), ctx: &RenderContext| {
                renderer.render(status, err, ctx)
            },
        );
        Self {
            handlers: HashMap::new(),
            fallback,
        }
    }

    /// Register a handler for `status`
    pub fn register<F>(mut self, status: StatusCode, handler: F) -> Self
    where
        F: Fn(StatusCode, &(dyn StdError + 'static), &RenderContext) -> Result<Response>
            + Send
            + Sync
            + 'static,
    {
        self.handlers.insert(status, Arc::new(handler));
        self
    }

    /// Handler for `status`, or the default renderer if none was registered
    pub fn get(&self, status: StatusCode) -> ErrorHandler {
        self.handlers
            .get(&status)
            .cloned()
            .unwrap_or_else(|| Arc::clone(&self.fallback))
    }

    /// Whether a custom handler exists for `status`
    pub fn contains(&self, status: StatusCode) -> bool {
        self.handlers.contains_key(&status)
    }
}

impl Default for ErrorHandlers {
    fn default() -> Self {
        Self::new(ErrorRenderer::default())
    }
}

impl fmt::Debug for ErrorHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut statuses: Vec<u16> = self.handlers.keys().map(|s| s.as_u16()).collect();
        statuses.sort_unstable();
        f.debug_struct("ErrorHandlers")
            .field("statuses", &statuses)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http_error::HttpError;
    use crate::render::Environment;
    use axum::response::IntoResponse;

    #[test]
    fn test_registered_handler_is_used() {
        let handlers = ErrorHandlers::default().register(StatusCode::IM_A_TEAPOT, |_, _, _| {
            Ok((StatusCode::IM_A_TEAPOT, "short and stout").into_response())
        });
        let err = HttpError::new(StatusCode::IM_A_TEAPOT, "no coffee");

        assert!(handlers.contains(StatusCode::IM_A_TEAPOT));
        let response = handlers.get(StatusCode::IM_A_TEAPOT)(
            StatusCode::IM_A_TEAPOT,
            &err,
            &RenderContext::default(),
        )
        .unwrap();
        assert_eq!(response.status(), StatusCode::IM_A_TEAPOT);
    }

    #[test]
    fn test_fallback_is_default_renderer() {
        let handlers = ErrorHandlers::default();
        let ctx = RenderContext {
            environment: Environment::Production,
            ..Default::default()
        };
        let err = HttpError::internal("hidden");

        assert!(!handlers.contains(StatusCode::INTERNAL_SERVER_ERROR));
        let response = handlers.get(StatusCode::INTERNAL_SERVER_ERROR)(
            StatusCode::INTERNAL_SERVER_ERROR,
            &err,
            &ctx,
        )
        .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
