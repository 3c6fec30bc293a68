//! Status-carrying errors for axum handlers
//!
//! Handlers return `Result<_, HttpError>`. Converting an [`HttpError`] into a
//! response produces a bare status response carrying the error in its
//! extensions; the error-page and reporting middlewares pick it up from
//! there.

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::trace::{concrete_type_name, Traced};
use crate::BoxError;

/// An error returned by an HTTP handler, tagged with the status to respond with
///
/// The wrapped error is its cause; its message is the cause's message.
#[derive(Debug)]
pub struct HttpError {
    status: StatusCode,
    caused_by: BoxError,
    cause_type: Option<&'static str>,
}

impl HttpError {
    /// Create a new HTTP error
    pub fn new<E>(status: StatusCode, error: E) -> Self
    where
        E: Into<BoxError>,
    {
        Self {
            status,
            caused_by: error.into(),
            cause_type: concrete_type_name::<E>(),
        }
    }

    /// A 500 Internal Server Error
    pub fn internal<E>(error: E) -> Self
    where
        E: Into<BoxError>,
    {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, error)
    }

    /// A 404 Not Found
    pub fn not_found<E>(error: E) -> Self
    where
        E: Into<BoxError>,
    {
        Self::new(StatusCode::NOT_FOUND, error)
    }

    /// Type name of the cause, when it was known at construction
    pub fn cause_type_name(&self) -> Option<&'static str> {
        self.cause_type
    }

    /// Status to respond with
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// The wrapped error
    pub fn cause(&self) -> &(dyn StdError + Send + Sync + 'static) {
        self.caused_by.as_ref()
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.caused_by, f)
    }
}

impl StdError for HttpError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(self.caused_by.as_ref() as &(dyn StdError + 'static))
    }
}

impl From<Traced> for HttpError {
    fn from(err: Traced) -> Self {
        Self::internal(err)
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let status = self.status;
        let reason = status.canonical_reason().unwrap_or("Error");

        let mut response = (status, reason).into_response();
        response.extensions_mut().insert(ErrorExtension::new(self));
        response
    }
}

/// Response extension carrying the handler's error to the middlewares
#[derive(Debug, Clone)]
pub struct ErrorExtension(Arc<HttpError>);

impl ErrorExtension {
    /// Wrap an error for storage in response extensions
    pub fn new(error: HttpError) -> Self {
        Self(Arc::new(error))
    }

    /// Status the handler asked for
    pub fn status(&self) -> StatusCode {
        self.0.status()
    }

    /// The handler's error
    pub fn error(&self) -> &HttpError {
        &self.0
    }
}

/// Attach an HTTP status to the error of a `Result`
pub trait HttpResultExt<T> {
    /// Map the error into an [`HttpError`] with `status`
    fn http_status(self, status: StatusCode) -> Result<T, HttpError>;
}

impl<T, E> HttpResultExt<T> for Result<T, E>
where
    E: Into<BoxError>,
{
    fn http_status(self, status: StatusCode) -> Result<T, HttpError> {
        self.map_err(|e| HttpError::new(status, e))
    }
}
