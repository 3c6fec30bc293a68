//! Sentry event wire format
//!
//! Only the parts of the event payload this crate fills in are modelled.

use std::error::Error as StdError;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::http_error::HttpError;
use crate::logging::HeaderScrubber;
use crate::render::RequestInfo;
use crate::report::PanicError;
use crate::trace::{ReportedFrame, Traced};

/// Event severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Error,
    Fatal,
}

/// A single event submitted to Sentry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Packet {
    /// 32 hex digit event id
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub level: Level,
    pub platform: String,
    pub logger: String,
    /// Top-level message; the root cause's message for error chains
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release: Option<String>,
    /// Exceptions, oldest first
    pub exception: ExceptionValues,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<HttpContext>,
}

impl Packet {
    /// Create a packet with a fresh event id and the current time
    pub fn new(message: impl Into<String>, level: Level, exceptions: Vec<Exception>) -> Self {
        Self {
            event_id: Uuid::new_v4().simple().to_string(),
            timestamp: Utc::now(),
            level,
            platform: "rust".to_string(),
            logger: env!("CARGO_PKG_NAME").to_string(),
            message: message.into(),
            environment: None,
            release: None,
            exception: ExceptionValues { values: exceptions },
            request: None,
        }
    }

    /// Attach the HTTP request the event happened in
    pub fn with_request(mut self, request: HttpContext) -> Self {
        self.request = Some(request);
        self
    }

    /// Exceptions in the packet, oldest first
    pub fn exceptions(&self) -> &[Exception] {
        &self.exception.values
    }
}

/// Container for the exception list, as the ingestion API expects it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExceptionValues {
    pub values: Vec<Exception>,
}

/// One member of an error chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exception {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stacktrace: Option<Stacktrace>,
}

impl Exception {
    /// Exception for `error` with optional resolved frames
    pub fn from_error(error: &(dyn StdError + 'static), frames: Vec<ReportedFrame>) -> Self {
        Self::with_kind(exception_type(error, None), error, frames)
    }

    /// Exception for `error` reported as type `kind`
    pub fn with_kind(
        kind: String,
        error: &(dyn StdError + 'static),
        frames: Vec<ReportedFrame>,
    ) -> Self {
        Self {
            kind,
            value: error.to_string(),
            stacktrace: if frames.is_empty() {
                None
            } else {
                Some(Stacktrace { frames })
            },
        }
    }
}

/// Resolved frames, outermost call first
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stacktrace {
    pub frames: Vec<ReportedFrame>,
}

/// The request an event happened in
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpContext {
    pub method: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_string: Option<String>,
    pub headers: Vec<(String, String)>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl HttpContext {
    /// Build from request metadata, dropping sensitive headers when a scrubber is given
    pub fn from_request(request: &RequestInfo, scrubber: Option<&HeaderScrubber>) -> Self {
        let headers = match scrubber {
            Some(scrubber) => scrubber.scrub(&request.headers),
            None => request.headers.clone(),
        };

        Self {
            method: request.method.clone(),
            url: request.url.clone(),
            query_string: request.query_string.clone(),
            headers,
            data: None,
        }
    }
}

/// Type reported for `error`, found as the source of `parent`
///
/// This crate's own errors are named directly. Other errors take the type
/// name their wrapper recorded; failing that, the `Debug` output is used.
pub fn exception_type(
    error: &(dyn StdError + 'static),
    parent: Option<&(dyn StdError + 'static)>,
) -> String {
    let known = if error.is::<Traced>() {
        Some(std::any::type_name::<Traced>())
    } else if error.is::<HttpError>() {
        Some(std::any::type_name::<HttpError>())
    } else if error.is::<PanicError>() {
        Some(std::any::type_name::<PanicError>())
    } else {
        parent.and_then(recorded_source_type)
    };

    known.map_or_else(|| type_name_of(error), str::to_string)
}

fn recorded_source_type(parent: &(dyn StdError + 'static)) -> Option<&'static str> {
    if let Some(traced) = parent.downcast_ref::<Traced>() {
        traced.source_type_name()
    } else if let Some(http) = parent.downcast_ref::<HttpError>() {
        http.cause_type_name()
    } else {
        None
    }
}

/// Best-effort type name for an error: the leading identifier of its `Debug` output
pub fn type_name_of(error: &(dyn StdError + 'static)) -> String {
    let debug = format!("{:?}", error);
    let end = debug
        .find(|c: char| !(c.is_alphanumeric() || c == '_' || c == ':'))
        .unwrap_or(debug.len());

    if end == 0 {
        "Error".to_string()
    } else {
        debug[..end].to_string()
    }
}
