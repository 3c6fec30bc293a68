//! Sentry reporting
//!
//! A [`Reporter`] turns handler errors and recovered panics into Sentry
//! packets and hands them to a [`Transport`] on a spawned task. Submission
//! is fire-and-forget: failures are logged and dropped, and nothing is
//! retried.
//!
//! # Example
//!
//! ```rust,ignore
//! use faultline::report::{Reporter, transport::{Dsn, HttpTransport}};
//!
//! let transport = HttpTransport::new(Dsn::parse(&dsn)?)?;
//! let reporter = Reporter::new(Arc::new(transport))
//!     .with_prefixes(vec!["my_app::".to_string()]);
//! ```

pub mod packet;
pub mod transport;

use std::any::Any;
use std::cell::RefCell;
use std::error::Error as StdError;
use std::fmt;
use std::sync::{Arc, Once};

use tracing::{debug, warn};

use crate::chain::error_chain;
use crate::config::FaultlineConfig;
use crate::logging::HeaderScrubber;
use crate::render::RequestInfo;
use crate::trace::{resolve_frames, StackTrace, StackTracer, TraceBinder};
use crate::Result;

use packet::{exception_type, Exception, HttpContext, Level, Packet};
use transport::{Dsn, HttpTransport, NoopTransport, Transport};

/// Frames skipped when a panic trace has to be captured after unwinding
const PANIC_SKIP: usize = 1;

/// Stack recorded by the panic hook, keyed by the panic's message
struct RecordedPanic {
    message: String,
    trace: StackTrace,
}

thread_local! {
    static PANIC_TRACE: RefCell<Option<RecordedPanic>> = const { RefCell::new(None) };
}

/// Record the call stack of every panic for the reporter
///
/// Without the hook, panic reports carry the stack of the middleware that
/// caught the panic rather than the panic site. The previously installed hook
/// still runs. Installing more than once has no effect.
pub fn install_panic_hook() {
    static INSTALL: Once = Once::new();

    INSTALL.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let recorded = RecordedPanic {
                message: panic_message(info.payload()),
                trace: StackTrace::capture_panic(),
            };
            PANIC_TRACE.with(|slot| {
                if let Ok(mut slot) = slot.try_borrow_mut() {
                    *slot = Some(recorded);
                }
            });
            previous(info);
        }));
    });
}

/// Take the stack the panic hook recorded on this thread for a panic with `message`
///
/// The slot is cleared either way. A trace left behind by an earlier panic
/// that was never reported, or a payload re-raised without running the hook,
/// does not match and yields `None`.
pub fn take_panic_trace(message: &str) -> Option<StackTrace> {
    PANIC_TRACE
        .with(|slot| slot.try_borrow_mut().ok().and_then(|mut slot| slot.take()))
        .filter(|recorded| recorded.message == message)
        .map(|recorded| recorded.trace)
}

/// Text of a panic payload
///
/// `panic!` payloads are `&str` or `String`; anything else is described
/// generically.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Box<dyn Any>".to_string()
    }
}

/// Error synthesized from a recovered panic
#[derive(Debug)]
pub struct PanicError {
    message: String,
    stack: StackTrace,
}

impl PanicError {
    pub fn new(message: impl Into<String>, stack: StackTrace) -> Self {
        Self {
            message: message.into(),
            stack,
        }
    }
}

impl fmt::Display for PanicError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl StdError for PanicError {}

impl StackTracer for PanicError {
    fn stack_trace(&self) -> &StackTrace {
        &self.stack
    }
}

/// Reports errors and panics to the remote backend
#[derive(Clone)]
pub struct Reporter {
    transport: Arc<dyn Transport>,
    prefixes: Vec<String>,
    panics_only: bool,
    scrubber: Option<HeaderScrubber>,
    binder: TraceBinder,
    environment: Option<String>,
    release: Option<String>,
}

impl Reporter {
    /// Create a reporter submitting through `transport`
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            prefixes: Vec::new(),
            panics_only: false,
            scrubber: Some(HeaderScrubber::default()),
            binder: TraceBinder::new().with_tracer::<PanicError>(),
            environment: None,
            release: None,
        }
    }

    /// A reporter that drops everything
    pub fn noop() -> Self {
        Self::new(Arc::new(NoopTransport))
    }

    /// Build from configuration; without a DSN reports are discarded
    pub fn from_config(config: &FaultlineConfig) -> Result<Self> {
        let transport: Arc<dyn Transport> = match &config.dsn {
            Some(dsn) => Arc::new(HttpTransport::new(Dsn::parse(dsn)?)?),
            None => Arc::new(NoopTransport),
        };

        let mut reporter = Self::new(transport)
            .with_prefixes(config.app_prefixes.clone())
            .panics_only(config.panics_only)
            .with_environment(config.environment.to_string());
        if !config.scrub_headers {
            reporter = reporter.with_scrubber(None);
        }
        if let Some(release) = &config.release {
            reporter = reporter.with_release(release.clone());
        }
        Ok(reporter)
    }

    /// Module or file prefixes identifying application frames
    pub fn with_prefixes(mut self, prefixes: Vec<String>) -> Self {
        self.prefixes = prefixes;
        self
    }

    /// Only report panics, not handler errors
    pub fn panics_only(mut self, panics_only: bool) -> Self {
        self.panics_only = panics_only;
        self
    }

    /// Header scrubber for request metadata; `None` reports all headers
    pub fn with_scrubber(mut self, scrubber: Option<HeaderScrubber>) -> Self {
        self.scrubber = scrubber;
        self
    }

    /// Trace binder used to find stacks on chain members
    pub fn with_binder(mut self, binder: TraceBinder) -> Self {
        self.binder = binder.with_tracer::<PanicError>();
        self
    }

    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = Some(environment.into());
        self
    }

    pub fn with_release(mut self, release: impl Into<String>) -> Self {
        self.release = Some(release.into());
        self
    }

    pub fn is_panics_only(&self) -> bool {
        self.panics_only
    }

    /// Packet describing the causal chain of `error`
    ///
    /// One exception per chain member, oldest first. The message is the
    /// root cause's message.
    pub fn error_packet(&self, error: &(dyn StdError + 'static), request: Option<&RequestInfo>) -> Packet {
        self.build_packet(error, Level::Error, request)
    }

    /// Packet describing a recovered panic
    pub fn panic_packet(
        &self,
        payload: &(dyn Any + Send),
        trace: StackTrace,
        request: Option<&RequestInfo>,
    ) -> Packet {
        let error = PanicError::new(panic_message(payload), trace);
        self.build_packet(&error, Level::Fatal, request)
    }

    /// Report a handler error, fire-and-forget
    pub fn report_error(&self, error: &(dyn StdError + 'static), request: &RequestInfo) {
        let packet = self.error_packet(error, Some(request));
        self.submit(packet);
    }

    /// Report a recovered panic, fire-and-forget
    ///
    /// Uses the stack recorded by [`install_panic_hook`] when available.
    /// Re-raising the panic is left to the caller.
    #[inline(never)]
    pub fn report_panic(&self, payload: &(dyn Any + Send), request: &RequestInfo) {
        let trace = take_panic_trace(&panic_message(payload))
            .unwrap_or_else(|| StackTrace::capture(PANIC_SKIP));
        let packet = self.panic_packet(payload, trace, Some(request));
        self.submit(packet);
    }

    fn build_packet(
        &self,
        error: &(dyn StdError + 'static),
        level: Level,
        request: Option<&RequestInfo>,
    ) -> Packet {
        let chain = error_chain(error);
        let mut exceptions: Vec<Exception> = chain
            .iter()
            .enumerate()
            .map(|(depth, &item)| {
                let parent = depth.checked_sub(1).map(|outer| chain[outer]);
                let frames = self
                    .binder
                    .trace_of(item)
                    .map(|trace| resolve_frames(trace, &self.prefixes))
                    .unwrap_or_default();
                Exception::with_kind(exception_type(item, parent), item, frames)
            })
            .collect();
        exceptions.reverse();

        let message = exceptions
            .first()
            .map(|root| root.value.clone())
            .unwrap_or_default();

        let mut packet = Packet::new(message, level, exceptions);
        packet.environment = self.environment.clone();
        packet.release = self.release.clone();
        if let Some(request) = request {
            packet = packet.with_request(HttpContext::from_request(request, self.scrubber.as_ref()));
        }
        packet
    }

    fn submit(&self, packet: Packet) {
        let transport = Arc::clone(&self.transport);

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                debug!(event_id = %packet.event_id, "submitting error report");
                handle.spawn(async move {
                    if let Err(e) = transport.send(&packet).await {
                        warn!(event_id = %packet.event_id, error = %e, "failed to deliver error report");
                    }
                });
            }
            Err(_) => {
                warn!(event_id = %packet.event_id, "no async runtime, dropping error report");
            }
        }
    }
}

impl fmt::Debug for Reporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reporter")
            .field("prefixes", &self.prefixes)
            .field("panics_only", &self.panics_only)
            .field("environment", &self.environment)
            .finish_non_exhaustive()
    }
}
