//! Captured call stacks
//!
//! A [`StackTrace`] is a list of code addresses recorded when an error was
//! created. Errors expose one through the optional [`StackTracer`]
//! capability; [`TraceBinder`] probes chain members for it and
//! [`resolve_frames`] turns a trace into frames for the reporting backend.

mod binder;
mod frame;

pub use binder::TraceBinder;
pub use frame::{is_in_app, resolve_frames, ReportedFrame};

use std::error::Error as StdError;
use std::fmt;

use crate::BoxError;

/// Deepest stack recorded by [`StackTrace::capture`]
const MAX_DEPTH: usize = 64;

/// Whether `function` belongs to the panic runtime rather than the code that panicked
///
/// `std::panicking::try` and `catch_unwind` are left out: they sit outside
/// the panicking code.
fn is_panic_machinery(function: &str) -> bool {
    const RUNTIME: &[&str] = &[
        "core::panicking::",
        "std::panicking::begin_panic",
        "std::panicking::panic_handler",
        "std::panicking::panic_with_hook",
        "std::panicking::rust_panic_with_hook",
        "std::panicking::default_hook",
        "std::panic::panic_any",
        "std::rt::begin_panic",
    ];

    RUNTIME.iter().any(|prefix| function.starts_with(prefix))
        || function.contains("__rust_end_short_backtrace")
        || function == "rust_begin_unwind"
}

/// A call stack captured at a point in the program
///
/// Addresses are stored innermost call first, each pointing into the call
/// instruction rather than at the return address, so they symbolize to the
/// line that made the call.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct StackTrace {
    addresses: Vec<usize>,
}

impl StackTrace {
    /// Capture the current call stack
    ///
    /// Frames belonging to the capture machinery are dropped, then `skip`
    /// more frames are skipped so callers can hide their own wrappers.
    #[inline(never)]
    pub fn capture(skip: usize) -> Self {
        let this = Self::capture as usize;
        let mut raw = Vec::new();
        let mut own_frame = None;

        backtrace::trace(|frame| {
            if own_frame.is_none() && frame.symbol_address() as usize == this {
                own_frame = Some(raw.len());
            }
            raw.push(frame.ip() as usize);
            raw.len() < MAX_DEPTH + skip + 8
        });

        let start = own_frame.map_or(0, |i| i + 1) + skip;
        let addresses = raw
            .into_iter()
            .skip(start)
            .take(MAX_DEPTH)
            .map(|ip| ip.saturating_sub(1))
            .collect();

        Self { addresses }
    }

    /// Capture from inside a panic hook
    ///
    /// Drops the hook's own frames and the panic runtime, so the innermost
    /// frame is the function that panicked. If the runtime frames cannot be
    /// symbolized the whole stack is kept.
    #[inline(never)]
    pub fn capture_panic() -> Self {
        let mut trace = Self::capture(1);
        if let Some(site) = trace.panic_site() {
            trace.addresses.drain(..site);
        }
        trace
    }

    /// Index of the first frame past the innermost run of panic runtime frames
    fn panic_site(&self) -> Option<usize> {
        let is_machinery = |address: usize| {
            frame::symbolize(address).is_some_and(|symbol| is_panic_machinery(&symbol.function))
        };

        let start = self.addresses.iter().position(|&a| is_machinery(a))?;
        let run = self.addresses[start..]
            .iter()
            .take_while(|&&a| is_machinery(a))
            .count();
        Some(start + run)
    }

    /// Build a trace from already adjusted code addresses
    pub fn from_addresses(addresses: Vec<usize>) -> Self {
        Self { addresses }
    }

    /// Code addresses, innermost call first
    pub fn addresses(&self) -> &[usize] {
        &self.addresses
    }

    /// Number of recorded frames
    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    /// Whether no frames were recorded
    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }
}

/// Verbose form: one frame per line pair, deepest call first
///
/// ```text
/// my_app::handlers::show
/// 	/src/handlers.rs:42
/// ```
impl fmt::Display for StackTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, &address) in self.addresses.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            match frame::symbolize(address) {
                Some(symbol) => {
                    write!(f, "{}", symbol.function)?;
                    match (&symbol.filename, symbol.lineno) {
                        (Some(file), Some(line)) => write!(f, "\n\t{}:{}", file, line)?,
                        (Some(file), None) => write!(f, "\n\t{}", file)?,
                        _ => write!(f, "\n\t<unknown>")?,
                    }
                }
                None => write!(f, "{:#x}\n\t<unknown>", address)?,
            }
        }
        Ok(())
    }
}

impl fmt::Debug for StackTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StackTrace")
            .field("frames", &self.addresses.len())
            .finish()
    }
}

/// Type name of `E` when it names a concrete error type
///
/// Message types and boxed trait objects say nothing about the error that
/// ends up behind them and yield `None`.
pub(crate) fn concrete_type_name<E>() -> Option<&'static str> {
    let name = std::any::type_name::<E>();
    let erased = name.starts_with('&')
        || name.starts_with("alloc::boxed::Box<")
        || name.starts_with("alloc::borrow::Cow<")
        || name == "alloc::string::String";
    (!erased).then_some(name)
}

/// Capability of errors that carry a captured call stack
pub trait StackTracer {
    /// The stack captured when the error was created
    fn stack_trace(&self) -> &StackTrace;
}

/// An error message with the call stack captured where it was created
///
/// Optionally wraps the error that caused it, which becomes its `source()`.
#[derive(Debug)]
pub struct Traced {
    message: String,
    source: Option<BoxError>,
    source_type: Option<&'static str>,
    stack: StackTrace,
}

impl Traced {
    /// A new root error with a captured stack
    #[inline(never)]
    pub fn msg(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
            source_type: None,
            stack: StackTrace::capture(1),
        }
    }

    /// Wrap `error` with a message and a captured stack
    #[inline(never)]
    pub fn wrap<E>(error: E, message: impl Into<String>) -> Self
    where
        E: Into<BoxError>,
    {
        Self {
            message: message.into(),
            source: Some(error.into()),
            source_type: concrete_type_name::<E>(),
            stack: StackTrace::capture(1),
        }
    }

    /// Attach a captured stack to `error`, keeping its message
    #[inline(never)]
    pub fn with_stack<E>(error: E) -> Self
    where
        E: Into<BoxError>,
    {
        let error = error.into();
        Self {
            message: error.to_string(),
            source: Some(error),
            source_type: concrete_type_name::<E>(),
            stack: StackTrace::capture(1),
        }
    }

    /// The message this error was created with
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Type name of the wrapped error, when it was known at the wrap site
    pub fn source_type_name(&self) -> Option<&'static str> {
        self.source_type
    }
}

impl fmt::Display for Traced {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl StdError for Traced {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source.as_deref().map(|e| e as &(dyn StdError + 'static))
    }
}

impl StackTracer for Traced {
    fn stack_trace(&self) -> &StackTrace {
        &self.stack
    }
}
