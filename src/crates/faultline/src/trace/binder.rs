//! Stack trace binding for chain members
//!
//! `std::error::Error` has no stable way to ask an error for its captured
//! stack, so the binder keeps a list of probes. Each probe tries to downcast
//! an error to one concrete type implementing [`StackTracer`].

use std::error::Error as StdError;
use std::fmt;

use super::{StackTrace, StackTracer, Traced};

type Probe = for<'a> fn(&'a (dyn StdError + 'static)) -> Option<&'a dyn StackTracer>;

fn probe<'a, T>(error: &'a (dyn StdError + 'static)) -> Option<&'a dyn StackTracer>
where
    T: StdError + StackTracer + 'static,
{
    error.downcast_ref::<T>().map(|t| t as &dyn StackTracer)
}

/// Finds the captured stack of an error, if it has one
#[derive(Clone)]
pub struct TraceBinder {
    probes: Vec<Probe>,
}

impl TraceBinder {
    /// A binder that recognizes [`Traced`] errors
    pub fn new() -> Self {
        Self {
            probes: vec![probe::<Traced> as Probe],
        }
    }

    /// Also recognize errors of type `T`
    pub fn with_tracer<T>(mut self) -> Self
    where
        T: StdError + StackTracer + 'static,
    {
        self.probes.push(probe::<T>);
        self
    }

    /// The stack captured by `error`, if it exposes one
    pub fn trace_of<'a>(&self, error: &'a (dyn StdError + 'static)) -> Option<&'a StackTrace> {
        self.probes
            .iter()
            .find_map(|probe| probe(error))
            .map(|tracer| tracer.stack_trace())
    }

    /// Formatted trace text and whether a trace was present
    ///
    /// Errors without a trace yield an empty string and `false`.
    pub fn text_of(&self, error: &(dyn StdError + 'static)) -> (String, bool) {
        match self.trace_of(error) {
            Some(trace) => (trace.to_string(), true),
            None => (String::new(), false),
        }
    }
}

impl Default for TraceBinder {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TraceBinder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TraceBinder")
            .field("probes", &self.probes.len())
            .finish()
    }
}
