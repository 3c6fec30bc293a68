//! Frame resolution for the reporting backend

use serde::{Deserialize, Serialize};

use super::StackTrace;

/// A stack frame resolved to source code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportedFrame {
    /// Source file, when debug info is available
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    /// Demangled function path without the hash suffix
    pub function: String,
    /// Line number, when debug info is available
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lineno: Option<u32>,
    /// Whether the frame belongs to the application rather than a dependency
    pub in_app: bool,
}

pub(super) struct Symbol {
    pub function: String,
    pub filename: Option<String>,
    pub lineno: Option<u32>,
}

/// Look up the function containing `address`.
///
/// Inlined calls resolve to several symbols; the innermost one wins.
pub(super) fn symbolize(address: usize) -> Option<Symbol> {
    let mut found = None;

    backtrace::resolve(address as *mut std::ffi::c_void, |symbol| {
        if found.is_some() {
            return;
        }
        if let Some(name) = symbol.name() {
            found = Some(Symbol {
                function: format!("{:#}", name),
                filename: symbol.filename().map(|path| path.display().to_string()),
                lineno: symbol.lineno(),
            });
        }
    });

    found
}

/// Whether a frame's file or module path starts with one of `prefixes`
pub fn is_in_app(filename: Option<&str>, function: &str, prefixes: &[String]) -> bool {
    prefixes.iter().any(|prefix| {
        !prefix.is_empty()
            && (function.starts_with(prefix.as_str())
                || filename.is_some_and(|file| file.starts_with(prefix.as_str())))
    })
}

/// Resolve `trace` into reportable frames, outermost call first.
///
/// Addresses that do not map to a function are skipped.
pub fn resolve_frames(trace: &StackTrace, prefixes: &[String]) -> Vec<ReportedFrame> {
    let mut frames: Vec<ReportedFrame> = trace
        .addresses()
        .iter()
        .filter_map(|&address| symbolize(address))
        .map(|symbol| {
            let in_app = is_in_app(symbol.filename.as_deref(), &symbol.function, prefixes);
            ReportedFrame {
                filename: symbol.filename,
                function: symbol.function,
                lineno: symbol.lineno,
                in_app,
            }
        })
        .collect();

    frames.reverse();
    frames
}

#[cfg(test)]
mod tests {
    use super::*;

    const UNRESOLVABLE: usize = 0x1;

    #[test]
    fn test_unresolvable_frame_is_skipped() {
        let captured = StackTrace::capture(0);
        let resolvable = captured.addresses()[0];
        let trace = StackTrace::from_addresses(vec![resolvable, UNRESOLVABLE]);

        let frames = resolve_frames(&trace, &[]);
        assert_eq!(frames.len(), 1);
        assert!(!frames[0].function.is_empty());
    }

    #[test]
    fn test_empty_trace() {
        let frames = resolve_frames(&StackTrace::default(), &[]);
        assert!(frames.is_empty());
    }

    #[test]
    fn test_frames_outermost_first() {
        let trace = StackTrace::capture(0);
        let innermost = symbolize(trace.addresses()[0]).unwrap().function;

        let frames = resolve_frames(&trace, &[]);
        assert_eq!(frames.last().unwrap().function, innermost);
    }

    #[test]
    fn test_in_app_by_module_path() {
        let prefixes = vec!["faultline::".to_string()];
        let trace = StackTrace::capture(0);

        let frames = resolve_frames(&trace, &prefixes);
        assert!(frames
            .iter()
            .any(|f| f.function.contains("test_in_app_by_module_path") && f.in_app));
        assert!(frames.iter().any(|f| !f.in_app));
    }

    #[test]
    fn test_is_in_app() {
        let prefixes = vec!["my_app::".to_string(), "/srv/my_app/".to_string()];

        assert!(is_in_app(None, "my_app::handlers::show", &prefixes));
        assert!(is_in_app(Some("/srv/my_app/src/main.rs"), "main", &prefixes));
        assert!(!is_in_app(Some("/cargo/registry/tokio/src/lib.rs"), "tokio::spawn", &prefixes));
        assert!(!is_in_app(Some("/srv/my_app/src/main.rs"), "main", &[String::new()]));
    }
}
