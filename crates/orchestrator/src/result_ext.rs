//! Result extension trait for logging errors with context.

use std::fmt::Display;
use tracing::error;

/// Extension trait that logs an `Err` with context and source location.
pub trait ResultExt<T, E> {
    /// Log the error with context if this is an `Err` variant.
    ///
    /// Returns the original `Result` unchanged so it can be chained before `?`.
    ///
    /// ```ignore
    /// use bpmn_orchestrator::result_ext::ResultExt;
    ///
    /// let definition = compile(xml).log("compiling workflow")?;
    /// ```
    fn log<S: ToString>(self, context: S) -> Result<T, E>;
}

impl<T, E: Display> ResultExt<T, E> for Result<T, E> {
    #[track_caller]
    fn log<S: ToString>(self, context: S) -> Result<T, E> {
        if let Err(ref e) = self {
            let caller_location = std::panic::Location::caller();
            error!(
                target: "bpmn_orchestrator",
                error = %e,
                file = %format!("{}:{}", caller_location.file(), caller_location.line()),
                context = %context.to_string(),
                "Operation failed"
            );
        }
        self
    }
}
