//! Driver error types.
//!
//! Note: some fields are only read by miette's `#[derive(Diagnostic)]`
//! expansion.

#![allow(unused_assignments, reason = "fields are read by the miette derive")]

use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

/// Failures of the driver itself, as opposed to diagnostics about the
/// analyzed program.
#[derive(Error, Debug, Diagnostic)]
pub enum DriverError {
    /// The analysis configuration could not be parsed.
    #[error("invalid analysis configuration: {message}")]
    #[diagnostic(code(driver::invalid_config), help("see `AnalysisConfig` for the accepted keys"))]
    InvalidConfig {
        /// What is wrong
        message: String,
        /// Where in the file, if known
        #[label("{message}")]
        span: Option<SourceSpan>,
        /// The configuration text
        #[source_code]
        src: NamedSource<String>,
    },

    /// Functions still carry error diagnostics.
    #[error("{errors} error(s) in {}", functions.join(", "))]
    #[diagnostic(
        code(driver::analysis_failed),
        help("functions with errors are not handed to code generation")
    )]
    AnalysisFailed {
        /// Number of error diagnostics
        errors: usize,
        /// Functions that reported them
        functions: Vec<String>,
    },

    /// Diagnostics could not be rendered against the source files.
    #[error("failed to render diagnostics: {message}")]
    #[diagnostic(code(driver::render))]
    Render {
        /// Underlying failure
        message: String,
    },
}
