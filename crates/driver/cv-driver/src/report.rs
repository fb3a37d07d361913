//! Analysis results per function and per module.

use cv_diagnostics::{Diagnostic, Severity};
use serde::Serialize;

use crate::annotate::AnnotatedBody;
use crate::error::DriverError;

/// Everything the analyses produced for one function
#[derive(Debug, Clone, Serialize)]
pub struct FunctionReport {
    /// Function name
    pub name: String,
    /// Diagnostics ordered by position, then kind
    pub diagnostics: Vec<Diagnostic>,
    /// Conventions and variants for code generation
    pub annotations: AnnotatedBody,
}

impl FunctionReport {
    /// Returns `true` if any diagnostic is an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }

    /// Whether the function may be handed to code generation.
    #[must_use]
    pub fn codegen_ready(&self) -> bool {
        !self.has_errors()
    }

    /// Error diagnostics.
    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|diag| diag.is_error())
    }

    /// Warning diagnostics.
    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|diag| diag.severity == Severity::Warning)
    }

    /// `summary()` of every diagnostic, one per line.
    #[must_use]
    pub fn summaries(&self) -> String {
        self.diagnostics
            .iter()
            .map(|diag| format!("{}\n", diag.summary()))
            .collect()
    }
}

/// Reports for every function of a module, in module order
#[derive(Debug, Clone, Default, Serialize)]
pub struct ModuleReport {
    /// Per-function reports
    pub functions: Vec<FunctionReport>,
}

impl ModuleReport {
    /// Returns `true` if any function reported an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.functions.iter().any(FunctionReport::has_errors)
    }

    /// Report of the function named `name`.
    #[must_use]
    pub fn function(&self, name: &str) -> Option<&FunctionReport> {
        self.functions.iter().find(|report| report.name == name)
    }

    /// All diagnostics, function by function.
    pub fn diagnostics(&self) -> impl Iterator<Item = &Diagnostic> {
        self.functions
            .iter()
            .flat_map(|report| report.diagnostics.iter())
    }

    /// Functions that may be handed to code generation.
    pub fn codegen_ready(&self) -> impl Iterator<Item = &FunctionReport> {
        self.functions.iter().filter(|report| report.codegen_ready())
    }

    /// Fails if any function carries an error diagnostic.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::AnalysisFailed`] naming the failing functions.
    pub fn ensure_codegen_ready(&self) -> Result<(), DriverError> {
        let failing: Vec<&FunctionReport> = self
            .functions
            .iter()
            .filter(|report| report.has_errors())
            .collect();
        if failing.is_empty() {
            return Ok(());
        }

        Err(DriverError::AnalysisFailed {
            errors: failing.iter().map(|report| report.errors().count()).sum(),
            functions: failing.iter().map(|report| report.name.clone()).collect(),
        })
    }
}
