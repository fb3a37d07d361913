//! Typestate error types.

use cv_diagnostics::{Diagnostic, DiagnosticKind, IntoDiagnostic};
use cv_span::FileSpan;
use thiserror::Error;

/// Errors found while tracking binding states.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypestateError {
    /// Read of a value that was never written.
    #[error("use of uninitialized value `{place}`")]
    UninitializedUse {
        /// The place read
        place: String,
        /// Location of the read
        span: FileSpan,
        /// Where the binding was declared
        declared: FileSpan,
    },

    /// Read of a value after it was given away.
    #[error("use of consumed value `{place}`")]
    UseAfterConsume {
        /// The place read
        place: String,
        /// Location of the read
        span: FileSpan,
        /// Where the value was consumed
        consumed: FileSpan,
    },

    /// A live binding reaches a join in different states.
    #[error("`{name}` does not hold a value on every path reaching this point")]
    InconsistentJoin {
        /// The binding
        name: String,
        /// Location of the join
        span: FileSpan,
        /// Site of a diverging transition
        diverged: FileSpan,
    },

    /// A binding leaves its scope with parts moved out.
    #[error("`{name}` is partially consumed when it goes out of scope")]
    PartiallyConsumedAtExit {
        /// The binding
        name: String,
        /// Parts that are missing
        parts: Vec<String>,
        /// Where the scope ends
        span: FileSpan,
        /// Where the last part was consumed
        consumed: FileSpan,
    },
}

impl TypestateError {
    /// Returns the primary source location for this error.
    #[must_use]
    pub fn span(&self) -> FileSpan {
        match self {
            Self::UninitializedUse { span, .. }
            | Self::UseAfterConsume { span, .. }
            | Self::InconsistentJoin { span, .. }
            | Self::PartiallyConsumedAtExit { span, .. } => *span,
        }
    }

    /// Diagnostic kind this error is reported as.
    #[must_use]
    pub fn kind(&self) -> DiagnosticKind {
        match self {
            Self::UninitializedUse { .. } => DiagnosticKind::UninitializedUse,
            Self::UseAfterConsume { .. } | Self::InconsistentJoin { .. } => {
                DiagnosticKind::UseAfterConsume
            }
            Self::PartiallyConsumedAtExit { .. } => DiagnosticKind::PartiallyConsumedAtExit,
        }
    }

    /// Returns a detailed message explaining the error.
    #[must_use]
    pub fn detailed_message(&self) -> String {
        match self {
            Self::UninitializedUse { place, .. } => {
                format!("`{place}` is read before any value is assigned to it")
            }
            Self::UseAfterConsume { place, .. } => {
                format!("`{place}` was given away earlier and holds no value")
            }
            Self::InconsistentJoin { name, .. } => {
                format!("`{name}` is used after this point, but not every path leaves it initialized")
            }
            Self::PartiallyConsumedAtExit { parts, .. } => {
                format!("missing parts: {}", parts.join(", "))
            }
        }
    }
}

impl IntoDiagnostic for TypestateError {
    fn into_diagnostic(self) -> Diagnostic {
        let diagnostic = Diagnostic::new(self.kind(), self.span(), self.to_string());
        match self {
            Self::UninitializedUse { declared, .. } => {
                diagnostic.with_label(declared, "declared here")
            }
            Self::UseAfterConsume { consumed, .. } => {
                diagnostic.with_label(consumed, "value consumed here")
            }
            Self::InconsistentJoin { diverged, .. } => {
                diagnostic.with_label(diverged, "state diverges here")
            }
            Self::PartiallyConsumedAtExit {
                parts, consumed, ..
            } => diagnostic.with_label(consumed, format!("moved out: {}", parts.join(", "))),
        }
    }
}
