//! Diagnostic stream shared by the convention analyses.
//!
//! Every pass reports its findings through its own error type and converts
//! them into [`Diagnostic`] with [`IntoDiagnostic`]. The driver merges the
//! per-pass results into one ordered stream per function.
//!
//! # Examples
//!
//! ```rust
//! use cv_diagnostics::{Diagnostic, DiagnosticKind, Severity};
//! use cv_span::FileSpan;
//!
//! let diag = Diagnostic::new(
//!     DiagnosticKind::UseAfterConsume,
//!     FileSpan::dummy(),
//!     "use of consumed binding `v`",
//! );
//! assert_eq!(diag.severity, Severity::Error);
//! assert_eq!(diag.summary(), "error[use-after-consume]: use of consumed binding `v`");
//! ```

mod render;

pub use render::to_codespan_diagnostic;

use std::fmt;

use cv_span::FileSpan;
use serde::{Deserialize, Serialize};

/// Severity of a diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    /// Reported, never blocks code generation
    Warning,
    /// Blocks code generation for the function
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Warning => f.write_str("warning"),
            Self::Error => f.write_str("error"),
        }
    }
}

/// Classification of a diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DiagnosticKind {
    /// Read of an uninitialized or consumed binding
    UninitializedUse,
    /// Use after a consuming access, or disagreeing states at a join
    UseAfterConsume,
    /// Overlapping mutable/consuming access, or an unrestored `inout`
    ExclusivityViolation,
    /// Borrowed value of a non-copyable type escaping its source
    IllegalEscape,
    /// Borrowed value escaping where a copy would fix it
    MissingCopy,
    /// Copy that could be a move
    UnnecessaryCopy,
    /// Bundle variant neither declared nor synthesizable
    BundleVariantUnavailable,
    /// `inout` argument written without the mutation marker
    MissingMutationMarker,
    /// Mutation of immutable or non-storage operand
    ImmutableAccess,
    /// `set` argument that already holds a value
    SetOnInitialized,
    /// Binding left partially consumed when its scope ends
    PartiallyConsumedAtExit,
}

impl DiagnosticKind {
    /// Stable kebab-case code used in rendered output.
    #[must_use]
    pub fn code(self) -> &'static str {
        match self {
            Self::UninitializedUse => "uninitialized-use",
            Self::UseAfterConsume => "use-after-consume",
            Self::ExclusivityViolation => "exclusivity-violation",
            Self::IllegalEscape => "illegal-escape",
            Self::MissingCopy => "missing-copy",
            Self::UnnecessaryCopy => "unnecessary-copy",
            Self::BundleVariantUnavailable => "bundle-variant-unavailable",
            Self::MissingMutationMarker => "missing-mutation-marker",
            Self::ImmutableAccess => "immutable-access",
            Self::SetOnInitialized => "set-on-initialized",
            Self::PartiallyConsumedAtExit => "partially-consumed-at-exit",
        }
    }

    /// Severity a diagnostic of this kind carries unless configured otherwise.
    #[must_use]
    pub fn default_severity(self) -> Severity {
        match self {
            Self::UnnecessaryCopy => Severity::Warning,
            _ => Severity::Error,
        }
    }
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A machine-applicable rewrite attached to a diagnostic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestedEdit {
    /// Source range to replace
    pub span: FileSpan,
    /// Replacement text
    pub replacement: String,
    /// Short description of the rewrite
    pub message: String,
}

impl SuggestedEdit {
    /// Creates a suggested edit.
    pub fn new(span: FileSpan, replacement: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            span,
            replacement: replacement.into(),
            message: message.into(),
        }
    }
}

/// A secondary location, such as the site that consumed a binding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelatedLabel {
    /// Location of the related site
    pub span: FileSpan,
    /// What happened there
    pub message: String,
}

/// A single diagnostic in the output stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// What went wrong
    pub kind: DiagnosticKind,
    /// Severity level
    pub severity: Severity,
    /// Primary source location
    pub span: FileSpan,
    /// Human-readable message
    pub message: String,
    /// Related sites
    pub labels: Vec<RelatedLabel>,
    /// Optional suggestion for fixing
    pub suggestion: Option<SuggestedEdit>,
}

impl Diagnostic {
    /// Creates a diagnostic with the default severity of `kind`.
    pub fn new(kind: DiagnosticKind, span: FileSpan, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity: kind.default_severity(),
            span,
            message: message.into(),
            labels: Vec::new(),
            suggestion: None,
        }
    }

    /// Adds a related label.
    #[must_use]
    pub fn with_label(mut self, span: FileSpan, message: impl Into<String>) -> Self {
        self.labels.push(RelatedLabel {
            span,
            message: message.into(),
        });
        self
    }

    /// Attaches a suggested edit.
    #[must_use]
    pub fn with_suggestion(mut self, suggestion: SuggestedEdit) -> Self {
        self.suggestion = Some(suggestion);
        self
    }

    /// Overrides the severity.
    #[must_use]
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    /// Returns `true` for error-class diagnostics.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    /// One-line `severity[code]: message` form.
    #[must_use]
    pub fn summary(&self) -> String {
        format!("{}[{}]: {}", self.severity, self.kind.code(), self.message)
    }
}

/// Conversion from a pass-specific error into the shared diagnostic type.
pub trait IntoDiagnostic {
    /// Converts `self` into a [`Diagnostic`].
    fn into_diagnostic(self) -> Diagnostic;
}

impl IntoDiagnostic for Diagnostic {
    fn into_diagnostic(self) -> Diagnostic {
        self
    }
}

/// Orders diagnostics by file, span start, then kind. The sort is stable, so
/// diagnostics at the same position keep the order the passes produced.
pub fn sort_diagnostics(diagnostics: &mut [Diagnostic]) {
    diagnostics.sort_by(|left, right| {
        (left.span.file, left.span.span.start, left.kind).cmp(&(
            right.span.file,
            right.span.span.start,
            right.kind,
        ))
    });
}
