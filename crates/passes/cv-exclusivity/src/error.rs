//! Exclusivity and convention error types.

use cv_cfg::Convention;
use cv_diagnostics::{Diagnostic, DiagnosticKind, IntoDiagnostic, SuggestedEdit};
use cv_span::FileSpan;
use thiserror::Error;

/// Result type for exclusivity checking.
///
/// Every violation in a body is collected before returning.
pub type ExclusivityResult<T> = Result<T, Vec<ExclusivityError>>;

/// Errors found while validating accesses against their conventions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExclusivityError {
    /// An access overlaps a projection that is still active.
    #[error("cannot access `{place}` for `{convention}` while it is projected for `{held}`")]
    OverlappingAccess {
        /// The place accessed
        place: String,
        /// Access requested
        convention: Convention,
        /// Location of the access
        span: FileSpan,
        /// Access the projection holds
        held: Convention,
        /// Where the projection was bound
        projected: FileSpan,
    },

    /// Two arguments of one call overlap and one of them is exclusive.
    #[error("`{place}` is passed as `{convention}` while `{other}` is passed as `{other_convention}`")]
    ArgumentOverlap {
        /// The later argument
        place: String,
        /// Its convention
        convention: Convention,
        /// Location of the later argument
        span: FileSpan,
        /// The earlier argument
        other: String,
        /// Its convention
        other_convention: Convention,
        /// Location of the earlier argument
        other_span: FileSpan,
    },

    /// An `inout` parameter does not hold its value when the function returns.
    #[error("`inout` parameter `{name}` is not restored before the function returns")]
    UnrestoredInout {
        /// The parameter
        name: String,
        /// The return
        span: FileSpan,
        /// Where the value was taken
        taken: FileSpan,
    },

    /// A mutable projection does not hold a value when its scope ends.
    #[error("`{convention}` projection `{name}` does not hold a value when it ends")]
    UnrestoredProjection {
        /// The projection binding
        name: String,
        /// Its convention
        convention: Convention,
        /// Where the scope ends
        span: FileSpan,
        /// Where the value was taken, or the binding declared
        origin: FileSpan,
    },

    /// A `set` parameter is not initialized when the function returns.
    #[error("`set` parameter `{name}` is not initialized before the function returns")]
    SetNotInitialized {
        /// The parameter
        name: String,
        /// The return
        span: FileSpan,
        /// The parameter declaration
        declared: FileSpan,
    },

    /// An `inout` argument without the mutation marker.
    #[error("`inout` argument `{place}` must be marked with `&`")]
    MissingMutationMarker {
        /// The argument
        place: String,
        /// Location of the argument
        span: FileSpan,
    },

    /// A mutating convention applied to an immutable binding.
    #[error("`{place}` is immutable and cannot be accessed for `{convention}`")]
    ImmutableArgument {
        /// The argument
        place: String,
        /// Convention required
        convention: Convention,
        /// Location of the argument
        span: FileSpan,
        /// Declaration of the root binding
        declared: FileSpan,
    },

    /// A mutating convention applied to a temporary.
    #[error("cannot pass a temporary value as `{convention}`")]
    TemporaryArgument {
        /// Convention required
        convention: Convention,
        /// Location of the argument
        span: FileSpan,
    },

    /// A write to storage that is immutable or already initialized `let`.
    #[error("cannot assign to immutable `{place}`")]
    AssignToImmutable {
        /// The place written
        place: String,
        /// Location of the write
        span: FileSpan,
        /// Declaration of the root binding
        declared: FileSpan,
    },

    /// A `set` argument that already holds a value.
    #[error("`set` argument `{place}` already holds a value")]
    SetOnInitialized {
        /// The argument
        place: String,
        /// Location of the argument
        span: FileSpan,
        /// Where the value was written
        initialized: FileSpan,
    },
}

impl ExclusivityError {
    /// Returns the primary source location for this error.
    #[must_use]
    pub fn span(&self) -> FileSpan {
        match self {
            Self::OverlappingAccess { span, .. }
            | Self::ArgumentOverlap { span, .. }
            | Self::UnrestoredInout { span, .. }
            | Self::UnrestoredProjection { span, .. }
            | Self::SetNotInitialized { span, .. }
            | Self::MissingMutationMarker { span, .. }
            | Self::ImmutableArgument { span, .. }
            | Self::TemporaryArgument { span, .. }
            | Self::AssignToImmutable { span, .. }
            | Self::SetOnInitialized { span, .. } => *span,
        }
    }

    /// Diagnostic kind this error is reported as.
    #[must_use]
    pub fn kind(&self) -> DiagnosticKind {
        match self {
            Self::OverlappingAccess { .. }
            | Self::ArgumentOverlap { .. }
            | Self::UnrestoredInout { .. }
            | Self::UnrestoredProjection { .. } => DiagnosticKind::ExclusivityViolation,
            Self::SetNotInitialized { .. } => DiagnosticKind::UninitializedUse,
            Self::MissingMutationMarker { .. } => DiagnosticKind::MissingMutationMarker,
            Self::ImmutableArgument { .. }
            | Self::TemporaryArgument { .. }
            | Self::AssignToImmutable { .. } => DiagnosticKind::ImmutableAccess,
            Self::SetOnInitialized { .. } => DiagnosticKind::SetOnInitialized,
        }
    }

    /// Returns a detailed message explaining the error.
    #[must_use]
    pub fn detailed_message(&self) -> String {
        match self {
            Self::OverlappingAccess { place, held, .. } => format!(
                "a `{held}` projection of `{place}` is still in scope; no conflicting access may \
                 overlap it until the projection ends"
            ),
            Self::ArgumentOverlap { place, other, .. } => format!(
                "`{place}` and `{other}` refer to overlapping storage, and at least one of them \
                 is accessed exclusively"
            ),
            Self::UnrestoredInout { name, .. } => {
                format!("`{name}` must hold a value on every path that leaves the function")
            }
            Self::UnrestoredProjection { name, .. } => {
                format!("assign a value to `{name}` before its scope ends")
            }
            Self::SetNotInitialized { name, .. } => {
                format!("assign a value to `{name}` on every path that leaves the function")
            }
            Self::MissingMutationMarker { place, .. } => {
                format!("write `&{place}` to show that the call mutates it")
            }
            Self::ImmutableArgument { place, .. } => {
                format!("`{place}` is bound immutably and cannot be mutated or initialized")
            }
            Self::TemporaryArgument { convention, .. } => {
                format!("a `{convention}` argument must be a storage location")
            }
            Self::AssignToImmutable { place, .. } => {
                format!("`{place}` is immutable once it holds a value")
            }
            Self::SetOnInitialized { place, .. } => {
                format!("`set` initializes storage; `{place}` is already initialized")
            }
        }
    }
}

impl IntoDiagnostic for ExclusivityError {
    fn into_diagnostic(self) -> Diagnostic {
        let diagnostic = Diagnostic::new(self.kind(), self.span(), self.to_string());
        match self {
            Self::OverlappingAccess {
                held, projected, ..
            } => diagnostic.with_label(projected, format!("`{held}` projection bound here")),
            Self::ArgumentOverlap {
                other_convention,
                other_span,
                ..
            } => diagnostic.with_label(other_span, format!("also passed as `{other_convention}` here")),
            Self::UnrestoredInout { taken, .. } => diagnostic.with_label(taken, "value taken here"),
            Self::UnrestoredProjection { origin, .. } => {
                diagnostic.with_label(origin, "value taken here")
            }
            Self::SetNotInitialized { declared, .. } => {
                diagnostic.with_label(declared, "parameter declared here")
            }
            Self::MissingMutationMarker { place, span } => diagnostic.with_suggestion(
                SuggestedEdit::new(span, format!("&{place}"), "add the mutation marker"),
            ),
            Self::ImmutableArgument { declared, .. } | Self::AssignToImmutable { declared, .. } => {
                diagnostic.with_label(declared, "declared here")
            }
            Self::TemporaryArgument { .. } => diagnostic,
            Self::SetOnInitialized { initialized, .. } => {
                diagnostic.with_label(initialized, "value written here")
            }
        }
    }
}
