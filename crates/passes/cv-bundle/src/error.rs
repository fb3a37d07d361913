//! Bundle resolution error types.

use cv_cfg::{Convention, ConventionSet};
use cv_diagnostics::{Diagnostic, DiagnosticKind, IntoDiagnostic};
use cv_liveness::UsageContext;
use cv_span::FileSpan;
use thiserror::Error;

/// Errors that can occur while resolving bundle calls.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BundleError {
    /// The call needs a variant the bundle neither declares nor can
    /// synthesize.
    #[error("no `{requested}` variant of `{bundle}` is available")]
    VariantUnavailable {
        /// Bundle name
        bundle: String,
        /// Variant the call site needs
        requested: Convention,
        /// Variants the bundle declares
        declared: ConventionSet,
        /// Why the call site needs it
        context: UsageContext,
        /// Name of the receiver type
        receiver_ty: String,
        /// Location of the call
        span: FileSpan,
        /// Location of the bundle declaration
        declaration: FileSpan,
    },
}

impl BundleError {
    /// Returns the primary source location for this error.
    #[must_use]
    pub fn span(&self) -> FileSpan {
        match self {
            Self::VariantUnavailable { span, .. } => *span,
        }
    }

    /// Returns a detailed message explaining the error.
    #[must_use]
    pub fn detailed_message(&self) -> String {
        match self {
            Self::VariantUnavailable {
                bundle,
                requested,
                declared,
                context,
                receiver_ty,
                ..
            } => format!(
                "receiver usage `{context}` requires the `{requested}` variant of `{bundle}`, \
                 which declares {declared}; it cannot be synthesized for `{receiver_ty}`"
            ),
        }
    }
}

impl IntoDiagnostic for BundleError {
    fn into_diagnostic(self) -> Diagnostic {
        let message = self.to_string();
        let note = self.detailed_message();
        match self {
            Self::VariantUnavailable {
                declared,
                span,
                declaration,
                ..
            } => Diagnostic::new(DiagnosticKind::BundleVariantUnavailable, span, message)
                .with_label(declaration, format!("bundle declared with {declared}"))
                .with_label(span, note),
        }
    }
}
