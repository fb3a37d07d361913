//! Copy diagnostic types.

use cv_diagnostics::{Diagnostic, DiagnosticKind, IntoDiagnostic, SuggestedEdit};
use cv_span::FileSpan;
use thiserror::Error;

/// Missing and unnecessary copies.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CopyError {
    /// A borrowed, copyable value escapes without being copied.
    #[error("`{place}` is borrowed and escapes without a copy")]
    MissingCopy {
        /// The escaping place
        place: String,
        /// The escaping value
        span: FileSpan,
        /// Where it escapes
        site: FileSpan,
        /// What happens at the site
        site_label: String,
        /// Inserted copy, when it can be spelled at the value
        fix: Option<SuggestedEdit>,
    },

    /// A borrowed value that cannot be copied escapes.
    #[error("`{place}` escapes its borrow, and `{ty}` is not copyable")]
    IllegalEscape {
        /// The escaping place
        place: String,
        /// Type of the escaping value
        ty: String,
        /// The escaping value
        span: FileSpan,
        /// Where it escapes
        site: FileSpan,
        /// What happens at the site
        site_label: String,
        /// Parameter rewritten to take ownership, if the root is a parameter
        fix: Option<SuggestedEdit>,
    },

    /// An explicit copy of a value that is not used afterwards.
    #[error("unnecessary copy of `{place}`")]
    UnnecessaryCopy {
        /// The copied place
        place: String,
        /// The copy expression
        span: FileSpan,
        /// Rewrite without the copy
        fix: SuggestedEdit,
    },
}

impl CopyError {
    /// Returns the primary source location for this error.
    #[must_use]
    pub fn span(&self) -> FileSpan {
        match self {
            Self::MissingCopy { span, .. }
            | Self::IllegalEscape { span, .. }
            | Self::UnnecessaryCopy { span, .. } => *span,
        }
    }

    /// Diagnostic kind this error is reported as.
    #[must_use]
    pub fn kind(&self) -> DiagnosticKind {
        match self {
            Self::MissingCopy { .. } => DiagnosticKind::MissingCopy,
            Self::IllegalEscape { .. } => DiagnosticKind::IllegalEscape,
            Self::UnnecessaryCopy { .. } => DiagnosticKind::UnnecessaryCopy,
        }
    }

    /// The suggested rewrite, if any.
    #[must_use]
    pub fn fix(&self) -> Option<&SuggestedEdit> {
        match self {
            Self::MissingCopy { fix, .. } | Self::IllegalEscape { fix, .. } => fix.as_ref(),
            Self::UnnecessaryCopy { fix, .. } => Some(fix),
        }
    }

    /// Returns a detailed message explaining the error.
    #[must_use]
    pub fn detailed_message(&self) -> String {
        match self {
            Self::MissingCopy { place, .. } => format!(
                "`{place}` is only borrowed here; copy it so the destination owns an independent value"
            ),
            Self::IllegalEscape { place, .. } => format!(
                "`{place}` cannot be copied; the value must be owned before it can be given away"
            ),
            Self::UnnecessaryCopy { place, .. } => {
                format!("`{place}` is not used afterwards, so its value can be transferred instead")
            }
        }
    }
}

impl IntoDiagnostic for CopyError {
    fn into_diagnostic(self) -> Diagnostic {
        let diagnostic = Diagnostic::new(self.kind(), self.span(), self.to_string());
        match self {
            Self::MissingCopy {
                site,
                site_label,
                fix,
                ..
            }
            | Self::IllegalEscape {
                site,
                site_label,
                fix,
                ..
            } => {
                let diagnostic = diagnostic.with_label(site, site_label);
                match fix {
                    Some(fix) => diagnostic.with_suggestion(fix),
                    None => diagnostic,
                }
            }
            Self::UnnecessaryCopy { fix, .. } => diagnostic.with_suggestion(fix),
        }
    }
}
