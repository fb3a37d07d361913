//! Conversion to `codespan-reporting` diagnostics for rustc-style output.

use codespan_reporting::diagnostic::{Diagnostic as CodespanDiagnostic, Label};

use crate::{Diagnostic, Severity};

/// Converts a diagnostic into its `codespan-reporting` form.
///
/// File identifiers are taken from the spans, so the caller's file database
/// must be keyed by [`cv_span::FileId`] values.
#[must_use]
pub fn to_codespan_diagnostic(diagnostic: &Diagnostic) -> CodespanDiagnostic<usize> {
    let base = match diagnostic.severity {
        Severity::Error => CodespanDiagnostic::error(),
        Severity::Warning => CodespanDiagnostic::warning(),
    };

    let mut labels = vec![
        Label::primary(diagnostic.span.file.0 as usize, diagnostic.span.range())
            .with_message(diagnostic.kind.code()),
    ];
    labels.extend(diagnostic.labels.iter().map(|label| {
        Label::secondary(label.span.file.0 as usize, label.span.range())
            .with_message(label.message.clone())
    }));

    let mut notes = Vec::new();
    if let Some(edit) = &diagnostic.suggestion {
        notes.push(format!("help: {}: `{}`", edit.message, edit.replacement));
    }

    base.with_message(diagnostic.message.clone())
        .with_code(diagnostic.kind.code())
        .with_labels(labels)
        .with_notes(notes)
}
