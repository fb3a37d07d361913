//! Human-readable diagnostic output.

use codespan_reporting::files::SimpleFiles;
use codespan_reporting::term::{self, Config};
use cv_diagnostics::{Diagnostic, to_codespan_diagnostic};

use crate::error::DriverError;

/// Renders `diagnostics` rustc-style against `files`.
///
/// Files must be added in [`cv_span::FileId`] order so the ids line up.
///
/// # Errors
///
/// Fails if a diagnostic points into a file or range that `files` lacks.
pub fn render_diagnostics(
    files: &SimpleFiles<String, String>,
    diagnostics: &[Diagnostic],
) -> Result<String, DriverError> {
    let config = Config::default();
    let mut buffer = Vec::new();

    for diagnostic in diagnostics {
        #[allow(deprecated, reason = "emit is the writer-agnostic entry point")]
        term::emit(&mut buffer, &config, files, &to_codespan_diagnostic(diagnostic)).map_err(
            |error| DriverError::Render {
                message: error.to_string(),
            },
        )?;
    }

    String::from_utf8(buffer).map_err(|error| DriverError::Render {
        message: error.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use cv_diagnostics::{DiagnosticKind, SuggestedEdit};
    use cv_span::{FileId, FileSpan, Span};

    #[test]
    fn test_render_includes_code_and_help() {
        let mut files = SimpleFiles::new();
        files.add("main.hylo".to_owned(), "let v = x\nuse(v)\n".to_owned());

        let span = FileSpan::new(FileId(0), Span::new(14, 15));
        let diag = Diagnostic::new(DiagnosticKind::UseAfterConsume, span, "use of consumed `v`")
            .with_suggestion(SuggestedEdit::new(span, "v.copy()", "copy it"));

        let output = render_diagnostics(&files, &[diag]).unwrap();
        assert!(output.contains("error[use-after-consume]"));
        assert!(output.contains("main.hylo"));
        assert!(output.contains("help: copy it: `v.copy()`"));
    }

    #[test]
    fn test_unknown_file_is_an_error() {
        let files = SimpleFiles::new();
        let span = FileSpan::new(FileId(4), Span::new(0, 1));
        let diag = Diagnostic::new(DiagnosticKind::MissingCopy, span, "escape");
        assert!(render_diagnostics(&files, &[diag]).is_err());
    }
}
