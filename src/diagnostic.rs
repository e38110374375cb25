//! Rich error reporting using codespan-reporting.

use std::ops::Range;

use codespan_reporting::diagnostic::{Diagnostic, Label, Severity};
use codespan_reporting::files::SimpleFiles;
use codespan_reporting::term;
use codespan_reporting::term::termcolor::{ColorChoice, StandardStream};
use flatbridge_ast::{BridgeError, Diagnostics};

use crate::load::LoadError;

fn emit_diagnostic_to_stderr(files: &SimpleFiles<String, String>, diagnostic: &Diagnostic<usize>) {
    let writer = StandardStream::stderr(ColorChoice::Auto);
    let config = term::Config::default();
    let _ = term::emit(&mut writer.lock(), &config, files, diagnostic);
}

/// A source file database for codespan-reporting.
pub struct SourceDb {
    files: SimpleFiles<String, String>,
    file_id: usize,
}

impl SourceDb {
    /// Create a new source database with a single file.
    pub fn new(name: String, source: String) -> Self {
        let mut files = SimpleFiles::new();
        let file_id = files.add(name, source);
        Self { files, file_id }
    }

    /// Report an error with source context.
    pub fn report_error(&self, message: &str, span: Range<usize>) {
        let diagnostic = Diagnostic::error()
            .with_message(message)
            .with_labels(vec![
                Label::primary(self.file_id, span).with_message("error occurs here"),
            ]);

        emit_diagnostic_to_stderr(&self.files, &diagnostic);
    }
}

/// Report a LoadError, with source context when the error carries a span.
pub fn report_load_error(err: &LoadError) {
    match err {
        LoadError::Parse {
            path,
            source_code,
            error,
        } => match error.span() {
            Some(span) if span.end <= source_code.len() => {
                let source_db = SourceDb::new(path.clone(), source_code.clone());
                source_db.report_error(&error.to_string(), span.clone());
            }
            _ => emit_plain(Severity::Error, &format!("{path}: {error}")),
        },
        LoadError::Link(error) => emit_plain(Severity::Error, &link_message(error)),
        _ => emit_plain(Severity::Error, &err.to_string()),
    }
}

fn link_message(error: &BridgeError) -> String {
    format!("failed to link declarations: {error}")
}

/// Print collected run diagnostics (warnings and errors only).
pub fn report_diagnostics(diags: &Diagnostics) {
    for d in diags.iter() {
        let severity = match d.severity {
            flatbridge_ast::Severity::Info => continue,
            flatbridge_ast::Severity::Warning => Severity::Warning,
            flatbridge_ast::Severity::Error => Severity::Error,
        };
        emit_plain(severity, &format!("{}: {}", d.subject, d.message));
    }
}

fn emit_plain(severity: Severity, message: &str) {
    let files = SimpleFiles::new();
    let diagnostic = Diagnostic::new(severity).with_message(message);
    emit_diagnostic_to_stderr(&files, &diagnostic);
}
