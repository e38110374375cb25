//! Diagnostics sink threaded through parsing and generation.
//!
//! Nothing in the workspace keeps diagnostics in global state: callers create
//! a [`Diagnostics`] value and pass it to `parse`/`generate`, then decide how
//! to report what was collected.

use std::fmt;

/// Severity level for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Informational message.
    Info,
    /// Output was produced but needs a human to look at it.
    Warning,
    /// Output for this item could not be produced.
    Error,
}

impl Severity {
    pub fn label(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }
}

/// What a diagnostic is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticKind {
    /// A hand-edited adapter body was kept as is.
    PreservedBody,
    /// A hand-edited body's function signature changed underneath it.
    SignatureChanged,
    /// No marshaling rule applied; a stub was emitted instead.
    NotGeneratable,
    /// A declaration was accepted but something about it is suspicious.
    Declaration,
}

impl DiagnosticKind {
    pub fn label(&self) -> &'static str {
        match self {
            DiagnosticKind::PreservedBody => "preserved body",
            DiagnosticKind::SignatureChanged => "signature changed",
            DiagnosticKind::NotGeneratable => "not generatable",
            DiagnosticKind::Declaration => "declaration",
        }
    }
}

/// A single diagnostic entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub kind: DiagnosticKind,
    /// The declaration involved, e.g. `ModuleWidget::GetSize`.
    pub subject: String,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} ({}): {}",
            self.severity.label(),
            self.subject,
            self.kind.label(),
            self.message
        )
    }
}

/// Collector for diagnostics during one run.
#[derive(Debug, Default)]
pub struct Diagnostics {
    items: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        match diagnostic.severity {
            Severity::Info => tracing::debug!(subject = %diagnostic.subject, "{}", diagnostic.message),
            Severity::Warning | Severity::Error => {
                tracing::warn!(subject = %diagnostic.subject, "{}", diagnostic.message)
            }
        }
        self.items.push(diagnostic);
    }

    pub fn report(
        &mut self,
        severity: Severity,
        kind: DiagnosticKind,
        subject: impl Into<String>,
        message: impl Into<String>,
    ) {
        self.push(Diagnostic {
            severity,
            kind,
            subject: subject.into(),
            message: message.into(),
        });
    }

    pub fn warn(&mut self, kind: DiagnosticKind, subject: impl Into<String>, message: impl Into<String>) {
        self.report(Severity::Warning, kind, subject, message);
    }

    pub fn info(&mut self, kind: DiagnosticKind, subject: impl Into<String>, message: impl Into<String>) {
        self.report(Severity::Info, kind, subject, message);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter()
    }

    pub fn of_kind(&self, kind: DiagnosticKind) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter().filter(move |d| d.kind == kind)
    }

    pub fn warning_count(&self) -> usize {
        self.items
            .iter()
            .filter(|d| d.severity >= Severity::Warning)
            .count()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collects_in_order() {
        let mut diags = Diagnostics::new();
        diags.info(DiagnosticKind::PreservedBody, "A::F", "kept");
        diags.warn(DiagnosticKind::SignatureChanged, "A::G", "removed `x`");

        assert_eq!(diags.len(), 2);
        assert_eq!(diags.warning_count(), 1);
        assert_eq!(diags.of_kind(DiagnosticKind::SignatureChanged).count(), 1);
        assert_eq!(
            diags.iter().last().unwrap().to_string(),
            "warning: A::G (signature changed): removed `x`"
        );
    }
}
