//! Machine-readable summary of a generation run.

use std::path::PathBuf;

use flatbridge_ast::{CanonicalDecl, Diagnostic, DiagnosticKind, Diagnostics, Severity};
use indexmap::IndexMap;
use serde::Serialize;

use crate::writer::WriteSummary;
use crate::ClassOutcome;

#[derive(Debug, Clone, Serialize)]
pub struct ReportedDiagnostic {
    pub severity: &'static str,
    pub kind: &'static str,
    pub subject: String,
    pub message: String,
}

impl From<&Diagnostic> for ReportedDiagnostic {
    fn from(d: &Diagnostic) -> Self {
        Self {
            severity: d.severity.label(),
            kind: d.kind.label(),
            subject: d.subject.clone(),
            message: d.message.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub classes: IndexMap<String, ClassOutcome>,
    pub files_written: Vec<PathBuf>,
    pub files_unchanged: Vec<PathBuf>,
    /// Canonical text of every class and global function.
    pub declarations: Vec<CanonicalDecl>,
    pub diagnostics: Vec<ReportedDiagnostic>,
}

impl RunReport {
    pub fn new(
        classes: IndexMap<String, ClassOutcome>,
        summary: WriteSummary,
        declarations: Vec<CanonicalDecl>,
        diags: &Diagnostics,
    ) -> Self {
        Self {
            classes,
            files_written: summary.written,
            files_unchanged: summary.unchanged,
            declarations,
            diagnostics: diags.iter().map(ReportedDiagnostic::from).collect(),
        }
    }

    /// Classes with at least one hand-edited or stubbed function.
    pub fn customized(&self) -> impl Iterator<Item = &str> {
        self.classes
            .iter()
            .filter(|(_, o)| o.customized)
            .map(|(name, _)| name.as_str())
    }

    pub fn count(&self, kind: DiagnosticKind) -> usize {
        let label = kind.label();
        self.diagnostics.iter().filter(|d| d.kind == label).count()
    }

    pub fn has_warnings(&self) -> bool {
        let warning = Severity::Warning.label();
        let error = Severity::Error.label();
        self.diagnostics
            .iter()
            .any(|d| d.severity == warning || d.severity == error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_serializes() {
        let mut classes = IndexMap::new();
        classes.insert("ModuleWidget".to_string(), ClassOutcome { customized: true });
        classes.insert("ModuleFrame".to_string(), ClassOutcome::default());
        let mut diags = Diagnostics::new();
        diags.warn(DiagnosticKind::SignatureChanged, "ModuleWidget::Resize", "changed");

        let report = RunReport::new(
            classes,
            WriteSummary {
                written: vec![PathBuf::from("bridge/widget_to_abi.cc")],
                unchanged: Vec::new(),
            },
            vec![CanonicalDecl {
                name: "ModuleWidget".to_string(),
                text: "class ModuleWidget : public ModuleBaseRefCounted { };".to_string(),
            }],
            &diags,
        );
        assert_eq!(report.customized().collect::<Vec<_>>(), vec!["ModuleWidget"]);
        assert_eq!(report.count(DiagnosticKind::SignatureChanged), 1);
        assert!(report.has_warnings());

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["classes"]["ModuleWidget"]["customized"], true);
        assert_eq!(json["files_written"][0], "bridge/widget_to_abi.cc");
        assert_eq!(json["declarations"][0]["name"], "ModuleWidget");
    }
}
