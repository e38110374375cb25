use std::fs;
use std::io::Write;
use std::path::Path;

use anyhow::Context;
use flatbridge_codegen::RunReport;
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

/// Write the run report as pretty JSON.
pub fn write_report(path: &Path, report: &RunReport) -> anyhow::Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    }
    let json = serde_json::to_string_pretty(report).context("failed to serialize run report")?;
    fs::write(path, json + "\n").with_context(|| format!("failed to write {}", path.display()))
}

/// One-screen summary of a generation run on stdout.
pub fn print_summary(report: &RunReport, dry_run: bool) -> std::io::Result<()> {
    let mut out = StandardStream::stdout(ColorChoice::Auto);
    let verb = if dry_run { "would write" } else { "wrote" };

    for path in &report.files_written {
        out.set_color(ColorSpec::new().set_fg(Some(Color::Green)).set_bold(true))?;
        write!(out, "{verb:>12}")?;
        out.reset()?;
        writeln!(out, " {}", path.display())?;
    }

    let customized: Vec<&str> = report.customized().collect();
    if !customized.is_empty() {
        out.set_color(ColorSpec::new().set_fg(Some(Color::Yellow)).set_bold(true))?;
        write!(out, "{:>12}", "customized")?;
        out.reset()?;
        writeln!(out, " {}", customized.join(", "))?;
    }

    out.set_color(ColorSpec::new().set_bold(true))?;
    write!(out, "{:>12}", "done")?;
    out.reset()?;
    writeln!(
        out,
        " {} classes, {} files {verb}, {} unchanged, {} warnings",
        report.classes.len(),
        report.files_written.len(),
        report.files_unchanged.len(),
        report
            .diagnostics
            .iter()
            .filter(|d| d.severity != "info")
            .count()
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_is_written_as_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/report.json");
        write_report(&path, &RunReport::default()).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert!(value["classes"].as_object().unwrap().is_empty());
        assert!(value["files_written"].as_array().unwrap().is_empty());
    }
}
