//! End-to-end runs of the `flatbridge` binary in a scratch project.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use tempfile::{tempdir, TempDir};

const WIDGET: &str = r#"
///
// A widget on screen.
///
/*--abi(source=library)--*/
class ModuleWidget : public ModuleBaseRefCounted {
 public:
  /*--abi()--*/
  virtual int GetSize() = 0;

  /*--abi()--*/
  virtual void SetTitle(const ModuleString& title) = 0;
};

/*--abi()--*/
void ModuleInitialize();
"#;

const CONFIG: &str = r#"
[input]
files = ["include/widget.h"]

[output]
root = "out"
report = "out/report.json"
"#;

fn project() -> TempDir {
    let dir = tempdir().unwrap();
    fs::create_dir_all(dir.path().join("include")).unwrap();
    fs::write(dir.path().join("include/widget.h"), WIDGET).unwrap();
    fs::write(dir.path().join("flatbridge.toml"), CONFIG).unwrap();
    dir
}

fn flatbridge(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_flatbridge"))
        .args(args)
        .current_dir(dir)
        .env_remove("FLATBRIDGE_LOG")
        .output()
        .expect("failed to run flatbridge")
}

fn report(dir: &Path) -> serde_json::Value {
    let text = fs::read_to_string(dir.join("out/report.json")).unwrap();
    serde_json::from_str(&text).unwrap()
}

#[test]
fn test_generate_then_regenerate_writes_nothing() {
    let dir = project();

    let first = flatbridge(dir.path(), &["generate"]);
    assert!(first.status.success(), "{}", String::from_utf8_lossy(&first.stderr));
    for file in [
        "out/include/capi/module_widget_capi.h",
        "out/include/capi/module_globals_capi.h",
        "out/bridge/widget_to_abi.cc",
        "out/bridge/widget_from_abi.cc",
    ] {
        assert!(dir.path().join(file).exists(), "{file} missing");
    }
    let written = report(dir.path())["files_written"].as_array().unwrap().len();
    assert!(written >= 4);

    let second = flatbridge(dir.path(), &["generate"]);
    assert!(second.status.success());
    let report = report(dir.path());
    assert!(report["files_written"].as_array().unwrap().is_empty());
    assert_eq!(report["files_unchanged"].as_array().unwrap().len(), written);
    assert_eq!(report["classes"]["ModuleWidget"]["customized"], false);
}

#[test]
fn test_dry_run_leaves_disk_alone() {
    let dir = project();
    let output = flatbridge(dir.path(), &["generate", "--dry-run"]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("would write"));
    assert!(!dir.path().join("out/bridge").exists());
}

#[test]
fn test_canonical_prints_declarations() {
    let dir = project();
    let output = flatbridge(dir.path(), &["canonical"]);
    assert!(output.status.success());

    let decls: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let names: Vec<&str> = decls
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, ["ModuleWidget", "ModuleInitialize"]);
    assert!(!decls[0]["text"].as_str().unwrap().contains("widget on screen"));
}

#[test]
fn test_unknown_type_fails_with_location() {
    let dir = project();
    fs::write(
        dir.path().join("include/broken.h"),
        "/*--abi()--*/\nvoid ModuleRun(Mystery value);\n",
    )
    .unwrap();

    let output = flatbridge(dir.path(), &["check", "include/broken.h"]);
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("unknown type `Mystery`"), "{stderr}");
    assert!(stderr.contains("broken.h"), "{stderr}");
}

#[test]
fn test_missing_input_is_an_error() {
    let dir = tempdir().unwrap();
    let output = flatbridge(dir.path(), &["check"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("no declaration files"));
}
