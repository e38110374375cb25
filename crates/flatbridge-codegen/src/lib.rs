//! Code generation for flatbridge.
//!
//! Two generators consume a linked [`DeclarationModel`](flatbridge_ast::DeclarationModel):
//! [`HeaderGenerator`] writes the C mirror headers, and [`BridgeGenerator`]
//! writes the adapters that convert between the C++ object API and the C ABI
//! in both directions. Output is returned as [`GeneratedFiles`]; persisting it
//! is left to [`writer`], which only touches files whose content changed.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::Serialize;

pub mod bridge;
mod code;
mod dispatch;
pub mod header;
pub mod layout;
pub mod marshal;
pub mod merge;
mod names;
pub mod report;
pub mod writer;

pub use bridge::BridgeGenerator;
pub use header::HeaderGenerator;
pub use layout::{ClassLayouts, LayoutGroup, StructLayout};
pub use report::RunReport;
pub use writer::{FileReader, FileWriter, FsReader, FsWriter, MemoryFs, WriteSummary};

/// Output directories, relative to the output root. They also appear in
/// generated `#include` lines, so they should be relative paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputDirs {
    pub abi_dir: PathBuf,
    pub bridge_dir: PathBuf,
}

impl Default for OutputDirs {
    fn default() -> Self {
        Self {
            abi_dir: PathBuf::from("include/capi"),
            bridge_dir: PathBuf::from("bridge"),
        }
    }
}

impl OutputDirs {
    /// `#include` spelling for a file in the ABI directory.
    pub(crate) fn abi_include(&self, file: &str) -> String {
        include_path(&self.abi_dir, file)
    }

    pub(crate) fn bridge_include(&self, file: &str) -> String {
        include_path(&self.bridge_dir, file)
    }
}

fn include_path(dir: &Path, file: &str) -> String {
    let dir = dir.to_string_lossy().replace('\\', "/");
    let dir = dir.trim_end_matches('/');
    if dir.is_empty() || dir == "." {
        file.to_string()
    } else {
        format!("{dir}/{file}")
    }
}

/// One generated file, with a path relative to the output root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedFile {
    pub path: PathBuf,
    pub contents: String,
}

/// Per-class result of a generation run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ClassOutcome {
    /// Some function body was preserved from disk or stubbed out.
    pub customized: bool,
}

/// Files produced by a generator plus per-class outcomes.
#[derive(Debug, Clone, Default)]
pub struct GeneratedFiles {
    pub files: Vec<GeneratedFile>,
    pub classes: IndexMap<String, ClassOutcome>,
}

impl GeneratedFiles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, path: PathBuf, contents: String) {
        self.files.push(GeneratedFile { path, contents });
    }

    /// Record a class, OR-ing `customized` with anything recorded before.
    pub fn record(&mut self, class: &str, customized: bool) {
        let outcome = self.classes.entry(class.to_string()).or_default();
        outcome.customized |= customized;
    }

    /// Append another generator's output.
    pub fn merge(&mut self, other: GeneratedFiles) {
        self.files.extend(other.files);
        for (class, outcome) in other.classes {
            self.record(&class, outcome.customized);
        }
    }

    pub fn get(&self, path: &Path) -> Option<&GeneratedFile> {
        self.files.iter().find(|f| f.path == path)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// `#ifndef` guard derived from a relative path.
pub(crate) fn header_guard(path: &Path) -> String {
    let mut guard: String = path
        .to_string_lossy()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    guard.push('_');
    guard
}
