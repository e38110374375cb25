//! Reading existing output and writing regenerated files.
//!
//! Generators never touch the filesystem themselves: they read previous
//! output through a [`FileReader`] (needed for merging hand-edited bodies)
//! and hand back [`GeneratedFiles`]. [`write_changed`] then writes only the
//! files whose content differs from what is already there.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use flatbridge_ast::{BridgeError, Result};
use serde::Serialize;
use tempfile::NamedTempFile;

use crate::GeneratedFiles;

/// Read access to previously generated files, by path relative to the
/// output root.
pub trait FileReader {
    /// `Ok(None)` when the file does not exist.
    fn read(&self, path: &Path) -> Result<Option<String>>;
}

pub trait FileWriter {
    fn write(&mut self, path: &Path, contents: &str) -> Result<()>;
}

fn io_error(path: &Path, source: io::Error) -> BridgeError {
    BridgeError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Reads files below an output root.
#[derive(Debug, Clone)]
pub struct FsReader {
    root: PathBuf,
}

impl FsReader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl FileReader for FsReader {
    fn read(&self, path: &Path) -> Result<Option<String>> {
        let full = self.root.join(path);
        match fs::read_to_string(&full) {
            Ok(text) => Ok(Some(text)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(io_error(&full, err)),
        }
    }
}

/// Writes files below an output root. Each file is written to a temporary
/// file in its destination directory and then renamed over the target, so
/// an interrupted run never leaves a half-written file behind.
#[derive(Debug, Clone)]
pub struct FsWriter {
    root: PathBuf,
}

impl FsWriter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl FileWriter for FsWriter {
    fn write(&mut self, path: &Path, contents: &str) -> Result<()> {
        let full = self.root.join(path);
        let dir = match full.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir).map_err(|e| io_error(&dir, e))?;

        let mut tmp = NamedTempFile::new_in(&dir).map_err(|e| io_error(&dir, e))?;
        tmp.write_all(contents.as_bytes())
            .map_err(|e| io_error(tmp.path(), e))?;
        tmp.persist(&full).map_err(|e| io_error(&full, e.error))?;
        Ok(())
    }
}

/// In-memory file tree. Backs `--dry-run` and tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryFs {
    files: BTreeMap<PathBuf, String>,
}

impl MemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<PathBuf>, contents: impl Into<String>) {
        self.files.insert(path.into(), contents.into());
    }

    pub fn get(&self, path: &Path) -> Option<&str> {
        self.files.get(path).map(String::as_str)
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.files.keys().map(PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl FileReader for MemoryFs {
    fn read(&self, path: &Path) -> Result<Option<String>> {
        Ok(self.files.get(path).cloned())
    }
}

impl FileWriter for MemoryFs {
    fn write(&mut self, path: &Path, contents: &str) -> Result<()> {
        self.files.insert(path.to_path_buf(), contents.to_string());
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WriteSummary {
    pub written: Vec<PathBuf>,
    pub unchanged: Vec<PathBuf>,
}

/// Write every file whose content differs from what `reader` sees.
pub fn write_changed(
    files: &GeneratedFiles,
    reader: &dyn FileReader,
    writer: &mut dyn FileWriter,
) -> Result<WriteSummary> {
    let mut summary = WriteSummary::default();
    for file in &files.files {
        if reader.read(&file.path)?.as_deref() == Some(file.contents.as_str()) {
            tracing::debug!(path = %file.path.display(), "unchanged");
            summary.unchanged.push(file.path.clone());
            continue;
        }
        writer.write(&file.path, &file.contents)?;
        tracing::info!(path = %file.path.display(), "wrote");
        summary.written.push(file.path.clone());
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn files() -> GeneratedFiles {
        let mut files = GeneratedFiles::new();
        files.push(PathBuf::from("include/capi/a_capi.h"), "// a\n".to_string());
        files.push(PathBuf::from("bridge/a_to_abi.cc"), "// b\n".to_string());
        files
    }

    #[test]
    fn test_fs_writer_creates_directories() {
        let dir = tempdir().unwrap();
        let reader = FsReader::new(dir.path());
        let mut writer = FsWriter::new(dir.path());

        let summary = write_changed(&files(), &reader, &mut writer).unwrap();
        assert_eq!(summary.written.len(), 2);
        assert_eq!(
            fs::read_to_string(dir.path().join("bridge/a_to_abi.cc")).unwrap(),
            "// b\n"
        );
    }

    #[test]
    fn test_unchanged_files_are_not_rewritten() {
        let dir = tempdir().unwrap();
        let reader = FsReader::new(dir.path());
        let mut writer = FsWriter::new(dir.path());
        write_changed(&files(), &reader, &mut writer).unwrap();

        let summary = write_changed(&files(), &reader, &mut writer).unwrap();
        assert!(summary.written.is_empty());
        assert_eq!(summary.unchanged.len(), 2);
    }

    #[test]
    fn test_missing_file_reads_as_none() {
        let dir = tempdir().unwrap();
        let reader = FsReader::new(dir.path());
        assert!(reader.read(Path::new("nope.h")).unwrap().is_none());
    }

    #[test]
    fn test_memory_fs_round() {
        let mut fs = MemoryFs::new();
        let summary = write_changed(&files(), &MemoryFs::new(), &mut fs).unwrap();
        assert_eq!(summary.written.len(), 2);
        assert_eq!(fs.get(Path::new("include/capi/a_capi.h")), Some("// a\n"));
    }
}
