//! Reading declaration files and building the linked model.

use std::fs;
use std::path::{Path, PathBuf};

use flatbridge_ast::{BridgeError, DeclarationModel, Diagnostics, Dialect, Scope};
use tracing::{debug, info};

/// One declaration file and its text, kept for error reporting.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub path: String,
    pub source: String,
}

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("failed to read {0}: {1}")]
    Io(String, String),
    #[error("{path}: {error}")]
    Parse {
        path: String,
        source_code: String,
        error: BridgeError,
    },
    #[error("{0}")]
    Link(BridgeError),
    #[error("no declaration files given (pass files or set [input] files in flatbridge.toml)")]
    NoInput,
}

/// Read every file, in order.
pub fn read_sources(paths: &[PathBuf]) -> Result<Vec<SourceFile>, LoadError> {
    if paths.is_empty() {
        return Err(LoadError::NoInput);
    }
    paths
        .iter()
        .map(|path| {
            let source = fs::read_to_string(path)
                .map_err(|e| LoadError::Io(display(path), e.to_string()))?;
            Ok(SourceFile {
                path: display(path),
                source,
            })
        })
        .collect()
}

/// Parse the files in order and link the result.
///
/// Typedefs declared in one file are visible to every file after it.
pub fn build_model(
    sources: &[SourceFile],
    dialect: &Dialect,
    diags: &mut Diagnostics,
) -> Result<DeclarationModel, LoadError> {
    let mut root = Scope::new("<root>");
    let mut fragments = Vec::with_capacity(sources.len());

    for file in sources {
        debug!(path = %file.path, "parsing");
        let fragment = flatbridge_parser::parse(&file.source, &[&root], dialect, diags).map_err(
            |error| LoadError::Parse {
                path: file.path.clone(),
                source_code: file.source.clone(),
                error,
            },
        )?;
        debug!(
            path = %file.path,
            classes = fragment.classes.len(),
            functions = fragment.functions.len(),
            "parsed"
        );
        root.typedefs.extend(fragment.typedefs.iter().cloned());
        fragments.push(fragment);
    }

    let model = DeclarationModel::build(fragments, dialect).map_err(LoadError::Link)?;
    info!(
        classes = model.classes().count(),
        functions = model.functions().len(),
        "model linked"
    );
    Ok(model)
}

fn display(path: &Path) -> String {
    path.display().to_string()
}
