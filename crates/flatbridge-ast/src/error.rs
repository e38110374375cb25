//! Error types shared by the parser and the generators.

use std::ops::Range;
use std::path::PathBuf;

use thiserror::Error;

/// Byte range inside one declaration file.
pub type Span = Range<usize>;

/// Errors raised while building the model or generating output.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// A type string that no rule, table or in-scope typedef resolves.
    #[error("unknown type `{raw}`")]
    UnknownType { raw: String, span: Option<Span> },

    /// Attributes that do not parse, or declarations that contradict the
    /// rest of the model.
    #[error("malformed declaration: {detail} in `{text}`")]
    MalformedDeclaration {
        detail: String,
        text: String,
        span: Option<Span>,
    },

    /// No marshaling rule exists for this category combination. Generation
    /// turns this into a stub for the one function involved.
    #[error("unsupported category combination: {detail} (`{text}`)")]
    UnsupportedCategoryCombination { detail: String, text: String },

    /// Reading or writing a file failed.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl BridgeError {
    pub fn unknown_type(raw: impl Into<String>) -> Self {
        BridgeError::UnknownType {
            raw: raw.into(),
            span: None,
        }
    }

    pub fn malformed(detail: impl Into<String>, text: impl Into<String>) -> Self {
        BridgeError::MalformedDeclaration {
            detail: detail.into(),
            text: text.into(),
            span: None,
        }
    }

    pub fn unsupported(detail: impl Into<String>, text: impl Into<String>) -> Self {
        BridgeError::UnsupportedCategoryCombination {
            detail: detail.into(),
            text: text.into(),
        }
    }

    /// Attach a source span if none is set yet.
    pub fn with_span(mut self, new_span: Span) -> Self {
        match &mut self {
            BridgeError::UnknownType { span, .. }
            | BridgeError::MalformedDeclaration { span, .. } => {
                if span.is_none() {
                    *span = Some(new_span);
                }
            }
            BridgeError::UnsupportedCategoryCombination { .. } | BridgeError::Io { .. } => {}
        }
        self
    }

    pub fn span(&self) -> Option<&Span> {
        match self {
            BridgeError::UnknownType { span, .. }
            | BridgeError::MalformedDeclaration { span, .. } => span.as_ref(),
            BridgeError::UnsupportedCategoryCombination { .. } | BridgeError::Io { .. } => None,
        }
    }

    /// Fatal errors abort the run; everything else is handled per function.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, BridgeError::UnsupportedCategoryCombination { .. })
    }
}

/// Result type alias for model and generator operations.
pub type Result<T> = std::result::Result<T, BridgeError>;
