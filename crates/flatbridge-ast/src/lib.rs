//! Declaration model for flatbridge.
//!
//! Holds everything the parser produces and the generators consume: the
//! class/function/typedef graph, resolved type categories, the naming
//! transliterator, project spellings and the shared error and diagnostics
//! types.

mod attrs;
mod diagnostics;
mod dialect;
mod error;
mod model;
pub mod naming;
mod types;

pub use attrs::Attributes;
pub use diagnostics::{Diagnostic, DiagnosticKind, Diagnostics, Severity};
pub use dialect::Dialect;
pub use error::{BridgeError, Result, Span};
pub use model::{
    ArgumentDecl, CanonicalDecl, ClassAttributes, ClassDecl, DeclarationModel, FunctionDecl,
    FunctionKind, ModelFragment, Ownership, Scope, Side, Typedef, VersionRange,
};
pub use naming::Transliterator;
pub use types::{Category, TypeAnalysis};
