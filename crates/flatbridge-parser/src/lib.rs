//! Parser for annotated declaration files.
//!
//! Turns header text into a [`ModelFragment`](flatbridge_ast::ModelFragment):
//! classes, global functions and typedefs, each with resolved argument and
//! return types, documentation and canonical text.

pub mod canonical;
pub mod lexer;
mod parser;
pub mod resolver;

pub use canonical::canonicalize;
pub use parser::parse;
pub use resolver::resolve;
