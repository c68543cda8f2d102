//! Source text to bytecode.
//!
//! The scanner produces tokens on demand and the parser emits bytecode
//! directly into the function being compiled; there is no syntax tree.

mod error;
mod parser;
mod precedence;
pub mod scanner;
mod scope;

pub use error::{CompileError, CompileErrors, ErrorLocation};
pub use parser::compile;
pub use scanner::{Scanner, Token, TokenKind};
