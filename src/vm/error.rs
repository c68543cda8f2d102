use std::fmt;

use thiserror::Error;

use crate::compiler::CompileErrors;

/// One frame of a runtime stack trace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceLine {
    pub line: usize,
    /// `None` for the top-level script.
    pub function: Option<String>,
}

impl fmt::Display for TraceLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.function {
            Some(name) => write!(f, "[line {}] in {}()", self.line, name),
            None => write!(f, "[line {}] in script", self.line),
        }
    }
}

/// A runtime error with the call stack at the point it was raised,
/// innermost frame first.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}{}", render_trace(.trace))]
pub struct RuntimeError {
    pub message: String,
    pub trace: Vec<TraceLine>,
}

fn render_trace(trace: &[TraceLine]) -> String {
    trace.iter().map(|line| format!("\n{}", line)).collect()
}

#[derive(Debug, Error)]
pub enum InterpretError {
    #[error(transparent)]
    Compile(#[from] CompileErrors),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}
