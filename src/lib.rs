//! Loxide - a bytecode virtual machine for the Lox language.
//!
//! Source is compiled in a single pass to bytecode by [`compiler::compile`]
//! and executed by [`vm::Vm`], which owns a garbage-collected heap.

pub mod compiler;
pub mod config;
pub mod vm;

// Re-export commonly used types
pub use compiler::{CompileError, CompileErrors};
pub use config::{GcConfig, RuntimeConfig, StatsFormat};
pub use vm::{GcStats, InterpretError, RuntimeError, Value, Vm};
