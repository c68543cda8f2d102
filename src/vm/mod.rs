//! Bytecode, the object heap and the interpreter loop.

mod chunk;
pub mod debug;
mod error;
mod heap;
mod native;
mod object;
mod ops;
mod table;
mod value;
mod vm;

pub use chunk::Chunk;
pub use error::{InterpretError, RuntimeError, TraceLine};
pub use heap::{GcStats, Heap, ObjRef};
pub use object::{Closure, Function, LoxString, Native, NativeFn, Object, Upvalue, hash_string};
pub use ops::{OpCode, OperandWidth};
pub use table::Table;
pub use value::{Value, format_number};
pub use vm::{FRAMES_MAX, STACK_MAX, Vm};
