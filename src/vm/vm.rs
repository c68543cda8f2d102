use std::collections::BTreeMap;
use std::io::{self, Write};

use tracing::{Level, debug, trace};

use super::debug::{disassemble_function_tree, disassemble_instruction};
use super::error::{InterpretError, RuntimeError, TraceLine};
use super::heap::{GcStats, Heap, ObjRef};
use super::native;
use super::object::{Closure, Native, NativeFn, Object, Upvalue};
use super::ops::OpCode;
use super::table::Table;
use super::value::Value;
use crate::compiler::{self, CompileErrors};
use crate::config::RuntimeConfig;

/// Maximum call depth.
pub const FRAMES_MAX: usize = 64;
pub const STACK_MAX: usize = FRAMES_MAX * 256;

/// A call frame for the VM.
#[derive(Debug, Clone, Copy)]
struct CallFrame {
    closure: ObjRef,
    /// The closure's function, cached to skip one heap lookup per byte.
    function: ObjRef,
    ip: usize,
    /// Stack index of slot 0 (the callee) for this frame.
    slots: usize,
}

/// The Lox virtual machine.
///
/// Globals and interned strings persist across calls to [`Vm::interpret`],
/// which is what the REPL relies on.
pub struct Vm {
    frames: Vec<CallFrame>,
    stack: Vec<Value>,
    globals: Table,
    heap: Heap,
    /// Upvalues still pointing into the stack, keyed by stack slot.
    open_upvalues: BTreeMap<usize, ObjRef>,
    config: RuntimeConfig,
    /// Output stream for print statements
    output: Box<dyn Write>,
}

impl Vm {
    pub fn new() -> Self {
        Self::new_with_config(RuntimeConfig::default(), Box::new(io::stdout()))
    }

    pub fn with_config(config: RuntimeConfig) -> Self {
        Self::new_with_config(config, Box::new(io::stdout()))
    }

    /// Create a VM with a custom output stream.
    pub fn with_output(output: Box<dyn Write>) -> Self {
        Self::new_with_config(RuntimeConfig::default(), output)
    }

    pub fn new_with_config(config: RuntimeConfig, output: Box<dyn Write>) -> Self {
        let mut vm = Self {
            frames: Vec::with_capacity(FRAMES_MAX),
            stack: Vec::with_capacity(STACK_MAX),
            globals: Table::new(),
            heap: Heap::new(config.gc),
            open_upvalues: BTreeMap::new(),
            config,
            output,
        };
        native::install(&mut vm);
        vm
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    pub fn gc_stats(&self) -> &GcStats {
        self.heap.stats()
    }

    // ========================================
    // Entry points
    // ========================================

    /// Compile `source` to its top-level function without running it.
    ///
    /// Collections during compilation keep everything the VM roots alive. The
    /// returned function itself is not rooted: push it, run it or discard it
    /// before the next allocation on this VM.
    pub fn compile(&mut self, source: &str) -> Result<ObjRef, CompileErrors> {
        let (stack, frames, upvalues, globals) =
            (&self.stack, &self.frames, &self.open_upvalues, &self.globals);
        compiler::compile(source, &mut self.heap, &|heap: &mut Heap| {
            mark_roots(heap, stack, frames, upvalues, globals)
        })
    }

    pub fn interpret(&mut self, source: &str) -> Result<(), InterpretError> {
        let function = self.compile(source)?;

        if self.config.dump_bytecode {
            let listing = disassemble_function_tree(&self.heap, function);
            self.write_output(format_args!("{}", listing))?;
        }

        self.push(Value::Obj(function));
        self.collect_if_needed();
        let closure = self.heap.alloc(Object::Closure(Closure::new(function, 0)));
        self.pop();
        self.push(Value::Obj(closure));
        self.call(closure, function, 0)?;

        self.run()?;
        self.output.flush().map_err(|e| self.io_error(e))?;
        Ok(())
    }

    pub fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    pub fn pop(&mut self) -> Value {
        self.stack.pop().expect("stack underflow")
    }

    fn peek(&self, distance: usize) -> Value {
        self.stack[self.stack.len() - 1 - distance]
    }

    /// Expose a host function to scripts as a global.
    pub fn define_native(&mut self, name: &str, arity: u8, function: NativeFn) {
        self.collect_if_needed();
        let name_ref = self.heap.alloc_string(name);
        // Both objects stay on the stack until the globals table holds them.
        self.push(Value::Obj(name_ref));
        self.collect_if_needed();
        let native = self.heap.alloc(Object::Native(Native {
            name: name_ref,
            arity,
            function,
        }));
        self.push(Value::Obj(native));

        let hash = self.heap.string(name_ref).hash();
        self.globals.set(name_ref, hash, Value::Obj(native));
        self.pop();
        self.pop();
    }

    // ========================================
    // Garbage collection
    // ========================================

    fn collect_if_needed(&mut self) {
        if self.heap.should_collect() {
            self.collect_garbage();
        }
    }

    /// Mark every root and run a full collection.
    pub fn collect_garbage(&mut self) -> usize {
        mark_roots(
            &mut self.heap,
            &self.stack,
            &self.frames,
            &self.open_upvalues,
            &self.globals,
        );
        self.heap.collect()
    }

    // ========================================
    // Errors
    // ========================================

    /// Build a runtime error with the current stack trace and reset the VM so
    /// it can interpret again.
    fn runtime_error(&mut self, message: impl Into<String>) -> RuntimeError {
        let trace = self
            .frames
            .iter()
            .rev()
            .map(|frame| {
                let function = self.heap.function(frame.function);
                TraceLine {
                    line: function
                        .chunk
                        .line_at(frame.ip.saturating_sub(1))
                        .unwrap_or(0),
                    function: function
                        .name
                        .map(|name| self.heap.string(name).as_str().to_string()),
                }
            })
            .collect();
        let error = RuntimeError {
            message: message.into(),
            trace,
        };
        debug!(message = %error.message, depth = self.frames.len(), "runtime error");
        self.reset_stack();
        error
    }

    fn io_error(&mut self, error: io::Error) -> RuntimeError {
        self.runtime_error(format!("Failed to write output: {}.", error))
    }

    fn reset_stack(&mut self) {
        self.stack.clear();
        self.frames.clear();
        self.open_upvalues.clear();
    }

    fn write_output(&mut self, args: std::fmt::Arguments<'_>) -> Result<(), RuntimeError> {
        match self.output.write_fmt(args) {
            Ok(()) => Ok(()),
            Err(e) => Err(self.io_error(e)),
        }
    }

    // ========================================
    // Decoding
    // ========================================

    fn frame(&self) -> &CallFrame {
        self.frames.last().expect("no active call frame")
    }

    fn read_byte(&mut self) -> u8 {
        let frame = self.frames.last_mut().expect("no active call frame");
        let byte = self.heap.function(frame.function).chunk.code[frame.ip];
        frame.ip += 1;
        byte
    }

    fn read_short(&mut self) -> u16 {
        let hi = self.read_byte();
        let lo = self.read_byte();
        u16::from_be_bytes([hi, lo])
    }

    fn read_constant(&mut self) -> Value {
        let index = self.read_byte() as usize;
        self.heap.function(self.frame().function).chunk.constants[index]
    }

    /// Read a constant the compiler guarantees is an interned name.
    fn read_name(&mut self) -> (ObjRef, u32) {
        let name = match self.read_constant() {
            Value::Obj(r) => r,
            other => panic!("expected name constant, found {:?}", other),
        };
        (name, self.heap.string(name).hash())
    }

    fn trace_instruction(&self) {
        let frame = self.frame();
        let chunk = &self.heap.function(frame.function).chunk;
        let mut text = String::new();
        disassemble_instruction(&self.heap, chunk, frame.ip, &mut text);
        let stack: String = self
            .stack
            .iter()
            .map(|value| format!("[ {} ]", value.display(&self.heap)))
            .collect();
        trace!(stack = %stack, "{}", text.trim_end());
    }

    // ========================================
    // Execution
    // ========================================

    fn run(&mut self) -> Result<(), RuntimeError> {
        loop {
            if tracing::enabled!(Level::TRACE) {
                self.trace_instruction();
            }

            let byte = self.read_byte();
            let op = match OpCode::try_from(byte) {
                Ok(op) => op,
                Err(byte) => return Err(self.runtime_error(format!("Unknown opcode {}.", byte))),
            };

            match op {
                OpCode::Constant => {
                    let constant = self.read_constant();
                    self.push(constant);
                }
                OpCode::Nil => self.push(Value::Nil),
                OpCode::True => self.push(Value::Bool(true)),
                OpCode::False => self.push(Value::Bool(false)),
                OpCode::Pop => {
                    self.pop();
                }

                OpCode::GetLocal => {
                    let slot = self.read_byte() as usize;
                    let value = self.stack[self.frame().slots + slot];
                    self.push(value);
                }
                OpCode::SetLocal => {
                    let slot = self.read_byte() as usize;
                    let index = self.frame().slots + slot;
                    self.stack[index] = self.peek(0);
                }
                OpCode::GetGlobal => {
                    let (name, hash) = self.read_name();
                    match self.globals.get(name, hash) {
                        Some(value) => self.push(value),
                        None => return Err(self.undefined_variable(name)),
                    }
                }
                OpCode::DefineGlobal => {
                    let (name, hash) = self.read_name();
                    let value = self.pop();
                    self.globals.set(name, hash, value);
                }
                OpCode::SetGlobal => {
                    let (name, hash) = self.read_name();
                    let value = self.peek(0);
                    if self.globals.set(name, hash, value) {
                        // Assignment never creates a global.
                        self.globals.delete(name, hash);
                        return Err(self.undefined_variable(name));
                    }
                }
                OpCode::GetUpvalue => {
                    let index = self.read_byte() as usize;
                    let upvalue = self.heap.closure(self.frame().closure).upvalues[index];
                    let value = match *self.heap.upvalue(upvalue) {
                        Upvalue::Open(slot) => self.stack[slot],
                        Upvalue::Closed(value) => value,
                    };
                    self.push(value);
                }
                OpCode::SetUpvalue => {
                    let index = self.read_byte() as usize;
                    let upvalue = self.heap.closure(self.frame().closure).upvalues[index];
                    let value = self.peek(0);
                    match *self.heap.upvalue(upvalue) {
                        Upvalue::Open(slot) => self.stack[slot] = value,
                        Upvalue::Closed(_) => {
                            *self.heap.upvalue_mut(upvalue) = Upvalue::Closed(value);
                        }
                    }
                }

                OpCode::Equal => {
                    let b = self.pop();
                    let a = self.pop();
                    self.push(Value::Bool(a == b));
                }
                OpCode::Greater => self.binary_number(">", |a, b| Value::Bool(a > b))?,
                OpCode::Less => self.binary_number("<", |a, b| Value::Bool(a < b))?,

                OpCode::Add => self.add()?,
                OpCode::Subtract => self.binary_number("-", |a, b| Value::Number(a - b))?,
                OpCode::Multiply => self.binary_number("*", |a, b| Value::Number(a * b))?,
                OpCode::Divide => self.binary_number("/", |a, b| Value::Number(a / b))?,
                OpCode::Not => {
                    let value = self.pop();
                    self.push(Value::Bool(value.is_falsey()));
                }
                OpCode::Negate => match self.peek(0) {
                    Value::Number(n) => {
                        self.pop();
                        self.push(Value::Number(-n));
                    }
                    _ => return Err(self.runtime_error("Operand of '-' must be a number.")),
                },

                OpCode::Print => {
                    let value = self.pop();
                    let result = writeln!(self.output, "{}", value.display(&self.heap));
                    if let Err(e) = result {
                        return Err(self.io_error(e));
                    }
                }

                OpCode::Jump => {
                    let offset = self.read_short() as usize;
                    self.frames.last_mut().expect("no active call frame").ip += offset;
                }
                OpCode::JumpIfFalse => {
                    let offset = self.read_short() as usize;
                    if self.peek(0).is_falsey() {
                        self.frames.last_mut().expect("no active call frame").ip += offset;
                    }
                }
                OpCode::Loop => {
                    let offset = self.read_short() as usize;
                    self.frames.last_mut().expect("no active call frame").ip -= offset;
                }

                OpCode::Call => {
                    let arg_count = self.read_byte();
                    let callee = self.peek(arg_count as usize);
                    self.call_value(callee, arg_count)?;
                }
                OpCode::Closure => self.make_closure(),
                OpCode::CloseUpvalue => {
                    let top = self.stack.len() - 1;
                    self.close_upvalues(top);
                    self.pop();
                }
                OpCode::Return => {
                    let result = self.pop();
                    let frame = self.frames.pop().expect("no active call frame");
                    self.close_upvalues(frame.slots);
                    self.stack.truncate(frame.slots);
                    if self.frames.is_empty() {
                        return Ok(());
                    }
                    self.push(result);
                }
            }
        }
    }

    fn undefined_variable(&mut self, name: ObjRef) -> RuntimeError {
        let message = format!("Undefined variable '{}'.", self.heap.string(name).as_str());
        self.runtime_error(message)
    }

    fn binary_number(&mut self, symbol: &str, apply: fn(f64, f64) -> Value) -> Result<(), RuntimeError> {
        match (self.peek(1), self.peek(0)) {
            (Value::Number(a), Value::Number(b)) => {
                self.pop();
                self.pop();
                self.push(apply(a, b));
                Ok(())
            }
            _ => Err(self.runtime_error(format!("Operands of '{}' must be numbers.", symbol))),
        }
    }

    fn add(&mut self) -> Result<(), RuntimeError> {
        match (self.peek(1), self.peek(0)) {
            (Value::Number(a), Value::Number(b)) => {
                self.pop();
                self.pop();
                self.push(Value::Number(a + b));
                Ok(())
            }
            (Value::Obj(a), Value::Obj(b))
                if self.heap.get(a).as_string().is_some()
                    && self.heap.get(b).as_string().is_some() =>
            {
                self.concatenate(a, b);
                Ok(())
            }
            _ => Err(self.runtime_error("Operands of '+' must be two numbers or two strings.")),
        }
    }

    fn concatenate(&mut self, a: ObjRef, b: ObjRef) {
        let mut text = String::with_capacity(
            self.heap.string(a).as_str().len() + self.heap.string(b).as_str().len(),
        );
        text.push_str(self.heap.string(a).as_str());
        text.push_str(self.heap.string(b).as_str());

        // Operands stay on the stack, and so rooted, across the collection.
        self.collect_if_needed();
        let result = self.heap.alloc_string(&text);
        self.pop();
        self.pop();
        self.push(Value::Obj(result));
    }

    // ========================================
    // Calls and closures
    // ========================================

    fn call_value(&mut self, callee: Value, arg_count: u8) -> Result<(), RuntimeError> {
        if let Value::Obj(r) = callee {
            match self.heap.get(r) {
                Object::Closure(closure) => {
                    let function = closure.function;
                    return self.call(r, function, arg_count);
                }
                Object::Native(native) => {
                    let (arity, function) = (native.arity, native.function);
                    return self.call_native(arity, function, arg_count);
                }
                _ => {}
            }
        }
        Err(self.runtime_error("Can only call functions."))
    }

    fn check_arity(&mut self, arity: u8, arg_count: u8) -> Result<(), RuntimeError> {
        if arity == arg_count {
            return Ok(());
        }
        Err(self.runtime_error(format!(
            "Expected {} arguments but got {}.",
            arity, arg_count
        )))
    }

    fn call(&mut self, closure: ObjRef, function: ObjRef, arg_count: u8) -> Result<(), RuntimeError> {
        self.check_arity(self.heap.function(function).arity, arg_count)?;
        if self.frames.len() == FRAMES_MAX {
            return Err(self.runtime_error("Stack overflow."));
        }
        self.frames.push(CallFrame {
            closure,
            function,
            ip: 0,
            slots: self.stack.len() - arg_count as usize - 1,
        });
        Ok(())
    }

    fn call_native(&mut self, arity: u8, function: NativeFn, arg_count: u8) -> Result<(), RuntimeError> {
        self.check_arity(arity, arg_count)?;
        let args_start = self.stack.len() - arg_count as usize;
        let result = function(&self.stack[args_start..]);
        match result {
            Ok(value) => {
                // Drop the arguments and the callee.
                self.stack.truncate(args_start - 1);
                self.push(value);
                Ok(())
            }
            Err(message) => Err(self.runtime_error(message)),
        }
    }

    fn make_closure(&mut self) {
        let function = match self.read_constant() {
            Value::Obj(r) => r,
            other => panic!("expected function constant, found {:?}", other),
        };
        let upvalue_count = self.heap.function(function).upvalue_count;

        self.collect_if_needed();
        let closure = self
            .heap
            .alloc(Object::Closure(Closure::new(function, upvalue_count)));
        // On the stack before capturing so upvalue allocations can't free it.
        self.push(Value::Obj(closure));

        for _ in 0..upvalue_count {
            let is_local = self.read_byte() == 1;
            let index = self.read_byte() as usize;
            let frame = *self.frame();
            let upvalue = if is_local {
                self.capture_upvalue(frame.slots + index)
            } else {
                self.heap.closure(frame.closure).upvalues[index]
            };
            self.heap.closure_mut(closure).upvalues.push(upvalue);
        }
    }

    /// Reuse the open upvalue for `slot` or create one, so closures over the
    /// same variable share it.
    fn capture_upvalue(&mut self, slot: usize) -> ObjRef {
        if let Some(existing) = self.open_upvalues.get(&slot) {
            return *existing;
        }
        self.collect_if_needed();
        let upvalue = self.heap.alloc(Object::Upvalue(Upvalue::Open(slot)));
        self.open_upvalues.insert(slot, upvalue);
        upvalue
    }

    /// Close every open upvalue at or above stack slot `last`.
    fn close_upvalues(&mut self, last: usize) {
        let closing = self.open_upvalues.split_off(&last);
        for (slot, upvalue) in closing {
            *self.heap.upvalue_mut(upvalue) = Upvalue::Closed(self.stack[slot]);
        }
    }
}

/// Mark the VM's roots: operand stack, frame closures, open upvalues and
/// globals.
fn mark_roots(
    heap: &mut Heap,
    stack: &[Value],
    frames: &[CallFrame],
    open_upvalues: &BTreeMap<usize, ObjRef>,
    globals: &Table,
) {
    for value in stack {
        heap.mark_value(*value);
    }
    for frame in frames {
        heap.mark_object(frame.closure);
    }
    for upvalue in open_upvalues.values() {
        heap.mark_object(*upvalue);
    }
    heap.mark_table(globals);
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}
