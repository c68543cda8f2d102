//! Bytecode disassembler.
//!
//! Output format, one instruction per line:
//!
//! ```text
//! 0000    1 OP_CONSTANT         0 '1.2'
//! 0002    | OP_NEGATE
//! 0003    2 OP_JUMP_IF_FALSE    3 -> 12
//! ```
//!
//! The second column is the source line, or `|` when it repeats the line of
//! the previous instruction.

use super::chunk::Chunk;
use super::heap::{Heap, ObjRef};
use super::ops::{OpCode, OperandWidth};
use super::value::Value;

/// Disassemble every instruction in `chunk` under a `== name ==` header.
pub fn disassemble_chunk(heap: &Heap, chunk: &Chunk, name: &str) -> String {
    let mut out = format!("== {} ==\n", name);
    let mut offset = 0;
    while offset < chunk.code.len() {
        offset = disassemble_instruction(heap, chunk, offset, &mut out);
    }
    out
}

/// Disassemble a function and, depth first, every function in its constant
/// pool.
pub fn disassemble_function_tree(heap: &Heap, function: ObjRef) -> String {
    let mut out = String::new();
    let mut pending = vec![function];
    while let Some(r) = pending.pop() {
        let function = heap.function(r);
        let name = match function.name {
            Some(name) => heap.string(name).as_str().to_string(),
            None => "<script>".to_string(),
        };
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(&disassemble_chunk(heap, &function.chunk, &name));

        let nested = function.chunk.constants.iter().rev().filter_map(|c| match c {
            Value::Obj(r) if heap.get(*r).as_function().is_some() => Some(*r),
            _ => None,
        });
        pending.extend(nested);
    }
    out
}

/// Append the disassembly of the instruction at `offset` to `out` and return
/// the offset of the next instruction.
pub fn disassemble_instruction(heap: &Heap, chunk: &Chunk, offset: usize, out: &mut String) -> usize {
    out.push_str(&format!("{:04} ", offset));
    let line = chunk.line_at(offset).unwrap_or(0);
    if offset > 0 && chunk.line_at(offset - 1) == Some(line) {
        out.push_str("   | ");
    } else {
        out.push_str(&format!("{:4} ", line));
    }

    let byte = chunk.code[offset];
    let op = match OpCode::try_from(byte) {
        Ok(op) => op,
        Err(byte) => {
            out.push_str(&format!("Unknown opcode {}\n", byte));
            return offset + 1;
        }
    };

    match op.operand_width() {
        OperandWidth::None => {
            out.push_str(op.mnemonic());
            out.push('\n');
            offset + 1
        }
        OperandWidth::Byte => match op {
            OpCode::Constant
            | OpCode::GetGlobal
            | OpCode::DefineGlobal
            | OpCode::SetGlobal => constant_instruction(heap, chunk, op, offset, out),
            _ => byte_instruction(chunk, op, offset, out),
        },
        OperandWidth::Short => {
            let sign = if op == OpCode::Loop { -1 } else { 1 };
            jump_instruction(chunk, op, sign, offset, out)
        }
        OperandWidth::Closure => closure_instruction(heap, chunk, offset, out),
    }
}

fn constant_instruction(heap: &Heap, chunk: &Chunk, op: OpCode, offset: usize, out: &mut String) -> usize {
    let index = chunk.code[offset + 1];
    out.push_str(&format!(
        "{:<16} {:4} '{}'\n",
        op.mnemonic(),
        index,
        constant_text(heap, chunk, index)
    ));
    offset + 2
}

fn byte_instruction(chunk: &Chunk, op: OpCode, offset: usize, out: &mut String) -> usize {
    let slot = chunk.code[offset + 1];
    out.push_str(&format!("{:<16} {:4}\n", op.mnemonic(), slot));
    offset + 2
}

fn jump_instruction(chunk: &Chunk, op: OpCode, sign: i64, offset: usize, out: &mut String) -> usize {
    let jump = chunk.read_short(offset + 1) as i64;
    let target = offset as i64 + 3 + sign * jump;
    out.push_str(&format!("{:<16} {:4} -> {}\n", op.mnemonic(), offset, target));
    offset + 3
}

fn closure_instruction(heap: &Heap, chunk: &Chunk, offset: usize, out: &mut String) -> usize {
    let index = chunk.code[offset + 1];
    out.push_str(&format!(
        "{:<16} {:4} {}\n",
        OpCode::Closure.mnemonic(),
        index,
        constant_text(heap, chunk, index)
    ));

    let mut next = offset + 2;
    let upvalue_count = match chunk.constants.get(index as usize) {
        Some(Value::Obj(r)) => heap.get(*r).as_function().map_or(0, |f| f.upvalue_count),
        _ => 0,
    };
    for _ in 0..upvalue_count {
        let is_local = chunk.code[next];
        let slot = chunk.code[next + 1];
        let kind = if is_local == 1 { "local" } else { "upvalue" };
        out.push_str(&format!("{:04}    |                     {} {}\n", next, kind, slot));
        next += 2;
    }
    next
}

fn constant_text(heap: &Heap, chunk: &Chunk, index: u8) -> String {
    match chunk.constants.get(index as usize) {
        Some(value) => value.display(heap).to_string(),
        None => "<bad constant>".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::object::{Function, Object};

    #[test]
    fn test_simple_chunk() {
        let heap = Heap::default();
        let mut chunk = Chunk::new();
        let index = chunk.add_constant(Value::Number(1.2));
        chunk.write_op(OpCode::Constant, 123);
        chunk.write(index as u8, 123);
        chunk.write_op(OpCode::Negate, 123);
        chunk.write_op(OpCode::Return, 124);

        let output = disassemble_chunk(&heap, &chunk, "test chunk");
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines[0], "== test chunk ==");
        assert_eq!(lines[1], "0000  123 OP_CONSTANT         0 '1.2'");
        assert_eq!(lines[2], "0002    | OP_NEGATE");
        assert_eq!(lines[3], "0003  124 OP_RETURN");
    }

    #[test]
    fn test_jump_targets() {
        let heap = Heap::default();
        let mut chunk = Chunk::new();
        chunk.write_op(OpCode::Jump, 1);
        chunk.write(0, 1);
        chunk.write(2, 1);
        chunk.write_op(OpCode::Nil, 1);
        chunk.write_op(OpCode::Pop, 1);
        chunk.write_op(OpCode::Loop, 2);
        chunk.write(0, 2);
        chunk.write(8, 2);

        let output = disassemble_chunk(&heap, &chunk, "jumps");
        assert!(output.contains("OP_JUMP             0 -> 5"));
        assert!(output.contains("OP_LOOP             5 -> 0"));
    }

    #[test]
    fn test_unknown_opcode() {
        let heap = Heap::default();
        let mut chunk = Chunk::new();
        chunk.write(250, 1);
        let mut out = String::new();
        assert_eq!(disassemble_instruction(&heap, &chunk, 0, &mut out), 1);
        assert!(out.contains("Unknown opcode 250"));
    }

    #[test]
    fn test_function_tree_includes_nested_functions() {
        let mut heap = Heap::default();
        let name = heap.alloc_string("inner");
        let mut inner = Function::new(Some(name));
        inner.upvalue_count = 1;
        inner.chunk.write_op(OpCode::Nil, 2);
        inner.chunk.write_op(OpCode::Return, 2);
        let inner = heap.alloc(Object::Function(inner));

        let mut script = Function::new(None);
        let index = script.chunk.add_constant(Value::Obj(inner));
        script.chunk.write_op(OpCode::Closure, 1);
        script.chunk.write(index as u8, 1);
        script.chunk.write(1, 1);
        script.chunk.write(3, 1);
        script.chunk.write_op(OpCode::Return, 1);
        let script = heap.alloc(Object::Function(script));

        let output = disassemble_function_tree(&heap, script);
        assert!(output.starts_with("== <script> =="));
        assert!(output.contains("OP_CLOSURE          0 <fn inner>"));
        assert!(output.contains("0002    |                     local 3"));
        assert!(output.contains("== inner =="));
    }
}
