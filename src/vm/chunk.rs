use super::ops::OpCode;
use super::value::Value;

/// A function body's bytecode, its source line table and its constant pool.
#[derive(Debug, Default)]
pub struct Chunk {
    pub code: Vec<u8>,
    /// `lines[i]` is the source line that produced `code[i]`.
    pub lines: Vec<usize>,
    pub constants: Vec<Value>,
}

impl Chunk {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    pub fn write(&mut self, byte: u8, line: usize) {
        self.code.push(byte);
        self.lines.push(line);
    }

    pub fn write_op(&mut self, op: OpCode, line: usize) {
        self.write(op.into(), line);
    }

    /// Append a constant and return its index in the pool.
    pub fn add_constant(&mut self, value: Value) -> usize {
        self.constants.push(value);
        self.constants.len() - 1
    }

    /// Source line for the instruction byte at `offset`.
    pub fn line_at(&self, offset: usize) -> Option<usize> {
        self.lines.get(offset).copied()
    }

    pub fn read_short(&self, offset: usize) -> u16 {
        u16::from_be_bytes([self.code[offset], self.code[offset + 1]])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lines_stay_aligned_with_code() {
        let mut chunk = Chunk::new();
        chunk.write_op(OpCode::Nil, 1);
        chunk.write_op(OpCode::Constant, 2);
        chunk.write(0, 2);
        chunk.write_op(OpCode::Return, 3);

        assert_eq!(chunk.code.len(), chunk.lines.len());
        assert_eq!(chunk.line_at(0), Some(1));
        assert_eq!(chunk.line_at(2), Some(2));
        assert_eq!(chunk.line_at(3), Some(3));
        assert_eq!(chunk.line_at(4), None);
    }

    #[test]
    fn test_add_constant_returns_index() {
        let mut chunk = Chunk::new();
        assert_eq!(chunk.add_constant(Value::Number(1.0)), 0);
        assert_eq!(chunk.add_constant(Value::Nil), 1);
        assert_eq!(chunk.constants[0], Value::Number(1.0));
    }

    #[test]
    fn test_read_short_is_big_endian() {
        let mut chunk = Chunk::new();
        chunk.write(0x12, 1);
        chunk.write(0x34, 1);
        assert_eq!(chunk.read_short(0), 0x1234);
    }
}
