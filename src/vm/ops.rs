/// Bytecode instructions.
///
/// Each instruction is one opcode byte followed by its operands. Operand
/// encodings:
/// - `u8`: one byte (constant index, stack slot, upvalue index, arg count)
/// - `u16`: two bytes, big-endian jump offset
/// - `Closure`: a constant byte, then one `(is_local, index)` byte pair per
///   upvalue of the referenced function
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OpCode {
    // ========================================
    // Constants & Literals
    // ========================================
    Constant,
    Nil,
    True,
    False,

    // ========================================
    // Stack Manipulation
    // ========================================
    Pop,

    // ========================================
    // Variables
    // ========================================
    GetLocal,
    SetLocal,
    GetGlobal,
    DefineGlobal,
    SetGlobal,
    GetUpvalue,
    SetUpvalue,

    // ========================================
    // Comparison
    // ========================================
    Equal,
    Greater,
    Less,

    // ========================================
    // Arithmetic
    // ========================================
    Add,
    Subtract,
    Multiply,
    Divide,
    Not,
    Negate,

    // ========================================
    // Output
    // ========================================
    Print,

    // ========================================
    // Control Flow
    // ========================================
    Jump,
    JumpIfFalse,
    Loop,

    // ========================================
    // Functions
    // ========================================
    Call,
    Closure,
    CloseUpvalue,
    Return,
}

/// How an instruction's operands are laid out after the opcode byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandWidth {
    None,
    Byte,
    Short,
    /// A constant byte followed by a variable number of upvalue pairs.
    Closure,
}

impl OpCode {
    const ALL: [OpCode; 29] = [
        OpCode::Constant,
        OpCode::Nil,
        OpCode::True,
        OpCode::False,
        OpCode::Pop,
        OpCode::GetLocal,
        OpCode::SetLocal,
        OpCode::GetGlobal,
        OpCode::DefineGlobal,
        OpCode::SetGlobal,
        OpCode::GetUpvalue,
        OpCode::SetUpvalue,
        OpCode::Equal,
        OpCode::Greater,
        OpCode::Less,
        OpCode::Add,
        OpCode::Subtract,
        OpCode::Multiply,
        OpCode::Divide,
        OpCode::Not,
        OpCode::Negate,
        OpCode::Print,
        OpCode::Jump,
        OpCode::JumpIfFalse,
        OpCode::Loop,
        OpCode::Call,
        OpCode::Closure,
        OpCode::CloseUpvalue,
        OpCode::Return,
    ];

    /// Stable mnemonic used by the disassembler.
    pub fn mnemonic(self) -> &'static str {
        match self {
            OpCode::Constant => "OP_CONSTANT",
            OpCode::Nil => "OP_NIL",
            OpCode::True => "OP_TRUE",
            OpCode::False => "OP_FALSE",
            OpCode::Pop => "OP_POP",
            OpCode::GetLocal => "OP_GET_LOCAL",
            OpCode::SetLocal => "OP_SET_LOCAL",
            OpCode::GetGlobal => "OP_GET_GLOBAL",
            OpCode::DefineGlobal => "OP_DEFINE_GLOBAL",
            OpCode::SetGlobal => "OP_SET_GLOBAL",
            OpCode::GetUpvalue => "OP_GET_UPVALUE",
            OpCode::SetUpvalue => "OP_SET_UPVALUE",
            OpCode::Equal => "OP_EQUAL",
            OpCode::Greater => "OP_GREATER",
            OpCode::Less => "OP_LESS",
            OpCode::Add => "OP_ADD",
            OpCode::Subtract => "OP_SUBTRACT",
            OpCode::Multiply => "OP_MULTIPLY",
            OpCode::Divide => "OP_DIVIDE",
            OpCode::Not => "OP_NOT",
            OpCode::Negate => "OP_NEGATE",
            OpCode::Print => "OP_PRINT",
            OpCode::Jump => "OP_JUMP",
            OpCode::JumpIfFalse => "OP_JUMP_IF_FALSE",
            OpCode::Loop => "OP_LOOP",
            OpCode::Call => "OP_CALL",
            OpCode::Closure => "OP_CLOSURE",
            OpCode::CloseUpvalue => "OP_CLOSE_UPVALUE",
            OpCode::Return => "OP_RETURN",
        }
    }

    pub fn operand_width(self) -> OperandWidth {
        match self {
            OpCode::Constant
            | OpCode::GetLocal
            | OpCode::SetLocal
            | OpCode::GetGlobal
            | OpCode::DefineGlobal
            | OpCode::SetGlobal
            | OpCode::GetUpvalue
            | OpCode::SetUpvalue
            | OpCode::Call => OperandWidth::Byte,
            OpCode::Jump | OpCode::JumpIfFalse | OpCode::Loop => OperandWidth::Short,
            OpCode::Closure => OperandWidth::Closure,
            _ => OperandWidth::None,
        }
    }
}

impl From<OpCode> for u8 {
    fn from(op: OpCode) -> Self {
        op as u8
    }
}

impl TryFrom<u8> for OpCode {
    type Error = u8;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        OpCode::ALL.get(byte as usize).copied().ok_or(byte)
    }
}
