//! Heap object variants.

use std::fmt;
use std::mem::size_of;

use super::chunk::Chunk;
use super::heap::ObjRef;
use super::value::Value;

/// Signature of a host function callable from scripts.
pub type NativeFn = fn(args: &[Value]) -> Result<Value, String>;

/// A heap-allocated object.
#[derive(Debug)]
pub enum Object {
    String(LoxString),
    Function(Function),
    Closure(Closure),
    Upvalue(Upvalue),
    Native(Native),
}

impl Object {
    pub fn kind(&self) -> &'static str {
        match self {
            Object::String(_) => "string",
            Object::Function(_) => "function",
            Object::Closure(_) => "closure",
            Object::Upvalue(_) => "upvalue",
            Object::Native(_) => "native",
        }
    }

    /// Estimated number of bytes owned by this object, used for GC pacing.
    pub fn size_estimate(&self) -> usize {
        let owned = match self {
            Object::String(s) => s.chars.len(),
            Object::Function(f) => {
                f.chunk.code.capacity()
                    + f.chunk.lines.capacity() * size_of::<usize>()
                    + f.chunk.constants.capacity() * size_of::<Value>()
            }
            Object::Closure(c) => c.upvalues.capacity() * size_of::<ObjRef>(),
            Object::Upvalue(_) | Object::Native(_) => 0,
        };
        size_of::<Object>() + owned
    }

    pub fn as_string(&self) -> Option<&LoxString> {
        match self {
            Object::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&Function> {
        match self {
            Object::Function(f) => Some(f),
            _ => None,
        }
    }
}

/// An interned, immutable string with its cached hash.
pub struct LoxString {
    chars: Box<str>,
    hash: u32,
}

impl LoxString {
    pub fn new(chars: &str) -> Self {
        Self {
            chars: chars.into(),
            hash: hash_string(chars),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.chars
    }

    pub fn hash(&self) -> u32 {
        self.hash
    }
}

impl fmt::Debug for LoxString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.chars)
    }
}

/// A compiled function body.
#[derive(Debug, Default)]
pub struct Function {
    pub arity: u8,
    pub upvalue_count: usize,
    pub chunk: Chunk,
    /// `None` for the top-level script.
    pub name: Option<ObjRef>,
}

impl Function {
    pub fn new(name: Option<ObjRef>) -> Self {
        Self {
            name,
            ..Default::default()
        }
    }
}

/// A function value together with its captured variables.
#[derive(Debug)]
pub struct Closure {
    pub function: ObjRef,
    pub upvalues: Vec<ObjRef>,
}

impl Closure {
    pub fn new(function: ObjRef, upvalue_count: usize) -> Self {
        Self {
            function,
            upvalues: Vec::with_capacity(upvalue_count),
        }
    }
}

/// A captured variable.
///
/// Open while the declaring frame is live (points at its stack slot), closed
/// once the slot is discarded (owns a copy of the last value).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Upvalue {
    Open(usize),
    Closed(Value),
}

/// A host function exposed to scripts.
pub struct Native {
    pub name: ObjRef,
    pub arity: u8,
    pub function: NativeFn,
}

impl fmt::Debug for Native {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Native")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .finish()
    }
}

/// 32-bit FNV-1a.
pub fn hash_string(s: &str) -> u32 {
    let mut hash: u32 = 2166136261;
    for byte in s.bytes() {
        hash ^= byte as u32;
        hash = hash.wrapping_mul(16777619);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fnv1a_known_values() {
        assert_eq!(hash_string(""), 2166136261);
        assert_eq!(hash_string("a"), 0xe40c292c);
        assert_eq!(hash_string("foobar"), 0xbf9cf968);
    }

    #[test]
    fn test_string_caches_hash() {
        let s = LoxString::new("hello");
        assert_eq!(s.hash(), hash_string("hello"));
        assert_eq!(s.as_str(), "hello");
    }

    #[test]
    fn test_size_estimate_counts_owned_bytes() {
        let short = Object::String(LoxString::new("a"));
        let long = Object::String(LoxString::new(&"a".repeat(100)));
        assert_eq!(long.size_estimate() - short.size_estimate(), 99);
    }
}
