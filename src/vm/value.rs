use std::fmt;

use super::heap::{Heap, ObjRef};
use super::object::Object;

/// A runtime value.
///
/// Values are copied by value on the operand stack. Object values carry a
/// non-owning reference into the [`Heap`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Value {
    Bool(bool),
    Nil,
    Number(f64),
    Obj(ObjRef),
}

impl Value {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_obj(&self) -> Option<ObjRef> {
        match self {
            Value::Obj(r) => Some(*r),
            _ => None,
        }
    }

    /// `nil` and `false` are falsey, everything else is truthy.
    pub fn is_falsey(&self) -> bool {
        matches!(self, Value::Nil | Value::Bool(false))
    }

    /// Render this value the way `print` does.
    pub fn display<'h>(&self, heap: &'h Heap) -> ValueDisplay<'h> {
        ValueDisplay { value: *self, heap }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<ObjRef> for Value {
    fn from(r: ObjRef) -> Self {
        Value::Obj(r)
    }
}

/// A value paired with the heap it lives in, for formatting.
pub struct ValueDisplay<'h> {
    value: Value,
    heap: &'h Heap,
}

impl fmt::Display for ValueDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.value {
            Value::Bool(b) => write!(f, "{}", b),
            Value::Nil => write!(f, "nil"),
            Value::Number(n) => write!(f, "{}", format_number(n)),
            Value::Obj(r) => match self.heap.get(r) {
                Object::String(s) => write!(f, "{}", s.as_str()),
                Object::Function(function) => self.fmt_function(f, function.name),
                Object::Closure(closure) => {
                    let name = self.heap.function(closure.function).name;
                    self.fmt_function(f, name)
                }
                Object::Native(_) => write!(f, "<native fn>"),
                Object::Upvalue(_) => write!(f, "upvalue"),
            },
        }
    }
}

impl ValueDisplay<'_> {
    fn fmt_function(&self, f: &mut fmt::Formatter<'_>, name: Option<ObjRef>) -> fmt::Result {
        match name {
            Some(name) => write!(f, "<fn {}>", self.heap.string(name).as_str()),
            None => write!(f, "<script>"),
        }
    }
}

/// Format a number like C's `%g`: six significant digits, trailing zeros
/// trimmed, exponent form for very small or very large magnitudes.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        return "nan".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    if n == 0.0 {
        return if n.is_sign_negative() { "-0" } else { "0" }.to_string();
    }

    const PRECISION: i32 = 6;

    // Round to the target precision first so the exponent reflects carries
    // (e.g. 999999.5 -> 1e+06).
    let scientific = format!("{:.*e}", (PRECISION - 1) as usize, n);
    let (mantissa, exponent) = match scientific.split_once('e') {
        Some(parts) => parts,
        None => return scientific,
    };
    let exponent: i32 = exponent.parse().unwrap_or(0);

    if exponent < -4 || exponent >= PRECISION {
        let mantissa = trim_fraction(mantissa);
        let sign = if exponent < 0 { '-' } else { '+' };
        format!("{}e{}{:02}", mantissa, sign, exponent.abs())
    } else {
        let decimals = (PRECISION - 1 - exponent) as usize;
        trim_fraction(&format!("{:.*}", decimals, n)).to_string()
    }
}

fn trim_fraction(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}
