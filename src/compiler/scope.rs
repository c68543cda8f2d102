//! Per-function compile state: locals, upvalues and scope depth.

use crate::vm::Function;

/// Locals and upvalues are addressed by a one-byte operand.
pub const MAX_LOCALS: usize = 256;
pub const MAX_UPVALUES: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionKind {
    Script,
    Function,
}

#[derive(Debug, Clone, Copy)]
pub struct Local<'src> {
    pub name: &'src str,
    /// `None` between declaration and the end of the initializer.
    pub depth: Option<usize>,
    pub is_captured: bool,
}

/// How a closure finds a captured variable when it is created: a slot in the
/// enclosing frame (`is_local`) or one of the enclosing closure's upvalues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpvalueRef {
    pub index: u8,
    pub is_local: bool,
}

pub struct FunctionState<'src> {
    pub function: Function,
    pub kind: FunctionKind,
    pub locals: Vec<Local<'src>>,
    pub upvalues: Vec<UpvalueRef>,
    pub scope_depth: usize,
}

impl<'src> FunctionState<'src> {
    pub fn new(function: Function, kind: FunctionKind) -> Self {
        // Slot 0 holds the callee.
        let reserved = Local {
            name: "",
            depth: Some(0),
            is_captured: false,
        };
        Self {
            function,
            kind,
            locals: vec![reserved],
            upvalues: Vec::new(),
            scope_depth: 0,
        }
    }

    /// Innermost local named `name`. The error is for a local read inside
    /// its own initializer.
    pub fn resolve_local(&self, name: &str) -> Result<Option<u8>, &'static str> {
        for (slot, local) in self.locals.iter().enumerate().rev() {
            if local.name == name {
                if local.depth.is_none() {
                    return Err("Can't read local variable in its own initializer.");
                }
                return Ok(Some(slot as u8));
            }
        }
        Ok(None)
    }

    pub fn add_local(&mut self, name: &'src str) -> Result<(), &'static str> {
        if self.locals.len() == MAX_LOCALS {
            return Err("Too many local variables in function.");
        }
        self.locals.push(Local {
            name,
            depth: None,
            is_captured: false,
        });
        Ok(())
    }

    /// Whether `name` is already declared in the innermost scope.
    pub fn is_declared_in_current_scope(&self, name: &str) -> bool {
        self.locals
            .iter()
            .rev()
            .take_while(|local| local.depth.is_none_or(|depth| depth >= self.scope_depth))
            .any(|local| local.name == name)
    }

    pub fn mark_initialized(&mut self) {
        if self.scope_depth == 0 {
            return;
        }
        if let Some(local) = self.locals.last_mut() {
            local.depth = Some(self.scope_depth);
        }
    }

    /// Register an upvalue, reusing an existing one for the same variable.
    pub fn add_upvalue(&mut self, index: u8, is_local: bool) -> Result<u8, &'static str> {
        let upvalue = UpvalueRef { index, is_local };
        if let Some(existing) = self.upvalues.iter().position(|u| *u == upvalue) {
            return Ok(existing as u8);
        }
        if self.upvalues.len() == MAX_UPVALUES {
            return Err("Too many closure variables in function.");
        }
        self.upvalues.push(upvalue);
        self.function.upvalue_count = self.upvalues.len();
        Ok((self.upvalues.len() - 1) as u8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> FunctionState<'static> {
        FunctionState::new(Function::default(), FunctionKind::Function)
    }

    #[test]
    fn test_slot_zero_is_reserved() {
        let state = state();
        assert_eq!(state.locals.len(), 1);
        assert_eq!(state.resolve_local(""), Ok(Some(0)));
    }

    #[test]
    fn test_resolve_innermost_shadowing_local() {
        let mut state = state();
        state.scope_depth = 1;
        state.add_local("a").unwrap();
        state.mark_initialized();
        state.scope_depth = 2;
        state.add_local("a").unwrap();
        state.mark_initialized();
        assert_eq!(state.resolve_local("a"), Ok(Some(2)));
        assert_eq!(state.resolve_local("b"), Ok(None));
    }

    #[test]
    fn test_uninitialized_local_cannot_be_read() {
        let mut state = state();
        state.scope_depth = 1;
        state.add_local("a").unwrap();
        assert!(state.resolve_local("a").is_err());
    }

    #[test]
    fn test_duplicate_detection_is_scope_local() {
        let mut state = state();
        state.scope_depth = 1;
        state.add_local("a").unwrap();
        state.mark_initialized();
        assert!(state.is_declared_in_current_scope("a"));
        state.scope_depth = 2;
        assert!(!state.is_declared_in_current_scope("a"));
    }

    #[test]
    fn test_local_limit() {
        let mut state = state();
        state.scope_depth = 1;
        for _ in 1..MAX_LOCALS {
            state.add_local("x").unwrap();
        }
        assert_eq!(
            state.add_local("x"),
            Err("Too many local variables in function.")
        );
    }

    #[test]
    fn test_upvalues_are_deduplicated() {
        let mut state = state();
        assert_eq!(state.add_upvalue(1, true), Ok(0));
        assert_eq!(state.add_upvalue(2, false), Ok(1));
        assert_eq!(state.add_upvalue(1, true), Ok(0));
        assert_eq!(state.function.upvalue_count, 2);
    }
}
