//! Closures and upvalues.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::value::Value;
use crate::vm::chunk::Function;

/// A reference to a variable that outlives the scope defining it.
///
/// While the enclosing function is still on the call stack the upvalue is
/// open and points at a live stack slot. When that frame returns, the value
/// moves off the stack into the upvalue itself.
#[derive(Debug, Clone)]
pub enum Upvalue {
    /// Points at a live stack slot.
    Open(usize),
    /// Owns the captured value.
    Closed(Value),
}

/// A function paired with its captured upvalues.
#[derive(Clone)]
pub struct Closure {
    pub function: Rc<Function>,
    pub upvalues: Vec<Rc<RefCell<Upvalue>>>,
}

impl Closure {
    pub fn new(function: Rc<Function>) -> Self {
        Self {
            function,
            upvalues: Vec::new(),
        }
    }
}

impl fmt::Debug for Closure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<closure {}>", self.function.name)
    }
}
