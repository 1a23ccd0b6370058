//! Call dispatch for `OP_CALL`.

use std::cell::RefCell;
use std::rc::Rc;

use crate::value::{Instance, Native, Value};
use crate::vm::upvalue::Closure;
use crate::vm::vm::{CallFrame, Vm, FRAMES_MAX};

impl Vm {
    /// Call the value sitting below `argc` arguments on the stack.
    pub(crate) fn call_value(&mut self, argc: usize) -> Result<(), String> {
        let callee_index = self.stack.len() - 1 - argc;
        let callee = self.stack[callee_index].clone();

        match callee {
            Value::Native(native) => self.call_native(&native, argc),
            Value::Closure(closure) => self.call_closure(closure, argc),
            Value::Function(function) => self.call_closure(Rc::new(Closure::new(function)), argc),
            Value::Class(class) => {
                // Replace the class with a fresh instance; `init` (if any)
                // runs as a call over the same window.
                let instance = Value::Instance(Rc::new(RefCell::new(Instance::new(class.clone()))));
                self.stack[callee_index] = instance;

                match class.find_method("init") {
                    Some(initializer) => self.call_closure(initializer, argc),
                    None if argc != 0 => Err(format!("Expected 0 arguments but got {}.", argc)),
                    None => Ok(()),
                }
            }
            Value::BoundMethod(bound) => {
                self.stack[callee_index] = bound.receiver.clone();
                self.call_closure(bound.method.clone(), argc)
            }
            _ => Err("Can only call functions and classes.".to_string()),
        }
    }

    fn call_closure(&mut self, closure: Rc<Closure>, argc: usize) -> Result<(), String> {
        if argc != closure.function.arity {
            return Err(format!(
                "Expected {} arguments but got {}.",
                closure.function.arity, argc
            ));
        }
        if self.frames.len() == FRAMES_MAX {
            return Err("Stack Overflow!".to_string());
        }

        let slot_base = self.stack.len() - argc - 1;
        self.frames.push(CallFrame {
            closure,
            ip: 0,
            slot_base,
        });
        Ok(())
    }

    /// Natives run inline. Arity is not enforced here; native authors
    /// enforce their own. An `Err` from the native becomes a panic.
    fn call_native(&mut self, native: &Rc<Native>, argc: usize) -> Result<(), String> {
        let args_start = self.stack.len() - argc;
        let mut argv = Vec::with_capacity(argc + 1);
        if native.is_method {
            // The receiver sits one below the callee and is consumed too.
            argv.push(self.stack[args_start - 2].clone());
        }
        argv.extend_from_slice(&self.stack[args_start..]);

        let result = (native.func)(&argv, &mut self.globals)?;

        let window = argc + if native.is_method { 2 } else { 1 };
        self.stack.truncate(self.stack.len() - window);
        self.push(result);
        Ok(())
    }
}
