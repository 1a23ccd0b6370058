//! Property access, inheritance, and method binding.

use std::rc::Rc;

use crate::natives;
use crate::value::{BoundMethod, MapKey, Value};
use crate::vm::vm::Vm;

impl Vm {
    /// `OP_GET_PROPERTY`: the object is at the top of the stack. Most paths
    /// replace it with the result; `pop` leaves the receiver in place and
    /// pushes a method-style native on top of it.
    pub(crate) fn get_property(&mut self, name: &str) -> Result<(), String> {
        let object = self.peek(0).clone();

        if name == "len" {
            self.pop();
            let length = match &object {
                Value::List(list) => list.borrow().len(),
                Value::String(s) => s.chars().count(),
                Value::Map(map) => map.borrow().len(),
                _ => return Err(format!("Property '{}' not found on type.", name)),
            };
            self.push(Value::Number(length as f64));
            return Ok(());
        }

        if name == "pop" {
            self.push(Value::Native(natives::list_pop()));
            return Ok(());
        }

        if let Value::Map(map) = &object {
            let found = map.borrow().get(&MapKey::String(name.to_string())).cloned();
            if let Some(value) = found {
                self.pop();
                self.push(value);
                return Ok(());
            }
        }

        if let Value::Instance(instance) = &object {
            let field = instance.borrow().fields.get(name).cloned();
            if let Some(value) = field {
                self.pop();
                self.push(value);
                return Ok(());
            }
            let method = instance.borrow().class.find_method(name);
            if let Some(method) = method {
                self.pop();
                self.push(Value::BoundMethod(Rc::new(BoundMethod {
                    receiver: object.clone(),
                    method,
                })));
                return Ok(());
            }
        }

        if let Value::Class(class) = &object {
            if let Some(method) = class.find_method(name) {
                self.pop();
                self.push(Value::Closure(method));
                return Ok(());
            }
        }

        self.pop();
        Err(format!("Property '{}' not found on type.", name))
    }

    /// `OP_SET_PROPERTY`: instance fields only; the stored value is left on
    /// the stack as the expression result.
    pub(crate) fn set_property(&mut self, name: &str) -> Result<(), String> {
        let value = self.pop();
        let object = self.peek(0).clone();

        match object {
            Value::Instance(instance) => {
                instance
                    .borrow_mut()
                    .fields
                    .insert(name.to_string(), value.clone());
                self.pop();
                self.push(value);
                Ok(())
            }
            _ => Err("Only instances have fields.".to_string()),
        }
    }

    /// `OP_INHERIT`: copy the popped superclass's method table into the
    /// subclass below it. Later additions to the parent are not reflected.
    pub(crate) fn inherit(&mut self) -> Result<(), String> {
        let Value::Class(superclass) = self.peek(0).clone() else {
            return Err("Superclass must be a class.".to_string());
        };
        let Value::Class(subclass) = self.peek(1).clone() else {
            return Err("Superclass must be a class.".to_string());
        };

        {
            let mut methods = subclass.methods.borrow_mut();
            for (name, method) in superclass.methods.borrow().iter() {
                methods.insert(name.clone(), method.clone());
            }
        }
        *subclass.superclass.borrow_mut() = Some(superclass);

        self.pop();
        Ok(())
    }

    /// `OP_METHOD`: bind the closure at the top into the class below it.
    pub(crate) fn define_method(&mut self, name: &str) -> Result<(), String> {
        let Value::Closure(method) = self.peek(0).clone() else {
            return Err("Method must be a closure.".to_string());
        };
        let Value::Class(class) = self.peek(1).clone() else {
            return Err("Methods can only be bound to classes.".to_string());
        };

        class.methods.borrow_mut().insert(name.to_string(), method);
        self.pop();
        Ok(())
    }
}
