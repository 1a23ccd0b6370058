//! Runtime values for the Ry virtual machine.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use indexmap::IndexMap;

use crate::vm::chunk::Function;
use crate::vm::upvalue::Closure;

/// A shared, mutable list.
pub type List = Rc<RefCell<Vec<Value>>>;

/// A shared, mutable map.
pub type Map = Rc<RefCell<IndexMap<MapKey, Value>>>;

/// The global variable table, shared with native functions.
pub type Globals = HashMap<String, Value>;

/// A numeric range `start..end`. Iteration is half-open (see the VM's
/// `FOR_EACH_NEXT`), counting up or down depending on the bound order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Range {
    pub start: f64,
    pub end: f64,
}

/// A host-implemented function. `argv` is the argument window on the value
/// stack; an `Err` message becomes a catchable panic in the VM.
#[derive(Clone)]
pub struct Native {
    pub name: String,
    pub arity: usize,
    /// A method-style native receives its receiver as `argv[0]`, one slot
    /// below the callee; the call consumes both.
    pub is_method: bool,
    pub func: Rc<dyn Fn(&[Value], &mut Globals) -> Result<Value, String>>,
}

impl Native {
    pub fn new<F>(name: impl Into<String>, arity: usize, func: F) -> Self
    where
        F: Fn(&[Value], &mut Globals) -> Result<Value, String> + 'static,
    {
        Self {
            name: name.into(),
            arity,
            is_method: false,
            func: Rc::new(func),
        }
    }

    pub fn method<F>(name: impl Into<String>, arity: usize, func: F) -> Self
    where
        F: Fn(&[Value], &mut Globals) -> Result<Value, String> + 'static,
    {
        Self {
            is_method: true,
            ..Self::new(name, arity, func)
        }
    }
}

impl fmt::Debug for Native {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<native {}>", self.name)
    }
}

/// A class: a name, an optional superclass, and a method table.
///
/// The method table is filled in by `OP_METHOD`/`OP_INHERIT` after the class
/// value is already on the stack, hence the interior mutability.
#[derive(Debug)]
pub struct Class {
    pub name: String,
    pub superclass: RefCell<Option<Rc<Class>>>,
    pub methods: RefCell<HashMap<String, Rc<Closure>>>,
}

impl Class {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            superclass: RefCell::new(None),
            methods: RefCell::new(HashMap::new()),
        }
    }

    pub fn find_method(&self, name: &str) -> Option<Rc<Closure>> {
        self.methods.borrow().get(name).cloned()
    }
}

/// A class instance.
#[derive(Debug)]
pub struct Instance {
    pub class: Rc<Class>,
    pub fields: HashMap<String, Value>,
}

impl Instance {
    pub fn new(class: Rc<Class>) -> Self {
        Self {
            class,
            fields: HashMap::new(),
        }
    }
}

/// A closure paired with a receiver; calling it installs the receiver into
/// slot 0 of the new frame.
#[derive(Debug)]
pub struct BoundMethod {
    pub receiver: Value,
    pub method: Rc<Closure>,
}

/// A runtime value. Aggregates and callables are shared by reference:
/// assignment copies the handle, not the contents.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    List(List),
    Map(Map),
    Range(Range),
    Function(Rc<Function>),
    Closure(Rc<Closure>),
    Native(Rc<Native>),
    Class(Rc<Class>),
    Instance(Rc<RefCell<Instance>>),
    BoundMethod(Rc<BoundMethod>),
}

impl Value {
    pub fn list(values: Vec<Value>) -> Value {
        Value::List(Rc::new(RefCell::new(values)))
    }

    pub fn map(entries: IndexMap<MapKey, Value>) -> Value {
        Value::Map(Rc::new(RefCell::new(entries)))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Range(_) => "range",
            Value::Function(_) => "function",
            Value::Closure(_) => "closure",
            Value::Native(_) => "native",
            Value::Class(_) => "class",
            Value::Instance(_) => "instance",
            Value::BoundMethod(_) => "bound method",
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// `null` is false, a bool is itself, a number is true iff non-zero,
    /// everything else is true.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0,
            _ => true,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Range(a), Value::Range(b)) => a == b,
            (Value::List(a), Value::List(b)) => Rc::ptr_eq(a, b),
            (Value::Map(a), Value::Map(b)) => Rc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Closure(a), Value::Closure(b)) => Rc::ptr_eq(a, b),
            (Value::Native(a), Value::Native(b)) => Rc::ptr_eq(a, b),
            (Value::Class(a), Value::Class(b)) => Rc::ptr_eq(a, b),
            (Value::Instance(a), Value::Instance(b)) => Rc::ptr_eq(a, b),
            (Value::BoundMethod(a), Value::BoundMethod(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", format_number(*n)),
            Value::String(s) => write!(f, "{}", s),
            Value::List(list) => {
                write!(f, "[")?;
                for (i, val) in list.borrow().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", val)?;
                }
                write!(f, "]")
            }
            Value::Map(map) => {
                write!(f, "{{")?;
                for (i, (key, val)) in map.borrow().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", key, val)?;
                }
                write!(f, "}}")
            }
            Value::Range(r) => write!(f, "{}..{}", r.start as i64, r.end as i64),
            Value::Function(_) => write!(f, "<function>"),
            Value::Closure(_) => write!(f, "<closure>"),
            Value::Native(_) => write!(f, "<native>"),
            Value::Class(class) => write!(f, "{}", class.name),
            Value::Instance(inst) => write!(f, "{} instance", inst.borrow().class.name),
            Value::BoundMethod(_) => write!(f, "<bound method>"),
        }
    }
}

/// Render a number with trailing zeros and a trailing `.` stripped, so whole
/// numbers print as integers: `3.0` is `"3"`, `3.5` is `"3.5"`.
pub fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

/// A hashable map key: numbers, bools, and strings by value; lists and maps
/// by identity.
#[derive(Debug, Clone)]
pub enum MapKey {
    Number(f64),
    Bool(bool),
    String(String),
    List(List),
    Map(Map),
}

impl MapKey {
    /// Convert a value to a key, or `None` for the unhashable kinds.
    pub fn from_value(value: &Value) -> Option<MapKey> {
        match value {
            Value::Number(n) => Some(MapKey::Number(*n)),
            Value::Bool(b) => Some(MapKey::Bool(*b)),
            Value::String(s) => Some(MapKey::String(s.clone())),
            Value::List(l) => Some(MapKey::List(l.clone())),
            Value::Map(m) => Some(MapKey::Map(m.clone())),
            _ => None,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            MapKey::Number(n) => Value::Number(*n),
            MapKey::Bool(b) => Value::Bool(*b),
            MapKey::String(s) => Value::String(s.clone()),
            MapKey::List(l) => Value::List(l.clone()),
            MapKey::Map(m) => Value::Map(m.clone()),
        }
    }
}

impl PartialEq for MapKey {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (MapKey::Number(a), MapKey::Number(b)) => a == b,
            (MapKey::Bool(a), MapKey::Bool(b)) => a == b,
            (MapKey::String(a), MapKey::String(b)) => a == b,
            (MapKey::List(a), MapKey::List(b)) => Rc::ptr_eq(a, b),
            (MapKey::Map(a), MapKey::Map(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Eq for MapKey {}

impl Hash for MapKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            MapKey::Number(n) => n.to_bits().hash(state),
            MapKey::Bool(b) => b.hash(state),
            MapKey::String(s) => s.hash(state),
            MapKey::List(l) => Rc::as_ptr(l).hash(state),
            MapKey::Map(m) => (Rc::as_ptr(m) as *const ()).hash(state),
        }
    }
}

impl fmt::Display for MapKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_print_without_trailing_zeros() {
        assert_eq!(format_number(3.0), "3");
        assert_eq!(format_number(3.5), "3.5");
        assert_eq!(format_number(-2.0), "-2");
        assert_eq!(format_number(0.0), "0");
    }

    #[test]
    fn lists_and_ranges_render() {
        let list = Value::list(vec![
            Value::Number(1.0),
            Value::Number(9.0),
            Value::Number(3.0),
        ]);
        assert_eq!(list.to_string(), "[1, 9, 3]");
        assert_eq!(
            Value::Range(Range {
                start: 1.0,
                end: 4.0
            })
            .to_string(),
            "1..4"
        );
    }

    #[test]
    fn truthiness() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::Bool(false).is_truthy());
        assert!(!Value::Number(0.0).is_truthy());
        assert!(Value::Number(2.0).is_truthy());
        assert!(Value::String(String::new()).is_truthy());
        assert!(Value::list(vec![]).is_truthy());
    }

    #[test]
    fn lists_compare_by_identity() {
        let a = Value::list(vec![Value::Number(1.0)]);
        let b = Value::list(vec![Value::Number(1.0)]);
        let c = a.clone();
        assert_ne!(a, b);
        assert_eq!(a, c);
    }

    #[test]
    fn map_keys_roundtrip() {
        let key = MapKey::from_value(&Value::String("name".into())).unwrap();
        assert_eq!(key.to_value(), Value::String("name".into()));
        assert!(MapKey::from_value(&Value::Null).is_none());
    }
}
