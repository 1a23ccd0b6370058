//! The Ry virtual machine: a fetch-decode-execute loop over byte-coded
//! chunks.
//!
//! All state is explicit: the value stack, the frame stack, the global
//! table, the open-upvalue list, the panic stack, and the module cache.
//! Every runtime error becomes a panic message; [`Vm::recover`] either
//! diverts to the innermost `attempt` handler or reports and bails.

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::PathBuf;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::error::RuntimeError;
use crate::lexer::Scanner;
use crate::modules;
use crate::natives;
use crate::parser::Parser;
use crate::value::{Globals, MapKey, Range, Value};
use crate::vm::chunk::{Chunk, Function};
use crate::vm::compiler::Compiler;
use crate::vm::opcode::Op;
use crate::vm::upvalue::{Closure, Upvalue};

/// Value stack capacity.
pub const STACK_MAX: usize = 256;
/// Call depth limit.
pub const FRAMES_MAX: usize = 64;

/// One activation record: the running closure, its instruction pointer, and
/// where its slot window starts (slot 0 holds the callee or receiver).
pub struct CallFrame {
    pub closure: Rc<Closure>,
    pub ip: usize,
    pub slot_base: usize,
}

/// Pushed by `OP_ATTEMPT`, popped by `OP_END_ATTEMPT` or the unwinder.
#[derive(Debug, Clone, Copy)]
pub struct PanicBlock {
    pub stack_depth: usize,
    pub frame_depth: usize,
    pub handler_ip: usize,
}

/// What one executed instruction asks the dispatch loop to do next.
pub(crate) enum Flow {
    Continue,
    Halt(Value),
}

/// `Err` carries a panic message on its way to the unwinder.
pub(crate) type StepResult = Result<Flow, String>;

/// The virtual machine. Owns every piece of runtime state for its lifetime;
/// a REPL keeps one VM so globals and the module cache persist across
/// submissions.
pub struct Vm {
    pub stack: Vec<Value>,
    pub frames: Vec<CallFrame>,
    pub globals: Globals,
    /// Open upvalues, ordered by descending stack slot.
    pub open_upvalues: Vec<Rc<RefCell<Upvalue>>>,
    pub panic_stack: Vec<PanicBlock>,
    /// Absolute module path -> compiled top-level closure.
    pub module_cache: HashMap<PathBuf, Rc<Closure>>,
    source: Rc<str>,
}

impl Vm {
    pub fn new() -> Self {
        let mut globals = Globals::new();
        natives::register(&mut globals);
        Self {
            stack: Vec::with_capacity(STACK_MAX),
            frames: Vec::with_capacity(FRAMES_MAX),
            globals,
            open_upvalues: Vec::new(),
            panic_stack: Vec::new(),
            module_cache: HashMap::new(),
            source: Rc::from(""),
        }
    }

    /// Execute a compiled top-level function. The source text is kept for
    /// diagnostics when a panic reaches the top without a handler.
    pub fn interpret(
        &mut self,
        function: Rc<Function>,
        source: &str,
    ) -> Result<Value, RuntimeError> {
        self.reset();
        self.source = Rc::from(source);

        let closure = Rc::new(Closure::new(function));
        self.push(Value::Closure(closure.clone()));
        self.frames.push(CallFrame {
            closure,
            ip: 0,
            slot_base: 0,
        });

        self.run()
    }

    fn reset(&mut self) {
        self.stack.clear();
        self.frames.clear();
        self.open_upvalues.clear();
        self.panic_stack.clear();
    }

    fn run(&mut self) -> Result<Value, RuntimeError> {
        loop {
            if self.stack.len() >= STACK_MAX {
                self.recover("Stack Overflow!".to_string())?;
                continue;
            }
            if let Some(frame) = self.frames.last() {
                if self.stack.len() < frame.slot_base {
                    self.recover("Stack Underflow!".to_string())?;
                    continue;
                }
            }

            match self.step() {
                Ok(Flow::Continue) => {}
                Ok(Flow::Halt(value)) => return Ok(value),
                Err(message) => self.recover(message)?,
            }
        }
    }

    fn step(&mut self) -> StepResult {
        {
            let frame = self.frames.last().expect("running frame");
            if frame.ip >= frame.closure.function.chunk.code.len() {
                return Ok(Flow::Halt(Value::Null));
            }
        }

        let byte = self.read_byte();
        let op = Op::try_from(byte).map_err(|b| format!("Unknown opcode {}.", b))?;

        match op {
            Op::Constant => {
                let value = self.read_constant();
                self.push(value);
            }
            Op::Null => self.push(Value::Null),
            Op::True => self.push(Value::Bool(true)),
            Op::False => self.push(Value::Bool(false)),
            Op::Pop => {
                self.pop();
            }
            Op::Copy => {
                let top = self.peek(0).clone();
                self.push(top);
            }

            Op::DefineGlobal => {
                let name = self.read_constant().to_string();
                let value = self.pop();
                self.globals.insert(name, value);
            }
            Op::GetGlobal => {
                let name = self.read_constant().to_string();
                match self.globals.get(&name) {
                    Some(value) => {
                        let value = value.clone();
                        self.push(value);
                    }
                    None => return Err(self.undefined_variable(&name, false)),
                }
            }
            Op::SetGlobal => {
                let name = self.read_constant().to_string();
                if !self.globals.contains_key(&name) {
                    return Err(self.undefined_variable(&name, true));
                }
                let value = self.pop();
                self.globals.insert(name, value);
            }
            Op::GetLocal => {
                let slot = self.read_byte() as usize;
                let base = self.frame().slot_base;
                let value = self.stack[base + slot].clone();
                self.push(value);
            }
            Op::SetLocal => {
                let slot = self.read_byte() as usize;
                let base = self.frame().slot_base;
                let value = self.pop();
                self.stack[base + slot] = value;
            }
            Op::GetUpvalue => {
                let index = self.read_byte() as usize;
                let upvalue = self.frame().closure.upvalues[index].clone();
                let value = match &*upvalue.borrow() {
                    Upvalue::Open(slot) => self.stack[*slot].clone(),
                    Upvalue::Closed(value) => value.clone(),
                };
                self.push(value);
            }
            Op::SetUpvalue => {
                // Peeks: the assigned value stays for the surrounding
                // expression.
                let index = self.read_byte() as usize;
                let value = self.peek(0).clone();
                let upvalue = self.frame().closure.upvalues[index].clone();
                let mut upvalue = upvalue.borrow_mut();
                match &mut *upvalue {
                    Upvalue::Open(slot) => self.stack[*slot] = value,
                    Upvalue::Closed(cell) => *cell = value,
                }
            }

            Op::GetProperty => {
                let name = self.read_constant().to_string();
                self.get_property(&name)?;
            }
            Op::SetProperty => {
                let name = self.read_constant().to_string();
                self.set_property(&name)?;
            }
            Op::GetIndex => {
                let index = self.pop();
                let object = self.pop();
                let value = self.get_index(&object, &index)?;
                self.push(value);
            }
            Op::SetIndex => {
                let value = self.pop();
                let index = self.pop();
                let object = self.pop();
                self.set_index(&object, &index, value)?;
            }

            Op::Add => {
                let b = self.pop();
                let a = self.pop();
                let result = add_values(a, b)?;
                self.push(result);
            }
            Op::Subtract => {
                let b = self.pop();
                let a = self.pop();
                match (a.as_number(), b.as_number()) {
                    (Some(a), Some(b)) => self.push(Value::Number(a - b)),
                    _ => return Err("Operands must be numbers".to_string()),
                }
            }
            Op::Multiply => {
                let b = self.pop();
                let a = self.pop();
                let result = multiply_values(a, b)?;
                self.push(result);
            }
            Op::Divide => {
                let b = self.pop();
                let a = self.pop();
                if b.as_number().unwrap_or(0.0) == 0.0 {
                    return Err("Division by zero".to_string());
                }
                match a.as_number() {
                    Some(a) => self.push(Value::Number(a / b.as_number().unwrap())),
                    // The value model is total: mismatches concatenate.
                    None => self.push(Value::String(format!("{}{}", a, b))),
                }
            }
            Op::Modulo => {
                let b = self.pop();
                let a = self.pop();
                match (a.as_number(), b.as_number()) {
                    (Some(a), Some(b)) => self.push(Value::Number(a % b)),
                    _ => self.push(Value::Null),
                }
            }
            Op::Negate => {
                let value = self.pop();
                match value.as_number() {
                    Some(n) => self.push(Value::Number(-n)),
                    None => self.push(Value::Null),
                }
            }
            Op::Not => {
                // The value-model `!`: defined on bools, nil otherwise.
                let value = self.pop();
                match value {
                    Value::Bool(b) => self.push(Value::Bool(!b)),
                    _ => self.push(Value::Null),
                }
            }
            Op::Equal => {
                let b = self.pop();
                let a = self.pop();
                self.push(Value::Bool(a == b));
            }
            Op::Greater => {
                let b = self.pop();
                let a = self.pop();
                match (a.as_number(), b.as_number()) {
                    (Some(a), Some(b)) => self.push(Value::Bool(a > b)),
                    _ => self.push(Value::Null),
                }
            }
            Op::Less => {
                let b = self.pop();
                let a = self.pop();
                match (a.as_number(), b.as_number()) {
                    (Some(a), Some(b)) => self.push(Value::Bool(a < b)),
                    _ => self.push(Value::Null),
                }
            }

            Op::BitwiseAnd => self.bitwise(|a, b| a & b)?,
            Op::BitwiseOr => self.bitwise(|a, b| a | b)?,
            Op::BitwiseXor => self.bitwise(|a, b| a ^ b)?,
            Op::LeftShift => self.bitwise(|a, b| a.wrapping_shl(b as u32))?,
            Op::RightShift => self.bitwise(|a, b| a.wrapping_shr(b as u32))?,

            Op::Jump => {
                let offset = self.read_short() as usize;
                self.frame_mut().ip += offset;
            }
            Op::JumpIfFalse => {
                // Peeks the condition; the compiler pops it on both paths.
                let offset = self.read_short() as usize;
                if !self.peek(0).is_truthy() {
                    self.frame_mut().ip += offset;
                }
            }
            Op::Loop => {
                let offset = self.read_short() as usize;
                self.frame_mut().ip -= offset;
            }
            Op::ForEachNext => self.for_each_next()?,

            Op::BuildList => {
                let count = self.read_byte() as usize;
                let start = self.stack.len() - count;
                let elements = self.stack.split_off(start);
                self.push(Value::list(elements));
            }
            Op::BuildMap => {
                let count = self.read_byte() as usize;
                let mut entries = IndexMap::new();
                for _ in 0..count {
                    let value = self.pop();
                    let key = self.pop();
                    let key = MapKey::from_value(&key)
                        .ok_or_else(|| format!("Cannot use {} as map key.", key.type_name()))?;
                    entries.insert(key, value);
                }
                self.push(Value::map(entries));
            }
            Op::BuildRangeList => {
                let end = self.pop();
                let start = self.pop();
                match (start.as_number(), end.as_number()) {
                    (Some(start), Some(end)) => self.push(Value::Range(Range { start, end })),
                    _ => return Err("Range bounds must be numbers.".to_string()),
                }
            }

            Op::Call => {
                let argc = self.read_byte() as usize;
                self.call_value(argc)?;
            }
            Op::Closure => {
                let constant = self.read_constant();
                let Value::Function(function) = constant else {
                    return Err("Closure operand must be a function.".to_string());
                };
                let mut upvalues = Vec::with_capacity(function.upvalue_count);
                for _ in 0..function.upvalue_count {
                    let is_local = self.read_byte() != 0;
                    let index = self.read_byte() as usize;
                    if is_local {
                        let slot = self.frame().slot_base + index;
                        upvalues.push(self.capture_upvalue(slot));
                    } else {
                        upvalues.push(self.frame().closure.upvalues[index].clone());
                    }
                }
                self.push(Value::Closure(Rc::new(Closure { function, upvalues })));
            }
            Op::Return => {
                let mut result = self.pop();
                let frame = self.frames.pop().expect("returning frame");
                // A constructor returns its receiver regardless of the body.
                if frame.closure.function.name == "init" {
                    result = self.stack[frame.slot_base].clone();
                }
                self.close_upvalues(frame.slot_base);
                self.stack.truncate(frame.slot_base);

                if self.frames.is_empty() {
                    return Ok(Flow::Halt(result));
                }
                self.push(result);
            }

            Op::Class => {
                let name = self.read_constant().to_string();
                self.push(Value::Class(Rc::new(crate::value::Class::new(name))));
            }
            Op::Inherit => self.inherit()?,
            Op::Method => {
                let name = self.read_constant().to_string();
                self.define_method(&name)?;
            }

            Op::Panic => {
                let message = self.pop();
                let text = if let Value::Null = message {
                    "Unknown Panic".to_string()
                } else {
                    message.to_string()
                };
                return Err(text);
            }
            Op::Attempt => {
                let offset = self.read_short() as usize;
                let handler_ip = self.frame().ip + offset;
                self.panic_stack.push(PanicBlock {
                    stack_depth: self.stack.len(),
                    frame_depth: self.frames.len(),
                    handler_ip,
                });
            }
            Op::EndAttempt => {
                if self.panic_stack.pop().is_none() {
                    return Err("Cannot end attempt if panic stack is empty.".to_string());
                }
            }

            Op::Import => self.import()?,
        }

        Ok(Flow::Continue)
    }

    // --- Stack primitives ---

    #[inline]
    pub(crate) fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    #[inline]
    pub(crate) fn pop(&mut self) -> Value {
        self.stack.pop().unwrap_or(Value::Null)
    }

    #[inline]
    pub(crate) fn peek(&self, distance: usize) -> &Value {
        &self.stack[self.stack.len() - 1 - distance]
    }

    pub(crate) fn frame(&self) -> &CallFrame {
        self.frames.last().expect("active frame")
    }

    pub(crate) fn frame_mut(&mut self) -> &mut CallFrame {
        self.frames.last_mut().expect("active frame")
    }

    fn read_byte(&mut self) -> u8 {
        let frame = self.frames.last_mut().expect("active frame");
        let byte = frame.closure.function.chunk.code[frame.ip];
        frame.ip += 1;
        byte
    }

    fn read_short(&mut self) -> u16 {
        let high = self.read_byte() as u16;
        let low = self.read_byte() as u16;
        (high << 8) | low
    }

    fn read_constant(&mut self) -> Value {
        let index = self.read_byte() as usize;
        self.frame().closure.function.chunk.constants[index].clone()
    }

    pub(crate) fn source(&self) -> &str {
        &self.source
    }

    // --- Upvalues ---

    /// Capture a stack slot, reusing an existing open upvalue for the same
    /// slot so every closure over a variable shares one cell.
    pub(crate) fn capture_upvalue(&mut self, slot: usize) -> Rc<RefCell<Upvalue>> {
        let mut insert_at = self.open_upvalues.len();
        for (i, upvalue) in self.open_upvalues.iter().enumerate() {
            if let Upvalue::Open(existing) = &*upvalue.borrow() {
                if *existing == slot {
                    return upvalue.clone();
                }
                if *existing < slot {
                    insert_at = i;
                    break;
                }
            }
        }

        let upvalue = Rc::new(RefCell::new(Upvalue::Open(slot)));
        self.open_upvalues.insert(insert_at, upvalue.clone());
        upvalue
    }

    /// Close every open upvalue at or above `from_slot`, moving the current
    /// stack value into the upvalue. The list is sorted descending, so the
    /// candidates sit at the front.
    pub(crate) fn close_upvalues(&mut self, from_slot: usize) {
        while let Some(first) = self.open_upvalues.first() {
            let slot = match &*first.borrow() {
                Upvalue::Open(slot) => *slot,
                Upvalue::Closed(_) => break,
            };
            if slot < from_slot {
                break;
            }
            let upvalue = self.open_upvalues.remove(0);
            let value = self.stack.get(slot).cloned().unwrap_or(Value::Null);
            *upvalue.borrow_mut() = Upvalue::Closed(value);
        }
    }

    // --- Iteration ---

    fn for_each_next(&mut self) -> Result<(), String> {
        let offset = self.read_short() as usize;
        let index_value = self.peek(0).clone();
        let collection = self.peek(1).clone();

        let Some(index) = index_value.as_number() else {
            return Err("Loop index must be a number.".to_string());
        };

        match collection {
            Value::Range(range) => {
                let current = range.start + index;
                let in_bounds = if range.start < range.end {
                    current < range.end
                } else {
                    current > range.end
                };
                if in_bounds {
                    let top = self.stack.len() - 1;
                    self.stack[top] = Value::Number(index + 1.0);
                    self.push(Value::Number(current));
                } else {
                    self.frame_mut().ip += offset;
                }
            }
            Value::List(list) => {
                let element = {
                    let list = list.borrow();
                    list.get(index as usize).cloned()
                };
                match element {
                    Some(element) => {
                        let top = self.stack.len() - 1;
                        self.stack[top] = Value::Number(index + 1.0);
                        self.push(element);
                    }
                    None => self.frame_mut().ip += offset,
                }
            }
            _ => return Err("Can only use 'each' on lists or ranges.".to_string()),
        }
        Ok(())
    }

    // --- Indexing ---

    fn get_index(&self, object: &Value, index: &Value) -> Result<Value, String> {
        match object {
            Value::List(list) => {
                let Some(i) = index.as_number() else {
                    return Err("List index must be a number.".to_string());
                };
                let list = list.borrow();
                if i >= 0.0 && (i as usize) < list.len() {
                    Ok(list[i as usize].clone())
                } else {
                    Err("List index out of bounds.".to_string())
                }
            }
            Value::Map(map) => {
                let key = MapKey::from_value(index)
                    .ok_or_else(|| format!("Cannot use {} as map key.", index.type_name()))?;
                map.borrow()
                    .get(&key)
                    .cloned()
                    .ok_or_else(|| format!("Key '{}' not found in map.", index))
            }
            Value::String(s) => {
                let Some(i) = index.as_number() else {
                    return Err("String index must be a number.".to_string());
                };
                if i < 0.0 {
                    return Err("String index out of bounds.".to_string());
                }
                s.chars()
                    .nth(i as usize)
                    .map(|c| Value::String(c.to_string()))
                    .ok_or_else(|| "String index out of bounds.".to_string())
            }
            _ => Err("Can only index lists, maps, and strings.".to_string()),
        }
    }

    fn set_index(&self, object: &Value, index: &Value, value: Value) -> Result<(), String> {
        match object {
            Value::List(list) => {
                let Some(i) = index.as_number() else {
                    return Err("List index must be a number.".to_string());
                };
                let mut list = list.borrow_mut();
                if i >= 0.0 && (i as usize) < list.len() {
                    list[i as usize] = value;
                    Ok(())
                } else {
                    Err("List index out of bounds.".to_string())
                }
            }
            Value::Map(map) => {
                let key = MapKey::from_value(index)
                    .ok_or_else(|| format!("Cannot use {} as map key.", index.type_name()))?;
                map.borrow_mut().insert(key, value);
                Ok(())
            }
            Value::String(_) => {
                Err("Strings are immutable and do not support index assignment.".to_string())
            }
            Value::Instance(_) => Err("Instances do not support index assignment.".to_string()),
            _ => Err("Only lists support index assignment.".to_string()),
        }
    }

    // --- Bitwise ---

    fn bitwise(&mut self, op: impl Fn(i64, i64) -> i64) -> Result<(), String> {
        let b = self.pop();
        let a = self.pop();
        match (a.as_number(), b.as_number()) {
            (Some(a), Some(b)) => {
                self.push(Value::Number(op(a as i64, b as i64) as f64));
                Ok(())
            }
            _ => Err("Operands must be numbers for bitwise operations.".to_string()),
        }
    }

    // --- Import ---

    fn import(&mut self) -> Result<(), String> {
        let path_value = self.pop();
        let Value::String(spec) = path_value else {
            return Err("Import path must be a string.".to_string());
        };
        let path = modules::find_module_path(&spec);

        // A cached module has already populated the globals; its top level
        // runs at most once, so the closure is pushed without being called
        // (the statement's trailing pop discards it).
        if let Some(closure) = self.module_cache.get(&path).cloned() {
            self.push(Value::Closure(closure));
            return Ok(());
        }

        let source = std::fs::read_to_string(&path)
            .map_err(|_| format!("Could not open script file '{}'.", path.display()))?;

        let compile_failed = || format!("Failed to compile imported script '{}'.", path.display());
        let tokens = Scanner::new(&source)
            .scan_tokens()
            .map_err(|_| compile_failed())?;
        let statements = Parser::new(tokens).parse().map_err(|_| compile_failed())?;

        let mut chunk = Chunk::new();
        let mut compiler = Compiler::new(&source);
        if !compiler.compile(&statements, &mut chunk) {
            return Err(compile_failed());
        }

        let function = Rc::new(Function::script(chunk, path.display().to_string()));
        let closure = Rc::new(Closure::new(function));
        self.module_cache.insert(path, closure.clone());
        self.call_module(closure)
    }

    /// Push the module's top-level closure and enter it; its globals land in
    /// the shared table, and its return resumes the importer.
    fn call_module(&mut self, closure: Rc<Closure>) -> Result<(), String> {
        if self.frames.len() == FRAMES_MAX {
            return Err("Stack Overflow!".to_string());
        }
        self.push(Value::Closure(closure.clone()));
        let slot_base = self.stack.len() - 1;
        self.frames.push(CallFrame {
            closure,
            ip: 0,
            slot_base,
        });
        Ok(())
    }
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

/// The canonical `+`: numbers add, lists concatenate or append, anything
/// involving a string concatenates the stringifications.
fn add_values(a: Value, b: Value) -> Result<Value, String> {
    match (&a, &b) {
        (Value::List(list), _) => {
            let mut combined = list.borrow().clone();
            match &b {
                Value::List(other) => combined.extend(other.borrow().iter().cloned()),
                _ => combined.push(b.clone()),
            }
            Ok(Value::list(combined))
        }
        (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a + b)),
        (Value::String(_), _) | (_, Value::String(_)) => {
            Ok(Value::String(format!("{}{}", a, b)))
        }
        _ => Err("Operands must be numbers, strings, or lists.".to_string()),
    }
}

/// `*` shares the list behaviour of `+` and adds string repetition in either
/// operand order.
fn multiply_values(a: Value, b: Value) -> Result<Value, String> {
    match (&a, &b) {
        (Value::List(list), _) => {
            let mut combined = list.borrow().clone();
            match &b {
                Value::List(other) => combined.extend(other.borrow().iter().cloned()),
                _ => combined.push(b.clone()),
            }
            Ok(Value::list(combined))
        }
        (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a * b)),
        (Value::Number(count), Value::String(s)) | (Value::String(s), Value::Number(count)) => {
            let count = if *count > 0.0 { *count as usize } else { 0 };
            Ok(Value::String(s.repeat(count)))
        }
        _ => Err("Operands must be numbers, strings, or lists.".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Native;

    /// Run a program with `out` captured into a buffer. Returns the output
    /// lines and the interpret result, with the VM handed back for state
    /// assertions.
    fn run_captured(source: &str) -> (Vec<String>, Result<Value, RuntimeError>, Vm) {
        let function = crate::compile(source).expect("compile error");
        let mut vm = Vm::new();

        let output = Rc::new(RefCell::new(Vec::new()));
        let sink = output.clone();
        vm.globals.insert(
            "out".to_string(),
            Value::Native(Rc::new(Native::new("out", 1, move |argv, _globals| {
                let line = argv
                    .iter()
                    .map(|v| v.to_string())
                    .collect::<Vec<_>>()
                    .join(" ");
                sink.borrow_mut().push(line);
                Ok(Value::Null)
            }))),
        );

        let result = vm.interpret(Rc::new(function), source);
        let lines = output.borrow().clone();
        (lines, result, vm)
    }

    /// Run a program that must succeed; asserts the stack-balance invariant.
    fn run_ok(source: &str) -> Vec<String> {
        let (lines, result, vm) = run_captured(source);
        result.expect("runtime error");
        assert!(vm.stack.is_empty(), "value stack not empty after interpret");
        assert!(vm.frames.is_empty(), "frames not empty after interpret");
        lines
    }

    /// Run a program that must panic uncaught; returns the panic message.
    fn run_err(source: &str) -> String {
        let (_, result, _) = run_captured(source);
        result.expect_err("expected runtime error").message().to_string()
    }

    fn run_global(source: &str, name: &str) -> Value {
        let (_, result, vm) = run_captured(source);
        result.expect("runtime error");
        vm.globals.get(name).cloned().unwrap_or(Value::Null)
    }

    // --- End-to-end scenarios ---

    #[test]
    fn arithmetic_precedence() {
        assert_eq!(run_ok("var a = 2  var b = 3  out(a + b * 4)"), ["14"]);
    }

    #[test]
    fn closure_counter() {
        let lines = run_ok(
            r#"
            func make() {
                var i = 0
                func step() {
                    i = i + 1
                    return i
                }
                return step
            }
            var s = make()
            out(s())
            out(s())
            out(s())
            "#,
        );
        assert_eq!(lines, ["1", "2", "3"]);
    }

    #[test]
    fn division_by_zero_is_caught() {
        let lines = run_ok("attempt { var x = 1 / 0 } fail e { out(e) }");
        assert_eq!(lines, ["Division by zero"]);
    }

    #[test]
    fn class_with_constructor_and_method() {
        let lines = run_ok(
            r#"
            class A {
                init(x) {
                    this.x = x
                }
                greet() {
                    return this.x
                }
            }
            var a = A("hi")
            out(a.greet())
            "#,
        );
        assert_eq!(lines, ["hi"]);
    }

    #[test]
    fn each_over_range_is_half_open() {
        assert_eq!(run_ok("each n in 1..4 { out(n) }"), ["1", "2", "3"]);
    }

    #[test]
    fn list_index_assignment() {
        assert_eq!(
            run_ok("var xs = [1,2,3] xs[1] = 9 out(xs)"),
            ["[1, 9, 3]"]
        );
    }

    // --- Values & operators ---

    #[test]
    fn number_stringification() {
        assert_eq!(run_ok("out(3.0) out(3.5)"), ["3", "3.5"]);
    }

    #[test]
    fn string_concatenation_coerces() {
        assert_eq!(run_ok(r#"out("a" + 1) out(2 + "b")"#), ["a1", "2b"]);
    }

    #[test]
    fn string_interpolation() {
        assert_eq!(
            run_ok(r#"var name = "Ry" out("hello ${name}!")"#),
            ["hello Ry!"]
        );
    }

    #[test]
    fn string_repetition() {
        assert_eq!(run_ok(r#"out("ab" * 3) out(2 * "x")"#), ["ababab", "xx"]);
    }

    #[test]
    fn list_addition() {
        assert_eq!(
            run_ok("out([1,2] + [3]) out([1] + 9)"),
            ["[1, 2, 3]", "[1, 9]"]
        );
    }

    #[test]
    fn comparison_on_non_numbers_is_null() {
        assert_eq!(run_ok(r#"out(1 < "x")"#), ["null"]);
        // >= lowers to LESS,NOT; nil from LESS stays nil through NOT.
        assert_eq!(run_ok(r#"out(2 >= 2) out(1 >= "a")"#), ["true", "null"]);
    }

    #[test]
    fn bitwise_operators() {
        assert_eq!(
            run_ok("out(6 & 3, 6 | 3, 6 ^ 3, 1 << 4, 16 >> 2)"),
            ["2 7 5 16 4"]
        );
    }

    #[test]
    fn logical_operators_short_circuit() {
        assert_eq!(
            run_ok("out(true and 2) out(false or 3) out(null and 1)"),
            ["2", "3", "null"]
        );
    }

    #[test]
    fn prefix_operators() {
        assert_eq!(run_ok("out(-5) out(!true) out(!5)"), ["-5", "false", "null"]);
    }

    #[test]
    fn postfix_operators() {
        assert_eq!(
            run_ok("var i = 5 out(i++) out(i) out(i--) out(i)"),
            ["5", "6", "6", "5"]
        );
    }

    #[test]
    fn modulo() {
        assert_eq!(run_ok("out(10 % 3)"), ["1"]);
    }

    #[test]
    fn range_renders_with_integer_bounds() {
        assert_eq!(run_ok("out(1..4)"), ["1..4"]);
    }

    // --- Control flow ---

    #[test]
    fn if_else() {
        assert_eq!(
            run_ok("if 1 > 2 { out(1) } else { out(2) }"),
            ["2"]
        );
    }

    #[test]
    fn while_loop_sum() {
        let result = run_global(
            r#"
            var i = 0
            var sum = 0
            while i < 10 {
                sum = sum + i
                i = i + 1
            }
            "#,
            "sum",
        );
        assert_eq!(result, Value::Number(45.0));
    }

    #[test]
    fn for_loop_with_increment() {
        let result = run_global(
            "var total = 0 for (var i = 1; i <= 5; i = i + 1) { total = total + i }",
            "total",
        );
        assert_eq!(result, Value::Number(15.0));
    }

    #[test]
    fn stop_exits_without_rebinding() {
        assert_eq!(
            run_ok("each n in [1,2,3,4] { if n == 3 { stop } out(n) }"),
            ["1", "2"]
        );
    }

    #[test]
    fn skip_advances_to_next_element() {
        assert_eq!(
            run_ok("each n in [1,2,3] { if n == 2 { skip } out(n) }"),
            ["1", "3"]
        );
    }

    #[test]
    fn stop_in_while() {
        assert_eq!(
            run_ok("var i = 0 while true { i = i + 1 if i == 3 { stop } } out(i)"),
            ["3"]
        );
    }

    #[test]
    fn each_over_empty_list() {
        assert_eq!(run_ok("each n in [] { out(n) } out(\"done\")"), ["done"]);
    }

    #[test]
    fn each_binds_elements_in_order() {
        assert_eq!(
            run_ok(r#"each w in ["a", "b", "c"] { out(w) }"#),
            ["a", "b", "c"]
        );
    }

    // --- Functions & closures ---

    #[test]
    fn recursive_fib() {
        let lines = run_ok(
            r#"
            func fib(n) {
                if n <= 1 {
                    return n
                }
                return fib(n - 1) + fib(n - 2)
            }
            out(fib(10))
            "#,
        );
        assert_eq!(lines, ["55"]);
    }

    #[test]
    fn arity_mismatch_panics_once() {
        let source = r#"
            func add(a, b) { return a + b }
            attempt { add(1, 2, 3) } fail e { out(e) }
        "#;
        assert_eq!(run_ok(source), ["Expected 2 arguments but got 3."]);
    }

    #[test]
    fn arity_mismatch_uncaught() {
        let message = run_err("func one(a) { return a } one()");
        assert_eq!(message, "Expected 1 arguments but got 0.");
    }

    #[test]
    fn closures_share_one_upvalue() {
        let lines = run_ok(
            r#"
            func make() {
                var shared = 0
                func bump() {
                    shared = shared + 1
                    return shared
                }
                func read() {
                    return shared
                }
                return 0
            }
            make()
            out(bump())
            out(bump())
            out(read())
            "#,
        );
        assert_eq!(lines, ["1", "2", "2"]);
    }

    #[test]
    fn upvalue_closes_with_last_value() {
        let lines = run_ok(
            r#"
            func make() {
                var i = 0
                func step() {
                    i = i + 1
                    return i
                }
                i = 10
                return step
            }
            var s = make()
            out(s())
            "#,
        );
        assert_eq!(lines, ["11"]);
    }

    #[test]
    fn call_on_non_callable() {
        assert_eq!(run_err("var x = 5 x()"), "Can only call functions and classes.");
    }

    // --- Classes ---

    #[test]
    fn constructor_returns_receiver() {
        let lines = run_ok(
            r#"
            class P {
                init(x) { this.x = x }
            }
            var p = P(5)
            out(p.x)
            out(p)
            "#,
        );
        assert_eq!(lines, ["5", "P instance"]);
    }

    #[test]
    fn inherited_methods_resolve() {
        let lines = run_ok(
            r#"
            class A {
                greet() { return "A" }
            }
            class B < A { }
            class C < A {
                greet() { return "C" }
            }
            out(B().greet())
            out(C().greet())
            "#,
        );
        assert_eq!(lines, ["A", "C"]);
    }

    #[test]
    fn bound_methods_carry_their_receiver() {
        let lines = run_ok(
            r#"
            class Greeter {
                init(name) { this.name = name }
                hello() { return "hi " + this.name }
            }
            var m = Greeter("ry").hello
            out(m)
            out(m())
            "#,
        );
        assert_eq!(lines, ["<bound method>", "hi ry"]);
    }

    #[test]
    fn class_without_init_rejects_arguments() {
        assert_eq!(run_err("class A { } A(1)"), "Expected 0 arguments but got 1.");
    }

    #[test]
    fn missing_property_panics() {
        assert_eq!(
            run_err("class A { } out(A().missing)"),
            "Property 'missing' not found on type."
        );
    }

    #[test]
    fn field_assignment_leaves_value() {
        let lines = run_ok(
            r#"
            class Box { }
            var b = Box()
            var stored = b.size = 3
            out(stored)
            out(b.size)
            "#,
        );
        assert_eq!(lines, ["3", "3"]);
    }

    // --- Aggregates & properties ---

    #[test]
    fn map_literal_access() {
        let lines = run_ok(
            r#"
            var m = {"a": 1, "b": 2}
            out(m["a"])
            out(m.b)
            out(m.len)
            "#,
        );
        assert_eq!(lines, ["1", "2", "2"]);
    }

    #[test]
    fn map_key_miss() {
        assert_eq!(
            run_err(r#"var m = {"a": 1} out(m["z"])"#),
            "Key 'z' not found in map."
        );
    }

    #[test]
    fn list_bounds() {
        assert_eq!(run_err("var xs = [1] out(xs[5])"), "List index out of bounds.");
        assert_eq!(
            run_err("var xs = [1] xs[5] = 0"),
            "List index out of bounds."
        );
    }

    #[test]
    fn string_indexing() {
        assert_eq!(run_ok(r#"var s = "abc" out(s[1]) out(s.len)"#), ["b", "3"]);
        assert_eq!(
            run_err(r#"var s = "abc" s[0] = "x""#),
            "Strings are immutable and do not support index assignment."
        );
    }

    #[test]
    fn list_len_and_pop() {
        let lines = run_ok(
            r#"
            var xs = [1, 2]
            out(xs.len)
            out(xs.pop())
            out(xs.len)
            "#,
        );
        assert_eq!(lines, ["2", "2", "1"]);
    }

    #[test]
    fn pop_from_empty_list_is_catchable() {
        let lines = run_ok("var xs = [] attempt { xs.pop() } fail e { out(e) }");
        assert_eq!(lines, ["Cannot pop from an empty list."]);
    }

    #[test]
    fn lists_are_shared_by_reference() {
        let lines = run_ok(
            r#"
            var a = [1]
            var b = a
            b[0] = 9
            out(a)
            "#,
        );
        assert_eq!(lines, ["[9]"]);
    }

    // --- Panics ---

    #[test]
    fn panic_recovery_binds_the_message() {
        assert_eq!(
            run_ok(r#"attempt { panic("boom") } fail e { out(e) }"#),
            ["boom"]
        );
    }

    #[test]
    fn panic_unwinds_call_frames() {
        let lines = run_ok(
            r#"
            func inner() { panic("deep") }
            func outer() { inner() }
            attempt { outer() } fail e { out(e) }
            out("after")
            "#,
        );
        assert_eq!(lines, ["deep", "after"]);
    }

    #[test]
    fn uncaught_panic_reports() {
        assert_eq!(run_err(r#"panic("x")"#), "x");
        assert_eq!(run_err("var x = 1 / 0"), "Division by zero");
    }

    #[test]
    fn nested_attempts_pop_innermost_first() {
        let lines = run_ok(
            r#"
            attempt {
                attempt { panic("inner") } fail e { out(e) }
                panic("outer")
            } fail e {
                out(e)
            }
            "#,
        );
        assert_eq!(lines, ["inner", "outer"]);
    }

    #[test]
    fn undefined_variable_suggestion() {
        assert_eq!(
            run_err("var foo2 = 1 out(foo)"),
            "Undefined variable 'foo'. Did you mean 'foo2'?"
        );
        assert_eq!(
            run_err("var count = 0 cuont = 1"),
            "Cannot set undefined variable 'cuont'. Did you mean 'count'?"
        );
    }

    // --- Namespaces & aliases ---

    #[test]
    fn namespace_prefixes_globals() {
        let lines = run_ok(
            r#"
            namespace math {
                var pi = 3
                func twice(x) { return x * 2 }
            }
            out(math::pi)
            out(math::twice(21))
            "#,
        );
        assert_eq!(lines, ["3", "42"]);
    }

    #[test]
    fn namespaced_code_reaches_natives_unprefixed() {
        assert_eq!(
            run_ok("namespace app { func hello() { out(\"hey\") } } app::hello()"),
            ["hey"]
        );
    }

    #[test]
    fn alias_defines_a_second_name() {
        assert_eq!(run_ok("alias output = out output(7)"), ["7"]);
    }

    // --- Modules ---

    #[test]
    fn import_runs_top_level_once() {
        let dir = std::env::temp_dir().join("ry_import_test");
        std::fs::create_dir_all(&dir).unwrap();
        let module = dir.join("counted.ry");
        std::fs::write(&module, "hits = hits + 1\nvar exported = 40 + 2").unwrap();

        let source = format!(
            "var hits = 0\nimport \"{p}\"\nimport \"{p}\"\nout(hits)\nout(exported)",
            p = module.display()
        );
        assert_eq!(run_ok(&source), ["1", "42"]);

        std::fs::remove_file(&module).ok();
    }

    #[test]
    fn import_missing_file_is_catchable() {
        let lines = run_ok(
            r#"attempt { import "no_such_module_anywhere" } fail e { out(e) }"#,
        );
        assert_eq!(
            lines,
            ["Could not open script file 'no_such_module_anywhere'."]
        );
    }
}
