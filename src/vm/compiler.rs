//! AST-to-bytecode compiler.
//!
//! Single pass: walks the statements once, emitting bytes into a `Chunk`.
//! Variable resolution happens here: locals become stack slot indexes,
//! captured variables become upvalue indexes, everything else is a global
//! looked up by (possibly namespace-qualified) name at runtime.

use std::collections::HashSet;
use std::rc::Rc;

use crate::ast::{FunctionDecl, Stmt};
use crate::natives;
use crate::report;
use crate::span::Span;
use crate::value::Value;
use crate::vm::chunk::{Chunk, Function, MAX_CONSTANTS};
use crate::vm::opcode::Op;

/// Upvalues per function are limited by the one-byte operand.
pub const MAX_UPVALUES: usize = 256;

/// A local variable tracked during compilation.
#[derive(Debug, Clone)]
pub struct Local {
    pub name: String,
    pub depth: i32,
    pub is_captured: bool,
}

/// Compile-time record of one captured variable, emitted after `OP_CLOSURE`
/// as an `(is_local, index)` byte pair.
#[derive(Debug, Clone, Copy)]
pub struct UpvalueDescriptor {
    pub index: u8,
    pub is_local: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopKind {
    While,
    For,
    Each,
}

/// Per-loop state for `stop`/`skip`: where the loop starts, how deep its
/// scope is (so locals above it can be popped), and the pending break jumps.
#[derive(Debug)]
pub struct LoopContext {
    pub start: usize,
    pub scope_depth: i32,
    pub kind: LoopKind,
    pub break_jumps: Vec<usize>,
}

/// Set while compiling a class body; `this` is only valid inside one.
#[derive(Debug, Clone)]
pub struct ClassContext {
    pub has_superclass: bool,
}

/// The compiler. One instance per function being compiled; nested functions
/// swap in a fresh compiler whose `enclosing` chain is used for upvalue
/// resolution.
pub struct Compiler {
    pub(crate) function: Function,
    pub(crate) locals: Vec<Local>,
    pub(crate) upvalues: Vec<UpvalueDescriptor>,
    pub(crate) scope_depth: i32,
    pub(crate) enclosing: Option<Box<Compiler>>,
    pub(crate) loop_stack: Vec<LoopContext>,
    pub(crate) class_context: Option<ClassContext>,
    pub(crate) namespace: String,
    pub(crate) native_names: HashSet<String>,
    pub(crate) had_error: bool,
    source: Rc<str>,
    line: usize,
    column: usize,
}

impl Compiler {
    pub fn new(source: &str) -> Self {
        Self {
            function: Function::new(""),
            locals: Vec::new(),
            upvalues: Vec::new(),
            scope_depth: 0,
            enclosing: None,
            loop_stack: Vec::new(),
            class_context: None,
            namespace: String::new(),
            native_names: natives::names().iter().map(|s| s.to_string()).collect(),
            had_error: false,
            source: Rc::from(source),
            line: 0,
            column: 0,
        }
    }

    /// Compile a program into the provided chunk. Returns false iff any
    /// error was reported during the traversal.
    pub fn compile(&mut self, statements: &[Stmt], chunk: &mut Chunk) -> bool {
        self.locals.clear();
        self.scope_depth = 0;
        self.add_local("(script)");

        for stmt in statements {
            self.compile_stmt(stmt);
        }
        self.emit(Op::Null);
        self.emit(Op::Return);

        *chunk = std::mem::take(&mut self.function.chunk);
        !self.had_error
    }

    // --- Emit helpers ---

    pub(crate) fn track(&mut self, span: Span) {
        self.line = span.line;
        self.column = span.column;
    }

    pub(crate) fn emit_byte(&mut self, byte: u8) {
        let (line, column) = (self.line, self.column);
        self.function.chunk.write(byte, line, column);
    }

    pub(crate) fn emit(&mut self, op: Op) {
        self.emit_byte(op as u8);
    }

    pub(crate) fn emit_ops(&mut self, first: Op, second: Op) {
        self.emit(first);
        self.emit(second);
    }

    pub(crate) fn emit_with(&mut self, op: Op, operand: u8) {
        self.emit(op);
        self.emit_byte(operand);
    }

    pub(crate) fn make_constant(&mut self, value: Value) -> u8 {
        let index = self.function.chunk.add_constant(value);
        if index >= MAX_CONSTANTS {
            self.error("Too many constants in one chunk.");
            return 0;
        }
        index as u8
    }

    pub(crate) fn emit_constant(&mut self, value: Value) {
        let index = self.make_constant(value);
        self.emit_with(Op::Constant, index);
    }

    /// Emit a jump with a placeholder offset; returns the patch site.
    pub(crate) fn emit_jump(&mut self, op: Op) -> usize {
        self.emit(op);
        self.emit_byte(0xff);
        self.emit_byte(0xff);
        self.function.chunk.len() - 2
    }

    pub(crate) fn patch_jump(&mut self, offset: usize) {
        // -2 adjusts for the operand bytes themselves.
        let jump = self.function.chunk.len() - offset - 2;
        if jump > u16::MAX as usize {
            self.error("Too much code to jump over.");
        }
        self.function.chunk.code[offset] = ((jump >> 8) & 0xff) as u8;
        self.function.chunk.code[offset + 1] = (jump & 0xff) as u8;
    }

    pub(crate) fn emit_loop(&mut self, loop_start: usize) {
        self.emit(Op::Loop);
        let offset = self.function.chunk.len() - loop_start + 2;
        if offset > u16::MAX as usize {
            self.error("Loop body too large.");
        }
        self.emit_byte(((offset >> 8) & 0xff) as u8);
        self.emit_byte((offset & 0xff) as u8);
    }

    // --- Scopes & locals ---

    pub(crate) fn begin_scope(&mut self) {
        self.scope_depth += 1;
    }

    pub(crate) fn end_scope(&mut self) {
        self.scope_depth -= 1;
        while let Some(local) = self.locals.last() {
            if local.depth <= self.scope_depth {
                break;
            }
            self.emit(Op::Pop);
            self.locals.pop();
        }
    }

    pub(crate) fn add_local(&mut self, name: &str) {
        if self.locals.len() > u8::MAX as usize {
            self.error("Too many local variables in function.");
            return;
        }
        self.locals.push(Local {
            name: name.to_string(),
            depth: self.scope_depth,
            is_captured: false,
        });
    }

    pub(crate) fn resolve_local(&self, name: &str) -> Option<u8> {
        for (i, local) in self.locals.iter().enumerate().rev() {
            if local.name == name {
                return Some(i as u8);
            }
        }
        None
    }

    pub(crate) fn resolve_upvalue(&mut self, name: &str) -> Option<u8> {
        self.enclosing.as_ref()?;

        let captured_local = {
            let enclosing = self.enclosing.as_mut().unwrap();
            match enclosing.resolve_local(name) {
                Some(index) => {
                    enclosing.locals[index as usize].is_captured = true;
                    Some(index)
                }
                None => None,
            }
        };
        if let Some(index) = captured_local {
            return Some(self.add_upvalue(index, true));
        }

        let outer = self.enclosing.as_mut().unwrap().resolve_upvalue(name);
        outer.map(|index| self.add_upvalue(index, false))
    }

    fn add_upvalue(&mut self, index: u8, is_local: bool) -> u8 {
        for (i, upvalue) in self.upvalues.iter().enumerate() {
            if upvalue.index == index && upvalue.is_local == is_local {
                return i as u8;
            }
        }
        if self.upvalues.len() == MAX_UPVALUES {
            self.error("Too many closure variables in function.");
            return 0;
        }
        self.upvalues.push(UpvalueDescriptor { index, is_local });
        (self.upvalues.len() - 1) as u8
    }

    // --- Namespaces ---

    /// Qualify an undecorated global name with the active namespace. Names
    /// that already carry `::`, native names, and `native*` names pass
    /// through untouched.
    pub(crate) fn qualify(&self, name: &str) -> String {
        if self.namespace.is_empty()
            || name.contains("::")
            || self.native_names.contains(name)
            || name.starts_with("native")
        {
            name.to_string()
        } else {
            format!("{}::{}", self.namespace, name)
        }
    }

    // --- Variable access ---

    pub(crate) fn emit_variable_get(&mut self, name: &str) {
        if let Some(slot) = self.resolve_local(name) {
            self.emit_with(Op::GetLocal, slot);
        } else if let Some(index) = self.resolve_upvalue(name) {
            self.emit_with(Op::GetUpvalue, index);
        } else {
            let qualified = self.qualify(name);
            let constant = self.make_constant(Value::String(qualified));
            self.emit_with(Op::GetGlobal, constant);
        }
    }

    pub(crate) fn emit_variable_set(&mut self, name: &str) {
        if let Some(slot) = self.resolve_local(name) {
            self.emit_with(Op::SetLocal, slot);
        } else if let Some(index) = self.resolve_upvalue(name) {
            self.emit_with(Op::SetUpvalue, index);
        } else {
            let qualified = self.qualify(name);
            let constant = self.make_constant(Value::String(qualified));
            self.emit_with(Op::SetGlobal, constant);
        }
    }

    // --- Nested functions ---

    /// Swap in a fresh compiler for a nested function; the current one
    /// becomes its `enclosing` until [`Self::finish_function`].
    pub(crate) fn start_function(&mut self, decl: &FunctionDecl, slot_zero: &str) {
        let mut child = Compiler {
            function: Function::new(decl.name.clone()),
            locals: Vec::new(),
            upvalues: Vec::new(),
            scope_depth: 0,
            enclosing: None,
            loop_stack: Vec::new(),
            class_context: self.class_context.clone(),
            namespace: self.namespace.clone(),
            native_names: self.native_names.clone(),
            had_error: false,
            source: Rc::clone(&self.source),
            line: self.line,
            column: self.column,
        };
        child.function.arity = decl.params.len();
        child.begin_scope();
        child.add_local(slot_zero);
        for param in &decl.params {
            child.add_local(param);
        }

        let parent = std::mem::replace(self, child);
        self.enclosing = Some(Box::new(parent));
    }

    /// Seal the nested function and restore the enclosing compiler.
    /// Returns the finished function and its capture descriptors, which the
    /// caller emits after `OP_CLOSURE`.
    pub(crate) fn finish_function(&mut self) -> (Function, Vec<UpvalueDescriptor>) {
        self.emit(Op::Null);
        self.emit(Op::Return);

        let mut function = std::mem::take(&mut self.function);
        function.upvalue_count = self.upvalues.len();
        let upvalues = std::mem::take(&mut self.upvalues);
        let had_error = self.had_error;

        let parent = self.enclosing.take().expect("nested compiler has a parent");
        *self = *parent;
        self.had_error |= had_error;

        (function, upvalues)
    }

    /// Compile a function body and emit the closure (constant + capture
    /// pairs). Shared by `func` declarations and methods.
    pub(crate) fn emit_function(&mut self, decl: &FunctionDecl, slot_zero: &str) {
        self.start_function(decl, slot_zero);
        for stmt in &decl.body {
            self.compile_stmt(stmt);
        }
        let (function, upvalues) = self.finish_function();

        let constant = self.make_constant(Value::Function(Rc::new(function)));
        self.emit_with(Op::Closure, constant);
        for upvalue in upvalues {
            self.emit_byte(upvalue.is_local as u8);
            self.emit_byte(upvalue.index);
        }
    }

    // --- Errors ---

    pub(crate) fn error(&mut self, message: &str) {
        report::report(self.line, self.column, "", message, &self.source);
        self.had_error = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile_source(source: &str) -> (Chunk, bool) {
        let statements = crate::parse(source).expect("parse error");
        let mut chunk = Chunk::new();
        let mut compiler = Compiler::new(source);
        let ok = compiler.compile(&statements, &mut chunk);
        (chunk, ok)
    }

    fn ops_of(chunk: &Chunk) -> Vec<u8> {
        chunk.code.clone()
    }

    #[test]
    fn global_var_bytecode() {
        let (chunk, ok) = compile_source("var x = 1");
        assert!(ok);
        assert_eq!(
            ops_of(&chunk),
            vec![
                Op::Constant as u8,
                0,
                Op::DefineGlobal as u8,
                1,
                Op::Null as u8,
                Op::Return as u8,
            ]
        );
        assert_eq!(chunk.lines.len(), chunk.code.len());
        assert_eq!(chunk.columns.len(), chunk.code.len());
    }

    #[test]
    fn expression_statements_pop_their_value() {
        let (chunk, ok) = compile_source("1 + 2");
        assert!(ok);
        let tail = &chunk.code[chunk.code.len() - 3..];
        assert_eq!(
            tail,
            [Op::Pop as u8, Op::Null as u8, Op::Return as u8]
        );
    }

    #[test]
    fn assignments_elide_the_statement_pop() {
        let (chunk, ok) = compile_source("var xs = [1] xs[0] = 2");
        assert!(ok);
        let tail = &chunk.code[chunk.code.len() - 3..];
        assert_eq!(
            tail,
            [Op::SetIndex as u8, Op::Null as u8, Op::Return as u8]
        );
    }

    #[test]
    fn relational_pairs_lower_to_negations() {
        let (chunk, ok) = compile_source("var a = 1 >= 2");
        assert!(ok);
        let code = ops_of(&chunk);
        let pair = [Op::Less as u8, Op::Not as u8];
        assert!(
            code.windows(2).any(|w| w == pair),
            "expected LESS,NOT in {:?}",
            code
        );

        let (chunk, _) = compile_source("var a = 1 <= 2");
        let pair = [Op::Greater as u8, Op::Not as u8];
        assert!(ops_of(&chunk).windows(2).any(|w| w == pair));
    }

    #[test]
    fn nested_function_records_its_captures() {
        let (chunk, ok) = compile_source(
            r#"
            func make() {
                var i = 0
                func step() {
                    return i
                }
                return 0
            }
            "#,
        );
        assert!(ok);

        let Some(Value::Function(make)) = chunk
            .constants
            .iter()
            .find(|c| matches!(c, Value::Function(f) if f.name == "make"))
        else {
            panic!("make not compiled");
        };
        let Some(Value::Function(step)) = make
            .chunk
            .constants
            .iter()
            .find(|c| matches!(c, Value::Function(f) if f.name == "step"))
        else {
            panic!("step not compiled");
        };
        assert_eq!(step.upvalue_count, 1);
        assert_eq!(make.upvalue_count, 0);
    }

    #[test]
    fn this_outside_class_fails() {
        let (_, ok) = compile_source("out(this)");
        assert!(!ok);
    }

    #[test]
    fn loop_controls_outside_loops_fail() {
        let (_, ok) = compile_source("stop");
        assert!(!ok);
        let (_, ok) = compile_source("skip");
        assert!(!ok);
    }

    #[test]
    fn constant_pool_overflow_is_an_error() {
        let mut source = String::new();
        for i in 0..200 {
            source.push_str(&format!("var v{} = {}\n", i, i));
        }
        let (_, ok) = compile_source(&source);
        assert!(!ok);
    }

    #[test]
    fn namespace_qualifies_declarations_and_reads() {
        let (chunk, ok) = compile_source("namespace m { var x = 1 var y = x }");
        assert!(ok);
        let names: Vec<&str> = chunk
            .constants
            .iter()
            .filter_map(|c| match c {
                Value::String(s) => Some(s.as_str()),
                _ => None,
            })
            .collect();
        assert!(names.contains(&"m::x"));
        assert!(names.contains(&"m::y"));
        assert!(!names.contains(&"x"));
    }
}
