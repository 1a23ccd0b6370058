//! Ry (Ry's for You): a small dynamically typed scripting language with a
//! single-pass compiler to stack-based bytecode and a VM to run it.
//!
//! The pipeline is lex -> parse -> compile -> interpret. The helpers here
//! wire those stages together for the CLI, the REPL, and embedding tests;
//! each stage is usable on its own through its module.

pub mod ast;
pub mod error;
pub mod lexer;
pub mod modules;
pub mod natives;
pub mod parser;
pub mod repl;
pub mod report;
pub mod span;
pub mod value;
pub mod vm;

use std::rc::Rc;

use error::{CompileError, RyError};
use span::Span;
use value::Value;
use vm::{Chunk, Compiler, Function, Vm};

/// Parse source text into statements without executing.
pub fn parse(source: &str) -> Result<Vec<ast::Stmt>, RyError> {
    let tokens = lexer::Scanner::new(source).scan_tokens()?;
    let statements = parser::Parser::new(tokens).parse()?;
    Ok(statements)
}

/// Compile source text to a top-level function without executing.
pub fn compile(source: &str) -> Result<Function, RyError> {
    let statements = parse(source)?;
    let mut chunk = Chunk::new();
    let mut compiler = Compiler::new(source);
    if !compiler.compile(&statements, &mut chunk) {
        return Err(CompileError::new("Compilation failed.", Span::default()).into());
    }
    Ok(Function::script(chunk, "<main>"))
}

/// Run source text on the given VM, returning the script's result value.
///
/// Compile and runtime diagnostics are reported as they occur; the error
/// value is for callers that need to branch on failure.
pub fn run_source(vm: &mut Vm, source: &str) -> Result<Value, RyError> {
    let function = compile(source)?;
    let result = vm.interpret(Rc::new(function), source)?;
    Ok(result)
}

/// Run source text, reporting any diagnostic that has not already been
/// printed by a later stage. This is what the CLI and REPL call.
pub fn interpret(vm: &mut Vm, source: &str) {
    match run_source(vm, source) {
        Ok(_) => {}
        Err(RyError::Lexer(e)) => {
            let span = e.span();
            report::report(span.line, span.column, "", &e.to_string(), source);
        }
        Err(RyError::Parser(e)) => {
            let span = e.span();
            report::report(span.line, span.column, "", &e.to_string(), source);
        }
        // The compiler and VM report at the fault site.
        Err(_) => {}
    }
}

/// Disassemble compiled bytecode to a string.
pub fn disassemble(function: &Function) -> String {
    vm::disassemble(function)
}
