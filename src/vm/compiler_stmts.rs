//! Statement compilation.

use crate::ast::{Expr, ExprKind, Stmt, StmtKind};
use crate::value::Value;
use crate::vm::compiler::{ClassContext, Compiler, LoopContext, LoopKind};
use crate::vm::opcode::Op;

impl Compiler {
    pub(crate) fn compile_stmt(&mut self, stmt: &Stmt) {
        self.track(stmt.span);
        match &stmt.kind {
            StmtKind::Expression(expr) => {
                self.compile_expr(expr);
                // Assignments and index writes leave nothing behind.
                if !matches!(expr.kind, ExprKind::Assign { .. } | ExprKind::IndexSet { .. }) {
                    self.emit(Op::Pop);
                }
            }
            StmtKind::Var { name, initializer } => {
                match initializer {
                    Some(init) => self.compile_expr(init),
                    None => self.emit(Op::Null),
                }
                if self.scope_depth > 0 {
                    // Namespaced declarations only mean something at global
                    // scope; locally, register the bare trailing segment.
                    let local_name = match name.rfind(':') {
                        Some(pos) => &name[pos + 1..],
                        None => name.as_str(),
                    };
                    self.add_local(local_name);
                } else {
                    let qualified = self.qualify(name);
                    let constant = self.make_constant(Value::String(qualified));
                    self.emit_with(Op::DefineGlobal, constant);
                }
            }
            StmtKind::Block(statements) => {
                self.begin_scope();
                for s in statements {
                    self.compile_stmt(s);
                }
                self.end_scope();
            }
            StmtKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.compile_expr(condition);
                let then_jump = self.emit_jump(Op::JumpIfFalse);
                self.emit(Op::Pop);

                self.compile_stmt(then_branch);

                let else_jump = self.emit_jump(Op::Jump);
                self.patch_jump(then_jump);
                self.emit(Op::Pop);

                if let Some(else_branch) = else_branch {
                    self.compile_stmt(else_branch);
                }
                self.patch_jump(else_jump);
            }
            StmtKind::While { condition, body } => self.compile_while(condition, body),
            StmtKind::For {
                init,
                condition,
                increment,
                body,
            } => self.compile_for(init.as_deref(), condition.as_ref(), increment.as_ref(), body),
            StmtKind::Each {
                name,
                iterable,
                body,
            } => self.compile_each(name, iterable, body),
            StmtKind::Function(decl) => {
                self.emit_function(decl, "");
                let qualified = self.qualify(&decl.name);
                let constant = self.make_constant(Value::String(qualified));
                self.emit_with(Op::DefineGlobal, constant);
            }
            StmtKind::Return { value } => {
                match value {
                    Some(expr) => self.compile_expr(expr),
                    None => self.emit(Op::Null),
                }
                self.emit(Op::Return);
            }
            StmtKind::Class {
                name,
                superclass,
                methods,
            } => {
                let enclosing_class = self.class_context.take();
                self.class_context = Some(ClassContext {
                    has_superclass: superclass.is_some(),
                });

                let qualified = self.qualify(name);
                let name_constant = self.make_constant(Value::String(qualified));
                self.emit_with(Op::Class, name_constant);
                self.emit_with(Op::DefineGlobal, name_constant);
                self.emit_with(Op::GetGlobal, name_constant);

                if let Some(superclass) = superclass {
                    self.compile_expr(superclass);
                    self.emit(Op::Inherit);
                }

                for method in methods {
                    self.track(method.span);
                    self.emit_function(method, "this");
                    let method_constant =
                        self.make_constant(Value::String(method.name.clone()));
                    self.emit_with(Op::Method, method_constant);
                }

                self.class_context = enclosing_class;
                self.emit(Op::Pop);
            }
            StmtKind::Panic { message } => {
                match message {
                    Some(expr) => self.compile_expr(expr),
                    None => self.emit(Op::Null),
                }
                self.emit(Op::Panic);
            }
            StmtKind::Attempt {
                body,
                error_name,
                handler,
            } => {
                let jump_to_fail = self.emit_jump(Op::Attempt);

                self.begin_scope();
                for s in body {
                    self.compile_stmt(s);
                }
                self.end_scope();

                // No panic happened; remove the safety net.
                self.emit(Op::EndAttempt);
                let skip_fail = self.emit_jump(Op::Jump);

                self.patch_jump(jump_to_fail);

                // The VM leaves the panic message on the stack; bind it.
                self.begin_scope();
                self.add_local(error_name);
                for s in handler {
                    self.compile_stmt(s);
                }
                self.end_scope();

                self.patch_jump(skip_fail);
            }
            StmtKind::Stop => self.compile_stop(),
            StmtKind::Skip => self.compile_skip(),
            StmtKind::Import(module) => {
                self.compile_expr(module);
                self.emit(Op::Import);
                self.emit(Op::Pop);
            }
            StmtKind::Alias { name, target } => {
                self.compile_expr(target);
                let qualified = self.qualify(name);
                let constant = self.make_constant(Value::String(qualified));
                self.emit_with(Op::DefineGlobal, constant);
            }
            StmtKind::Namespace { name, body } => {
                let previous = std::mem::replace(&mut self.namespace, name.clone());
                for s in body {
                    self.compile_stmt(s);
                }
                self.namespace = previous;
            }
        }
    }

    fn compile_while(&mut self, condition: &Expr, body: &Stmt) {
        let loop_start = self.function.chunk.len();
        self.loop_stack.push(LoopContext {
            start: loop_start,
            scope_depth: self.scope_depth,
            kind: LoopKind::While,
            break_jumps: Vec::new(),
        });

        self.compile_expr(condition);
        let exit_jump = self.emit_jump(Op::JumpIfFalse);
        self.emit(Op::Pop);

        self.compile_stmt(body);
        self.emit_loop(loop_start);

        self.patch_jump(exit_jump);
        self.emit(Op::Pop);

        let context = self.loop_stack.pop().expect("loop context");
        for jump in context.break_jumps {
            self.patch_jump(jump);
        }
    }

    fn compile_for(
        &mut self,
        init: Option<&Stmt>,
        condition: Option<&Expr>,
        increment: Option<&Expr>,
        body: &Stmt,
    ) {
        self.begin_scope();
        if let Some(init) = init {
            self.compile_stmt(init);
        }

        let loop_start = self.function.chunk.len();
        self.loop_stack.push(LoopContext {
            start: loop_start,
            scope_depth: self.scope_depth,
            kind: LoopKind::For,
            break_jumps: Vec::new(),
        });

        let exit_jump = condition.map(|condition| {
            self.compile_expr(condition);
            let jump = self.emit_jump(Op::JumpIfFalse);
            self.emit(Op::Pop);
            jump
        });

        self.compile_stmt(body);

        // `skip` jumps back to the loop start, so it bypasses this clause.
        if let Some(increment) = increment {
            self.compile_expr(increment);
            self.emit(Op::Pop);
        }

        self.emit_loop(loop_start);

        if let Some(exit_jump) = exit_jump {
            self.patch_jump(exit_jump);
            self.emit(Op::Pop);
        }

        let context = self.loop_stack.pop().expect("loop context");
        for jump in context.break_jumps {
            self.patch_jump(jump);
        }
        self.end_scope();
    }

    fn compile_each(&mut self, name: &str, iterable: &Expr, body: &Stmt) {
        // Two anonymous slots keep the collection and the running index live
        // under the loop; FOR_EACH_NEXT works on them in place.
        self.compile_expr(iterable);
        self.emit_constant(Value::Number(0.0));

        self.begin_scope();
        self.add_local("");
        self.add_local("");

        let loop_start = self.function.chunk.len();
        self.loop_stack.push(LoopContext {
            start: loop_start,
            scope_depth: self.scope_depth,
            kind: LoopKind::Each,
            break_jumps: Vec::new(),
        });

        let exit_jump = self.emit_jump(Op::ForEachNext);

        self.begin_scope();
        self.add_local(name);
        self.compile_stmt(body);
        self.end_scope();

        self.emit_loop(loop_start);
        self.patch_jump(exit_jump);

        self.end_scope();

        let context = self.loop_stack.pop().expect("loop context");
        for jump in context.break_jumps {
            self.patch_jump(jump);
        }
    }

    fn compile_stop(&mut self) {
        let Some(context) = self.loop_stack.last() else {
            self.error("Cannot use 'stop' outside of a loop.");
            return;
        };
        let loop_depth = context.scope_depth;
        let is_each = context.kind == LoopKind::Each;

        let pops = self.locals_deeper_than(loop_depth);
        for _ in 0..pops {
            self.emit(Op::Pop);
        }
        if is_each {
            // Also discard the collection and index pair.
            self.emit_ops(Op::Pop, Op::Pop);
        }

        let jump = self.emit_jump(Op::Jump);
        self.loop_stack
            .last_mut()
            .expect("loop context")
            .break_jumps
            .push(jump);
    }

    fn compile_skip(&mut self) {
        let Some(context) = self.loop_stack.last() else {
            self.error("Cannot use 'skip' outside of a loop.");
            return;
        };
        let loop_depth = context.scope_depth;
        let start = context.start;

        let pops = self.locals_deeper_than(loop_depth);
        for _ in 0..pops {
            self.emit(Op::Pop);
        }
        self.emit_loop(start);
    }

    /// How many locals sit above the given scope depth. `stop`/`skip` pop
    /// their stack slots but the locals stay registered for the code after
    /// the jump.
    fn locals_deeper_than(&self, depth: i32) -> usize {
        self.locals
            .iter()
            .rev()
            .take_while(|local| local.depth > depth)
            .count()
    }
}
