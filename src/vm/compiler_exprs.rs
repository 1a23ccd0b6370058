//! Expression compilation. Every expression leaves exactly one value on the
//! stack, with the documented exceptions (`SET_LOCAL`/`SET_GLOBAL` pop their
//! value, so assignments leave nothing).

use crate::ast::{BitwiseOp, Expr, ExprKind, LogicalOp, MathOp, PostfixOp, PrefixOp, ShiftOp};
use crate::value::Value;
use crate::vm::compiler::Compiler;
use crate::vm::opcode::Op;

impl Compiler {
    pub(crate) fn compile_expr(&mut self, expr: &Expr) {
        self.track(expr.span);
        match &expr.kind {
            ExprKind::Number(n) => self.emit_constant(Value::Number(*n)),
            ExprKind::Str(s) => self.emit_constant(Value::String(s.clone())),
            ExprKind::Bool(true) => self.emit(Op::True),
            ExprKind::Bool(false) => self.emit(Op::False),
            ExprKind::Null => self.emit(Op::Null),
            ExprKind::Variable(name) => self.emit_variable_get(name),
            ExprKind::Assign { name, value } => {
                self.compile_expr(value);
                self.track(expr.span);
                self.emit_variable_set(name);
            }
            ExprKind::Math { left, op, right } => {
                self.compile_expr(left);
                self.compile_expr(right);
                self.track(expr.span);
                match op {
                    MathOp::Add => self.emit(Op::Add),
                    MathOp::Subtract => self.emit(Op::Subtract),
                    MathOp::Multiply => self.emit(Op::Multiply),
                    MathOp::Divide => self.emit(Op::Divide),
                    MathOp::Modulo => self.emit(Op::Modulo),
                    MathOp::Equal => self.emit(Op::Equal),
                    MathOp::NotEqual => self.emit_ops(Op::Equal, Op::Not),
                    MathOp::Greater => self.emit(Op::Greater),
                    MathOp::Less => self.emit(Op::Less),
                    // `>=` and `<=` have no opcode of their own; the
                    // negated pair inherits `<`/`>`'s nil on non-numbers.
                    MathOp::GreaterEqual => self.emit_ops(Op::Less, Op::Not),
                    MathOp::LessEqual => self.emit_ops(Op::Greater, Op::Not),
                }
            }
            ExprKind::Logical { left, op, right } => match op {
                LogicalOp::And => {
                    self.compile_expr(left);
                    let end_jump = self.emit_jump(Op::JumpIfFalse);
                    self.emit(Op::Pop);
                    self.compile_expr(right);
                    self.patch_jump(end_jump);
                }
                LogicalOp::Or => {
                    self.compile_expr(left);
                    let else_jump = self.emit_jump(Op::JumpIfFalse);
                    let end_jump = self.emit_jump(Op::Jump);
                    self.patch_jump(else_jump);
                    self.emit(Op::Pop);
                    self.compile_expr(right);
                    self.patch_jump(end_jump);
                }
            },
            ExprKind::Prefix { op, right } => {
                self.compile_expr(right);
                self.track(expr.span);
                match op {
                    PrefixOp::Negate => self.emit(Op::Negate),
                    PrefixOp::Not => self.emit(Op::Not),
                }
            }
            ExprKind::Postfix { target, op } => self.compile_postfix(expr, target, *op),
            ExprKind::Bitwise { left, op, right } => {
                self.compile_expr(left);
                self.compile_expr(right);
                self.track(expr.span);
                match op {
                    BitwiseOp::And => self.emit(Op::BitwiseAnd),
                    BitwiseOp::Or => self.emit(Op::BitwiseOr),
                    BitwiseOp::Xor => self.emit(Op::BitwiseXor),
                }
            }
            ExprKind::Shift { left, op, right } => {
                self.compile_expr(left);
                self.compile_expr(right);
                self.track(expr.span);
                match op {
                    ShiftOp::Left => self.emit(Op::LeftShift),
                    ShiftOp::Right => self.emit(Op::RightShift),
                }
            }
            ExprKind::Call { callee, arguments } => {
                self.compile_expr(callee);
                for argument in arguments {
                    self.compile_expr(argument);
                }
                self.track(expr.span);
                self.emit_with(Op::Call, arguments.len() as u8);
            }
            ExprKind::Get { object, name } => {
                self.compile_expr(object);
                self.track(expr.span);
                let constant = self.make_constant(Value::String(name.clone()));
                self.emit_with(Op::GetProperty, constant);
            }
            ExprKind::Set {
                object,
                name,
                value,
            } => {
                self.compile_expr(object);
                self.compile_expr(value);
                self.track(expr.span);
                let constant = self.make_constant(Value::String(name.clone()));
                self.emit_with(Op::SetProperty, constant);
            }
            ExprKind::Index { object, index } => {
                self.compile_expr(object);
                self.compile_expr(index);
                self.track(expr.span);
                self.emit(Op::GetIndex);
            }
            ExprKind::IndexSet {
                object,
                index,
                value,
            } => {
                self.compile_expr(object);
                self.compile_expr(index);
                self.compile_expr(value);
                self.track(expr.span);
                self.emit(Op::SetIndex);
            }
            ExprKind::List(elements) => {
                if elements.len() > u8::MAX as usize {
                    self.error("Too many elements in list literal.");
                    return;
                }
                for element in elements {
                    self.compile_expr(element);
                }
                self.track(expr.span);
                self.emit_with(Op::BuildList, elements.len() as u8);
            }
            ExprKind::MapLiteral(items) => {
                if items.len() > u8::MAX as usize {
                    self.error("Too many entries in map literal.");
                    return;
                }
                for (key, value) in items {
                    self.compile_expr(key);
                    self.compile_expr(value);
                }
                self.track(expr.span);
                self.emit_with(Op::BuildMap, items.len() as u8);
            }
            ExprKind::Range { start, end } => {
                self.compile_expr(start);
                self.compile_expr(end);
                self.track(expr.span);
                self.emit(Op::BuildRangeList);
            }
            ExprKind::Grouping(inner) => self.compile_expr(inner),
            ExprKind::This => {
                if self.class_context.is_none() {
                    self.error("Cannot use 'this' outside of a class.");
                    return;
                }
                self.emit_with(Op::GetLocal, 0);
            }
        }
    }

    /// `x++` / `x--`: load, keep a copy as the expression's value, adjust by
    /// one, store back.
    fn compile_postfix(&mut self, expr: &Expr, target: &Expr, op: PostfixOp) {
        let ExprKind::Variable(name) = &target.kind else {
            self.error("Can only increment or decrement a variable.");
            return;
        };
        let name = name.clone();
        self.track(expr.span);

        self.emit_variable_get(&name);
        self.emit(Op::Copy);
        self.emit_constant(Value::Number(1.0));
        match op {
            PostfixOp::Increment => self.emit(Op::Add),
            PostfixOp::Decrement => self.emit(Op::Subtract),
        }
        self.emit_variable_set(&name);
        // SET_UPVALUE leaves its value behind; drop it so the copied old
        // value is the expression result, as with locals and globals.
        if self.resolve_local(&name).is_none() && self.resolve_upvalue(&name).is_some() {
            self.emit(Op::Pop);
        }
    }
}
