//! Abstract syntax tree for Ry.

pub mod expr;
pub mod stmt;

pub use expr::{BitwiseOp, Expr, ExprKind, LogicalOp, MathOp, PostfixOp, PrefixOp, ShiftOp};
pub use stmt::{FunctionDecl, Stmt, StmtKind};
