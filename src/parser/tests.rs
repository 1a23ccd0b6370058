//! Parser tests.

use crate::ast::{ExprKind, MathOp, StmtKind};
use crate::error::ParserError;
use crate::lexer::Scanner;
use crate::parser::Parser;

fn parse(source: &str) -> Vec<crate::ast::Stmt> {
    let tokens = Scanner::new(source).scan_tokens().expect("lexer error");
    Parser::new(tokens).parse().expect("parser error")
}

fn parse_err(source: &str) -> ParserError {
    let tokens = Scanner::new(source).scan_tokens().expect("lexer error");
    Parser::new(tokens).parse().expect_err("expected parse error")
}

#[test]
fn var_declaration() {
    let stmts = parse("var x = 1");
    assert_eq!(stmts.len(), 1);
    let StmtKind::Var { name, initializer } = &stmts[0].kind else {
        panic!("expected var");
    };
    assert_eq!(name, "x");
    assert!(matches!(
        initializer.as_ref().unwrap().kind,
        ExprKind::Number(n) if n == 1.0
    ));
}

#[test]
fn precedence_binds_factor_over_term() {
    let stmts = parse("out(1 + 2 * 3)");
    let StmtKind::Expression(call) = &stmts[0].kind else {
        panic!("expected expression");
    };
    let ExprKind::Call { arguments, .. } = &call.kind else {
        panic!("expected call");
    };
    let ExprKind::Math { op, right, .. } = &arguments[0].kind else {
        panic!("expected math");
    };
    assert_eq!(*op, MathOp::Add);
    assert!(matches!(
        right.kind,
        ExprKind::Math {
            op: MathOp::Multiply,
            ..
        }
    ));
}

#[test]
fn function_declaration_with_params() {
    let stmts = parse("func add(a, b) { return a + b }");
    let StmtKind::Function(decl) = &stmts[0].kind else {
        panic!("expected function");
    };
    assert_eq!(decl.name, "add");
    assert_eq!(decl.params, ["a", "b"]);
    assert_eq!(decl.body.len(), 1);
}

#[test]
fn class_with_superclass_and_methods() {
    let stmts = parse("class B < A { init(x) { } greet() { } }");
    let StmtKind::Class {
        name,
        superclass,
        methods,
    } = &stmts[0].kind
    else {
        panic!("expected class");
    };
    assert_eq!(name, "B");
    assert!(matches!(
        superclass.as_ref().unwrap().kind,
        ExprKind::Variable(ref n) if n == "A"
    ));
    assert_eq!(methods.len(), 2);
    assert_eq!(methods[0].name, "init");
}

#[test]
fn each_statement() {
    let stmts = parse("each n in 1..4 { out(n) }");
    let StmtKind::Each { name, iterable, .. } = &stmts[0].kind else {
        panic!("expected each");
    };
    assert_eq!(name, "n");
    assert!(matches!(iterable.kind, ExprKind::Range { .. }));
}

#[test]
fn attempt_fail_statement() {
    let stmts = parse(r#"attempt { panic("x") } fail e { out(e) }"#);
    let StmtKind::Attempt {
        body,
        error_name,
        handler,
    } = &stmts[0].kind
    else {
        panic!("expected attempt");
    };
    assert_eq!(error_name, "e");
    assert_eq!(body.len(), 1);
    assert_eq!(handler.len(), 1);
}

#[test]
fn for_statement_clauses() {
    let stmts = parse("for (var i = 0; i < 10; i = i + 1) { }");
    let StmtKind::For {
        init,
        condition,
        increment,
        ..
    } = &stmts[0].kind
    else {
        panic!("expected for");
    };
    assert!(init.is_some());
    assert!(condition.is_some());
    assert!(increment.is_some());

    let stmts = parse("for (;;) { stop }");
    let StmtKind::For {
        init,
        condition,
        increment,
        ..
    } = &stmts[0].kind
    else {
        panic!("expected for");
    };
    assert!(init.is_none());
    assert!(condition.is_none());
    assert!(increment.is_none());
}

#[test]
fn assignment_targets() {
    assert!(matches!(
        &parse("x = 1")[0].kind,
        StmtKind::Expression(e) if matches!(e.kind, ExprKind::Assign { .. })
    ));
    assert!(matches!(
        &parse("a.b = 1")[0].kind,
        StmtKind::Expression(e) if matches!(e.kind, ExprKind::Set { .. })
    ));
    assert!(matches!(
        &parse("a[0] = 1")[0].kind,
        StmtKind::Expression(e) if matches!(e.kind, ExprKind::IndexSet { .. })
    ));
    assert!(matches!(
        parse_err("1 = 2"),
        ParserError::InvalidAssignmentTarget(_)
    ));
}

#[test]
fn qualified_names_join() {
    let stmts = parse("out(math::pi)");
    let StmtKind::Expression(call) = &stmts[0].kind else {
        panic!("expected expression");
    };
    let ExprKind::Call { arguments, .. } = &call.kind else {
        panic!("expected call");
    };
    assert!(matches!(
        &arguments[0].kind,
        ExprKind::Variable(name) if name == "math::pi"
    ));
}

#[test]
fn map_literal() {
    let stmts = parse(r#"var m = {"a": 1, "b": 2}"#);
    let StmtKind::Var { initializer, .. } = &stmts[0].kind else {
        panic!("expected var");
    };
    let ExprKind::MapLiteral(items) = &initializer.as_ref().unwrap().kind else {
        panic!("expected map literal");
    };
    assert_eq!(items.len(), 2);
}

#[test]
fn postfix_after_call_chain() {
    let stmts = parse("i++");
    assert!(matches!(
        &stmts[0].kind,
        StmtKind::Expression(e) if matches!(e.kind, ExprKind::Postfix { .. })
    ));
}
