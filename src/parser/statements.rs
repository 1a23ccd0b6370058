//! Statement parsing.

use crate::ast::{FunctionDecl, Stmt, StmtKind};
use crate::error::ParserError;
use crate::lexer::TokenKind;

use super::core::{ParseResult, Parser};

impl Parser {
    pub(crate) fn declaration(&mut self) -> ParseResult<Stmt> {
        let span = self.current_span();
        if self.match_token(&TokenKind::Var) {
            let name = self.expect_qualified_name()?;
            let initializer = if self.match_token(&TokenKind::Equal) {
                Some(self.expression()?)
            } else {
                None
            };
            return Ok(Stmt::new(StmtKind::Var { name, initializer }, span));
        }
        if self.match_token(&TokenKind::Func) {
            let decl = self.function_decl()?;
            return Ok(Stmt::new(StmtKind::Function(decl), span));
        }
        if self.match_token(&TokenKind::Class) {
            return self.class_declaration();
        }
        if self.match_token(&TokenKind::Namespace) {
            let name = self.expect_identifier()?;
            self.expect(&TokenKind::LeftBrace)?;
            let mut body = Vec::new();
            while !self.check(&TokenKind::RightBrace) && !self.is_at_end() {
                body.push(self.declaration()?);
            }
            self.expect(&TokenKind::RightBrace)?;
            return Ok(Stmt::new(StmtKind::Namespace { name, body }, span));
        }
        if self.match_token(&TokenKind::Alias) {
            let name = self.expect_identifier()?;
            self.expect(&TokenKind::Equal)?;
            let target = self.expression()?;
            return Ok(Stmt::new(StmtKind::Alias { name, target }, span));
        }
        self.statement()
    }

    pub(crate) fn statement(&mut self) -> ParseResult<Stmt> {
        let span = self.current_span();

        if self.match_token(&TokenKind::If) {
            return self.if_statement();
        }
        if self.match_token(&TokenKind::While) {
            let condition = self.expression()?;
            let body = Box::new(self.statement()?);
            return Ok(Stmt::new(StmtKind::While { condition, body }, span));
        }
        if self.match_token(&TokenKind::For) {
            return self.for_statement();
        }
        if self.match_token(&TokenKind::Each) {
            let name = self.expect_identifier()?;
            self.expect(&TokenKind::In)?;
            let iterable = self.expression()?;
            let body = Box::new(self.statement()?);
            return Ok(Stmt::new(
                StmtKind::Each {
                    name,
                    iterable,
                    body,
                },
                span,
            ));
        }
        if self.match_token(&TokenKind::Return) {
            let value = if self.can_start_expression() {
                Some(self.expression()?)
            } else {
                None
            };
            return Ok(Stmt::new(StmtKind::Return { value }, span));
        }
        if self.match_token(&TokenKind::Panic) {
            let message = if self.can_start_expression() {
                Some(self.expression()?)
            } else {
                None
            };
            return Ok(Stmt::new(StmtKind::Panic { message }, span));
        }
        if self.match_token(&TokenKind::Attempt) {
            self.expect(&TokenKind::LeftBrace)?;
            let mut body = Vec::new();
            while !self.check(&TokenKind::RightBrace) && !self.is_at_end() {
                body.push(self.declaration()?);
            }
            self.expect(&TokenKind::RightBrace)?;
            self.expect(&TokenKind::Fail)?;
            let error_name = self.expect_identifier()?;
            self.expect(&TokenKind::LeftBrace)?;
            let mut handler = Vec::new();
            while !self.check(&TokenKind::RightBrace) && !self.is_at_end() {
                handler.push(self.declaration()?);
            }
            self.expect(&TokenKind::RightBrace)?;
            return Ok(Stmt::new(
                StmtKind::Attempt {
                    body,
                    error_name,
                    handler,
                },
                span,
            ));
        }
        if self.match_token(&TokenKind::Stop) {
            return Ok(Stmt::new(StmtKind::Stop, span));
        }
        if self.match_token(&TokenKind::Skip) {
            return Ok(Stmt::new(StmtKind::Skip, span));
        }
        if self.match_token(&TokenKind::Import) {
            let module = self.expression()?;
            return Ok(Stmt::new(StmtKind::Import(module), span));
        }
        if self.match_token(&TokenKind::LeftBrace) {
            let mut statements = Vec::new();
            while !self.check(&TokenKind::RightBrace) && !self.is_at_end() {
                statements.push(self.declaration()?);
            }
            self.expect(&TokenKind::RightBrace)?;
            return Ok(Stmt::new(StmtKind::Block(statements), span));
        }

        let expr = self.expression()?;
        Ok(Stmt::new(StmtKind::Expression(expr), span))
    }

    fn if_statement(&mut self) -> ParseResult<Stmt> {
        let span = self.previous().span;
        let condition = self.expression()?;
        let then_branch = Box::new(self.statement()?);
        let else_branch = if self.match_token(&TokenKind::Else) {
            Some(Box::new(if self.match_token(&TokenKind::If) {
                self.if_statement()?
            } else {
                self.statement()?
            }))
        } else {
            None
        };
        Ok(Stmt::new(
            StmtKind::If {
                condition,
                then_branch,
                else_branch,
            },
            span,
        ))
    }

    fn for_statement(&mut self) -> ParseResult<Stmt> {
        let span = self.previous().span;
        self.expect(&TokenKind::LeftParen)?;

        let init = if self.match_token(&TokenKind::Semicolon) {
            None
        } else {
            let stmt = self.declaration()?;
            self.expect(&TokenKind::Semicolon)?;
            Some(Box::new(stmt))
        };

        let condition = if self.check(&TokenKind::Semicolon) {
            None
        } else {
            Some(self.expression()?)
        };
        self.expect(&TokenKind::Semicolon)?;

        let increment = if self.check(&TokenKind::RightParen) {
            None
        } else {
            Some(self.expression()?)
        };
        self.expect(&TokenKind::RightParen)?;

        let body = Box::new(self.statement()?);
        Ok(Stmt::new(
            StmtKind::For {
                init,
                condition,
                increment,
                body,
            },
            span,
        ))
    }

    fn class_declaration(&mut self) -> ParseResult<Stmt> {
        let span = self.previous().span;
        let name = self.expect_identifier()?;

        let superclass = if self.match_token(&TokenKind::Less) {
            Some(self.expression()?)
        } else {
            None
        };

        self.expect(&TokenKind::LeftBrace)?;
        let mut methods = Vec::new();
        while !self.check(&TokenKind::RightBrace) && !self.is_at_end() {
            methods.push(self.function_decl()?);
        }
        self.expect(&TokenKind::RightBrace)?;

        Ok(Stmt::new(
            StmtKind::Class {
                name,
                superclass,
                methods,
            },
            span,
        ))
    }

    /// `name(params) { body }`, shared by `func` declarations and methods.
    fn function_decl(&mut self) -> ParseResult<FunctionDecl> {
        let span = self.current_span();
        let name = self.expect_identifier()?;
        self.expect(&TokenKind::LeftParen)?;

        let mut params = Vec::new();
        if !self.check(&TokenKind::RightParen) {
            loop {
                params.push(self.expect_identifier()?);
                if !self.match_token(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RightParen)?;

        self.expect(&TokenKind::LeftBrace)?;
        let mut body = Vec::new();
        while !self.check(&TokenKind::RightBrace) && !self.is_at_end() {
            body.push(self.declaration()?);
        }
        self.expect(&TokenKind::RightBrace)?;

        if params.len() > u8::MAX as usize {
            return Err(ParserError::general(
                "Cannot have more than 255 parameters",
                span,
            ));
        }

        Ok(FunctionDecl {
            name,
            params,
            body,
            span,
        })
    }
}
