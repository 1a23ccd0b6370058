//! Expression parsing, loosest binding first.

use crate::ast::{
    BitwiseOp, Expr, ExprKind, LogicalOp, MathOp, PostfixOp, PrefixOp, ShiftOp,
};
use crate::error::ParserError;
use crate::lexer::TokenKind;

use super::core::{ParseResult, Parser};

impl Parser {
    pub(crate) fn expression(&mut self) -> ParseResult<Expr> {
        self.assignment()
    }

    /// Whether the current token can begin an expression. Used where a value
    /// is optional (`return`, `panic`) and there is no statement terminator.
    pub(crate) fn can_start_expression(&self) -> bool {
        matches!(
            self.peek().kind,
            TokenKind::Number(_)
                | TokenKind::Str(_)
                | TokenKind::Identifier(_)
                | TokenKind::True
                | TokenKind::False
                | TokenKind::Null
                | TokenKind::This
                | TokenKind::LeftParen
                | TokenKind::LeftBracket
                | TokenKind::Minus
                | TokenKind::Bang
        )
    }

    fn assignment(&mut self) -> ParseResult<Expr> {
        let expr = self.or_expr()?;

        if self.match_token(&TokenKind::Equal) {
            let equals_span = self.previous().span;
            let value = Box::new(self.assignment()?);
            return match expr.kind {
                ExprKind::Variable(name) => Ok(Expr::new(
                    ExprKind::Assign { name, value },
                    expr.span,
                )),
                ExprKind::Get { object, name } => Ok(Expr::new(
                    ExprKind::Set {
                        object,
                        name,
                        value,
                    },
                    expr.span,
                )),
                ExprKind::Index { object, index } => Ok(Expr::new(
                    ExprKind::IndexSet {
                        object,
                        index,
                        value,
                    },
                    expr.span,
                )),
                _ => Err(ParserError::InvalidAssignmentTarget(equals_span)),
            };
        }

        Ok(expr)
    }

    fn or_expr(&mut self) -> ParseResult<Expr> {
        let mut expr = self.and_expr()?;
        while self.match_token(&TokenKind::Or) {
            let span = self.previous().span;
            let right = self.and_expr()?;
            expr = Expr::new(
                ExprKind::Logical {
                    left: Box::new(expr),
                    op: LogicalOp::Or,
                    right: Box::new(right),
                },
                span,
            );
        }
        Ok(expr)
    }

    fn and_expr(&mut self) -> ParseResult<Expr> {
        let mut expr = self.bitwise_or()?;
        while self.match_token(&TokenKind::And) {
            let span = self.previous().span;
            let right = self.bitwise_or()?;
            expr = Expr::new(
                ExprKind::Logical {
                    left: Box::new(expr),
                    op: LogicalOp::And,
                    right: Box::new(right),
                },
                span,
            );
        }
        Ok(expr)
    }

    fn bitwise_or(&mut self) -> ParseResult<Expr> {
        let mut expr = self.bitwise_xor()?;
        while self.match_token(&TokenKind::Pipe) {
            let span = self.previous().span;
            let right = self.bitwise_xor()?;
            expr = Expr::new(
                ExprKind::Bitwise {
                    left: Box::new(expr),
                    op: BitwiseOp::Or,
                    right: Box::new(right),
                },
                span,
            );
        }
        Ok(expr)
    }

    fn bitwise_xor(&mut self) -> ParseResult<Expr> {
        let mut expr = self.bitwise_and()?;
        while self.match_token(&TokenKind::Caret) {
            let span = self.previous().span;
            let right = self.bitwise_and()?;
            expr = Expr::new(
                ExprKind::Bitwise {
                    left: Box::new(expr),
                    op: BitwiseOp::Xor,
                    right: Box::new(right),
                },
                span,
            );
        }
        Ok(expr)
    }

    fn bitwise_and(&mut self) -> ParseResult<Expr> {
        let mut expr = self.equality()?;
        while self.match_token(&TokenKind::Ampersand) {
            let span = self.previous().span;
            let right = self.equality()?;
            expr = Expr::new(
                ExprKind::Bitwise {
                    left: Box::new(expr),
                    op: BitwiseOp::And,
                    right: Box::new(right),
                },
                span,
            );
        }
        Ok(expr)
    }

    fn equality(&mut self) -> ParseResult<Expr> {
        let mut expr = self.comparison()?;
        loop {
            let op = if self.match_token(&TokenKind::EqualEqual) {
                MathOp::Equal
            } else if self.match_token(&TokenKind::BangEqual) {
                MathOp::NotEqual
            } else {
                break;
            };
            let span = self.previous().span;
            let right = self.comparison()?;
            expr = Expr::new(
                ExprKind::Math {
                    left: Box::new(expr),
                    op,
                    right: Box::new(right),
                },
                span,
            );
        }
        Ok(expr)
    }

    fn comparison(&mut self) -> ParseResult<Expr> {
        let mut expr = self.shift()?;
        loop {
            let op = if self.match_token(&TokenKind::Less) {
                MathOp::Less
            } else if self.match_token(&TokenKind::LessEqual) {
                MathOp::LessEqual
            } else if self.match_token(&TokenKind::Greater) {
                MathOp::Greater
            } else if self.match_token(&TokenKind::GreaterEqual) {
                MathOp::GreaterEqual
            } else {
                break;
            };
            let span = self.previous().span;
            let right = self.shift()?;
            expr = Expr::new(
                ExprKind::Math {
                    left: Box::new(expr),
                    op,
                    right: Box::new(right),
                },
                span,
            );
        }
        Ok(expr)
    }

    fn shift(&mut self) -> ParseResult<Expr> {
        let mut expr = self.range()?;
        loop {
            let op = if self.match_token(&TokenKind::LessLess) {
                ShiftOp::Left
            } else if self.match_token(&TokenKind::GreaterGreater) {
                ShiftOp::Right
            } else {
                break;
            };
            let span = self.previous().span;
            let right = self.range()?;
            expr = Expr::new(
                ExprKind::Shift {
                    left: Box::new(expr),
                    op,
                    right: Box::new(right),
                },
                span,
            );
        }
        Ok(expr)
    }

    fn range(&mut self) -> ParseResult<Expr> {
        let expr = self.term()?;
        if self.match_token(&TokenKind::DotDot) {
            let span = self.previous().span;
            let end = self.term()?;
            return Ok(Expr::new(
                ExprKind::Range {
                    start: Box::new(expr),
                    end: Box::new(end),
                },
                span,
            ));
        }
        Ok(expr)
    }

    fn term(&mut self) -> ParseResult<Expr> {
        let mut expr = self.factor()?;
        loop {
            let op = if self.match_token(&TokenKind::Plus) {
                MathOp::Add
            } else if self.match_token(&TokenKind::Minus) {
                MathOp::Subtract
            } else {
                break;
            };
            let span = self.previous().span;
            let right = self.factor()?;
            expr = Expr::new(
                ExprKind::Math {
                    left: Box::new(expr),
                    op,
                    right: Box::new(right),
                },
                span,
            );
        }
        Ok(expr)
    }

    fn factor(&mut self) -> ParseResult<Expr> {
        let mut expr = self.unary()?;
        loop {
            let op = if self.match_token(&TokenKind::Star) {
                MathOp::Multiply
            } else if self.match_token(&TokenKind::Slash) {
                MathOp::Divide
            } else if self.match_token(&TokenKind::Percent) {
                MathOp::Modulo
            } else {
                break;
            };
            let span = self.previous().span;
            let right = self.unary()?;
            expr = Expr::new(
                ExprKind::Math {
                    left: Box::new(expr),
                    op,
                    right: Box::new(right),
                },
                span,
            );
        }
        Ok(expr)
    }

    fn unary(&mut self) -> ParseResult<Expr> {
        if self.match_token(&TokenKind::Minus) {
            let span = self.previous().span;
            let right = Box::new(self.unary()?);
            return Ok(Expr::new(
                ExprKind::Prefix {
                    op: PrefixOp::Negate,
                    right,
                },
                span,
            ));
        }
        if self.match_token(&TokenKind::Bang) {
            let span = self.previous().span;
            let right = Box::new(self.unary()?);
            return Ok(Expr::new(
                ExprKind::Prefix {
                    op: PrefixOp::Not,
                    right,
                },
                span,
            ));
        }
        self.postfix()
    }

    fn postfix(&mut self) -> ParseResult<Expr> {
        let expr = self.call()?;
        if self.match_token(&TokenKind::PlusPlus) {
            let span = self.previous().span;
            return Ok(Expr::new(
                ExprKind::Postfix {
                    target: Box::new(expr),
                    op: PostfixOp::Increment,
                },
                span,
            ));
        }
        if self.match_token(&TokenKind::MinusMinus) {
            let span = self.previous().span;
            return Ok(Expr::new(
                ExprKind::Postfix {
                    target: Box::new(expr),
                    op: PostfixOp::Decrement,
                },
                span,
            ));
        }
        Ok(expr)
    }

    fn call(&mut self) -> ParseResult<Expr> {
        let mut expr = self.primary()?;
        loop {
            if self.match_token(&TokenKind::LeftParen) {
                let span = self.previous().span;
                let mut arguments = Vec::new();
                if !self.check(&TokenKind::RightParen) {
                    loop {
                        arguments.push(self.expression()?);
                        if !self.match_token(&TokenKind::Comma) {
                            break;
                        }
                    }
                }
                self.expect(&TokenKind::RightParen)?;
                if arguments.len() > u8::MAX as usize {
                    return Err(ParserError::general(
                        "Cannot have more than 255 arguments",
                        span,
                    ));
                }
                expr = Expr::new(
                    ExprKind::Call {
                        callee: Box::new(expr),
                        arguments,
                    },
                    span,
                );
            } else if self.match_token(&TokenKind::Dot) {
                let span = self.previous().span;
                let name = self.expect_identifier()?;
                expr = Expr::new(
                    ExprKind::Get {
                        object: Box::new(expr),
                        name,
                    },
                    span,
                );
            } else if self.match_token(&TokenKind::LeftBracket) {
                let span = self.previous().span;
                let index = self.expression()?;
                self.expect(&TokenKind::RightBracket)?;
                expr = Expr::new(
                    ExprKind::Index {
                        object: Box::new(expr),
                        index: Box::new(index),
                    },
                    span,
                );
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn primary(&mut self) -> ParseResult<Expr> {
        let span = self.current_span();

        match self.peek().kind.clone() {
            TokenKind::Number(n) => {
                self.advance();
                Ok(Expr::new(ExprKind::Number(n), span))
            }
            TokenKind::Str(s) => {
                self.advance();
                Ok(Expr::new(ExprKind::Str(s), span))
            }
            TokenKind::True => {
                self.advance();
                Ok(Expr::new(ExprKind::Bool(true), span))
            }
            TokenKind::False => {
                self.advance();
                Ok(Expr::new(ExprKind::Bool(false), span))
            }
            TokenKind::Null => {
                self.advance();
                Ok(Expr::new(ExprKind::Null, span))
            }
            TokenKind::This => {
                self.advance();
                Ok(Expr::new(ExprKind::This, span))
            }
            TokenKind::Identifier(_) => {
                let name = self.expect_qualified_name()?;
                Ok(Expr::new(ExprKind::Variable(name), span))
            }
            TokenKind::LeftParen => {
                self.advance();
                let inner = self.expression()?;
                self.expect(&TokenKind::RightParen)?;
                Ok(Expr::new(ExprKind::Grouping(Box::new(inner)), span))
            }
            TokenKind::LeftBracket => {
                self.advance();
                let mut elements = Vec::new();
                if !self.check(&TokenKind::RightBracket) {
                    loop {
                        elements.push(self.expression()?);
                        if !self.match_token(&TokenKind::Comma) {
                            break;
                        }
                    }
                }
                self.expect(&TokenKind::RightBracket)?;
                Ok(Expr::new(ExprKind::List(elements), span))
            }
            TokenKind::LeftBrace => {
                self.advance();
                let mut items = Vec::new();
                if !self.check(&TokenKind::RightBrace) {
                    loop {
                        let key = self.expression()?;
                        self.expect(&TokenKind::Colon)?;
                        let value = self.expression()?;
                        items.push((key, value));
                        if !self.match_token(&TokenKind::Comma) {
                            break;
                        }
                    }
                }
                self.expect(&TokenKind::RightBrace)?;
                Ok(Expr::new(ExprKind::MapLiteral(items), span))
            }
            other => Err(ParserError::unexpected_token(
                "expression",
                format!("{}", other),
                span,
            )),
        }
    }
}
