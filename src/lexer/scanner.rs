//! Lexer for Ry source code.

use crate::error::LexerError;
use crate::lexer::token::{Token, TokenKind};
use crate::span::Span;

/// The scanner transforms source text into a stream of tokens.
///
/// String interpolation is resolved here: `"x = ${a}!"` is emitted as
/// `"x = " + a + "!"` so the parser never sees interpolation at all.
pub struct Scanner<'a> {
    source: &'a [u8],
    current: usize,
    line: usize,
    column: usize,
    token_line: usize,
    token_column: usize,
    tokens: Vec<Token>,
}

impl<'a> Scanner<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source: source.as_bytes(),
            current: 0,
            line: 1,
            column: 1,
            token_line: 1,
            token_column: 1,
            tokens: Vec::new(),
        }
    }

    pub fn scan_tokens(mut self) -> Result<Vec<Token>, LexerError> {
        while !self.is_at_end() {
            self.token_line = self.line;
            self.token_column = self.column;
            self.scan_token()?;
        }
        self.token_line = self.line;
        self.token_column = self.column;
        self.push(TokenKind::Eof);
        Ok(self.tokens)
    }

    fn scan_token(&mut self) -> Result<(), LexerError> {
        let c = self.advance();
        match c {
            b'#' => {
                while self.peek() != Some(b'\n') && !self.is_at_end() {
                    self.advance();
                }
            }
            b'+' => {
                if self.match_char(b'+') {
                    self.push(TokenKind::PlusPlus);
                } else {
                    self.push(TokenKind::Plus);
                }
            }
            b'-' => {
                if self.match_char(b'>') {
                    self.push(TokenKind::Arrow);
                } else if self.match_char(b'-') {
                    self.push(TokenKind::MinusMinus);
                } else {
                    self.push(TokenKind::Minus);
                }
            }
            b'*' => self.push(TokenKind::Star),
            b'/' => self.push(TokenKind::Slash),
            b'%' => self.push(TokenKind::Percent),
            b'=' => {
                if self.match_char(b'=') {
                    self.push(TokenKind::EqualEqual);
                } else {
                    self.push(TokenKind::Equal);
                }
            }
            b'!' => {
                if self.match_char(b'=') {
                    self.push(TokenKind::BangEqual);
                } else {
                    self.push(TokenKind::Bang);
                }
            }
            b'<' => {
                if self.match_char(b'<') {
                    self.push(TokenKind::LessLess);
                } else if self.match_char(b'=') {
                    self.push(TokenKind::LessEqual);
                } else {
                    self.push(TokenKind::Less);
                }
            }
            b'>' => {
                if self.match_char(b'>') {
                    self.push(TokenKind::GreaterGreater);
                } else if self.match_char(b'=') {
                    self.push(TokenKind::GreaterEqual);
                } else {
                    self.push(TokenKind::Greater);
                }
            }
            b'(' => self.push(TokenKind::LeftParen),
            b')' => self.push(TokenKind::RightParen),
            b'{' => self.push(TokenKind::LeftBrace),
            b'}' => self.push(TokenKind::RightBrace),
            b'[' => self.push(TokenKind::LeftBracket),
            b']' => self.push(TokenKind::RightBracket),
            b',' => self.push(TokenKind::Comma),
            b';' => self.push(TokenKind::Semicolon),
            b'&' => self.push(TokenKind::Ampersand),
            b'^' => self.push(TokenKind::Caret),
            b'|' => self.push(TokenKind::Pipe),
            b'~' => self.push(TokenKind::Tilde),
            b':' => {
                if self.match_char(b':') {
                    self.push(TokenKind::DoubleColon);
                } else {
                    self.push(TokenKind::Colon);
                }
            }
            b'.' => {
                if self.match_char(b'.') {
                    self.push(TokenKind::DotDot);
                } else {
                    self.push(TokenKind::Dot);
                }
            }
            b'"' => self.string()?,
            b' ' | b'\t' | b'\r' | b'\n' => {}
            _ => {
                if c.is_ascii_digit() {
                    self.number(c);
                } else if c.is_ascii_alphabetic() || c == b'_' {
                    self.identifier(c);
                } else {
                    return Err(LexerError::UnexpectedChar(
                        c as char,
                        Span::new(self.token_line, self.token_column),
                    ));
                }
            }
        }
        Ok(())
    }

    fn number(&mut self, first: u8) {
        let mut text = String::new();
        text.push(first as char);
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                text.push(self.advance() as char);
            } else {
                break;
            }
        }
        // A dot only continues the number when a digit follows, so `1..4`
        // stays a range and `xs.len` after a number stays a property chain.
        if self.peek() == Some(b'.') && self.peek_next().is_some_and(|c| c.is_ascii_digit()) {
            text.push(self.advance() as char);
            while let Some(c) = self.peek() {
                if c.is_ascii_digit() {
                    text.push(self.advance() as char);
                } else {
                    break;
                }
            }
        }
        let value: f64 = text.parse().unwrap_or(0.0);
        self.push(TokenKind::Number(value));
    }

    fn identifier(&mut self, first: u8) {
        let mut text = String::new();
        text.push(first as char);
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == b'_' {
                text.push(self.advance() as char);
            } else {
                break;
            }
        }
        match TokenKind::keyword(&text) {
            Some(kind) => self.push(kind),
            None => self.push(TokenKind::Identifier(text)),
        }
    }

    fn string(&mut self) -> Result<(), LexerError> {
        let mut value = String::new();

        while self.peek() != Some(b'"') && !self.is_at_end() {
            if self.peek() == Some(b'\\') {
                self.advance();
                if self.is_at_end() {
                    return Err(LexerError::UnterminatedString(Span::new(
                        self.line,
                        self.column,
                    )));
                }
                let escaped = self.advance();
                match escaped {
                    b'n' => value.push('\n'),
                    b't' => value.push('\t'),
                    b'r' => value.push('\r'),
                    b'"' => value.push('"'),
                    b'\\' => value.push('\\'),
                    b'$' => value.push('$'),
                    // Unknown escapes keep the character literally.
                    other => value.push(other as char),
                }
            } else if self.peek() == Some(b'$') && self.peek_next() == Some(b'{') {
                // Interpolation: flush the segment so far, then splice in the
                // variable joined by `+` tokens.
                if !value.is_empty() {
                    self.push(TokenKind::Str(std::mem::take(&mut value)));
                    self.push(TokenKind::Plus);
                }

                self.advance(); // $
                self.advance(); // {
                let mut name = String::new();
                while self.peek() != Some(b'}') && !self.is_at_end() {
                    name.push(self.advance() as char);
                }
                if self.is_at_end() {
                    return Err(LexerError::UnterminatedInterpolation(Span::new(
                        self.line,
                        self.column,
                    )));
                }
                self.advance(); // }

                self.push(TokenKind::Identifier(name));
                self.push(TokenKind::Plus);
                self.token_line = self.line;
                self.token_column = self.column;
            } else {
                value.push(self.advance() as char);
            }
        }

        if self.is_at_end() {
            return Err(LexerError::UnterminatedString(Span::new(
                self.line,
                self.column,
            )));
        }

        self.advance(); // closing "
        self.push(TokenKind::Str(value));
        Ok(())
    }

    // --- Cursor helpers ---

    fn is_at_end(&self) -> bool {
        self.current >= self.source.len()
    }

    fn advance(&mut self) -> u8 {
        let c = self.source[self.current];
        self.current += 1;
        if c == b'\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        c
    }

    fn peek(&self) -> Option<u8> {
        self.source.get(self.current).copied()
    }

    fn peek_next(&self) -> Option<u8> {
        self.source.get(self.current + 1).copied()
    }

    fn match_char(&mut self, expected: u8) -> bool {
        if self.peek() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn push(&mut self, kind: TokenKind) {
        self.tokens.push(Token::new(
            kind,
            Span::new(self.token_line, self.token_column),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        Scanner::new(source)
            .scan_tokens()
            .expect("lexer error")
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn scans_operators_and_keywords() {
        assert_eq!(
            kinds("var x = 1 + 2"),
            vec![
                TokenKind::Var,
                TokenKind::Identifier("x".into()),
                TokenKind::Equal,
                TokenKind::Number(1.0),
                TokenKind::Plus,
                TokenKind::Number(2.0),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn ranges_do_not_eat_number_dots() {
        assert_eq!(
            kinds("1..4"),
            vec![
                TokenKind::Number(1.0),
                TokenKind::DotDot,
                TokenKind::Number(4.0),
                TokenKind::Eof,
            ]
        );
        assert_eq!(
            kinds("1.5"),
            vec![TokenKind::Number(1.5), TokenKind::Eof]
        );
    }

    #[test]
    fn postfix_and_shift_operators() {
        assert_eq!(
            kinds("i++ 1 << 2"),
            vec![
                TokenKind::Identifier("i".into()),
                TokenKind::PlusPlus,
                TokenKind::Number(1.0),
                TokenKind::LessLess,
                TokenKind::Number(2.0),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn interpolation_desugars_to_concatenation() {
        assert_eq!(
            kinds("\"x = ${a}!\""),
            vec![
                TokenKind::Str("x = ".into()),
                TokenKind::Plus,
                TokenKind::Identifier("a".into()),
                TokenKind::Plus,
                TokenKind::Str("!".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn comments_are_skipped() {
        assert_eq!(
            kinds("1 # the rest\n2"),
            vec![TokenKind::Number(1.0), TokenKind::Number(2.0), TokenKind::Eof]
        );
    }

    #[test]
    fn string_escapes() {
        assert_eq!(
            kinds(r#""a\n\"b\"""#),
            vec![TokenKind::Str("a\n\"b\"".into()), TokenKind::Eof]
        );
    }
}
