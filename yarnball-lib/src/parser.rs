//! Recursive descent parser with two tokens of lookahead.
//!
//! Every `parse_*` function starts with `cur` on the first token of its construct and returns
//! with `cur` on the first token after it. Names of groups are not resolved here, that only
//! happens when the program runs.

use crate::ast::*;
use crate::lexer::{Lexer, Token, TokenKind};
use std::mem;
use thiserror::Error;

/// how many blocks may be open at once
pub const MAX_NESTING: usize = 256;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("line {line}, column {column}: expected {expected}, found `{found}`")]
    UnexpectedToken {
        expected: String,
        found: String,
        line: usize,
        column: usize,
    },

    #[error("line {line}: unexpected end of input, expected {expected}")]
    UnexpectedEof { expected: String, line: usize },

    #[error("line {line}, column {column}: illegal character `{found}`")]
    IllegalCharacter {
        found: String,
        line: usize,
        column: usize,
    },

    #[error("line {line}, column {column}: {literal} does not fit into a 64 bit integer")]
    InvalidInteger {
        literal: String,
        line: usize,
        column: usize,
    },

    #[error("line {line}, column {column}: blocks nested more than {} deep", MAX_NESTING)]
    NestingTooDeep { line: usize, column: usize },
}

impl ParseError {
    pub fn line(&self) -> usize {
        match self {
            ParseError::UnexpectedToken { line, .. }
            | ParseError::UnexpectedEof { line, .. }
            | ParseError::IllegalCharacter { line, .. }
            | ParseError::InvalidInteger { line, .. }
            | ParseError::NestingTooDeep { line, .. } => *line,
        }
    }

    /// true if more input could have made the source valid
    pub fn is_eof(&self) -> bool {
        matches!(self, ParseError::UnexpectedEof { .. })
    }
}

pub type ParseResult<T> = Result<T, ParseError>;

/// lexes and parses a complete source text
pub fn parse(src: &str) -> ParseResult<Program> {
    let res = Parser::new(Lexer::new(src)).parse_program();
    match &res {
        Ok(program) => log::debug!("parsed {} top level instructions", program.len()),
        Err(e) => log::debug!("parsing failed: {}", e),
    }
    res
}

pub struct Parser<I: Iterator<Item = Token>> {
    tokens: I,
    cur: Token,
    peek: Token,
    /// number of blocks currently open
    depth: usize,
}

impl<I: Iterator<Item = Token>> Parser<I> {
    pub fn new(mut tokens: I) -> Self {
        let cur = tokens
            .next()
            .unwrap_or_else(|| Token::new(TokenKind::Eof, "", 1, 1));
        let peek = tokens
            .next()
            .unwrap_or_else(|| Token::new(TokenKind::Eof, "", cur.line, cur.column));
        Parser {
            tokens,
            cur,
            peek,
            depth: 0,
        }
    }

    pub fn parse_program(mut self) -> ParseResult<Program> {
        let mut instructions = vec![];
        while !self.cur.is(TokenKind::Eof) {
            instructions.push(self.parse_instruction()?);
        }
        Ok(Program(instructions))
    }

    /// moves one token ahead and returns the token that was consumed
    fn advance(&mut self) -> Token {
        let next = self.tokens.next().unwrap_or_else(|| {
            Token::new(TokenKind::Eof, "", self.peek.line, self.peek.column)
        });
        let new_cur = mem::replace(&mut self.peek, next);
        mem::replace(&mut self.cur, new_cur)
    }

    fn parse_instruction(&mut self) -> ParseResult<Instruction> {
        use TokenKind::*;
        match self.cur.kind {
            Stitch(stitch) if stitch.takes_operand() => self.parse_chain(),
            Stitch(stitch) => {
                let tok = self.advance();
                Ok(Primitive::new(stitch, tok.line).into())
            }
            Ident => {
                let tok = self.advance();
                Ok(GroupUse {
                    name: tok.text,
                    args: vec![],
                    line: tok.line,
                }
                .into())
            }
            Use => self.parse_use(),
            Subpattern => self.parse_group_def(),
            Star => self.parse_repeat(),
            If => self.parse_conditional(),
            _ => Err(unexpected(&self.cur, "a stitch, a block or a subpattern name")),
        }
    }

    /// `ch N`
    fn parse_chain(&mut self) -> ParseResult<Instruction> {
        let TokenKind::Stitch(stitch) = self.cur.kind else {
            return Err(unexpected(&self.cur, "a stitch"));
        };
        if !self.peek.is(TokenKind::Int) {
            let expected = format!("an integer after `{}`", self.cur.text);
            return Err(unexpected(&self.peek, expected));
        }
        let tok = self.advance();
        let operand = self.parse_int()?;
        Ok(Primitive {
            stitch,
            operand: Some(operand),
            line: tok.line,
        }
        .into())
    }

    /// `use name` optionally followed by `(arg arg ...)`
    fn parse_use(&mut self) -> ParseResult<Instruction> {
        let start = self.advance();
        let name = self.expect(TokenKind::Ident, "a subpattern name after `use`")?;
        let mut args = vec![];
        if self.cur.is(TokenKind::LParen) {
            let open = self.advance();
            loop {
                match self.cur.kind {
                    TokenKind::RParen => {
                        self.advance();
                        break;
                    }
                    TokenKind::Int => args.push(Argument::Int(self.parse_int()?)),
                    TokenKind::Ident => args.push(Argument::Name(self.advance().text)),
                    _ => {
                        let expected = format!(
                            "an argument or `)` to close the list opened on line {}",
                            open.line
                        );
                        return Err(unexpected(&self.cur, expected));
                    }
                }
            }
        }
        Ok(GroupUse {
            name: name.text,
            args,
            line: start.line,
        }
        .into())
    }

    /// `subpattern name [(params)] = ( body )`
    fn parse_group_def(&mut self) -> ParseResult<Instruction> {
        let start = self.advance();
        let name = self.expect(TokenKind::Ident, "a subpattern name")?;
        let mut params = vec![];
        if self.cur.is(TokenKind::LParen) {
            self.advance();
            while !self.cur.is(TokenKind::RParen) {
                params.push(self.expect(TokenKind::Ident, "a parameter name or `)`")?.text);
            }
            self.advance();
        }
        self.expect(TokenKind::Equals, "`=` after the subpattern name")?;
        let open = self.expect(TokenKind::LParen, "`(` to start the subpattern body")?;
        let body = self.parse_block(&[TokenKind::RParen], || {
            format!(
                "`)` to close subpattern `{}` opened on line {}",
                name.text, open.line
            )
        })?;
        self.advance();
        Ok(GroupDef {
            name: name.text,
            params,
            body,
            line: start.line,
        }
        .into())
    }

    /// `* body ; rep from * [count] [times]`
    fn parse_repeat(&mut self) -> ParseResult<Instruction> {
        let start = self.advance();
        let body = self.parse_block(&[TokenKind::Semicolon], || {
            format!("`;` to close the repeat opened on line {}", start.line)
        })?;
        self.advance();
        self.expect(TokenKind::Rep, "`rep` after `;`")?;
        self.expect_word("from")?;
        self.expect(TokenKind::Star, "`*` after `rep from`")?;
        let count = if self.cur.is(TokenKind::Int) {
            Some(self.parse_int()?)
        } else {
            None
        };
        if self.cur.is_word("times") {
            self.advance();
        }
        Ok(Repeat {
            count,
            body,
            line: start.line,
        }
        .into())
    }

    /// `if then_body [else else_body] end`
    fn parse_conditional(&mut self) -> ParseResult<Instruction> {
        let start = self.advance();
        let closing = || format!("`end` to close the `if` opened on line {}", start.line);
        let then_body = self.parse_block(&[TokenKind::Else, TokenKind::End], closing)?;
        let else_body = if self.cur.is(TokenKind::Else) {
            self.advance();
            self.parse_block(&[TokenKind::End], closing)?
        } else {
            vec![]
        };
        self.advance();
        Ok(Conditional {
            then_body,
            else_body,
            line: start.line,
        }
        .into())
    }

    /// parses instructions until `cur` is one of `terminators`, which is left unconsumed
    fn parse_block(
        &mut self,
        terminators: &[TokenKind],
        expected: impl Fn() -> String,
    ) -> ParseResult<Vec<Instruction>> {
        if self.depth >= MAX_NESTING {
            return Err(ParseError::NestingTooDeep {
                line: self.cur.line,
                column: self.cur.column,
            });
        }
        self.depth += 1;
        let mut body = vec![];
        let res = loop {
            if terminators.contains(&self.cur.kind) {
                break Ok(body);
            }
            if self.cur.is(TokenKind::Eof) {
                break Err(unexpected(&self.cur, expected()));
            }
            match self.parse_instruction() {
                Ok(instruction) => body.push(instruction),
                Err(e) => break Err(e),
            }
        };
        self.depth -= 1;
        res
    }

    fn parse_int(&mut self) -> ParseResult<i64> {
        let tok = self.expect(TokenKind::Int, "an integer")?;
        tok.text.parse().map_err(|_| ParseError::InvalidInteger {
            literal: tok.text.clone(),
            line: tok.line,
            column: tok.column,
        })
    }

    fn expect(&mut self, kind: TokenKind, expected: &str) -> ParseResult<Token> {
        if self.cur.is(kind) {
            Ok(self.advance())
        } else {
            Err(unexpected(&self.cur, expected))
        }
    }

    fn expect_word(&mut self, word: &str) -> ParseResult<Token> {
        if self.cur.is_word(word) {
            Ok(self.advance())
        } else {
            Err(unexpected(&self.cur, format!("`{}`", word)))
        }
    }
}

fn unexpected(tok: &Token, expected: impl Into<String>) -> ParseError {
    match tok.kind {
        TokenKind::Eof => ParseError::UnexpectedEof {
            expected: expected.into(),
            line: tok.line,
        },
        TokenKind::Illegal => ParseError::IllegalCharacter {
            found: tok.text.clone(),
            line: tok.line,
            column: tok.column,
        },
        _ => ParseError::UnexpectedToken {
            expected: expected.into(),
            found: tok.text.clone(),
            line: tok.line,
            column: tok.column,
        },
    }
}
