//! Turns source text into a lazy stream of [`Token`]s.
//!
//! The lexer never fails. Characters it does not understand become [`TokenKind::Illegal`]
//! tokens, and the parser rejects them with a proper position.

use crate::stitch::Stitch;
use derive_more::Display;
use once_cell::sync::Lazy;
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Stitch(Stitch),
    Rep,
    Use,
    If,
    Else,
    End,
    Subpattern,
    /// any word that is neither a keyword nor a stitch, i.e. a group name
    Ident,
    Int,
    LParen,
    RParen,
    Semicolon,
    Star,
    Equals,
    Eof,
    Illegal,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use TokenKind::*;
        match self {
            TokenKind::Stitch(s) => write!(f, "`{}`", s),
            Rep => write!(f, "`rep`"),
            Use => write!(f, "`use`"),
            If => write!(f, "`if`"),
            Else => write!(f, "`else`"),
            End => write!(f, "`end`"),
            Subpattern => write!(f, "`subpattern`"),
            Ident => write!(f, "name"),
            Int => write!(f, "integer"),
            LParen => write!(f, "`(`"),
            RParen => write!(f, "`)`"),
            Semicolon => write!(f, "`;`"),
            Star => write!(f, "`*`"),
            Equals => write!(f, "`=`"),
            Eof => write!(f, "end of input"),
            Illegal => write!(f, "illegal character"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Display)]
#[display(fmt = "{}:{}\t{:?}\t{:?}", line, column, kind, text)]
pub struct Token {
    pub kind: TokenKind,
    /// the raw lexeme, exactly as written
    pub text: String,
    pub line: usize,
    pub column: usize,
}

impl Token {
    pub fn new(kind: TokenKind, text: impl Into<String>, line: usize, column: usize) -> Self {
        Token {
            kind,
            text: text.into(),
            line,
            column,
        }
    }

    pub fn is(&self, kind: TokenKind) -> bool {
        self.kind == kind
    }

    /// true if this is a plain identifier spelling `word`, ignoring case
    pub fn is_word(&self, word: &str) -> bool {
        self.kind == TokenKind::Ident && self.text.eq_ignore_ascii_case(word)
    }
}

static KEYWORDS: Lazy<HashMap<&'static str, TokenKind>> = Lazy::new(|| {
    HashMap::from([
        ("rep", TokenKind::Rep),
        ("use", TokenKind::Use),
        ("if", TokenKind::If),
        ("else", TokenKind::Else),
        ("end", TokenKind::End),
        ("subpattern", TokenKind::Subpattern),
        ("pattern", TokenKind::Subpattern),
    ])
});

fn lookup_word(word: &str) -> TokenKind {
    let lower = word.to_ascii_lowercase();
    if let Some(kind) = KEYWORDS.get(lower.as_str()) {
        return *kind;
    }
    Stitch::from_str(&lower)
        .map(TokenKind::Stitch)
        .unwrap_or(TokenKind::Ident)
}

/// Cleans up raw source before tokenizing.
///
/// Strips a leading byte order mark, turns non-breaking spaces into spaces, cuts `#` comments
/// and blanks out leading `Row N:` / `Round N:` labels. Labels are replaced by spaces rather
/// than removed, so columns of the remaining text stay the same.
pub fn normalize(source: &str) -> String {
    let source = source.strip_prefix('\u{feff}').unwrap_or(source);
    let source = source.replace('\u{a0}', " ");
    let mut out = String::with_capacity(source.len());
    for (i, line) in source.split('\n').enumerate() {
        if i > 0 {
            out.push('\n');
        }
        let line = match line.find('#') {
            Some(idx) => &line[..idx],
            None => line,
        };
        out.push_str(&blank_row_label(line));
    }
    out
}

fn blank_row_label(line: &str) -> Cow<str> {
    match row_label_len(line) {
        Some(len) => {
            let blanks = " ".repeat(line[..len].chars().count());
            Cow::Owned(blanks + &line[len..])
        }
        None => Cow::Borrowed(line),
    }
}

/// Byte length of a leading `Row N:` / `Round N:` label, including the whitespace around it.
pub(crate) fn row_label_len(line: &str) -> Option<usize> {
    let at_word = skip_while(line, 0, char::is_whitespace);
    let after_word = skip_while(line, at_word, |c| c.is_ascii_alphabetic());
    let word = &line[at_word..after_word];
    if !word.eq_ignore_ascii_case("row") && !word.eq_ignore_ascii_case("round") {
        return None;
    }
    let at_number = skip_while(line, after_word, char::is_whitespace);
    let after_number = skip_while(line, at_number, |c| c.is_ascii_digit());
    if at_number == after_word || after_number == at_number {
        return None;
    }
    let at_colon = skip_while(line, after_number, char::is_whitespace);
    if !line[at_colon..].starts_with(':') {
        return None;
    }
    Some(skip_while(line, at_colon + 1, char::is_whitespace))
}

fn skip_while(s: &str, from: usize, pred: impl Fn(char) -> bool) -> usize {
    s[from..]
        .char_indices()
        .find(|(_, c)| !pred(*c))
        .map_or(s.len(), |(i, _)| from + i)
}

pub struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
    /// set once the iterator handed out the end token
    exhausted: bool,
}

impl Lexer {
    pub fn new(source: &str) -> Self {
        Lexer {
            chars: normalize(source).chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
            exhausted: false,
        }
    }

    /// Returns the next token. Once the input is used up, every call returns an `Eof` token.
    pub fn next_token(&mut self) -> Token {
        self.skip_trivia();
        let (line, column) = (self.line, self.column);
        let token = match self.current() {
            None => Token::new(TokenKind::Eof, "", line, column),
            Some(_) if self.at_slip_stitch() => {
                let text: String = (0..5).filter_map(|_| self.bump()).collect();
                Token::new(TokenKind::Stitch(Stitch::Slst), text, line, column)
            }
            Some(ch) if ch.is_ascii_alphabetic() => {
                let word = self.take_while(|c| c.is_ascii_alphabetic());
                Token::new(lookup_word(&word), word, line, column)
            }
            Some(ch) if ch.is_ascii_digit() => {
                let digits = self.take_while(|c| c.is_ascii_digit());
                Token::new(TokenKind::Int, digits, line, column)
            }
            Some(ch) => {
                self.bump();
                let kind = match ch {
                    '(' => TokenKind::LParen,
                    ')' => TokenKind::RParen,
                    ';' => TokenKind::Semicolon,
                    '*' => TokenKind::Star,
                    '=' => TokenKind::Equals,
                    '>' => TokenKind::Stitch(Stitch::Greater),
                    '<' => TokenKind::Stitch(Stitch::Less),
                    _ => TokenKind::Illegal,
                };
                Token::new(kind, ch.to_string(), line, column)
            }
        };
        log::trace!("token {}", token);
        token
    }

    fn current(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.current()?;
        self.pos += 1;
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(ch)
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> String {
        let mut text = String::new();
        while let Some(ch) = self.current().filter(|c| pred(*c)) {
            text.push(ch);
            self.bump();
        }
        text
    }

    /// whitespace, commas and `#` comments carry no meaning
    fn skip_trivia(&mut self) {
        while let Some(ch) = self.current() {
            if ch.is_whitespace() || ch == ',' {
                self.bump();
            } else if ch == '#' {
                while !matches!(self.current(), None | Some('\n')) {
                    self.bump();
                }
            } else {
                break;
            }
        }
    }

    /// `sl st`, written as two words, is the slip stitch
    fn at_slip_stitch(&self) -> bool {
        let Some(window) = self.chars.get(self.pos..self.pos + 5) else {
            return false;
        };
        let window: String = window.iter().collect();
        let followed_by_letter = self
            .chars
            .get(self.pos + 5)
            .map_or(false, |c| c.is_ascii_alphabetic());
        window.eq_ignore_ascii_case("sl st") && !followed_by_letter
    }
}

/// Yields every token up to and including the first `Eof`, then stops.
impl Iterator for Lexer {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        if self.exhausted {
            return None;
        }
        let token = self.next_token();
        if token.is(TokenKind::Eof) {
            self.exhausted = true;
        }
        Some(token)
    }
}
