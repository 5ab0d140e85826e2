//! Byte-level tokenizer for mapping text
//!
//! Produces zero-copy tokens borrowing from the input. Whitespace, newlines
//! and `#` comments are skipped, so statements are separated purely by the
//! grammar.

use once_cell::sync::Lazy;
use rustc_hash::FxHashMap;

use super::error::{ParseError, ParseResult};
use super::span::Spanned;

/// A lexical token
#[derive(Debug, Clone, PartialEq)]
pub enum Token<'input> {
    /// Integer literal
    Integer(i64),
    /// Floating point literal
    Float(f64),
    /// Quoted string literal, escapes not yet processed
    String(&'input str),
    /// Triple quoted string literal, taken verbatim
    RawString(&'input str),
    /// Identifier
    Identifier(&'input str),

    /// `true`
    True,
    /// `false`
    False,
    /// `null`
    Null,
    /// `this`
    This,
    /// `if`
    If,
    /// `else`
    Else,

    /// `+`
    Plus,
    /// `-`
    Minus,
    /// `*`
    Star,
    /// `/`
    Slash,
    /// `%`
    Percent,
    /// `==`
    EqualEqual,
    /// `!=`
    NotEqual,
    /// `<`
    LessThan,
    /// `<=`
    LessThanOrEqual,
    /// `>`
    GreaterThan,
    /// `>=`
    GreaterThanOrEqual,
    /// `&&`
    AndAnd,
    /// `||`
    OrOr,
    /// `!`
    Bang,
    /// `|`
    Pipe,
    /// `=`
    Assign,

    /// `(`
    LeftParen,
    /// `)`
    RightParen,
    /// `[`
    LeftBracket,
    /// `]`
    RightBracket,
    /// `{`
    LeftBrace,
    /// `}`
    RightBrace,
    /// `.`
    Dot,
    /// `,`
    Comma,
    /// `:`
    Colon,
    /// `$`
    Dollar,
}

impl Token<'_> {
    /// Source-like rendering used in error messages
    pub fn describe(&self) -> String {
        match self {
            Token::Integer(i) => i.to_string(),
            Token::Float(f) => f.to_string(),
            Token::String(s) => format!("\"{s}\""),
            Token::RawString(s) => format!("\"\"\"{s}\"\"\""),
            Token::Identifier(s) => s.to_string(),
            Token::True => "true".into(),
            Token::False => "false".into(),
            Token::Null => "null".into(),
            Token::This => "this".into(),
            Token::If => "if".into(),
            Token::Else => "else".into(),
            Token::Plus => "+".into(),
            Token::Minus => "-".into(),
            Token::Star => "*".into(),
            Token::Slash => "/".into(),
            Token::Percent => "%".into(),
            Token::EqualEqual => "==".into(),
            Token::NotEqual => "!=".into(),
            Token::LessThan => "<".into(),
            Token::LessThanOrEqual => "<=".into(),
            Token::GreaterThan => ">".into(),
            Token::GreaterThanOrEqual => ">=".into(),
            Token::AndAnd => "&&".into(),
            Token::OrOr => "||".into(),
            Token::Bang => "!".into(),
            Token::Pipe => "|".into(),
            Token::Assign => "=".into(),
            Token::LeftParen => "(".into(),
            Token::RightParen => ")".into(),
            Token::LeftBracket => "[".into(),
            Token::RightBracket => "]".into(),
            Token::LeftBrace => "{".into(),
            Token::RightBrace => "}".into(),
            Token::Dot => ".".into(),
            Token::Comma => ",".into(),
            Token::Colon => ":".into(),
            Token::Dollar => "$".into(),
        }
    }

    /// Name usable as a path segment or named argument
    pub fn as_identifier(&self) -> Option<&str> {
        match self {
            Token::Identifier(s) => Some(s),
            _ => None,
        }
    }
}

static KEYWORD_TABLE: Lazy<FxHashMap<&'static str, Token<'static>>> = Lazy::new(|| {
    let mut map = FxHashMap::default();
    map.insert("true", Token::True);
    map.insert("false", Token::False);
    map.insert("null", Token::Null);
    map.insert("this", Token::This);
    map.insert("if", Token::If);
    map.insert("else", Token::Else);
    map
});

/// Tokenizer over mapping text
#[derive(Debug, Clone)]
pub struct Tokenizer<'input> {
    input: &'input str,
    bytes: &'input [u8],
    pos: usize,
}

impl<'input> Tokenizer<'input> {
    /// Create a tokenizer at the start of `input`
    pub fn new(input: &'input str) -> Self {
        Self {
            input,
            bytes: input.as_bytes(),
            pos: 0,
        }
    }

    /// Current byte offset
    pub fn position(&self) -> usize {
        self.pos
    }

    #[inline(always)]
    fn peek_byte(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    #[inline(always)]
    fn is_id_start(ch: u8) -> bool {
        matches!(ch, b'A'..=b'Z' | b'a'..=b'z' | b'_')
    }

    #[inline(always)]
    fn is_id_continue(ch: u8) -> bool {
        matches!(ch, b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'_')
    }

    fn skip_whitespace_and_comments(&mut self) {
        while let Some(ch) = self.peek_byte(0) {
            match ch {
                b' ' | b'\t' | b'\r' | b'\n' => self.pos += 1,
                b'#' => {
                    while let Some(c) = self.peek_byte(0) {
                        if c == b'\n' {
                            break;
                        }
                        self.pos += 1;
                    }
                }
                _ => break,
            }
        }
    }

    fn parse_number(&mut self) -> ParseResult<Token<'input>> {
        let start = self.pos;
        while self.peek_byte(0).is_some_and(|c| c.is_ascii_digit()) {
            self.pos += 1;
        }

        let is_float = self.peek_byte(0) == Some(b'.')
            && self.peek_byte(1).is_some_and(|c| c.is_ascii_digit());
        let literal = &self.input[start..];

        if is_float {
            self.pos += 1;
            while self.peek_byte(0).is_some_and(|c| c.is_ascii_digit()) {
                self.pos += 1;
            }
            let literal = &literal[..self.pos - start];
            return literal
                .parse::<f64>()
                .map(Token::Float)
                .map_err(|_| ParseError::InvalidNumber {
                    literal: literal.to_string(),
                    position: start,
                });
        }

        let literal = &literal[..self.pos - start];
        literal
            .parse::<i64>()
            .map(Token::Integer)
            .map_err(|_| ParseError::InvalidNumber {
                literal: literal.to_string(),
                position: start,
            })
    }

    fn parse_identifier(&mut self) -> &'input str {
        let start = self.pos;
        while self.peek_byte(0).is_some_and(Self::is_id_continue) {
            self.pos += 1;
        }
        &self.input[start..self.pos]
    }

    fn parse_string_literal(&mut self) -> ParseResult<Token<'input>> {
        let quote = self.pos;
        if self.bytes[self.pos..].starts_with(b"\"\"\"") {
            self.pos += 3;
            let start = self.pos;
            return match self.input[start..].find("\"\"\"") {
                Some(len) => {
                    self.pos = start + len + 3;
                    Ok(Token::RawString(&self.input[start..start + len]))
                }
                None => Err(ParseError::UnclosedString { position: quote }),
            };
        }

        self.pos += 1;
        let start = self.pos;
        while let Some(ch) = self.peek_byte(0) {
            match ch {
                b'"' => {
                    let content = &self.input[start..self.pos];
                    self.pos += 1;
                    return Ok(Token::String(content));
                }
                b'\\' => self.pos += 2,
                b'\n' => break,
                _ => self.pos += 1,
            }
        }
        Err(ParseError::UnclosedString { position: quote })
    }

    /// Read the next token, or `None` at end of input
    pub fn next_token(&mut self) -> ParseResult<Option<Spanned<Token<'input>>>> {
        self.skip_whitespace_and_comments();

        let start = self.pos;
        let Some(ch) = self.peek_byte(0) else {
            return Ok(None);
        };

        let (token, width) = match ch {
            b'.' => (Token::Dot, 1),
            b'(' => (Token::LeftParen, 1),
            b')' => (Token::RightParen, 1),
            b',' => (Token::Comma, 1),
            b'[' => (Token::LeftBracket, 1),
            b']' => (Token::RightBracket, 1),
            b'{' => (Token::LeftBrace, 1),
            b'}' => (Token::RightBrace, 1),
            b':' => (Token::Colon, 1),
            b'$' => (Token::Dollar, 1),
            b'+' => (Token::Plus, 1),
            b'-' => (Token::Minus, 1),
            b'*' => (Token::Star, 1),
            b'/' => (Token::Slash, 1),
            b'%' => (Token::Percent, 1),
            b'=' if self.peek_byte(1) == Some(b'=') => (Token::EqualEqual, 2),
            b'=' => (Token::Assign, 1),
            b'!' if self.peek_byte(1) == Some(b'=') => (Token::NotEqual, 2),
            b'!' => (Token::Bang, 1),
            b'<' if self.peek_byte(1) == Some(b'=') => (Token::LessThanOrEqual, 2),
            b'<' => (Token::LessThan, 1),
            b'>' if self.peek_byte(1) == Some(b'=') => (Token::GreaterThanOrEqual, 2),
            b'>' => (Token::GreaterThan, 1),
            b'&' if self.peek_byte(1) == Some(b'&') => (Token::AndAnd, 2),
            b'|' if self.peek_byte(1) == Some(b'|') => (Token::OrOr, 2),
            b'|' => (Token::Pipe, 1),
            b'"' => {
                let token = self.parse_string_literal()?;
                return Ok(Some(Spanned::new(token, start, self.pos)));
            }
            b'0'..=b'9' => {
                let token = self.parse_number()?;
                return Ok(Some(Spanned::new(token, start, self.pos)));
            }
            c if Self::is_id_start(c) => {
                let ident = self.parse_identifier();
                let token = KEYWORD_TABLE
                    .get(ident)
                    .cloned()
                    .unwrap_or(Token::Identifier(ident));
                return Ok(Some(Spanned::new(token, start, self.pos)));
            }
            _ => {
                let found = self.input[start..].chars().next().unwrap_or_default();
                return Err(ParseError::UnexpectedToken {
                    token: found.to_string(),
                    expected: "a valid token".to_string(),
                    position: start,
                });
            }
        };

        self.pos += width;
        Ok(Some(Spanned::new(token, start, self.pos)))
    }

    /// Tokenize the whole input
    pub fn tokenize_all(mut self) -> ParseResult<Vec<Spanned<Token<'input>>>> {
        let mut tokens = Vec::new();
        while let Some(token) = self.next_token()? {
            tokens.push(token);
        }
        Ok(tokens)
    }
}

/// Process the escape sequences of a quoted string literal. `position` is
/// reported on failure.
pub fn unescape(raw: &str, position: usize) -> ParseResult<String> {
    let mut result = String::with_capacity(raw.len());
    let mut chars = raw.chars();

    while let Some(ch) = chars.next() {
        if ch != '\\' {
            result.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => result.push('\n'),
            Some('t') => result.push('\t'),
            Some('r') => result.push('\r'),
            Some('\\') => result.push('\\'),
            Some('"') => result.push('"'),
            Some('/') => result.push('/'),
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                let decoded = (hex.len() == 4)
                    .then(|| u32::from_str_radix(&hex, 16).ok())
                    .flatten()
                    .and_then(char::from_u32);
                match decoded {
                    Some(c) => result.push(c),
                    None => {
                        return Err(ParseError::InvalidEscape {
                            sequence: format!("\\u{hex}"),
                            position,
                        });
                    }
                }
            }
            Some(other) => {
                return Err(ParseError::InvalidEscape {
                    sequence: format!("\\{other}"),
                    position,
                });
            }
            None => {
                return Err(ParseError::InvalidEscape {
                    sequence: "\\".to_string(),
                    position,
                });
            }
        }
    }

    Ok(result)
}
