//! Token layer shared by the four mini-grammars.
//!
//! The grammars are small and keyword-heavy: uppercase words (`FILTER`,
//! `LIKE`, `FOR`, `KV`, …), numbers, single-quoted strings, and a handful
//! of punctuation. Words are lexed uniformly; the parsers decide which
//! ones are keywords in their position.

use hvml_core::{CoreError, CoreResult};
use std::fmt;

/// Kind of a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// A bare word: keyword or identifier.
    Word,
    /// A numeric literal.
    Number,
    /// A single-quoted string literal (quotes stripped).
    Str,
    /// `:`
    Colon,
    /// `,`
    Comma,
    /// `(`
    LParen,
    /// `)`
    RParen,
    /// `+`
    Plus,
    /// `-`
    Minus,
    /// `*`
    Star,
    /// `/`
    Slash,
    /// End of input.
    Eof,
}

/// One token.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    /// The token's kind.
    pub kind: TokenKind,
    /// Source text (string literals hold their unquoted content).
    pub text: String,
    /// Numeric payload for `Number` tokens.
    pub number: f64,
}

impl Token {
    fn punct(kind: TokenKind, text: &str) -> Self {
        Self {
            kind,
            text: text.to_owned(),
            number: 0.0,
        }
    }

    /// Whether this is the word `kw` (case-sensitive; keywords are
    /// uppercase by convention).
    #[must_use]
    pub fn is_word(&self, kw: &str) -> bool {
        self.kind == TokenKind::Word && self.text == kw
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TokenKind::Str => write!(f, "'{}'", self.text),
            TokenKind::Eof => f.write_str("<eof>"),
            _ => f.write_str(&self.text),
        }
    }
}

/// Tokenize `input` for the mini-grammar parsers.
pub fn tokenize(input: &str) -> CoreResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let bytes = input.as_bytes();
    let mut pos = 0;

    while pos < bytes.len() {
        let c = bytes[pos];
        match c {
            b' ' | b'\t' | b'\r' | b'\n' => pos += 1,
            b':' => {
                tokens.push(Token::punct(TokenKind::Colon, ":"));
                pos += 1;
            }
            b',' => {
                tokens.push(Token::punct(TokenKind::Comma, ","));
                pos += 1;
            }
            b'(' => {
                tokens.push(Token::punct(TokenKind::LParen, "("));
                pos += 1;
            }
            b')' => {
                tokens.push(Token::punct(TokenKind::RParen, ")"));
                pos += 1;
            }
            b'+' => {
                tokens.push(Token::punct(TokenKind::Plus, "+"));
                pos += 1;
            }
            b'-' => {
                tokens.push(Token::punct(TokenKind::Minus, "-"));
                pos += 1;
            }
            b'*' => {
                tokens.push(Token::punct(TokenKind::Star, "*"));
                pos += 1;
            }
            b'/' => {
                tokens.push(Token::punct(TokenKind::Slash, "/"));
                pos += 1;
            }
            b'\'' => {
                pos += 1;
                let start = pos;
                while pos < bytes.len() && bytes[pos] != b'\'' {
                    pos += 1;
                }
                if pos >= bytes.len() {
                    return Err(CoreError::bad_arg("unterminated string literal"));
                }
                let text = std::str::from_utf8(&bytes[start..pos])
                    .map_err(|_| CoreError::bad_arg("rule is not UTF-8"))?
                    .to_owned();
                pos += 1;
                tokens.push(Token {
                    kind: TokenKind::Str,
                    text,
                    number: 0.0,
                });
            }
            b'0'..=b'9' | b'.' => {
                let start = pos;
                while pos < bytes.len()
                    && (bytes[pos].is_ascii_digit()
                        || bytes[pos] == b'.'
                        || bytes[pos] == b'e'
                        || bytes[pos] == b'E')
                {
                    pos += 1;
                }
                let text = std::str::from_utf8(&bytes[start..pos]).unwrap().to_owned();
                let number: f64 = text
                    .parse()
                    .map_err(|_| CoreError::bad_arg(format!("bad number '{text}'")))?;
                tokens.push(Token {
                    kind: TokenKind::Number,
                    text,
                    number,
                });
            }
            c if c.is_ascii_alphabetic() || c == b'_' => {
                let start = pos;
                while pos < bytes.len()
                    && (bytes[pos].is_ascii_alphanumeric() || bytes[pos] == b'_')
                {
                    pos += 1;
                }
                let text = std::str::from_utf8(&bytes[start..pos]).unwrap().to_owned();
                tokens.push(Token {
                    kind: TokenKind::Word,
                    text,
                    number: 0.0,
                });
            }
            other => {
                return Err(CoreError::bad_arg(format!(
                    "unexpected character '{}' in rule",
                    other as char
                )));
            }
        }
    }

    tokens.push(Token::punct(TokenKind::Eof, ""));
    Ok(tokens)
}

/// Token cursor used by the parsers.
pub struct TokenStream {
    tokens: Vec<Token>,
    pos: usize,
}

impl TokenStream {
    /// Tokenize and wrap `input`.
    pub fn new(input: &str) -> CoreResult<Self> {
        Ok(Self {
            tokens: tokenize(input)?,
            pos: 0,
        })
    }

    /// The current token.
    #[must_use]
    pub fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    /// The token after the current one (EOF-saturated).
    #[must_use]
    pub fn peek2(&self) -> &Token {
        self.tokens
            .get(self.pos + 1)
            .unwrap_or_else(|| self.tokens.last().expect("token stream has EOF"))
    }

    /// Consume and return the current token.
    pub fn next(&mut self) -> Token {
        let t = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        t
    }

    /// Consume the current token if it is the word `kw`.
    pub fn eat_word(&mut self, kw: &str) -> bool {
        if self.peek().is_word(kw) {
            self.next();
            true
        } else {
            false
        }
    }

    /// Consume the current token if its kind is `kind`.
    pub fn eat(&mut self, kind: TokenKind) -> bool {
        if self.peek().kind == kind {
            self.next();
            true
        } else {
            false
        }
    }

    /// Require the word `kw`.
    pub fn expect_word(&mut self, kw: &str) -> CoreResult<()> {
        if self.eat_word(kw) {
            Ok(())
        } else {
            Err(CoreError::bad_arg(format!(
                "expected '{kw}', found '{}'",
                self.peek()
            )))
        }
    }

    /// Require a token of `kind`, returning it.
    pub fn expect(&mut self, kind: TokenKind) -> CoreResult<Token> {
        if self.peek().kind == kind {
            Ok(self.next())
        } else {
            Err(CoreError::bad_arg(format!(
                "expected {kind:?}, found '{}'",
                self.peek()
            )))
        }
    }

    /// Require end of input.
    pub fn expect_eof(&self) -> CoreResult<()> {
        if self.peek().kind == TokenKind::Eof {
            Ok(())
        } else {
            Err(CoreError::bad_arg(format!(
                "trailing tokens starting at '{}'",
                self.peek()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_filter_rule() {
        let tokens = tokenize("FILTER: LIKE '/^foo/i' MAX 16, FOR KV").unwrap();
        let kinds: Vec<_> = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::Word,
                TokenKind::Colon,
                TokenKind::Word,
                TokenKind::Str,
                TokenKind::Word,
                TokenKind::Number,
                TokenKind::Comma,
                TokenKind::Word,
                TokenKind::Word,
                TokenKind::Eof,
            ]
        );
        assert_eq!(tokens[3].text, "/^foo/i");
        assert_eq!(tokens[5].number, 16.0);
    }

    #[test]
    fn test_unterminated_string() {
        assert!(tokenize("AS 'oops").is_err());
    }
}
