//! Generic longest-prefix tokenizer driven by an ordered table of token
//! definitions.
//!
//! The table order is the disambiguation rule: the first definition that
//! matches at the cursor wins. A match is rejected when it would split an
//! identifier, so the keyword `in` never matches inside `integer`.

use crate::error::{Error, Result};
use regex::Regex;

/// How a single token is recognised.
#[derive(Debug, Clone)]
pub enum TokenDef {
    Literal(&'static str),
    /// A pattern matched at the cursor. It is anchored on construction.
    Pattern(Regex),
}

impl TokenDef {
    /// Builds an anchored pattern definition.
    pub fn pattern(pattern: &str) -> std::result::Result<Self, regex::Error> {
        Regex::new(&format!("^(?:{pattern})")).map(TokenDef::Pattern)
    }

    fn match_len(&self, rest: &str) -> Option<usize> {
        match self {
            TokenDef::Literal(lit) => rest.starts_with(lit).then_some(lit.len()),
            TokenDef::Pattern(re) => re.find(rest).map(|m| m.end()).filter(|&n| n > 0),
        }
    }
}

/// One lexed token. `kind` is `None` for text no definition matched; those
/// only survive in non-strict mode.
#[derive(Debug, Clone, PartialEq)]
pub struct RawToken<K> {
    pub text: String,
    pub kind: Option<K>,
    pub line: usize,
}

/// Identifier-class characters for the boundary check.
pub fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$'
}

/// A tokenizer parameterised by whitespace and token definitions.
#[derive(Debug, Clone)]
pub struct Lexer<K> {
    whitespace: Vec<char>,
    defs: Vec<(TokenDef, K)>,
}

impl<K: Copy> Lexer<K> {
    pub fn new(whitespace: &[char], defs: Vec<(TokenDef, K)>) -> Self {
        Self {
            whitespace: whitespace.to_vec(),
            defs,
        }
    }

    /// Splits `input` into tokens, counting lines from `start_line`.
    ///
    /// Unmatched characters accumulate into a pending word that is flushed
    /// at whitespace, at the next successful match, or at end of input. In
    /// `strict` mode a flushed word is a [`Error::Lex`].
    pub fn tokenize(
        &self,
        input: &str,
        start_line: usize,
        strict: bool,
    ) -> Result<Vec<RawToken<K>>> {
        let mut cursor = Cursor {
            input,
            pos: 0,
            line: start_line,
        };
        let mut tokens = Vec::new();
        let mut pending = String::new();
        let mut pending_line = start_line;

        while let Some(c) = cursor.peek() {
            if self.whitespace.contains(&c) {
                flush(&mut pending, pending_line, strict, &mut tokens)?;
                cursor.advance(c.len_utf8());
                continue;
            }

            if let Some((len, kind)) = self.match_at(&cursor) {
                flush(&mut pending, pending_line, strict, &mut tokens)?;
                let line = cursor.line;
                let text = cursor.advance(len);
                tokens.push(RawToken {
                    text: text.to_string(),
                    kind: Some(kind),
                    line,
                });
                continue;
            }

            if pending.is_empty() {
                pending_line = cursor.line;
            }
            pending.push(c);
            cursor.advance(c.len_utf8());
        }

        flush(&mut pending, pending_line, strict, &mut tokens)?;
        Ok(tokens)
    }

    fn match_at(&self, cursor: &Cursor<'_>) -> Option<(usize, K)> {
        let rest = cursor.remaining();
        let prev = cursor.input[..cursor.pos].chars().next_back();
        self.defs.iter().find_map(|(def, kind)| {
            let len = def.match_len(rest)?;
            on_boundary(prev, &rest[..len], rest[len..].chars().next()).then_some((len, *kind))
        })
    }
}

/// Neither edge of `token` may sit directly against an identifier character.
fn on_boundary(prev: Option<char>, token: &str, next: Option<char>) -> bool {
    let glued = |outer: Option<char>, inner: Option<char>| {
        matches!((outer, inner), (Some(o), Some(i)) if is_ident_char(o) && is_ident_char(i))
    };
    !glued(prev, token.chars().next()) && !glued(next, token.chars().next_back())
}

fn flush<K>(
    pending: &mut String,
    line: usize,
    strict: bool,
    tokens: &mut Vec<RawToken<K>>,
) -> Result<()> {
    if pending.is_empty() {
        return Ok(());
    }
    let word = std::mem::take(pending);
    if strict {
        return Err(Error::Lex { line, token: word });
    }
    tokens.push(RawToken {
        text: word,
        kind: None,
        line,
    });
    Ok(())
}

struct Cursor<'a> {
    input: &'a str,
    pos: usize,
    line: usize,
}

impl<'a> Cursor<'a> {
    fn remaining(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.remaining().chars().next()
    }

    fn advance(&mut self, n: usize) -> &'a str {
        let text = &self.input[self.pos..self.pos + n];
        self.line += text.matches('\n').count();
        self.pos += n;
        text
    }
}
