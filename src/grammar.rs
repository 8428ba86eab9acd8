//! Token taxonomy of the expression language and the lexer built from it.

use crate::error::Result;
use crate::lexer::{Lexer, RawToken, TokenDef};
use once_cell::sync::Lazy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Or,
    And,
    BitOr,
    BitXor,
    BitAnd,
    Is,
    /// `defined`, `null`, `empty`, `iterable`, `even`, `odd`.
    Predicate,
    /// `===`, `==`, `!==`, `!=`, `<=`, `>=`, `<`, `>`.
    CmpOp,
    StartsWith,
    EndsWith,
    Matches,
    In,
    Range,
    Plus,
    Minus,
    Power,
    Mul,
    FloorDiv,
    Div,
    Mod,
    Not,
    Colon,
    Dot,
    Comma,
    Pipe,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    /// Number or quoted string literal.
    Terminal,
    Ident,
}

/// An expression token: text, kind and source line.
pub type Token = RawToken<TokenKind>;

const WHITESPACE: [char; 4] = [' ', '\t', '\n', '\r'];

static EXPRESSION_LEXER: Lazy<Lexer<TokenKind>> = Lazy::new(|| {
    use TokenKind::*;
    use TokenDef::Literal as L;

    let mut defs: Vec<(TokenDef, TokenKind)> = vec![
        (L("or"), Or),
        (L("and"), And),
        (L("b-or"), BitOr),
        (L("b-xor"), BitXor),
        (L("b-and"), BitAnd),
        (L("is"), Is),
    ];
    for word in ["defined", "null", "empty", "iterable", "even", "odd"] {
        defs.push((L(word), Predicate));
    }
    for op in ["===", "==", "!==", "!=", "<=", ">="] {
        defs.push((L(op), CmpOp));
    }
    defs.push((L("<"), CmpOp));
    defs.push((L(">"), CmpOp));
    defs.push((pattern(r"starts\s+with"), StartsWith));
    defs.push((pattern(r"ends\s+with"), EndsWith));
    defs.extend([
        (L("matches"), Matches),
        (L("in"), In),
        (L(".."), Range),
        (L("+"), Plus),
        (L("-"), Minus),
        (L("**"), Power),
        (L("*"), Mul),
        (L("//"), FloorDiv),
        (L("/"), Div),
        (L("%"), Mod),
        (L("not"), Not),
        (L(":"), Colon),
        (L("."), Dot),
        (L(","), Comma),
        (L("|"), Pipe),
        (L("("), LParen),
        (L(")"), RParen),
        (L("["), LBracket),
        (L("]"), RBracket),
        (L("{"), LBrace),
        (L("}"), RBrace),
    ]);
    defs.push((pattern(r"[0-9]+\.[0-9]+"), Terminal));
    defs.push((pattern(r"[0-9]+"), Terminal));
    defs.push((pattern(r#"(?s)'(?:\\.|[^'\\])*'"#), Terminal));
    defs.push((pattern(r#"(?s)"(?:\\.|[^"\\])*""#), Terminal));
    defs.push((pattern(r"[A-Za-z_$][A-Za-z0-9_$]*"), Ident));

    Lexer::new(&WHITESPACE, defs)
});

// The table above is fixed, so a bad pattern is a programming error.
fn pattern(p: &str) -> TokenDef {
    TokenDef::pattern(p).unwrap_or_else(|err| panic!("invalid token pattern {p:?}: {err}"))
}

/// Tokenizes expression source strictly: unknown text is a lex error.
pub fn tokenize(source: &str, line: usize) -> Result<Vec<Token>> {
    EXPRESSION_LEXER.tokenize(source, line, true)
}

/// Decodes a quoted string literal token, quotes included.
pub fn unquote(token: &str) -> String {
    let inner = &token[1..token.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    Some(decoded) => out.push(decoded),
                    None => {
                        out.push('u');
                        out.push_str(&hex);
                    }
                }
            }
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        tokenize(src, 1)
            .unwrap()
            .into_iter()
            .filter_map(|t| t.kind)
            .collect()
    }

    #[test]
    fn keywords_and_identifiers() {
        use TokenKind::*;
        assert_eq!(kinds("index in items"), [Ident, In, Ident]);
        assert_eq!(kinds("isEmpty is empty"), [Ident, Is, Predicate]);
        assert_eq!(kinds("not_set or nothing"), [Ident, Or, Ident]);
    }

    #[test]
    fn operators_prefer_longest_listed_form() {
        use TokenKind::*;
        assert_eq!(kinds("a === b"), [Ident, CmpOp, Ident]);
        assert_eq!(kinds("2**3//4"), [Terminal, Power, Terminal, FloorDiv, Terminal]);
        assert_eq!(kinds("1..3"), [Terminal, Range, Terminal]);
        assert_eq!(kinds("1.5"), [Terminal]);
    }

    #[test]
    fn starts_with_spans_whitespace() {
        let tokens = tokenize("s starts   with 'a'", 1).unwrap();
        assert_eq!(tokens[1].kind, Some(TokenKind::StartsWith));
        assert_eq!(tokens[1].text, "starts   with");
    }

    #[test]
    fn strings_keep_escaped_quotes() {
        let tokens = tokenize(r#"'it\'s' "a\"b""#, 1).unwrap();
        assert_eq!(tokens.len(), 2);
        assert_eq!(unquote(&tokens[0].text), "it's");
        assert_eq!(unquote(&tokens[1].text), "a\"b");
    }

    #[test]
    fn unquote_handles_escapes() {
        assert_eq!(unquote(r"'a\nb\u0041'"), "a\nbA");
    }

    #[test]
    fn invalid_character_is_lex_error() {
        assert!(tokenize("a # b", 1).is_err());
    }
}
