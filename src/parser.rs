//! Recursive-descent compiler from expression source to [`Expr`].
//!
//! Precedence, low to high:
//!
//! ```text
//! Filter      := LogicalOr ('|' CallOrVar)*
//! LogicalOr   := LogicalAnd ('or' LogicalOr)?
//! LogicalAnd  := BitwiseOr ('and' LogicalAnd)?
//! BitwiseOr   := BitwiseXor ('b-or' BitwiseOr)?
//! BitwiseXor  := BitwiseAnd ('b-xor' BitwiseXor)?
//! BitwiseAnd  := Comparison ('b-and' BitwiseAnd)?
//! Comparison  := AddSub ( 'is' 'not'? predicate | cmp AddSub
//!                       | ('starts'|'ends') 'with' AddSub | 'matches' AddSub
//!                       | 'in' Primary )?
//! AddSub      := MulDiv (('+'|'-') AddSub)?
//! MulDiv      := Power (('*'|'//'|'/'|'%') MulDiv)?
//! Power       := Unary ('**' Power)?
//! Unary       := ('not'|'+'|'-') Primary | Primary
//! Primary     := '(' Filter ')' | '[' list ']' | '{' map '}' | CallOrVar | Terminal
//! ```
//!
//! Binary levels recurse on the right, so every binary operator is
//! right-associative: `10 - 4 - 3` is `10 - (4 - 3)`.

use crate::ast::*;
use crate::error::{Error, Result};
use crate::grammar::{self, Token, TokenKind};
use crate::lexer::is_ident_char;
use crate::value::Value;
use std::collections::VecDeque;

/// Deepest nesting accepted for groups, literals, argument lists and
/// operator chains in an expression, and for blocks in a template.
pub const MAX_NESTING_DEPTH: usize = 64;

/// Parses a complete expression; trailing tokens are a syntax error.
pub fn parse_expression(source: &str, line: usize) -> Result<Expr> {
    let mut parser = Parser::new(source, line)?;
    let expr = parser.parse_filter()?;
    parser.finish()?;
    Ok(expr)
}

/// Parses the filter chain of a `{% filter %}` statement, e.g.
/// `upper | replace({'A': 'a'})`. Each stage is returned as a
/// [`Expr::Call`] whose arguments exclude the piped input.
pub fn parse_pipeline(source: &str, line: usize) -> Result<Vec<Expr>> {
    let mut parser = Parser::new(source, line)?;
    let mut stages = Vec::new();
    loop {
        let (name, args) = parser.parse_filter_call()?;
        stages.push(Expr::Call { name, args });
        if !parser.eat(TokenKind::Pipe) {
            break;
        }
    }
    parser.finish()?;
    Ok(stages)
}

pub struct Parser {
    tokens: VecDeque<Token>,
    line: usize,
    depth: usize,
}

impl Parser {
    pub fn new(source: &str, line: usize) -> Result<Self> {
        Ok(Self {
            tokens: grammar::tokenize(source, line)?.into(),
            line,
            depth: 0,
        })
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.front()
    }

    fn peek_kind(&self) -> Option<TokenKind> {
        self.peek().and_then(|t| t.kind)
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.peek_kind() == Some(kind)
    }

    fn consume(&mut self) -> Option<Token> {
        let token = self.tokens.pop_front()?;
        self.line = token.line;
        Some(token)
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        let found = self.check(kind);
        if found {
            self.consume();
        }
        found
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Result<Token> {
        if self.check(kind) {
            if let Some(token) = self.consume() {
                return Ok(token);
            }
        }
        Err(self.error(format!("`{what}` expected")))
    }

    /// Syntax error at the current token, naming it.
    fn error(&self, message: impl Into<String>) -> Error {
        let message = message.into();
        match self.peek() {
            Some(token) => Error::syntax(
                token.line,
                format!("{message}, unexpected token `{}`", token.text),
            ),
            None => Error::syntax(self.line, format!("{message}, unexpected end of expression")),
        }
    }

    fn finish(&self) -> Result<()> {
        match self.peek() {
            Some(token) => Err(Error::syntax(
                token.line,
                format!("unexpected token `{}`", token.text),
            )),
            None => Ok(()),
        }
    }

    /// Runs `parse` one level deeper, failing past [`MAX_NESTING_DEPTH`].
    fn nested<T>(&mut self, parse: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        if self.depth >= MAX_NESTING_DEPTH {
            return Err(self.error(format!(
                "expression nested deeper than {MAX_NESTING_DEPTH} levels"
            )));
        }
        self.depth += 1;
        let parsed = parse(self);
        self.depth -= 1;
        parsed
    }

    pub fn parse_filter(&mut self) -> Result<Expr> {
        let mut left = self.parse_logical_or()?;
        while self.eat(TokenKind::Pipe) {
            let (name, mut args) = self.parse_filter_call()?;
            args.insert(0, left);
            left = Expr::Call { name, args };
        }
        Ok(left)
    }

    /// `name`, `name.sub` or `name(args)` in pipe position.
    fn parse_filter_call(&mut self) -> Result<(String, Vec<Expr>)> {
        if !self.check(TokenKind::Ident) {
            return Err(self.error("filter name expected"));
        }
        let name = self.parse_qualified_name()?.join(".");
        let args = if self.eat(TokenKind::LParen) {
            let args = self.nested(Self::parse_items)?;
            self.expect(TokenKind::RParen, ")")?;
            args
        } else {
            Vec::new()
        };
        Ok((name, args))
    }

    fn parse_logical_or(&mut self) -> Result<Expr> {
        let left = self.parse_logical_and()?;
        self.binary_tail(left, &[BinOp::Or], Self::parse_logical_or)
    }

    fn parse_logical_and(&mut self) -> Result<Expr> {
        let left = self.parse_bitwise_or()?;
        self.binary_tail(left, &[BinOp::And], Self::parse_logical_and)
    }

    fn parse_bitwise_or(&mut self) -> Result<Expr> {
        let left = self.parse_bitwise_xor()?;
        self.binary_tail(left, &[BinOp::BitOr], Self::parse_bitwise_or)
    }

    fn parse_bitwise_xor(&mut self) -> Result<Expr> {
        let left = self.parse_bitwise_and()?;
        self.binary_tail(left, &[BinOp::BitXor], Self::parse_bitwise_xor)
    }

    fn parse_bitwise_and(&mut self) -> Result<Expr> {
        let left = self.parse_comparison()?;
        self.binary_tail(left, &[BinOp::BitAnd], Self::parse_bitwise_and)
    }

    fn parse_comparison(&mut self) -> Result<Expr> {
        let left = self.parse_add_sub()?;
        let (kind, text) = match self.peek() {
            Some(token) => (token.kind, token.text.clone()),
            None => return Ok(left),
        };

        let (op, right) = match kind {
            Some(TokenKind::Is) => {
                self.consume();
                return self.parse_test(left);
            }
            Some(TokenKind::CmpOp) => {
                let op = BinOp::comparison(&text)
                    .ok_or_else(|| self.error("comparison operator expected"))?;
                self.consume();
                (op, self.parse_add_sub()?)
            }
            Some(TokenKind::StartsWith) => {
                self.consume();
                (BinOp::StartsWith, self.parse_add_sub()?)
            }
            Some(TokenKind::EndsWith) => {
                self.consume();
                (BinOp::EndsWith, self.parse_add_sub()?)
            }
            Some(TokenKind::Matches) => {
                self.consume();
                (BinOp::Matches, self.parse_add_sub()?)
            }
            Some(TokenKind::In) => {
                self.consume();
                (BinOp::In, self.parse_primary(false)?)
            }
            _ => return Ok(left),
        };
        Ok(binary(op, left, right))
    }

    /// After `is`: optional `not`, then a predicate keyword.
    fn parse_test(&mut self, operand: Expr) -> Result<Expr> {
        let negated = self.eat(TokenKind::Not);
        let predicate = self
            .peek()
            .filter(|t| t.kind == Some(TokenKind::Predicate))
            .and_then(|t| Predicate::from_keyword(&t.text));
        let Some(predicate) = predicate else {
            return Err(self.error(
                "keyword `defined`, `null`, `empty`, `iterable`, `even` or `odd` expected",
            ));
        };
        self.consume();

        let test = unary(UnaryOp::Is(predicate), operand);
        Ok(if negated { unary(UnaryOp::Not, test) } else { test })
    }

    fn parse_add_sub(&mut self) -> Result<Expr> {
        let left = self.parse_mul_div()?;
        self.binary_tail(left, &[BinOp::Add, BinOp::Sub], Self::parse_add_sub)
    }

    fn parse_mul_div(&mut self) -> Result<Expr> {
        let left = self.parse_power()?;
        self.binary_tail(
            left,
            &[BinOp::Mul, BinOp::FloorDiv, BinOp::Div, BinOp::Mod],
            Self::parse_mul_div,
        )
    }

    fn parse_power(&mut self) -> Result<Expr> {
        let left = self.parse_unary()?;
        self.binary_tail(left, &[BinOp::Pow], Self::parse_power)
    }

    /// Consumes one operator from `accepted` and its right operand, if the
    /// next token is such an operator.
    fn binary_tail(
        &mut self,
        left: Expr,
        accepted: &[BinOp],
        rhs: fn(&mut Self) -> Result<Expr>,
    ) -> Result<Expr> {
        let op = self
            .peek_kind()
            .and_then(arithmetic_op)
            .filter(|op| accepted.contains(op));
        let Some(op) = op else {
            return Ok(left);
        };
        self.consume();
        let right = self.nested(rhs)?;
        Ok(binary(op, left, right))
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        let op = match self.peek_kind() {
            Some(TokenKind::Not) => UnaryOp::Not,
            Some(TokenKind::Plus) => UnaryOp::Plus,
            Some(TokenKind::Minus) => UnaryOp::Neg,
            _ => return self.parse_primary(true),
        };
        self.consume();
        let operand = self.parse_primary(true)?;
        Ok(unary(op, operand))
    }

    /// `allow_group` is false on the right of `in`.
    fn parse_primary(&mut self, allow_group: bool) -> Result<Expr> {
        match self.peek_kind() {
            Some(TokenKind::LParen) if allow_group => {
                self.consume();
                let inner = self.nested(Self::parse_filter)?;
                self.expect(TokenKind::RParen, ")")?;
                Ok(inner)
            }
            Some(TokenKind::LBracket) => {
                self.consume();
                let items = self.nested(Self::parse_items)?;
                self.expect(TokenKind::RBracket, "]")?;
                Ok(Expr::ListLit(items))
            }
            Some(TokenKind::LBrace) => {
                self.consume();
                let entries = self.nested(Self::parse_entries)?;
                self.expect(TokenKind::RBrace, "}")?;
                Ok(Expr::MapLit(entries))
            }
            Some(TokenKind::Ident) => self.parse_call_or_var(),
            Some(TokenKind::Terminal) => self.parse_terminal(),
            Some(TokenKind::Predicate) if self.peek().is_some_and(|t| t.text == "null") => {
                self.consume();
                Ok(Expr::Literal(Value::Null))
            }
            _ => Err(self.error("syntax error or truncated expression")),
        }
    }

    fn parse_call_or_var(&mut self) -> Result<Expr> {
        let path = self.parse_qualified_name()?;
        if let [only] = path.as_slice() {
            match only.as_str() {
                "true" => return Ok(Expr::Literal(Value::Bool(true))),
                "false" => return Ok(Expr::Literal(Value::Bool(false))),
                _ => {}
            }
        }

        if self.eat(TokenKind::LParen) {
            let args = self.nested(Self::parse_items)?;
            self.expect(TokenKind::RParen, ")")?;
            return Ok(Expr::Call {
                name: path.join("."),
                args,
            });
        }

        let indices = if self.eat(TokenKind::LBracket) {
            let indices = self.nested(Self::parse_items)?;
            self.expect(TokenKind::RBracket, "]")?;
            indices
        } else {
            Vec::new()
        };
        Ok(Expr::Var { path, indices })
    }

    /// `ident ('.' name)*`. Keywords are accepted after a dot, so
    /// `loop.first` and `user.empty` both work.
    fn parse_qualified_name(&mut self) -> Result<Vec<String>> {
        let first = self.expect(TokenKind::Ident, "identifier")?;
        let mut path = vec![first.text];
        while self.eat(TokenKind::Dot) {
            let is_name = self.peek().is_some_and(|t| {
                t.text.chars().all(is_ident_char)
                    && !t.text.starts_with(|c: char| c.is_ascii_digit())
            });
            if !is_name {
                return Err(self.error("identifier expected after `.`"));
            }
            if let Some(token) = self.consume() {
                path.push(token.text);
            }
        }
        Ok(path)
    }

    fn parse_terminal(&mut self) -> Result<Expr> {
        let token = self.expect(TokenKind::Terminal, "literal")?;
        let lo = literal(&token)?;
        if !self.eat(TokenKind::Range) {
            return Ok(lo);
        }
        let hi = self.expect(TokenKind::Terminal, "literal")?;
        Ok(Expr::Range {
            lo: Box::new(lo),
            hi: Box::new(literal(&hi)?),
        })
    }

    /// Comma-separated expressions up to (not including) `)` or `]`.
    /// A trailing comma is accepted.
    fn parse_items(&mut self) -> Result<Vec<Expr>> {
        let mut items = Vec::new();
        while self.peek().is_some()
            && !self.check(TokenKind::RParen)
            && !self.check(TokenKind::RBracket)
        {
            items.push(self.parse_filter()?);
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        Ok(items)
    }

    /// `key: value` pairs up to `}`. Keys are literals or bare names.
    fn parse_entries(&mut self) -> Result<Vec<(String, Expr)>> {
        let mut entries = Vec::new();
        while self.peek().is_some() && !self.check(TokenKind::RBrace) {
            let key = match self.peek_kind() {
                Some(TokenKind::Terminal) => {
                    let token = self.expect(TokenKind::Terminal, "literal")?;
                    match literal(&token)? {
                        Expr::Literal(value) => value.to_string(),
                        _ => token.text,
                    }
                }
                Some(TokenKind::Ident) => self.expect(TokenKind::Ident, "identifier")?.text,
                _ => return Err(self.error("map key expected")),
            };
            self.expect(TokenKind::Colon, ":")?;
            let value = self.parse_filter()?;
            entries.push((key, value));
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        Ok(entries)
    }
}

fn binary(op: BinOp, left: Expr, right: Expr) -> Expr {
    Expr::BinaryOp {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

fn unary(op: UnaryOp, operand: Expr) -> Expr {
    Expr::UnaryOp {
        op,
        operand: Box::new(operand),
    }
}

fn arithmetic_op(kind: TokenKind) -> Option<BinOp> {
    Some(match kind {
        TokenKind::Or => BinOp::Or,
        TokenKind::And => BinOp::And,
        TokenKind::BitOr => BinOp::BitOr,
        TokenKind::BitXor => BinOp::BitXor,
        TokenKind::BitAnd => BinOp::BitAnd,
        TokenKind::Plus => BinOp::Add,
        TokenKind::Minus => BinOp::Sub,
        TokenKind::Mul => BinOp::Mul,
        TokenKind::FloorDiv => BinOp::FloorDiv,
        TokenKind::Div => BinOp::Div,
        TokenKind::Mod => BinOp::Mod,
        TokenKind::Power => BinOp::Pow,
        _ => return None,
    })
}

fn literal(token: &Token) -> Result<Expr> {
    if token.text.starts_with(['\'', '"']) {
        return Ok(Expr::Literal(Value::String(grammar::unquote(&token.text))));
    }
    token
        .text
        .parse::<f64>()
        .map(|n| Expr::Literal(Value::Number(n)))
        .map_err(|_| Error::syntax(token.line, format!("invalid number `{}`", token.text)))
}
