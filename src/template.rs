//! Block parser: turns template text into a [`Template`] tree.
//!
//! Statements are `{% keyword args %}`. Text between them is kept raw;
//! its `{{ }}` interpolations are compiled lazily by the renderer.
//! Comments `{# ... #}` do not nest and are removed before anything else,
//! keeping their newlines so reported lines stay exact.

use crate::ast::{Branch, Node, Template};
use crate::error::{Error, Result};
use crate::lexer::is_ident_char;
use crate::parser::MAX_NESTING_DEPTH;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use tracing::debug;

static STATEMENT_RE: Lazy<Regex> =
    Lazy::new(|| static_regex(r"(?s)\{%\s*([a-zA-Z]+)\s*(.*?)\s*%\}"));
static COMMENT_RE: Lazy<Regex> = Lazy::new(|| static_regex(r"(?s)\{#.*?#\}"));
static FOR_RE: Lazy<Regex> =
    Lazy::new(|| static_regex(r"(?s)^([A-Za-z_$][A-Za-z0-9_$]*)\s+in\s+(.+)$"));

fn static_regex(pattern: &str) -> Regex {
    Regex::new(pattern)
        .unwrap_or_else(|err| panic!("invalid template pattern {pattern:?}: {err}"))
}

/// A compound statement whose closing keyword has not been seen yet.
enum Open {
    If {
        done: Vec<Branch>,
        current: Branch,
        has_else: bool,
    },
    For {
        target: String,
        iterable: String,
        line: usize,
        body: Vec<Node>,
    },
    Filter {
        filters: String,
        line: usize,
        body: Vec<Node>,
    },
}

impl Open {
    fn kind(&self) -> &'static str {
        match self {
            Open::If { .. } => "if",
            Open::For { .. } => "for",
            Open::Filter { .. } => "filter",
        }
    }

    fn close(self) -> Node {
        match self {
            Open::If {
                mut done, current, ..
            } => {
                done.push(current);
                Node::If { branches: done }
            }
            Open::For {
                target,
                iterable,
                line,
                body,
            } => Node::For {
                target,
                iterable,
                line,
                body,
            },
            Open::Filter { filters, line, body } => Node::Filter { filters, line, body },
        }
    }
}

struct Builder {
    root: Vec<Node>,
    open: Vec<Open>,
}

impl Builder {
    fn body(&mut self) -> &mut Vec<Node> {
        match self.open.last_mut() {
            Some(Open::If { current, .. }) => &mut current.body,
            Some(Open::For { body, .. } | Open::Filter { body, .. }) => body,
            None => &mut self.root,
        }
    }

    fn push(&mut self, node: Node) {
        self.body().push(node);
    }

    fn enter(&mut self, block: Open, line: usize) -> Result<()> {
        if self.open.len() >= MAX_NESTING_DEPTH {
            return Err(Error::syntax(
                line,
                format!("blocks nested deeper than {MAX_NESTING_DEPTH} levels"),
            ));
        }
        self.open.push(block);
        Ok(())
    }

    /// `missing keyword `endX`` for every open block, outermost first.
    fn unclosed(blocks: &[Open]) -> String {
        blocks
            .iter()
            .map(|block| format!("missing keyword `end{}`", block.kind()))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn close(&mut self, kind: &str, line: usize) -> Result<()> {
        match self.open.iter().rposition(|block| block.kind() == kind) {
            Some(at) if at + 1 == self.open.len() => {
                if let Some(block) = self.open.pop() {
                    let node = block.close();
                    self.push(node);
                }
                Ok(())
            }
            Some(at) => Err(Error::syntax(line, Self::unclosed(&self.open[at + 1..]))),
            None => Err(Error::syntax(line, format!("missing keyword `{kind}`"))),
        }
    }

    fn branch(&mut self, keyword: &str, condition: Option<String>, line: usize) -> Result<()> {
        let Some(Open::If {
            done,
            current,
            has_else,
        }) = self.open.last_mut()
        else {
            return Err(Error::syntax(line, "missing keyword `if`"));
        };
        if *has_else {
            return Err(Error::syntax(line, format!("unexpected keyword `{keyword}` after `else`")));
        }
        *has_else = condition.is_none();
        let next = Branch {
            condition,
            line,
            body: Vec::new(),
        };
        done.push(std::mem::replace(current, next));
        Ok(())
    }
}

/// Parses template text into its block tree.
pub fn parse(text: &str) -> Result<Template> {
    let source = strip_comments(text);
    let mut builder = Builder {
        root: Vec::new(),
        open: Vec::new(),
    };
    let mut line = 1;
    let mut pos = 0;

    for caps in STATEMENT_RE.captures_iter(&source) {
        let Some(whole) = caps.get(0) else { continue };
        push_text(&mut builder, &source[pos..whole.start()], &mut line);
        let stmt_line = line;
        line += newlines(whole.as_str());
        pos = whole.end();
        statement(&mut builder, &caps, stmt_line)?;
    }
    push_text(&mut builder, &source[pos..], &mut line);

    if !builder.open.is_empty() {
        return Err(Error::syntax(line, Builder::unclosed(&builder.open)));
    }
    debug!(nodes = builder.root.len(), lines = line, "parsed template");
    Ok(builder.root)
}

fn statement(builder: &mut Builder, caps: &Captures<'_>, line: usize) -> Result<()> {
    let keyword = caps.get(1).map_or("", |m| m.as_str());
    let args = caps.get(2).map_or("", |m| m.as_str());

    match keyword {
        "set" => {
            let Some((name, expr)) = args.split_once('=') else {
                return Err(Error::syntax(line, "`=` expected in `set` statement"));
            };
            let name = name.trim();
            if !is_identifier(name) {
                return Err(Error::syntax(line, format!("invalid variable name `{name}`")));
            }
            builder.push(Node::Set {
                name: name.to_string(),
                expr: required(expr.trim(), "set", line)?,
                line,
            });
        }
        "do" => builder.push(Node::Do {
            expr: required(args, "do", line)?,
            line,
        }),
        "include" => {
            let (expr, with, only) = split_include(args);
            if with.is_some_and(str::is_empty) {
                return Err(Error::syntax(line, "expression expected after `with`"));
            }
            builder.push(Node::Include {
                expr: required(expr, "include", line)?,
                with: with.map(str::to_string),
                only,
                line,
            });
        }
        "if" => {
            let current = Branch {
                condition: Some(required(args, "if", line)?),
                line,
                body: Vec::new(),
            };
            builder.enter(
                Open::If {
                    done: Vec::new(),
                    current,
                    has_else: false,
                },
                line,
            )?;
        }
        "elseif" => {
            let condition = required(args, "elseif", line)?;
            builder.branch("elseif", Some(condition), line)?;
        }
        "else" => {
            bare(args, line)?;
            builder.branch("else", None, line)?;
        }
        "for" => {
            let Some(parts) = FOR_RE.captures(args) else {
                return Err(Error::syntax(
                    line,
                    "`<name> in <expression>` expected in `for` statement",
                ));
            };
            let block = Open::For {
                target: parts[1].to_string(),
                iterable: parts[2].trim().to_string(),
                line,
                body: Vec::new(),
            };
            builder.enter(block, line)?;
        }
        "filter" => {
            let block = Open::Filter {
                filters: required(args, "filter", line)?,
                line,
                body: Vec::new(),
            };
            builder.enter(block, line)?;
        }
        "endif" | "endfor" | "endfilter" => {
            bare(args, line)?;
            builder.close(&keyword[3..], line)?;
        }
        other => return Err(Error::syntax(line, format!("unknown keyword `{other}`"))),
    }
    Ok(())
}

fn push_text(builder: &mut Builder, text: &str, line: &mut usize) {
    if !text.is_empty() {
        builder.push(Node::Text {
            raw: text.to_string(),
            line: *line,
        });
    }
    *line += newlines(text);
}

fn required(args: &str, keyword: &str, line: usize) -> Result<String> {
    if args.is_empty() {
        return Err(Error::syntax(line, format!("expression expected after `{keyword}`")));
    }
    Ok(args.to_string())
}

/// Keywords that take no arguments.
fn bare(args: &str, line: usize) -> Result<()> {
    match args.split_whitespace().next() {
        Some(token) => Err(Error::syntax(line, format!("unexpected token `{token}`"))),
        None => Ok(()),
    }
}

fn newlines(text: &str) -> usize {
    text.bytes().filter(|&b| b == b'\n').count()
}

fn is_identifier(name: &str) -> bool {
    name.chars().next().is_some_and(|c| !c.is_ascii_digit()) && name.chars().all(is_ident_char)
}

/// Replaces each comment by the newlines it contained.
pub fn strip_comments(text: &str) -> String {
    COMMENT_RE
        .replace_all(text, |caps: &Captures<'_>| "\n".repeat(newlines(&caps[0])))
        .into_owned()
}

/// Splits `file [with expr] [only]` at top level, ignoring keywords that
/// appear inside string literals or brackets.
fn split_include(args: &str) -> (&str, Option<&str>, bool) {
    let mut rest = args.trim();
    let mut only = false;
    if let Some(head) = rest.strip_suffix("only") {
        if head.ends_with(char::is_whitespace) && !head.trim().is_empty() {
            rest = head.trim_end();
            only = true;
        }
    }
    match find_keyword(rest, "with") {
        Some(at) => (rest[..at].trim(), Some(rest[at + "with".len()..].trim()), only),
        None => (rest, None, only),
    }
}

fn find_keyword(source: &str, word: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote = None;
    let mut escaped = false;
    let mut prev = None;

    for (i, c) in source.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
        } else {
            match c {
                '\'' | '"' => quote = Some(c),
                '(' | '[' | '{' => depth += 1,
                ')' | ']' | '}' => depth = depth.saturating_sub(1),
                _ if depth == 0
                    && !prev.is_some_and(is_ident_char)
                    && source[i..].starts_with(word)
                    && !source[i + word.len()..].starts_with(is_ident_char) =>
                {
                    return Some(i);
                }
                _ => {}
            }
        }
        prev = Some(c);
    }
    None
}
