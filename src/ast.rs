use crate::value::Value;
use std::fmt::Write;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Or,
    And,
    BitOr,
    BitXor,
    BitAnd,
    Eq,
    StrictEq,
    NotEq,
    StrictNotEq,
    Lt,
    Le,
    Gt,
    Ge,
    StartsWith,
    EndsWith,
    Matches,
    In,
    Add,
    Sub,
    Mul,
    FloorDiv,
    Div,
    Mod,
    Pow,
}

impl BinOp {
    pub fn as_str(self) -> &'static str {
        match self {
            BinOp::Or => "or",
            BinOp::And => "and",
            BinOp::BitOr => "b-or",
            BinOp::BitXor => "b-xor",
            BinOp::BitAnd => "b-and",
            BinOp::Eq => "==",
            BinOp::StrictEq => "===",
            BinOp::NotEq => "!=",
            BinOp::StrictNotEq => "!==",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::StartsWith => "starts with",
            BinOp::EndsWith => "ends with",
            BinOp::Matches => "matches",
            BinOp::In => "in",
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::FloorDiv => "//",
            BinOp::Div => "/",
            BinOp::Mod => "%",
            BinOp::Pow => "**",
        }
    }

    pub(crate) fn comparison(text: &str) -> Option<Self> {
        Some(match text {
            "==" => BinOp::Eq,
            "===" => BinOp::StrictEq,
            "!=" => BinOp::NotEq,
            "!==" => BinOp::StrictNotEq,
            "<" => BinOp::Lt,
            "<=" => BinOp::Le,
            ">" => BinOp::Gt,
            ">=" => BinOp::Ge,
            _ => return None,
        })
    }
}

/// Keyword after `is`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Predicate {
    Defined,
    Null,
    Empty,
    Iterable,
    Even,
    Odd,
}

impl Predicate {
    pub fn as_str(self) -> &'static str {
        match self {
            Predicate::Defined => "defined",
            Predicate::Null => "null",
            Predicate::Empty => "empty",
            Predicate::Iterable => "iterable",
            Predicate::Even => "even",
            Predicate::Odd => "odd",
        }
    }

    pub(crate) fn from_keyword(word: &str) -> Option<Self> {
        Some(match word {
            "defined" => Predicate::Defined,
            "null" => Predicate::Null,
            "empty" => Predicate::Empty,
            "iterable" => Predicate::Iterable,
            "even" => Predicate::Even,
            "odd" => Predicate::Odd,
            _ => return None,
        })
    }

    /// Stdlib function implementing the test.
    pub fn function(self) -> &'static str {
        match self {
            Predicate::Defined => "isDefined",
            Predicate::Null => "isNull",
            Predicate::Empty => "isEmpty",
            Predicate::Iterable => "isIterable",
            Predicate::Even => "isEven",
            Predicate::Odd => "isOdd",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
    Plus,
    /// Postfix `is <predicate>`; `is not` wraps it in `Not`.
    Is(Predicate),
}

impl UnaryOp {
    pub fn as_str(self) -> &'static str {
        match self {
            UnaryOp::Not => "not",
            UnaryOp::Neg => "-",
            UnaryOp::Plus => "+",
            UnaryOp::Is(_) => "is",
        }
    }
}

/// Compiled expression tree. Children are owned; trees never share nodes.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    BinaryOp {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    UnaryOp {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Literal(Value),
    ListLit(Vec<Expr>),
    MapLit(Vec<(String, Expr)>),
    /// `name(args)`, or a filter stage with the piped value as first arg.
    Call {
        name: String,
        args: Vec<Expr>,
    },
    /// `a.b.c` optionally followed by `[i, j]` successive lookups.
    Var {
        path: Vec<String>,
        indices: Vec<Expr>,
    },
    /// `lo..hi` over literal bounds.
    Range {
        lo: Box<Expr>,
        hi: Box<Expr>,
    },
}

impl Expr {
    /// Renders the tree as a Graphviz digraph.
    pub fn to_dot(&self) -> String {
        let mut nodes = String::new();
        let mut edges = String::new();
        let mut counter = 0;
        self.dot_node(&mut nodes, &mut edges, &mut counter);
        format!("digraph ast {{\n\trankdir=TB;\n{nodes}{edges}}}\n")
    }

    fn label(&self) -> String {
        match self {
            Expr::BinaryOp { op, .. } => op.as_str().to_string(),
            Expr::UnaryOp {
                op: UnaryOp::Is(pred),
                ..
            } => format!("is {}", pred.as_str()),
            Expr::UnaryOp { op, .. } => op.as_str().to_string(),
            Expr::Literal(Value::String(s)) => format!("{s:?}"),
            Expr::Literal(v) => v.to_string(),
            Expr::ListLit(_) => "List".to_string(),
            Expr::MapLit(_) => "Map".to_string(),
            Expr::Call { name, .. } => format!("{name}()"),
            Expr::Var { path, .. } => path.join("."),
            Expr::Range { .. } => "..".to_string(),
        }
    }

    fn dot_node(&self, nodes: &mut String, edges: &mut String, counter: &mut usize) -> usize {
        let id = *counter;
        *counter += 1;
        let label = self.label().replace('"', "\\\"");
        let _ = writeln!(nodes, "\tnode{id} [label=\"{label}\"];");

        let mut edge = |child: &Expr, tag: Option<&str>, nodes: &mut String, edges: &mut String| {
            let child_id = child.dot_node(nodes, edges, counter);
            match tag {
                Some(tag) => {
                    let tag = tag.replace('"', "\\\"");
                    let _ = writeln!(edges, "\tnode{id} -> node{child_id} [label=\"[{tag}]\"];");
                }
                None => {
                    let _ = writeln!(edges, "\tnode{id} -> node{child_id};");
                }
            }
        };

        match self {
            Expr::BinaryOp { left, right, .. } | Expr::Range { lo: left, hi: right } => {
                edge(left, None, nodes, edges);
                edge(right, None, nodes, edges);
            }
            Expr::UnaryOp { operand, .. } => edge(operand, None, nodes, edges),
            Expr::Literal(_) => {}
            Expr::ListLit(items)
            | Expr::Call { args: items, .. }
            | Expr::Var { indices: items, .. } => {
                for (i, item) in items.iter().enumerate() {
                    let tag = i.to_string();
                    edge(item, Some(tag.as_str()), nodes, edges);
                }
            }
            Expr::MapLit(entries) => {
                for (key, item) in entries {
                    edge(item, Some(key.as_str()), nodes, edges);
                }
            }
        }
        id
    }
}

/// One `if`/`elseif`/`else` arm. `condition` is `None` for `else`.
#[derive(Debug, Clone, PartialEq)]
pub struct Branch {
    pub condition: Option<String>,
    pub line: usize,
    pub body: Vec<Node>,
}

/// Block tree node. Expression sources stay raw until render time.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Literal text; `{{ }}` interpolations are resolved when rendered.
    Text {
        raw: String,
        line: usize,
    },
    Set {
        name: String,
        expr: String,
        line: usize,
    },
    Do {
        expr: String,
        line: usize,
    },
    Include {
        expr: String,
        with: Option<String>,
        only: bool,
        line: usize,
    },
    If {
        branches: Vec<Branch>,
    },
    For {
        target: String,
        iterable: String,
        line: usize,
        body: Vec<Node>,
    },
    /// `{% filter f | g %}...{% endfilter %}`.
    Filter {
        filters: String,
        line: usize,
        body: Vec<Node>,
    },
}

pub type Template = Vec<Node>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dot_output_lists_nodes_and_edges() {
        let expr = Expr::BinaryOp {
            op: BinOp::Add,
            left: Box::new(Expr::Literal(Value::Number(1.0))),
            right: Box::new(Expr::Call {
                name: "abs".into(),
                args: vec![Expr::Literal(Value::from("x"))],
            }),
        };
        let dot = expr.to_dot();
        assert!(dot.starts_with("digraph ast {"));
        assert!(dot.contains("node0 [label=\"+\"]"));
        assert!(dot.contains("node2 [label=\"abs()\"]"));
        assert!(dot.contains("node3 [label=\"\\\"x\\\"\"]"));
        assert!(dot.contains("node0 -> node1;"));
        assert!(dot.contains("node2 -> node3 [label=\"[0]\"];"));
    }
}
