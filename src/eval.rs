//! Tree-walking interpreter over [`Expr`].

use crate::ast::{BinOp, Expr, UnaryOp};
use crate::error::{Error, FunctionError, Result};
use crate::stdlib;
use crate::value::{Lookup, Map, Value};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A user-registered callable.
pub type Function =
    Arc<dyn Fn(&[Value]) -> std::result::Result<Value, FunctionError> + Send + Sync>;

/// Callables available to expressions beyond the stdlib.
///
/// Names resolve against the stdlib first, so registering `upper` has no
/// effect on templates.
#[derive(Clone, Default)]
pub struct Functions {
    registered: HashMap<String, Function>,
}

impl fmt::Debug for Functions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.registered.keys().collect();
        names.sort();
        f.debug_struct("Functions").field("registered", &names).finish()
    }
}

impl Functions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, name: impl Into<String>, function: F)
    where
        F: Fn(&[Value]) -> std::result::Result<Value, FunctionError> + Send + Sync + 'static,
    {
        self.registered.insert(name.into(), Arc::new(function));
    }

    /// True if `name` resolves to a stdlib or registered function.
    pub fn contains(&self, name: &str) -> bool {
        stdlib::get(name).is_some() || self.registered.contains_key(name)
    }

    fn call(
        &self,
        name: &str,
        args: &[Value],
    ) -> Option<std::result::Result<Value, FunctionError>> {
        if let Some(builtin) = stdlib::get(name) {
            return Some(builtin(args));
        }
        self.registered.get(name).map(|function| function(args))
    }
}

/// Evaluates expressions against one scope. `line` is attached to every
/// error raised.
pub struct Evaluator<'a> {
    scope: &'a dyn Lookup,
    functions: &'a Functions,
    line: usize,
}

impl<'a> Evaluator<'a> {
    pub fn new(scope: &'a dyn Lookup, functions: &'a Functions, line: usize) -> Self {
        Self {
            scope,
            functions,
            line,
        }
    }

    pub fn eval(&self, expr: &Expr) -> Result<Value> {
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::ListLit(items) => self.eval_all(items).map(Value::List),
            Expr::MapLit(entries) => entries
                .iter()
                .map(|(key, item)| Ok((key.clone(), self.eval(item)?)))
                .collect::<Result<Map>>()
                .map(Value::Map),
            Expr::Var { path, indices } => self.eval_var(path, indices),
            Expr::Call { name, args } => {
                let args = self.eval_all(args)?;
                self.call(name, &args)
            }
            Expr::Range { lo, hi } => {
                let bounds = [self.eval(lo)?, self.eval(hi)?];
                self.call("range", &bounds)
            }
            Expr::UnaryOp { op, operand } => self.eval_unary(*op, operand),
            Expr::BinaryOp { op, left, right } => self.eval_binary(*op, left, right),
        }
    }

    /// Invokes a named function, stdlib first.
    pub fn call(&self, name: &str, args: &[Value]) -> Result<Value> {
        match self.functions.call(name, args) {
            Some(Ok(value)) => Ok(value),
            Some(Err(err)) => Err(Error::runtime(self.line, format!("function `{name}`: {err}"))),
            None => Err(Error::runtime(self.line, format!("unknown function `{name}`"))),
        }
    }

    fn eval_all(&self, exprs: &[Expr]) -> Result<Vec<Value>> {
        exprs.iter().map(|e| self.eval(e)).collect()
    }

    fn eval_var(&self, path: &[String], indices: &[Expr]) -> Result<Value> {
        let Some((head, members)) = path.split_first() else {
            return Ok(Value::Undefined);
        };
        let keys = self.eval_all(indices)?;

        let mut current = self.scope.lookup(head);
        for member in members {
            let key = Value::from(member.as_str());
            current = current.and_then(|v| index(v, &key));
        }
        for key in &keys {
            current = current.and_then(|v| index(v, key));
        }
        Ok(current.cloned().unwrap_or_default())
    }

    fn eval_unary(&self, op: UnaryOp, operand: &Expr) -> Result<Value> {
        let value = self.eval(operand)?;
        Ok(match op {
            UnaryOp::Not => Value::Bool(!value.is_truthy()),
            UnaryOp::Neg => Value::Number(-value.to_number()),
            UnaryOp::Plus => Value::Number(value.to_number()),
            UnaryOp::Is(predicate) => return self.call(predicate.function(), &[value]),
        })
    }

    fn eval_binary(&self, op: BinOp, left: &Expr, right: &Expr) -> Result<Value> {
        let l = self.eval(left)?;
        match (op, right) {
            (BinOp::Or, _) if l.is_truthy() => return Ok(l),
            (BinOp::And, _) if !l.is_truthy() => return Ok(l),
            (BinOp::In, Expr::Range { lo, hi }) => {
                let args = [l, self.eval(lo)?, self.eval(hi)?];
                return self.call("isInRange", &args);
            }
            _ => {}
        }
        let r = self.eval(right)?;
        self.apply(op, l, r)
    }

    /// Applies `op` to two evaluated operands.
    fn apply(&self, op: BinOp, l: Value, r: Value) -> Result<Value> {
        let value = match op {
            BinOp::Or => {
                if l.is_truthy() {
                    l
                } else {
                    r
                }
            }
            BinOp::And => {
                if l.is_truthy() {
                    r
                } else {
                    l
                }
            }
            BinOp::In => return self.call("isInObject", &[l, r]),
            BinOp::Add if l.is_string() || r.is_string() => Value::String(format!("{l}{r}")),
            BinOp::Add => Value::Number(l.to_number() + r.to_number()),
            BinOp::Sub => Value::Number(l.to_number() - r.to_number()),
            BinOp::Mul => Value::Number(l.to_number() * r.to_number()),
            BinOp::Div => Value::Number(l.to_number() / r.to_number()),
            BinOp::FloorDiv => Value::Number((l.to_number() / r.to_number()).floor()),
            BinOp::Mod => Value::Number(l.to_number() % r.to_number()),
            BinOp::Pow => Value::Number(l.to_number().powf(r.to_number())),
            BinOp::BitOr => Value::Number(f64::from(l.to_int32() | r.to_int32())),
            BinOp::BitXor => Value::Number(f64::from(l.to_int32() ^ r.to_int32())),
            BinOp::BitAnd => Value::Number(f64::from(l.to_int32() & r.to_int32())),
            BinOp::Eq => Value::Bool(l.loose_eq(&r)),
            BinOp::NotEq => Value::Bool(!l.loose_eq(&r)),
            BinOp::StrictEq => Value::Bool(l.strict_eq(&r)),
            BinOp::StrictNotEq => Value::Bool(!l.strict_eq(&r)),
            BinOp::Lt => Value::Bool(compare(&l, &r) == Some(Ordering::Less)),
            BinOp::Le => Value::Bool(matches!(
                compare(&l, &r),
                Some(Ordering::Less | Ordering::Equal)
            )),
            BinOp::Gt => Value::Bool(compare(&l, &r) == Some(Ordering::Greater)),
            BinOp::Ge => Value::Bool(matches!(
                compare(&l, &r),
                Some(Ordering::Greater | Ordering::Equal)
            )),
            BinOp::StartsWith => return self.call("startsWith", &[l, r]),
            BinOp::EndsWith => return self.call("endsWith", &[l, r]),
            BinOp::Matches => return self.call("match", &[l, r]),
        };
        Ok(value)
    }
}

/// Strings compare lexicographically, everything else numerically.
fn compare(l: &Value, r: &Value) -> Option<Ordering> {
    match (l, r) {
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => l.to_number().partial_cmp(&r.to_number()),
    }
}

/// `value[key]`: numeric index into a list, key into a map.
fn index<'v>(value: &'v Value, key: &Value) -> Option<&'v Value> {
    match value {
        Value::List(items) => {
            let n = key.to_number();
            (n >= 0.0 && n.fract() == 0.0).then(|| items.get(n as usize)).flatten()
        }
        Value::Map(map) => map.get(key.to_string().as_str()),
        _ => None,
    }
}
