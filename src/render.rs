//! Tree-walking renderer for parsed templates.

use crate::ast::{Expr, Node, Template};
use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::eval::Evaluator;
use crate::value::{Lookup, Map, Value};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

static VARIABLE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)\{\{\s*(.*?)\s*\}\}")
        .unwrap_or_else(|err| panic!("invalid interpolation pattern: {err}"))
});

/// Variable frames, innermost last. The first frame holds the caller's
/// context plus top-level `set` bindings; each `for` iteration pushes one.
#[derive(Debug, Clone)]
pub(crate) struct Scope {
    frames: Vec<Map>,
}

impl Scope {
    pub(crate) fn new(globals: Map) -> Self {
        Self { frames: vec![globals] }
    }

    fn push_scope(&mut self) {
        self.frames.push(Map::new());
    }

    fn pop_scope(&mut self) {
        if self.frames.len() > 1 {
            self.frames.pop();
        }
    }

    fn set_local(&mut self, name: impl Into<String>, value: Value) {
        if let Some(frame) = self.frames.last_mut() {
            frame.insert(name.into(), value);
        }
    }

    /// All visible bindings in one map, inner frames shadowing outer ones.
    fn flatten(&self) -> Map {
        let mut vars = Map::new();
        for frame in &self.frames {
            vars.extend(frame.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        vars
    }

    pub(crate) fn into_globals(mut self) -> Map {
        self.frames.truncate(1);
        self.frames.pop().unwrap_or_default()
    }
}

impl Lookup for Scope {
    fn lookup(&self, name: &str) -> Option<&Value> {
        self.frames.iter().rev().find_map(|frame| frame.get(name))
    }
}

/// State of one render call: the iteration budget is shared by the
/// template and everything it includes.
pub(crate) struct Renderer<'e> {
    engine: &'e Engine,
    iterations: usize,
}

impl<'e> Renderer<'e> {
    pub(crate) fn new(engine: &'e Engine) -> Self {
        Self {
            engine,
            iterations: 0,
        }
    }

    pub(crate) fn render(
        &mut self,
        template: &Template,
        scope: &mut Scope,
        depth: usize,
    ) -> Result<String> {
        let mut out = String::new();
        self.render_nodes(template, scope, depth, &mut out)?;
        Ok(out)
    }

    fn eval(&self, source: &str, line: usize, scope: &Scope) -> Result<Value> {
        self.engine.cache.eval(source, line, scope, &self.engine.functions)
    }

    fn render_nodes(
        &mut self,
        nodes: &[Node],
        scope: &mut Scope,
        depth: usize,
        out: &mut String,
    ) -> Result<()> {
        for node in nodes {
            match node {
                Node::Text { raw, line } => self.interpolate(raw, *line, scope, out)?,
                Node::Set { name, expr, line } => {
                    let value = self.eval(expr, *line, scope)?;
                    scope.set_local(name.as_str(), value);
                }
                Node::Do { expr, line } => {
                    self.eval(expr, *line, scope)?;
                }
                Node::If { branches } => {
                    for branch in branches {
                        let taken = match &branch.condition {
                            Some(condition) => {
                                self.eval(condition, branch.line, scope)?.is_truthy()
                            }
                            None => true,
                        };
                        if taken {
                            self.render_nodes(&branch.body, scope, depth, out)?;
                            break;
                        }
                    }
                }
                Node::For {
                    target,
                    iterable,
                    line,
                    body,
                } => self.render_for(target, iterable, *line, body, scope, depth, out)?,
                Node::Include {
                    expr,
                    with,
                    only,
                    line,
                } => self.render_include(expr, with.as_deref(), *only, *line, scope, depth, out)?,
                Node::Filter { filters, line, body } => {
                    let mut inner = String::new();
                    self.render_nodes(body, scope, depth, &mut inner)?;
                    let filtered = self.apply_filters(filters, *line, Value::String(inner), scope)?;
                    out.push_str(&filtered.to_string());
                }
            }
        }
        Ok(())
    }

    /// Replaces every `{{ expr }}` in `raw`. Each interpolation reports the
    /// line it starts on.
    fn interpolate(&self, raw: &str, line: usize, scope: &Scope, out: &mut String) -> Result<()> {
        let mut last = 0;
        let mut line = line;
        for caps in VARIABLE_RE.captures_iter(raw) {
            let (Some(whole), Some(expr)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            let before = &raw[last..whole.start()];
            out.push_str(before);
            line += before.matches('\n').count();

            let value = self.eval(expr.as_str(), line, scope)?;
            out.push_str(&value.to_string());

            line += whole.as_str().matches('\n').count();
            last = whole.end();
        }
        out.push_str(&raw[last..]);
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn render_for(
        &mut self,
        target: &str,
        iterable: &str,
        line: usize,
        body: &[Node],
        scope: &mut Scope,
        depth: usize,
        out: &mut String,
    ) -> Result<()> {
        let items: Vec<Value> = match self.eval(iterable, line, scope)? {
            Value::List(items) => items,
            Value::Map(map) => map.into_keys().map(Value::String).collect(),
            Value::String(s) => s.chars().map(|c| Value::String(c.to_string())).collect(),
            other => {
                return Err(Error::runtime(
                    line,
                    format!("`{target}` must be iterable, got {}", other.kind()),
                ))
            }
        };

        let length = items.len();
        for (index, item) in items.into_iter().enumerate() {
            self.iterations += 1;
            let limit = self.engine.config.max_iterations;
            if self.iterations > limit {
                return Err(Error::runtime(
                    line,
                    format!("loop iteration limit of {limit} exceeded"),
                ));
            }

            let mut meta = Map::new();
            meta.insert("index".into(), Value::from(index));
            meta.insert("length".into(), Value::from(length));
            meta.insert("first".into(), Value::Bool(index == 0));
            meta.insert("last".into(), Value::Bool(index + 1 == length));

            scope.push_scope();
            scope.set_local(target, item);
            scope.set_local("loop", Value::Map(meta));
            let rendered = self.render_nodes(body, scope, depth, out);
            scope.pop_scope();
            rendered?;
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn render_include(
        &mut self,
        expr: &str,
        with: Option<&str>,
        only: bool,
        line: usize,
        scope: &Scope,
        depth: usize,
        out: &mut String,
    ) -> Result<()> {
        let name = match self.eval(expr, line, scope)? {
            Value::String(name) => name,
            other => {
                return Err(Error::runtime(
                    line,
                    format!("include target must be a string, got {}", other.kind()),
                ))
            }
        };

        let extra = match with {
            Some(source) => match self.eval(source, line, scope)? {
                Value::Map(map) => map,
                _ => return Err(Error::runtime(line, "dictionary expected")),
            },
            None => Map::new(),
        };
        let vars = if only {
            extra
        } else {
            let mut vars = scope.flatten();
            vars.extend(extra);
            vars
        };

        let limit = self.engine.config.max_include_depth;
        if depth >= limit {
            return Err(Error::runtime(
                line,
                format!("include depth limit of {limit} exceeded at `{name}`"),
            ));
        }
        let Some(loader) = self.engine.loader.as_deref() else {
            return Err(Error::runtime(
                line,
                format!("could not open `{name}`, no loader configured"),
            ));
        };

        debug!(name = %name, depth, "including template");
        let text = loader
            .fetch(&name)
            .map_err(|err| Error::runtime(line, format!("could not open `{name}`, {err}")))?;
        let template = self.engine.parse(&text)?;
        let mut child = Scope::new(vars);
        self.render_nodes(&template, &mut child, depth + 1, out)
    }

    fn apply_filters(
        &self,
        filters: &str,
        line: usize,
        input: Value,
        scope: &Scope,
    ) -> Result<Value> {
        let stages = self.engine.cache.compile_pipeline(filters, line)?;
        let evaluator = Evaluator::new(scope, &self.engine.functions, line);
        let mut value = input;
        for stage in stages.iter() {
            let Expr::Call { name, args } = stage else {
                return Err(Error::runtime(line, "filter name expected"));
            };
            let mut call_args = Vec::with_capacity(args.len() + 1);
            call_args.push(value);
            for arg in args {
                call_args.push(evaluator.eval(arg)?);
            }
            value = evaluator.call(name, &call_args)?;
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(pairs: &[(&str, i64)]) -> Map {
        pairs.iter().map(|(k, v)| (k.to_string(), Value::from(*v))).collect()
    }

    #[test]
    fn inner_frames_shadow_outer() {
        let mut scope = Scope::new(frame(&[("a", 1), ("b", 2)]));
        scope.push_scope();
        scope.set_local("a", Value::from(10));
        assert_eq!(scope.lookup("a"), Some(&Value::from(10)));
        assert_eq!(scope.lookup("b"), Some(&Value::from(2)));
        assert_eq!(scope.flatten().get("a"), Some(&Value::from(10)));

        scope.pop_scope();
        assert_eq!(scope.lookup("a"), Some(&Value::from(1)));
    }

    #[test]
    fn global_frame_is_never_popped() {
        let mut scope = Scope::new(frame(&[("a", 1)]));
        scope.pop_scope();
        scope.set_local("b", Value::from(2));
        let globals = scope.into_globals();
        assert_eq!(globals.len(), 2);
    }
}
