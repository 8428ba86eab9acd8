//! Memoised compilation of expression source and template text.
//!
//! Entries are keyed by the exact source text and live as long as the
//! cache. Only parse results are stored; every evaluation runs against the
//! scope it is given.

use crate::ast::{Expr, Template};
use crate::error::Result;
use crate::eval::{Evaluator, Functions};
use crate::parser;
use crate::template;
use crate::value::{Lookup, Value};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, trace};

type Entries<T> = RwLock<HashMap<String, Arc<T>>>;

#[derive(Debug, Default)]
pub struct ExpressionCache {
    exprs: Entries<Expr>,
    pipelines: Entries<Vec<Expr>>,
}

impl ExpressionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the compiled tree for `source`, parsing it on first use.
    /// Failed parses are not remembered.
    pub fn compile(&self, source: &str, line: usize) -> Result<Arc<Expr>> {
        memoise(&self.exprs, "expression", source, || parser::parse_expression(source, line))
    }

    /// As [`compile`](Self::compile), for `{% filter %}` chains.
    pub fn compile_pipeline(&self, source: &str, line: usize) -> Result<Arc<Vec<Expr>>> {
        memoise(&self.pipelines, "filter chain", source, || parser::parse_pipeline(source, line))
    }

    pub fn eval(
        &self,
        source: &str,
        line: usize,
        scope: &dyn Lookup,
        functions: &Functions,
    ) -> Result<Value> {
        let expr = self.compile(source, line)?;
        Evaluator::new(scope, functions, line).eval(&expr)
    }

    /// Number of distinct expressions compiled so far.
    pub fn len(&self) -> usize {
        self.exprs.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.exprs.write().unwrap_or_else(PoisonError::into_inner).clear();
        self.pipelines.write().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

/// Parsed templates, keyed by their full text.
#[derive(Debug, Default)]
pub struct TemplateCache {
    entries: Entries<Template>,
}

impl TemplateCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(&self, text: &str) -> Result<Arc<Template>> {
        memoise(&self.entries, "template", text, || template::parse(text))
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.write().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

fn memoise<T>(
    entries: &Entries<T>,
    kind: &'static str,
    source: &str,
    build: impl FnOnce() -> Result<T>,
) -> Result<Arc<T>> {
    if let Some(hit) = entries.read().unwrap_or_else(PoisonError::into_inner).get(source) {
        trace!(kind, source, "cache hit");
        return Ok(Arc::clone(hit));
    }

    debug!(kind, bytes = source.len(), "cache miss, compiling");
    let built = Arc::new(build()?);
    let mut entries = entries.write().unwrap_or_else(PoisonError::into_inner);
    // Another thread may have compiled the same text meanwhile; keep the first.
    Ok(Arc::clone(entries.entry(source.to_string()).or_insert(built)))
}
