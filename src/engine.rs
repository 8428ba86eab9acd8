use crate::ast::Template;
use crate::cache::{ExpressionCache, TemplateCache};
use crate::config::EngineConfig;
use crate::error::{Error, FunctionError, Result};
use crate::eval::Functions;
use crate::loader::Loader;
use crate::render::{Renderer, Scope};
use crate::value::{Context, Value};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Owns the compilation caches, registered functions and include loader.
///
/// An engine is `Send + Sync`; one instance can serve concurrent renders
/// and they share its caches.
///
/// ```
/// use shimmytwig::{Context, Engine};
///
/// let engine = Engine::new();
/// let ctx = Context::new().with_var("name", "world");
/// assert_eq!(engine.render("Hello {{ name | capitalize }}!", &ctx).unwrap(), "Hello World!");
/// ```
#[derive(Default)]
pub struct Engine {
    pub(crate) config: EngineConfig,
    pub(crate) cache: ExpressionCache,
    pub(crate) templates: TemplateCache,
    pub(crate) functions: Functions,
    pub(crate) loader: Option<Box<dyn Loader>>,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("cached_expressions", &self.cache.len())
            .field("cached_templates", &self.templates.len())
            .field("functions", &self.functions)
            .field("loader", &self.loader.is_some())
            .finish()
    }
}

impl Engine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn with_loader(mut self, loader: impl Loader + 'static) -> Self {
        self.set_loader(loader);
        self
    }

    pub fn set_loader(&mut self, loader: impl Loader + 'static) {
        self.loader = Some(Box::new(loader));
    }

    /// Registers a function callable from expressions and filters. Stdlib
    /// names take precedence.
    pub fn add_function<F>(&mut self, name: impl Into<String>, function: F)
    where
        F: Fn(&[Value]) -> std::result::Result<Value, FunctionError> + Send + Sync + 'static,
    {
        self.functions.register(name, function);
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cache(&self) -> &ExpressionCache {
        &self.cache
    }

    pub fn template_cache(&self) -> &TemplateCache {
        &self.templates
    }

    /// Parses template text into its block tree, memoised by text.
    pub fn parse(&self, text: &str) -> Result<Arc<Template>> {
        self.templates.parse(text)
    }

    /// Renders `text`. Bindings made by `set` are discarded afterwards.
    pub fn render(&self, text: &str, ctx: &Context) -> Result<String> {
        let mut scope = Scope::new(ctx.as_map().clone());
        self.render_scope(text, &mut scope)
    }

    /// Renders `text` and writes top-level `set` bindings back into `ctx`.
    /// On error `ctx` is left untouched.
    pub fn render_into(&self, text: &str, ctx: &mut Context) -> Result<String> {
        let mut scope = Scope::new(ctx.as_map().clone());
        let out = self.render_scope(text, &mut scope)?;
        *ctx = Context::from(scope.into_globals());
        Ok(out)
    }

    /// Fetches `name` through the configured loader and renders it.
    pub fn render_template(&self, name: &str, ctx: &Context) -> Result<String> {
        let Some(loader) = self.loader.as_deref() else {
            return Err(Error::runtime(1, format!("could not open `{name}`, no loader configured")));
        };
        let text = loader
            .fetch(name)
            .map_err(|err| Error::runtime(1, format!("could not open `{name}`, {err}")))?;
        self.render(&text, ctx)
    }

    /// Evaluates a single expression against `ctx`.
    pub fn eval(&self, source: &str, ctx: &Context) -> Result<Value> {
        self.cache.eval(source, 1, ctx, &self.functions)
    }

    fn render_scope(&self, text: &str, scope: &mut Scope) -> Result<String> {
        debug!(bytes = text.len(), "rendering template");
        let template = self.parse(text)?;
        Renderer::new(self).render(&template, scope, 0)
    }
}
