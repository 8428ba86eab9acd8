//! shimmytwig: a small Twig-like template engine.
//!
//! Templates mix literal text with `{{ expr }}` interpolations and
//! `{% stmt %}` control statements. Expressions are compiled once per
//! distinct source text and cached on the [`Engine`]; rendering walks the
//! parsed block tree against a [`Context`].
//!
//! Supported statements:
//! - `{% set name = expr %}` and `{% do expr %}`.
//! - `{% if %}` / `{% elseif %}` / `{% else %}` / `{% endif %}`.
//! - `{% for x in expr %} ... {% endfor %}`, with a `loop` record holding
//!   `index`, `length`, `first` and `last`.
//! - `{% include expr [with expr] [only] %}` through a [`Loader`].
//! - `{% filter f | g(args) %} ... {% endfilter %}`.
//! - `{# comments #}`, which do not nest.
//!
//! Not supported:
//! - Template inheritance (`extends`, `block`).
//! - Macros.
//! - Host objects: values are limited to [`Value`]'s variants.
//!
//! Missing variables and out-of-range indices are never errors. They
//! evaluate to [`Value::Undefined`], which renders as empty text.
//!
//! ```
//! use shimmytwig::Context;
//!
//! let ctx = Context::new().with_var("items", vec!["a", "b"]);
//! let out = shimmytwig::render(
//!     "{% for i in items %}{{ i }}{% if not loop.last %}, {% endif %}{% endfor %}",
//!     &ctx,
//! )
//! .unwrap();
//! assert_eq!(out, "a, b");
//! ```

pub mod ast;
pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod eval;
pub mod grammar;
pub mod lexer;
pub mod loader;
pub mod parser;
mod render;
pub mod stdlib;
pub mod template;
pub mod value;

pub use config::EngineConfig;
pub use engine::Engine;
pub use error::{Error, FunctionError, Result};
pub use loader::{FileSystemLoader, LoadError, Loader, MemoryLoader};
pub use parser::parse_expression;
pub use value::{Context, Map, Value};

/// Renders `text` against `ctx` with a fresh [`Engine`].
///
/// Nothing is cached between calls and `include` has no loader; build an
/// [`Engine`] to get either.
pub fn render(text: &str, ctx: &Context) -> Result<String> {
    Engine::new().render(text, ctx)
}
