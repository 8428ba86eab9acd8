//! Retrieval of templates named by `include`.

use std::collections::HashMap;
use std::io;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("template `{0}` not found")]
    NotFound(String),

    /// The name would resolve outside the loader's root.
    #[error("template name `{0}` is not allowed")]
    Forbidden(String),

    #[error("failed to read `{name}`")]
    Io {
        name: String,
        #[source]
        source: io::Error,
    },
}

/// Synchronous fetch-by-name capability used by `include`.
pub trait Loader: Send + Sync {
    fn fetch(&self, name: &str) -> Result<String, LoadError>;
}

impl<F> Loader for F
where
    F: Fn(&str) -> Result<String, LoadError> + Send + Sync,
{
    fn fetch(&self, name: &str) -> Result<String, LoadError> {
        self(name)
    }
}

/// Loads templates from files below a root directory.
#[derive(Debug, Clone)]
pub struct FileSystemLoader {
    root: PathBuf,
}

impl FileSystemLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Joins `name` onto the root. Absolute names and `..` are refused.
    fn resolve(&self, name: &str) -> Result<PathBuf, LoadError> {
        let relative = Path::new(name);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if name.is_empty() || escapes {
            return Err(LoadError::Forbidden(name.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

impl Loader for FileSystemLoader {
    fn fetch(&self, name: &str) -> Result<String, LoadError> {
        let path = self.resolve(name)?;
        debug!(path = %path.display(), "reading template");
        std::fs::read_to_string(&path).map_err(|source| match source.kind() {
            io::ErrorKind::NotFound => LoadError::NotFound(name.to_string()),
            _ => LoadError::Io {
                name: name.to_string(),
                source,
            },
        })
    }
}

/// Templates held in memory, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct MemoryLoader {
    templates: HashMap<String, String>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, text: impl Into<String>) {
        self.templates.insert(name.into(), text.into());
    }

    pub fn with(mut self, name: impl Into<String>, text: impl Into<String>) -> Self {
        self.insert(name, text);
        self
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for MemoryLoader {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            templates: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

impl Loader for MemoryLoader {
    fn fetch(&self, name: &str) -> Result<String, LoadError> {
        self.templates
            .get(name)
            .cloned()
            .ok_or_else(|| LoadError::NotFound(name.to_string()))
    }
}
