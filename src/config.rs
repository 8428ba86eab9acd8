use serde::{Deserialize, Serialize};

/// Limits applied to every render call of an [`Engine`](crate::Engine).
///
/// Missing fields take their defaults, so `{}` is a valid document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum nesting of `include` statements.
    pub max_include_depth: usize,
    /// Maximum number of `for` iterations across one render call.
    pub max_iterations: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_include_depth: 16,
            max_iterations: 1_000_000,
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}
