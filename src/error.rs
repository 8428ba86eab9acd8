//! Error types shared by the lexer, parsers and renderer.

use thiserror::Error;

/// Everything that can abort a parse or render call.
///
/// Every variant carries the 1-based source line. Missing variables are
/// never errors; they evaluate to [`Value::Undefined`](crate::Value::Undefined).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// Expression text that matches no token definition.
    #[error("lex error, line `{line}`, invalid token `{token}`")]
    Lex { line: usize, token: String },

    /// Malformed expression or statement structure.
    #[error("syntax error, line `{line}`, {message}")]
    Syntax { line: usize, message: String },

    /// Failure while evaluating an otherwise well-formed template.
    #[error("runtime error, line `{line}`, {message}")]
    Runtime { line: usize, message: String },
}

impl Error {
    pub(crate) fn syntax(line: usize, message: impl Into<String>) -> Self {
        Error::Syntax {
            line,
            message: message.into(),
        }
    }

    pub(crate) fn runtime(line: usize, message: impl Into<String>) -> Self {
        Error::Runtime {
            line,
            message: message.into(),
        }
    }

    /// Source line the error was raised at.
    pub fn line(&self) -> usize {
        match self {
            Error::Lex { line, .. } | Error::Syntax { line, .. } | Error::Runtime { line, .. } => {
                *line
            }
        }
    }

    pub fn is_syntax(&self) -> bool {
        matches!(self, Error::Syntax { .. })
    }

    pub fn is_runtime(&self) -> bool {
        matches!(self, Error::Runtime { .. })
    }
}

/// Failure reported by a stdlib or user-registered function.
///
/// The interpreter attaches the source line and surfaces it as
/// [`Error::Runtime`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct FunctionError(pub String);

impl FunctionError {
    pub fn new(message: impl Into<String>) -> Self {
        FunctionError(message.into())
    }
}

impl From<regex::Error> for FunctionError {
    fn from(err: regex::Error) -> Self {
        FunctionError(format!("invalid regular expression: {err}"))
    }
}

/// Result type for parse and render operations.
pub type Result<T> = std::result::Result<T, Error>;
