use std::path::PathBuf;

use thiserror::Error;

/// All the ways a compilation can fail.
///
/// Every variant aborts the whole invocation: no partial output is ever
/// written. `Syntax` errors carry a pre-rendered source snippet, `Semantic`
/// errors optionally carry a corrective hint that the CLI prints on its own
/// line, and `Internal` marks a violated compiler invariant (a bug in the
/// compiler itself, not in the input).
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("{0}")]
    Syntax(String),

    #[error("{message}")]
    Semantic {
        message: String,
        hint: Option<String>,
    },

    #[error("internal compiler invariant violated: {0}")]
    Internal(String),

    #[error("failed to read '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl CompileError {
    pub fn semantic(message: impl Into<String>) -> Self {
        CompileError::Semantic {
            message: message.into(),
            hint: None,
        }
    }

    pub fn semantic_with_hint(message: impl Into<String>, hint: impl Into<String>) -> Self {
        CompileError::Semantic {
            message: message.into(),
            hint: Some(hint.into()),
        }
    }

    /// The hint line, if this error carries one.
    pub fn hint(&self) -> Option<&str> {
        match self {
            CompileError::Semantic { hint, .. } => hint.as_deref(),
            _ => None,
        }
    }
}
