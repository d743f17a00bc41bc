//! Error types for the Matrix compiler

use serde::Serialize;
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CompilerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Resolution error for {path}: {message}")]
    Resolution { path: String, message: String },

    #[error("Config error in {file}: {message}")]
    Config { file: String, message: String },

    #[error("Parse error in {file} at line {line}: {message}")]
    Parse { file: String, line: usize, message: String },

    #[error("Directive error in {file}: {message}")]
    Directive { file: String, message: String },

    #[error("Transform error in {file}: {message}")]
    Transform { file: String, message: String },

    #[error("{} transform errors: {}", .0.len(), join_messages(.0))]
    Aggregate(Vec<CompilerError>),

    #[error("No modules found under {root}")]
    NoModules { root: String },
}

pub type Result<T> = std::result::Result<T, CompilerError>;

/// Coarse classification used by statistics and the CLI summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    Io,
    Resolution,
    Config,
    Parse,
    Directive,
    Transform,
    NoModules,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Io => "IoError",
            ErrorKind::Resolution => "ResolutionError",
            ErrorKind::Config => "ConfigError",
            ErrorKind::Parse => "ParseError",
            ErrorKind::Directive => "DirectiveError",
            ErrorKind::Transform => "TransformError",
            ErrorKind::NoModules => "NoModulesError",
        };
        f.write_str(name)
    }
}

fn join_messages(errors: &[CompilerError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl CompilerError {
    pub fn resolution(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Resolution {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn config(file: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Config {
            file: file.into(),
            message: message.into(),
        }
    }

    pub fn parse(file: impl Into<String>, line: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            file: file.into(),
            line,
            message: message.into(),
        }
    }

    pub fn directive(file: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Directive {
            file: file.into(),
            message: message.into(),
        }
    }

    pub fn transform(file: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transform {
            file: file.into(),
            message: message.into(),
        }
    }

    /// Collapses a list of failures into one error. A single failure is returned as-is.
    pub fn aggregate(mut errors: Vec<CompilerError>) -> Self {
        if errors.len() == 1 {
            errors.remove(0)
        } else {
            Self::Aggregate(errors)
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            CompilerError::Io(_) => ErrorKind::Io,
            CompilerError::Resolution { .. } => ErrorKind::Resolution,
            CompilerError::Config { .. } => ErrorKind::Config,
            CompilerError::Parse { .. } => ErrorKind::Parse,
            CompilerError::Directive { .. } => ErrorKind::Directive,
            CompilerError::Transform { .. } | CompilerError::Aggregate(_) => ErrorKind::Transform,
            CompilerError::NoModules { .. } => ErrorKind::NoModules,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregate_single_error_is_unwrapped() {
        let err = CompilerError::aggregate(vec![CompilerError::parse("a.wxml", 3, "bad tag")]);
        assert_eq!(err.kind(), ErrorKind::Parse);
        assert_eq!(err.to_string(), "Parse error in a.wxml at line 3: bad tag");
    }

    #[test]
    fn test_aggregate_message_lists_every_failure() {
        let err = CompilerError::aggregate(vec![
            CompilerError::transform("a.js", "boom"),
            CompilerError::resolution("b.js", "missing"),
        ]);
        assert_eq!(err.kind(), ErrorKind::Transform);
        let message = err.to_string();
        assert!(message.starts_with("2 transform errors"));
        assert!(message.contains("boom"));
        assert!(message.contains("missing"));
    }

    #[test]
    fn test_kind_display_names() {
        assert_eq!(ErrorKind::Resolution.to_string(), "ResolutionError");
        assert_eq!(ErrorKind::Directive.to_string(), "DirectiveError");
    }
}
