//! Errors surfaced to callers.

use crate::ir::Span;
use crate::lang::{Language, UnknownLanguage};

/// Syntax the source grammar rejects.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("parse error at {line}:{column} near `{token}`: {message}")]
pub struct ParseError {
    pub line: usize,
    pub column: usize,
    pub token: String,
    pub message: String,
}

impl ParseError {
    pub fn new(span: Span, token: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            line: span.line,
            column: span.column,
            token: token.into(),
            message: message.into(),
        }
    }

    pub fn span(&self) -> Span {
        Span::new(self.line, self.column)
    }
}

/// A node the target language cannot express.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cannot generate {node} at {}:{}: {message}", location.line, location.column)]
pub struct GenerationError {
    /// IR node kind, e.g. `assignment` or `operation`.
    pub node: String,
    /// Position of the nearest enclosing node that carries one.
    pub location: Span,
    pub message: String,
}

impl GenerationError {
    pub fn new(node: impl Into<String>, location: Span, message: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            location,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Parse,
    Generation,
    UnsupportedLanguage,
}

/// Any failure of a single translation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TranslateError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error("no reader for {0}")]
    NoReader(Language),

    #[error("no writer for {0}")]
    NoWriter(Language),

    #[error(transparent)]
    UnknownLanguage(#[from] UnknownLanguage),
}

impl TranslateError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TranslateError::Parse(_) => ErrorKind::Parse,
            TranslateError::Generation(_) => ErrorKind::Generation,
            TranslateError::NoReader(_)
            | TranslateError::NoWriter(_)
            | TranslateError::UnknownLanguage(_) => ErrorKind::UnsupportedLanguage,
        }
    }

    pub fn location(&self) -> Option<Span> {
        match self {
            TranslateError::Parse(e) => Some(e.span()),
            TranslateError::Generation(e) => Some(e.location),
            _ => None,
        }
    }

    pub fn message(&self) -> String {
        match self {
            TranslateError::Parse(e) => e.message.clone(),
            TranslateError::Generation(e) => e.message.clone(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_display() {
        let err = ParseError::new(Span::new(3, 7), "\"abc", "unterminated string");
        assert_eq!(
            err.to_string(),
            "parse error at 3:7 near `\"abc`: unterminated string"
        );
    }

    #[test]
    fn test_translate_error_accessors() {
        let err: TranslateError = ParseError::new(Span::new(1, 2), "(", "unbalanced").into();
        assert_eq!(err.kind(), ErrorKind::Parse);
        assert_eq!(err.location(), Some(Span::new(1, 2)));
        assert_eq!(err.message(), "unbalanced");

        let err = TranslateError::NoReader(Language::Rust);
        assert_eq!(err.kind(), ErrorKind::UnsupportedLanguage);
        assert_eq!(err.location(), None);
        assert_eq!(err.message(), "no reader for rust");
    }
}
