use std::fmt;
use thiserror::Error;

/// A 1-based location in template source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TemplateError {
    #[error("Lex Error: {message} at {position}")]
    Lex { message: String, position: Position },
    #[error("Parse Error: {message} at {position}")]
    Parse { message: String, position: Position },
    #[error("Eval Error: {0}")]
    Eval(String),
    #[error("Limit Exceeded: {0}")]
    LimitExceeded(String),
    #[error("Template Not Found: {0}")]
    TemplateNotFound(String),
    #[error("Serialization Error: {0}")]
    SerializationError(String),
    #[error("Template Load Error: {0}")]
    TemplateLoadError(String),
}

pub type Error = TemplateError;

impl TemplateError {
    pub(crate) fn lex(message: impl Into<String>, position: Position) -> Self {
        TemplateError::Lex {
            message: message.into(),
            position,
        }
    }

    pub(crate) fn parse(message: impl Into<String>, position: Position) -> Self {
        TemplateError::Parse {
            message: message.into(),
            position,
        }
    }

    /// Source position for lex and parse errors.
    pub fn position(&self) -> Option<Position> {
        match self {
            TemplateError::Lex { position, .. } | TemplateError::Parse { position, .. } => {
                Some(*position)
            }
            _ => None,
        }
    }
}

impl serde::ser::Error for TemplateError {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        TemplateError::SerializationError(msg.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_position() {
        let err = TemplateError::lex("unterminated output region", Position::new(2, 7));
        assert_eq!(
            err.to_string(),
            "Lex Error: unterminated output region at line 2, column 7"
        );
        assert_eq!(err.position(), Some(Position::new(2, 7)));
        assert_eq!(TemplateError::Eval("x".into()).position(), None);
    }
}
