//! Positioned errors raised by the expression lexer and parser.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Which stage of the front end rejected the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExprErrorKind {
    Lex,
    Parse,
}

impl fmt::Display for ExprErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lex => write!(f, "Lex error"),
            Self::Parse => write!(f, "Parse error"),
        }
    }
}

/// Byte offset plus 1-based line and column of a point in the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Location {
    pub position: usize,
    pub line: usize,
    pub column: usize,
}

impl Location {
    /// Locate byte offset `position` within `source`.
    pub fn locate(source: &str, position: usize) -> Self {
        let position = position.min(source.len());
        let before = &source[..position];
        let line_start = before.rfind('\n').map_or(0, |i| i + 1);
        Self {
            position,
            line: before.matches('\n').count() + 1,
            column: before[line_start..].chars().count() + 1,
        }
    }
}

/// A lex or parse failure with enough context to point at the culprit.
///
/// `Display` renders the message, the offending source line, and a caret
/// under the column.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{}", self.render())]
pub struct ExprError {
    pub kind: ExprErrorKind,
    pub message: String,
    pub position: usize,
    pub line: usize,
    pub column: usize,
    /// The full expression text.
    pub expression: String,
}

impl ExprError {
    pub fn lex(message: impl Into<String>, expression: &str, at: Location) -> Self {
        Self::new(ExprErrorKind::Lex, message, expression, at)
    }

    pub fn parse(message: impl Into<String>, expression: &str, at: Location) -> Self {
        Self::new(ExprErrorKind::Parse, message, expression, at)
    }

    fn new(kind: ExprErrorKind, message: impl Into<String>, expression: &str, at: Location) -> Self {
        Self {
            kind,
            message: message.into(),
            position: at.position,
            line: at.line,
            column: at.column,
            expression: expression.to_string(),
        }
    }

    fn render(&self) -> String {
        let line_text = self
            .expression
            .lines()
            .nth(self.line.saturating_sub(1))
            .unwrap_or("");
        let caret = " ".repeat(self.column.saturating_sub(1));
        format!(
            "{} at line {}, column {}: {}\n  {}\n  {}^",
            self.kind, self.line, self.column, self.message, line_text, caret
        )
    }
}

impl From<ExprError> for mp_core::Error {
    fn from(err: ExprError) -> Self {
        mp_core::Error::Expression(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locate_multiline() {
        let src = "exists(audio)\nand @";
        let loc = Location::locate(src, src.len() - 1);
        assert_eq!(loc.line, 2);
        assert_eq!(loc.column, 5);
        assert_eq!(loc.position, 18);
    }

    #[test]
    fn caret_rendering() {
        let src = "exists(audio) @";
        let err = ExprError::lex("Unexpected character '@'", src, Location::locate(src, 14));
        let expected = format!(
            "Lex error at line 1, column 15: Unexpected character '@'\n  exists(audio) @\n  {}^",
            " ".repeat(14)
        );
        assert_eq!(err.to_string(), expected);
    }

    #[test]
    fn converts_to_core_error() {
        let err = ExprError::parse("Empty expression", "", Location::default());
        let core: mp_core::Error = err.into();
        assert_eq!(core.kind(), mp_core::ErrorKind::Validation);
        assert!(core.to_string().contains("Empty expression"));
    }
}
