//! Logos-based tokenizer for condition expressions.
//!
//! Keywords and booleans are lowercase only, so `AND` or `True` lex as
//! identifiers. Identifiers may contain `.` and `-` so codec names such as
//! `dts-hd` and `h.265` stay a single token.

use logos::{Lexer, Logos};

use crate::error::{ExprError, Location};

/// Token types emitted by the Logos lexer.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n]+")]
pub enum Token<'src> {
    // -----------------------------------------------------------------
    // Punctuation
    // -----------------------------------------------------------------
    #[token("(")]
    LParen,

    #[token(")")]
    RParen,

    #[token("[")]
    LBracket,

    #[token("]")]
    RBracket,

    #[token(",")]
    Comma,

    // -----------------------------------------------------------------
    // Operators
    // -----------------------------------------------------------------
    #[token("==")]
    Eq,

    #[token("!=")]
    Neq,

    #[token("<")]
    Lt,

    #[token("<=")]
    Lte,

    #[token(">")]
    Gt,

    #[token(">=")]
    Gte,

    #[token("in")]
    In,

    #[token("and")]
    And,

    #[token("or")]
    Or,

    #[token("not")]
    Not,

    // -----------------------------------------------------------------
    // Literals
    // -----------------------------------------------------------------
    #[token("true", |_| true)]
    #[token("false", |_| false)]
    Bool(bool),

    /// Number with a unit suffix: `15M`, `192k`, `1.5GB`.
    #[regex(r"[0-9]+(\.[0-9]+)?[kKmMgGtT][bB]?", priority = 4)]
    Size(&'src str),

    /// Integer or decimal: `42`, `3.14`.
    #[regex(r"[0-9]+(\.[0-9]+)?", priority = 3)]
    Number(&'src str),

    /// Quoted string with escapes resolved.
    #[regex(r#""([^"\\]|\\.)*""#, unquote)]
    #[regex(r#"'([^'\\]|\\.)*'"#, unquote)]
    Str(String),

    /// Bare identifier (lowest priority).
    #[regex(r"[A-Za-z_][A-Za-z0-9_.\-]*", priority = 1)]
    Ident(&'src str),
}

fn unquote<'s>(lex: &mut Lexer<'s, Token<'s>>) -> String {
    let raw = lex.slice();
    let inner = &raw[1..raw.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

impl Token<'_> {
    /// Whether the token is one of the comparison operators (including `in`).
    pub fn is_operator(&self) -> bool {
        matches!(
            self,
            Token::Eq | Token::Neq | Token::Lt | Token::Lte | Token::Gt | Token::Gte | Token::In
        )
    }
}

/// A token together with its byte span and 1-based line/column.
#[derive(Debug, Clone, PartialEq)]
pub struct SpannedToken<'src> {
    pub token: Token<'src>,
    pub span: std::ops::Range<usize>,
    pub line: usize,
    pub column: usize,
}

impl SpannedToken<'_> {
    pub fn location(&self) -> Location {
        Location {
            position: self.span.start,
            line: self.line,
            column: self.column,
        }
    }
}

/// Tokenize an expression, failing on the first unrecognized input.
pub fn tokenize(input: &str) -> Result<Vec<SpannedToken<'_>>, ExprError> {
    let mut tokens = Vec::new();
    // Line/column are derived incrementally from the previous token.
    let mut cursor = Location::locate(input, 0);

    for (result, span) in Token::lexer(input).spanned() {
        cursor = advance(input, cursor, span.start);
        match result {
            Ok(token) => tokens.push(SpannedToken {
                token,
                span,
                line: cursor.line,
                column: cursor.column,
            }),
            Err(()) => {
                let ch = input[span.start..].chars().next().unwrap_or('\0');
                let message = if ch == '"' || ch == '\'' {
                    "Unterminated string".to_string()
                } else {
                    format!("Unexpected character '{ch}'")
                };
                return Err(ExprError::lex(message, input, cursor));
            }
        }
    }
    Ok(tokens)
}

fn advance(input: &str, from: Location, to: usize) -> Location {
    let mut loc = from;
    for ch in input[from.position..to].chars() {
        if ch == '\n' {
            loc.line += 1;
            loc.column = 1;
        } else {
            loc.column += 1;
        }
    }
    loc.position = to;
    loc
}
