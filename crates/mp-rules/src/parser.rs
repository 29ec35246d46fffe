//! Recursive-descent parser turning expression text into a [`Condition`].
//!
//! Grammar (precedence: `not` > comparisons > `and` > `or`):
//!
//! ```text
//! expression = or_expr
//! or_expr    = and_expr ('or' and_expr)*
//! and_expr   = not_expr ('and' not_expr)*
//! not_expr   = 'not' not_expr | atom
//! atom       = '(' expression ')' | call | field_comparison
//! call       = IDENT '(' args? ')' (op value)?
//! field_comparison = IDENT op value
//! args       = arg (',' arg)*
//! arg        = IDENT op value | IDENT | STRING | op value   (last, count only)
//! op         = '==' | '!=' | '<' | '<=' | '>' | '>=' | 'in'
//! value      = STRING | NUMBER | SIZE | IDENT | BOOLEAN | list
//! list       = '[' value (',' value)* ']'
//! ```

use mp_core::TrackKind;

use crate::condition::{
    Condition, NumericFilter, OriginCheck, StringMatch, TitlePattern, TrackFilters,
    DEFAULT_MULTI_LANGUAGE_THRESHOLD,
};
use crate::error::{ExprError, Location};
use crate::lexer::{tokenize, SpannedToken, Token};
use crate::value::{MetadataOp, Operator, SizeLiteral, Value};

/// Maximum nesting of parentheses and `not` accepted by [`parse`].
pub const DEFAULT_MAX_DEPTH: usize = mp_core::config::MAX_EXPRESSION_DEPTH;

const FILTER_NAMES: &str =
    "channels, codec, default, forced, height, lang, language, not_commentary, title, width";

type ParseResult<T> = Result<T, ExprError>;

/// Parse an expression with the default nesting limit.
pub fn parse(source: &str) -> ParseResult<Condition> {
    parse_with_max_depth(source, DEFAULT_MAX_DEPTH)
}

/// Parse an expression, rejecting nesting deeper than `max_depth`.
pub fn parse_with_max_depth(source: &str, max_depth: usize) -> ParseResult<Condition> {
    if source.trim().is_empty() {
        return Err(ExprError::parse(
            "Empty expression",
            source,
            Location::locate(source, 0),
        ));
    }

    let tokens = tokenize(source)?;
    let mut parser = Parser {
        source,
        tokens,
        pos: 0,
        depth: 0,
        max_depth,
    };
    let condition = parser.expression()?;

    if let Some(tok) = parser.peek() {
        return Err(parser.error_at(
            tok.location(),
            format!("Unexpected token '{}' after expression", parser.text(tok)),
        ));
    }
    Ok(condition)
}

// ---------------------------------------------------------------------------
// Arguments
// ---------------------------------------------------------------------------

struct NamedArg {
    name: String,
    op: Operator,
    value: Value,
    at: Location,
}

struct PositionalArg {
    text: String,
    at: Location,
}

enum TrailingOp {
    Op(Operator),
    Contains,
}

struct Trailing {
    op: TrailingOp,
    value: Value,
    at: Location,
}

#[derive(Default)]
struct Args {
    positional: Vec<PositionalArg>,
    named: Vec<NamedArg>,
    /// `count(subtitle, >= 1)`: the comparison written as the last argument.
    inline: Option<Trailing>,
}

struct Call {
    name: String,
    at: Location,
    positional: Vec<PositionalArg>,
    named: Vec<NamedArg>,
    trailing: Option<Trailing>,
}

fn operator_of(token: &Token<'_>) -> Option<Operator> {
    Some(match token {
        Token::Eq => Operator::Eq,
        Token::Neq => Operator::Neq,
        Token::Lt => Operator::Lt,
        Token::Lte => Operator::Lte,
        Token::Gt => Operator::Gt,
        Token::Gte => Operator::Gte,
        Token::In => Operator::In,
        _ => return None,
    })
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::Text(t) => Some(t.clone()),
        Value::Int(i) => Some(i.to_string()),
        Value::Float(f) => Some(f.to_string()),
        _ => None,
    }
}

fn value_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Text(t) if t.eq_ignore_ascii_case("true") => Some(true),
        Value::Text(t) if t.eq_ignore_ascii_case("false") => Some(false),
        _ => None,
    }
}

fn value_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Int(i) => Some(*i as f64),
        Value::Float(f) => Some(*f),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

struct Parser<'src> {
    source: &'src str,
    tokens: Vec<SpannedToken<'src>>,
    pos: usize,
    depth: usize,
    max_depth: usize,
}

impl<'src> Parser<'src> {
    fn peek(&self) -> Option<&SpannedToken<'src>> {
        self.tokens.get(self.pos)
    }

    fn peek_token(&self) -> Option<&Token<'src>> {
        self.peek().map(|t| &t.token)
    }

    fn peek_nth(&self, n: usize) -> Option<&Token<'src>> {
        self.tokens.get(self.pos + n).map(|t| &t.token)
    }

    fn advance(&mut self) -> Option<SpannedToken<'src>> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn text(&self, tok: &SpannedToken<'_>) -> &'src str {
        &self.source[tok.span.clone()]
    }

    fn here(&self) -> Location {
        match self.peek() {
            Some(tok) => tok.location(),
            None => Location::locate(self.source, self.source.len()),
        }
    }

    fn describe_current(&self) -> String {
        match self.peek() {
            Some(tok) => format!("'{}'", self.text(tok)),
            None => "end of expression".into(),
        }
    }

    fn error(&self, message: impl Into<String>) -> ExprError {
        ExprError::parse(message, self.source, self.here())
    }

    fn error_at(&self, at: Location, message: impl Into<String>) -> ExprError {
        ExprError::parse(message, self.source, at)
    }

    fn expect(&mut self, expected: Token<'src>, what: &str) -> ParseResult<SpannedToken<'src>> {
        if self.peek_token() == Some(&expected) {
            if let Some(tok) = self.advance() {
                return Ok(tok);
            }
        }
        Err(self.error(format!("Expected {what}, got {}", self.describe_current())))
    }

    fn enter(&mut self) -> ParseResult<()> {
        self.depth += 1;
        if self.depth > self.max_depth {
            return Err(self.error(format!(
                "Expression nesting exceeds maximum depth of {}",
                self.max_depth
            )));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    // ---- Grammar productions ----

    fn expression(&mut self) -> ParseResult<Condition> {
        self.or_expr()
    }

    fn or_expr(&mut self) -> ParseResult<Condition> {
        let mut parts = vec![self.and_expr()?];
        while self.peek_token() == Some(&Token::Or) {
            self.advance();
            parts.push(self.and_expr()?);
        }
        Ok(if parts.len() == 1 {
            parts.remove(0)
        } else {
            Condition::Or(parts)
        })
    }

    fn and_expr(&mut self) -> ParseResult<Condition> {
        let mut parts = vec![self.not_expr()?];
        while self.peek_token() == Some(&Token::And) {
            self.advance();
            parts.push(self.not_expr()?);
        }
        Ok(if parts.len() == 1 {
            parts.remove(0)
        } else {
            Condition::And(parts)
        })
    }

    fn not_expr(&mut self) -> ParseResult<Condition> {
        if self.peek_token() != Some(&Token::Not) {
            return self.atom();
        }
        self.advance();
        self.enter()?;
        let inner = self.not_expr()?;
        self.leave();
        Ok(Condition::Not(Box::new(inner)))
    }

    fn atom(&mut self) -> ParseResult<Condition> {
        match self.peek_token() {
            Some(Token::LParen) => {
                self.enter()?;
                self.advance();
                let inner = self.expression()?;
                self.expect(Token::RParen, "')'")?;
                self.leave();
                Ok(inner)
            }
            Some(Token::Ident(name)) => {
                let name = *name;
                match self.peek_nth(1) {
                    Some(Token::LParen) => self.call(),
                    Some(tok) if tok.is_operator() => self.field_comparison(),
                    _ => {
                        self.advance();
                        Err(self.error(format!(
                            "Expected '(' or operator after '{name}', got {}",
                            self.describe_current()
                        )))
                    }
                }
            }
            _ => Err(self.error(format!(
                "Expected function call or '(', got {}",
                self.describe_current()
            ))),
        }
    }

    fn field_comparison(&mut self) -> ParseResult<Condition> {
        let Some(field_tok) = self.advance() else {
            return Err(self.error("Expected field name"));
        };
        let field = self.text(&field_tok).to_lowercase();
        let op = match self.advance().as_ref().and_then(|t| operator_of(&t.token)) {
            Some(op) => op,
            None => return Err(self.error_at(field_tok.location(), "Expected operator")),
        };
        let value_at = self.here();
        let value = self.value()?;
        if matches!(value, Value::List(_)) && op != Operator::In {
            return Err(self.error_at(value_at, "List values require the 'in' operator"));
        }
        Ok(Condition::Comparison { field, op, value })
    }

    fn call(&mut self) -> ParseResult<Condition> {
        let Some(name_tok) = self.advance() else {
            return Err(self.error("Expected function name"));
        };
        let name = self.text(&name_tok).to_lowercase();
        self.expect(Token::LParen, "'('")?;

        let mut args = Args::default();
        if self.peek_token() != Some(&Token::RParen) {
            self.arg(&name, &mut args)?;
            while self.peek_token() == Some(&Token::Comma) {
                self.advance();
                self.arg(&name, &mut args)?;
            }
        }
        self.expect(Token::RParen, "')'")?;

        let mut trailing = self.trailing(&name)?;
        if let Some(inline) = args.inline {
            if trailing.is_some() {
                return Err(self.error_at(inline.at, "count() comparison given twice"));
            }
            trailing = Some(inline);
        }
        let call = Call {
            name,
            at: name_tok.location(),
            positional: args.positional,
            named: args.named,
            trailing,
        };
        self.build(call)
    }

    fn arg(&mut self, function: &str, args: &mut Args) -> ParseResult<()> {
        let at = self.here();
        if args.inline.is_some() {
            return Err(self.error("count() comparison must be the last argument"));
        }
        match self.peek_token().cloned() {
            Some(tok) if function == "count" && tok.is_operator() => {
                self.advance();
                let op = operator_of(&tok).map(TrailingOp::Op);
                let value = self.value()?;
                if let Some(op) = op {
                    args.inline = Some(Trailing { op, value, at });
                }
                Ok(())
            }
            Some(Token::Ident(ident)) => {
                self.advance();
                let op = self.peek_token().and_then(operator_of);
                if let Some(op) = op {
                    self.advance();
                    let value = self.value()?;
                    args.named.push(NamedArg {
                        name: ident.to_lowercase(),
                        op,
                        value,
                        at,
                    });
                } else {
                    args.positional.push(PositionalArg {
                        text: ident.to_string(),
                        at,
                    });
                }
                Ok(())
            }
            Some(Token::Str(text)) => {
                self.advance();
                args.positional.push(PositionalArg { text, at });
                Ok(())
            }
            _ => Err(self.error(format!(
                "Expected identifier, got {}",
                self.describe_current()
            ))),
        }
    }

    fn trailing(&mut self, name: &str) -> ParseResult<Option<Trailing>> {
        let at = self.here();
        let op = match self.peek_token() {
            Some(tok) if tok.is_operator() => operator_of(tok).map(TrailingOp::Op),
            Some(Token::Ident(word))
                if word.eq_ignore_ascii_case("contains")
                    && matches!(name, "plugin" | "container_meta") =>
            {
                Some(TrailingOp::Contains)
            }
            _ => None,
        };
        let Some(op) = op else {
            return Ok(None);
        };
        self.advance();
        let value = self.value()?;
        Ok(Some(Trailing { op, value, at }))
    }

    fn value(&mut self) -> ParseResult<Value> {
        let Some(tok) = self.peek().cloned() else {
            return Err(self.error("Expected value, got end of expression"));
        };
        let at = tok.location();
        let value = match tok.token {
            Token::Str(s) => Value::Text(s),
            Token::Ident(s) => Value::Text(s.to_string()),
            Token::Bool(b) => Value::Bool(b),
            Token::Number(n) if n.contains('.') => n
                .parse()
                .map(Value::Float)
                .map_err(|_| self.error_at(at, format!("Invalid number '{n}'")))?,
            Token::Number(n) => n
                .parse()
                .map(Value::Int)
                .map_err(|_| self.error_at(at, format!("Invalid number '{n}'")))?,
            Token::Size(s) => SizeLiteral::parse(s)
                .map(Value::Size)
                .ok_or_else(|| self.error_at(at, format!("Invalid size '{s}'")))?,
            Token::LBracket => return self.list(),
            _ => {
                return Err(self.error(format!(
                    "Expected value, got {}",
                    self.describe_current()
                )))
            }
        };
        self.advance();
        Ok(value)
    }

    fn list(&mut self) -> ParseResult<Value> {
        self.expect(Token::LBracket, "'['")?;
        let mut values = vec![self.list_item()?];
        while self.peek_token() == Some(&Token::Comma) {
            self.advance();
            values.push(self.list_item()?);
        }
        self.expect(Token::RBracket, "']'")?;
        Ok(Value::List(values))
    }

    /// Lists are flat: `[` inside a list is rejected before recursing.
    fn list_item(&mut self) -> ParseResult<Value> {
        if self.peek_token() == Some(&Token::LBracket) {
            return Err(self.error("Nested lists are not supported"));
        }
        self.value()
    }

    // ---- Condition builders ----

    fn build(&self, call: Call) -> ParseResult<Condition> {
        match call.name.as_str() {
            "exists" | "count" => self.build_track_query(call),
            "multi_language" => self.build_multi_language(call),
            "plugin" => self.build_metadata(call, 2),
            "container_meta" => self.build_metadata(call, 1),
            "is_original" | "is_dubbed" => self.build_origin(call),
            "title_match" => self.build_title_match(call),
            other => Err(self.error_at(call.at, format!("Unknown function: '{other}'"))),
        }
    }

    fn track_kind(&self, arg: &PositionalArg) -> ParseResult<TrackKind> {
        arg.text.parse().map_err(|_| {
            self.error_at(
                arg.at,
                format!(
                    "Invalid track type: '{}'. Expected one of: attachment, audio, subtitle, video",
                    arg.text
                ),
            )
        })
    }

    fn reject_trailing(&self, call: &Call) -> ParseResult<()> {
        match &call.trailing {
            Some(t) => Err(self.error_at(
                t.at,
                format!("{}() does not support trailing comparison operators", call.name),
            )),
            None => Ok(()),
        }
    }

    fn reject_positional(&self, call: &Call) -> ParseResult<()> {
        match call.positional.first() {
            Some(arg) => Err(self.error_at(
                arg.at,
                format!("{}() takes only named arguments, got '{}'", call.name, arg.text),
            )),
            None => Ok(()),
        }
    }

    fn reject_named(&self, call: &Call) -> ParseResult<()> {
        match call.named.first() {
            Some(arg) => Err(self.error_at(
                arg.at,
                format!("{}() does not take named arguments, got '{}'", call.name, arg.name),
            )),
            None => Ok(()),
        }
    }

    fn build_track_query(&self, call: Call) -> ParseResult<Condition> {
        let Some(first) = call.positional.first() else {
            return Err(self.error_at(
                call.at,
                format!(
                    "{}() requires a track type argument (video, audio, subtitle, attachment)",
                    call.name
                ),
            ));
        };
        let track_type = self.track_kind(first)?;
        let mut filters = self.filters(&call.named)?;
        for extra in &call.positional[1..] {
            if extra.text.eq_ignore_ascii_case("not_commentary") {
                filters.not_commentary = Some(true);
            } else {
                return Err(self.error_at(extra.at, format!("Unexpected argument '{}'", extra.text)));
            }
        }

        if call.name == "exists" {
            self.reject_trailing(&call)?;
            return Ok(Condition::Exists {
                track_type,
                filters,
            });
        }

        let Some(trailing) = call.trailing else {
            return Err(self.error_at(
                call.at,
                "count() requires a trailing comparison (e.g., count(audio) >= 2)",
            ));
        };
        let op = match trailing.op {
            TrailingOp::Op(op) if op != Operator::Neq && op != Operator::In => op,
            _ => {
                return Err(self.error_at(
                    trailing.at,
                    "count() only supports ==, <, <=, >, >= operators",
                ))
            }
        };
        let value = match trailing.value {
            Value::Int(n) => u64::try_from(n).ok(),
            _ => None,
        }
        .ok_or_else(|| {
            self.error_at(trailing.at, "count() comparison value must be a non-negative integer")
        })?;

        Ok(Condition::Count {
            track_type,
            filters,
            op,
            value,
        })
    }

    fn filters(&self, named: &[NamedArg]) -> ParseResult<TrackFilters> {
        let mut filters = TrackFilters::default();
        for arg in named {
            match arg.name.as_str() {
                "lang" | "language" => filters.language = Some(self.string_match(arg)?),
                "codec" => filters.codec = Some(self.string_match(arg)?),
                "channels" => filters.channels = Some(self.numeric(arg)?),
                "height" => filters.height = Some(self.numeric(arg)?),
                "width" => filters.width = Some(self.numeric(arg)?),
                "default" => filters.is_default = Some(self.boolean(arg)?),
                "forced" => filters.is_forced = Some(self.boolean(arg)?),
                "not_commentary" => filters.not_commentary = Some(self.boolean(arg)?),
                "title" => {
                    if arg.op != Operator::Eq {
                        return Err(self.error_at(arg.at, "Filter 'title' only supports == operator"));
                    }
                    let text = value_text(&arg.value).ok_or_else(|| {
                        self.error_at(arg.at, "Filter 'title' requires a string value")
                    })?;
                    filters.title = Some(text);
                }
                other => {
                    return Err(self.error_at(
                        arg.at,
                        format!("Unknown filter: '{other}'. Expected one of: {FILTER_NAMES}"),
                    ))
                }
            }
        }
        Ok(filters)
    }

    fn string_match(&self, arg: &NamedArg) -> ParseResult<StringMatch> {
        let bad_value =
            || self.error_at(arg.at, format!("Filter '{}' requires string values", arg.name));
        match (arg.op, &arg.value) {
            (Operator::In, Value::List(items)) => items
                .iter()
                .map(|v| value_text(v).ok_or_else(bad_value))
                .collect::<ParseResult<Vec<_>>>()
                .map(StringMatch::AnyOf),
            (Operator::In, single) => value_text(single)
                .map(|v| StringMatch::AnyOf(vec![v]))
                .ok_or_else(bad_value),
            (Operator::Eq, single) => value_text(single)
                .map(StringMatch::One)
                .ok_or_else(bad_value),
            _ => Err(self.error_at(
                arg.at,
                format!("Filter '{}' only supports == and 'in' operators", arg.name),
            )),
        }
    }

    fn numeric(&self, arg: &NamedArg) -> ParseResult<NumericFilter> {
        if matches!(arg.op, Operator::Neq | Operator::In) {
            return Err(self.error_at(
                arg.at,
                format!("Filter '{}' does not support operator '{}'", arg.name, arg.op),
            ));
        }
        match arg.value {
            Value::Int(value) => Ok(NumericFilter { op: arg.op, value }),
            _ => Err(self.error_at(
                arg.at,
                format!("Filter '{}' requires an integer value", arg.name),
            )),
        }
    }

    fn boolean(&self, arg: &NamedArg) -> ParseResult<bool> {
        if arg.op != Operator::Eq {
            return Err(self.error_at(
                arg.at,
                format!("Filter '{}' only supports == operator", arg.name),
            ));
        }
        value_bool(&arg.value).ok_or_else(|| {
            self.error_at(arg.at, format!("Filter '{}' requires true or false", arg.name))
        })
    }

    fn build_multi_language(&self, call: Call) -> ParseResult<Condition> {
        self.reject_positional(&call)?;
        self.reject_trailing(&call)?;

        let mut threshold = DEFAULT_MULTI_LANGUAGE_THRESHOLD;
        let mut track_index = None;
        let mut primary_language = None;
        for arg in &call.named {
            if arg.op != Operator::Eq {
                return Err(self.error_at(
                    arg.at,
                    "multi_language() only supports == for named arguments",
                ));
            }
            match arg.name.as_str() {
                "threshold" => {
                    threshold = value_f64(&arg.value).ok_or_else(|| {
                        self.error_at(arg.at, "Invalid threshold value: expected a number")
                    })?;
                }
                "track_index" => {
                    let index = match arg.value {
                        Value::Int(i) => usize::try_from(i).ok(),
                        _ => None,
                    };
                    track_index = Some(index.ok_or_else(|| {
                        self.error_at(arg.at, "Invalid track_index value: expected an integer")
                    })?);
                }
                "primary_language" => {
                    primary_language = Some(value_text(&arg.value).ok_or_else(|| {
                        self.error_at(arg.at, "Invalid primary_language value")
                    })?);
                }
                other => {
                    return Err(self.error_at(
                        arg.at,
                        format!("Unknown multi_language() argument: '{other}'"),
                    ))
                }
            }
        }

        Ok(Condition::AudioIsMultiLanguage {
            threshold,
            track_index,
            primary_language,
        })
    }

    fn build_metadata(&self, call: Call, arity: usize) -> ParseResult<Condition> {
        self.reject_named(&call)?;
        if call.positional.len() != arity {
            let usage = if arity == 2 {
                "plugin() requires two positional arguments: plugin(name, field)"
            } else {
                "container_meta() requires a field name argument"
            };
            return Err(self.error_at(call.at, usage));
        }

        let (op, value) = match call.trailing {
            None => (MetadataOp::Exists, None),
            Some(trailing) => {
                let op = match trailing.op {
                    TrailingOp::Contains => MetadataOp::Contains,
                    TrailingOp::Op(op) => MetadataOp::from_operator(op).ok_or_else(|| {
                        self.error_at(
                            trailing.at,
                            format!("{}() does not support 'in' operator", call.name),
                        )
                    })?,
                };
                let scalar = trailing.value.to_scalar().ok_or_else(|| {
                    self.error_at(
                        trailing.at,
                        format!("{}() comparison value must be a scalar", call.name),
                    )
                })?;
                (op, Some(scalar))
            }
        };

        let mut names = call.positional.iter().map(|a| a.text.to_lowercase());
        if arity == 2 {
            let plugin = names.next().unwrap_or_default();
            let field = names.next().unwrap_or_default();
            Ok(Condition::PluginMetadata {
                plugin,
                field,
                op,
                value,
            })
        } else {
            Ok(Condition::ContainerMetadata {
                field: names.next().unwrap_or_default(),
                op,
                value,
            })
        }
    }

    fn build_origin(&self, call: Call) -> ParseResult<Condition> {
        self.reject_positional(&call)?;
        self.reject_trailing(&call)?;

        let mut check = OriginCheck::default();
        for arg in &call.named {
            if arg.op != Operator::Eq {
                return Err(self.error_at(
                    arg.at,
                    format!("{}() only supports == for named arguments", call.name),
                ));
            }
            match arg.name.as_str() {
                "lang" | "language" => {
                    check.language = Some(value_text(&arg.value).ok_or_else(|| {
                        self.error_at(arg.at, "Invalid language value")
                    })?);
                }
                "confidence" | "min_confidence" => {
                    check.min_confidence = value_f64(&arg.value).ok_or_else(|| {
                        self.error_at(arg.at, "Invalid confidence value: expected a number")
                    })?;
                }
                "value" => {
                    check.value = value_bool(&arg.value).ok_or_else(|| {
                        self.error_at(arg.at, "Invalid value: expected true or false")
                    })?;
                }
                other => {
                    return Err(self.error_at(
                        arg.at,
                        format!("Unknown {}() argument: '{other}'", call.name),
                    ))
                }
            }
        }

        Ok(if call.name == "is_original" {
            Condition::IsOriginal(check)
        } else {
            Condition::IsDubbed(check)
        })
    }

    fn build_title_match(&self, call: Call) -> ParseResult<Condition> {
        self.reject_named(&call)?;
        self.reject_trailing(&call)?;

        let (track_type, pattern) = match call.positional.as_slice() {
            [pattern] => (None, pattern),
            [kind, pattern] => (Some(self.track_kind(kind)?), pattern),
            _ => {
                return Err(self.error_at(
                    call.at,
                    "title_match() takes a pattern and an optional track type",
                ))
            }
        };
        let compiled = TitlePattern::new(pattern.text.as_str())
            .map_err(|e| self.error_at(pattern.at, format!("Invalid regex '{}': {e}", pattern.text)))?;

        Ok(Condition::TitleMatch {
            track_type,
            pattern: compiled,
        })
    }
}
