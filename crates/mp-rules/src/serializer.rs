//! Render a [`Condition`] back to canonical expression text.
//!
//! `parse(serialize(c)) == c` for every condition the parser can produce.
//! Parentheses are emitted only where precedence requires them.

use std::fmt::Write;

use crate::condition::{
    Condition, OriginCheck, StringMatch, TrackFilters, DEFAULT_MIN_CONFIDENCE,
    DEFAULT_MULTI_LANGUAGE_THRESHOLD,
};
use crate::value::{MetadataOp, Scalar, Value};

const KEYWORDS: &[&str] = &["and", "or", "not", "in", "true", "false"];

/// Binding strength; higher binds tighter.
fn precedence(cond: &Condition) -> u8 {
    match cond {
        Condition::Or(_) => 1,
        Condition::And(_) => 2,
        Condition::Not(_) => 3,
        _ => 4,
    }
}

/// Serialize a condition to expression text.
pub fn serialize(cond: &Condition) -> String {
    let mut out = String::new();
    write_condition(&mut out, cond);
    out
}

fn write_child(out: &mut String, child: &Condition, min_precedence: u8) {
    if precedence(child) < min_precedence {
        out.push('(');
        write_condition(out, child);
        out.push(')');
    } else {
        write_condition(out, child);
    }
}

fn write_joined(out: &mut String, parts: &[Condition], keyword: &str, min_precedence: u8) {
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            let _ = write!(out, " {keyword} ");
        }
        write_child(out, part, min_precedence);
    }
}

fn write_condition(out: &mut String, cond: &Condition) {
    match cond {
        // A nested group of the same kind keeps its parentheses so the tree
        // shape survives a round trip.
        Condition::Or(parts) => write_joined(out, parts, "or", 2),
        Condition::And(parts) => write_joined(out, parts, "and", 3),
        Condition::Not(inner) => {
            out.push_str("not ");
            write_child(out, inner, 3);
        }
        Condition::Exists {
            track_type,
            filters,
        } => {
            let mut args = vec![track_type.to_string()];
            filter_args(filters, &mut args);
            call(out, "exists", &args);
        }
        Condition::Count {
            track_type,
            filters,
            op,
            value,
        } => {
            let mut args = vec![track_type.to_string()];
            filter_args(filters, &mut args);
            call(out, "count", &args);
            let _ = write!(out, " {op} {value}");
        }
        Condition::Comparison { field, op, value } => {
            let _ = write!(out, "{field} {op} {}", value_text(value));
        }
        Condition::TitleMatch {
            track_type,
            pattern,
        } => {
            let mut args = Vec::new();
            if let Some(kind) = track_type {
                args.push(kind.to_string());
            }
            args.push(quote(pattern.as_str()));
            call(out, "title_match", &args);
        }
        Condition::AudioIsMultiLanguage {
            threshold,
            track_index,
            primary_language,
        } => {
            let mut args = Vec::new();
            if *threshold != DEFAULT_MULTI_LANGUAGE_THRESHOLD {
                args.push(format!("threshold == {}", float_text(*threshold)));
            }
            if let Some(index) = track_index {
                args.push(format!("track_index == {index}"));
            }
            if let Some(lang) = primary_language {
                args.push(format!("primary_language == {}", text(lang)));
            }
            call(out, "multi_language", &args);
        }
        Condition::PluginMetadata {
            plugin,
            field,
            op,
            value,
        } => {
            call(out, "plugin", &[text(plugin), text(field)]);
            write_metadata_tail(out, *op, value.as_ref());
        }
        Condition::ContainerMetadata { field, op, value } => {
            call(out, "container_meta", &[text(field)]);
            write_metadata_tail(out, *op, value.as_ref());
        }
        Condition::IsOriginal(check) => call(out, "is_original", &origin_args(check)),
        Condition::IsDubbed(check) => call(out, "is_dubbed", &origin_args(check)),
    }
}

fn call(out: &mut String, name: &str, args: &[String]) {
    let _ = write!(out, "{name}({})", args.join(", "));
}

fn write_metadata_tail(out: &mut String, op: MetadataOp, value: Option<&Scalar>) {
    if let (false, Some(value)) = (op == MetadataOp::Exists, value) {
        let _ = write!(out, " {op} {}", scalar_text(value));
    }
}

fn filter_args(filters: &TrackFilters, args: &mut Vec<String>) {
    if let Some(m) = &filters.language {
        args.push(string_match("lang", m));
    }
    if let Some(m) = &filters.codec {
        args.push(string_match("codec", m));
    }
    for (name, filter) in [
        ("channels", filters.channels),
        ("height", filters.height),
        ("width", filters.width),
    ] {
        if let Some(f) = filter {
            args.push(format!("{name} {} {}", f.op, f.value));
        }
    }
    if let Some(b) = filters.is_default {
        args.push(format!("default == {b}"));
    }
    if let Some(b) = filters.is_forced {
        args.push(format!("forced == {b}"));
    }
    if let Some(title) = &filters.title {
        args.push(format!("title == {}", quote(title)));
    }
    match filters.not_commentary {
        Some(true) => args.push("not_commentary".into()),
        Some(false) => args.push("not_commentary == false".into()),
        None => {}
    }
}

fn string_match(name: &str, m: &StringMatch) -> String {
    match m {
        StringMatch::One(v) => format!("{name} == {}", text(v)),
        StringMatch::AnyOf(vs) => {
            let items: Vec<String> = vs.iter().map(|v| text(v)).collect();
            format!("{name} in [{}]", items.join(", "))
        }
    }
}

fn origin_args(check: &OriginCheck) -> Vec<String> {
    let mut args = Vec::new();
    if !check.value {
        args.push("value == false".into());
    }
    if check.min_confidence != DEFAULT_MIN_CONFIDENCE {
        args.push(format!("confidence == {}", float_text(check.min_confidence)));
    }
    if let Some(lang) = &check.language {
        args.push(format!("lang == {}", text(lang)));
    }
    args
}

// ---------------------------------------------------------------------------
// Literals
// ---------------------------------------------------------------------------

fn is_plain_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    let leading_ok = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    leading_ok
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        && !KEYWORDS.contains(&s)
}

fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out.push('"');
    out
}

/// Bare when it lexes as a single identifier, quoted otherwise.
fn text(s: &str) -> String {
    if is_plain_identifier(s) {
        s.to_string()
    } else {
        quote(s)
    }
}

/// Floats always carry a decimal point so they re-parse as floats.
fn float_text(f: f64) -> String {
    if f.is_finite() && f.fract() == 0.0 {
        format!("{f:.1}")
    } else {
        format!("{f}")
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::Text(s) => text(s),
        Value::Int(i) => i.to_string(),
        Value::Float(f) => float_text(*f),
        Value::Bool(b) => b.to_string(),
        Value::Size(s) => s.raw.clone(),
        Value::List(items) => {
            let items: Vec<String> = items.iter().map(value_text).collect();
            format!("[{}]", items.join(", "))
        }
    }
}

fn scalar_text(value: &Scalar) -> String {
    match value {
        Scalar::Text(s) => text(s),
        Scalar::Int(i) => i.to_string(),
        Scalar::Float(f) => float_text(*f),
        Scalar::Bool(b) => b.to_string(),
    }
}
