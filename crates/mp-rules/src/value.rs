//! Operators and literal values shared by the parser, evaluator and serializer.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Operators
// ---------------------------------------------------------------------------

/// Comparison operator as written in an expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    In,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Neq => "!=",
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::In => "in",
        }
    }

    /// Whether the operator orders its operands (`< <= > >=`).
    pub fn is_ordering(&self) -> bool {
        matches!(self, Self::Lt | Self::Lte | Self::Gt | Self::Gte)
    }

    /// Apply the operator to two ordered values. `In` never matches here.
    pub fn compare<T: PartialOrd + ?Sized>(&self, actual: &T, expected: &T) -> bool {
        match self {
            Self::Eq => actual == expected,
            Self::Neq => actual != expected,
            Self::Lt => actual < expected,
            Self::Lte => actual <= expected,
            Self::Gt => actual > expected,
            Self::Gte => actual >= expected,
            Self::In => false,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operator of a plugin or container metadata check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetadataOp {
    /// The field is present with a value.
    Exists,
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    /// Case-insensitive substring match on the string form.
    Contains,
}

impl MetadataOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exists => "exists",
            Self::Eq => "==",
            Self::Neq => "!=",
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Contains => "contains",
        }
    }

    pub fn from_operator(op: Operator) -> Option<Self> {
        match op {
            Operator::Eq => Some(Self::Eq),
            Operator::Neq => Some(Self::Neq),
            Operator::Lt => Some(Self::Lt),
            Operator::Lte => Some(Self::Lte),
            Operator::Gt => Some(Self::Gt),
            Operator::Gte => Some(Self::Gte),
            Operator::In => None,
        }
    }

    fn ordering(&self) -> Option<Operator> {
        match self {
            Self::Lt => Some(Operator::Lt),
            Self::Lte => Some(Operator::Lte),
            Self::Gt => Some(Operator::Gt),
            Self::Gte => Some(Operator::Gte),
            _ => None,
        }
    }

    /// Compare an actual metadata value against the expected one.
    ///
    /// String equality is case-insensitive; ordering needs numbers on both
    /// sides. With `coerce` set, a textual actual value is parsed as a number
    /// for ordering (container tags are always strings).
    pub fn apply(&self, actual: &Scalar, expected: Option<&Scalar>, coerce: bool) -> bool {
        let Some(expected) = expected else {
            return matches!(self, Self::Exists);
        };
        match self {
            Self::Exists => true,
            Self::Eq => actual.loose_eq(expected),
            Self::Neq => !actual.loose_eq(expected),
            Self::Contains => actual
                .to_string()
                .to_lowercase()
                .contains(&expected.to_string().to_lowercase()),
            ordering => {
                let lhs = if coerce {
                    actual.coerce_f64()
                } else {
                    actual.as_f64()
                };
                match (lhs, expected.as_f64(), ordering.ordering()) {
                    (Some(a), Some(b), Some(op)) => op.compare(&a, &b),
                    _ => false,
                }
            }
        }
    }
}

impl fmt::Display for MetadataOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Values
// ---------------------------------------------------------------------------

/// A size literal such as `15M` (binary multiples: `k` = 1024).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeLiteral {
    /// The literal exactly as written.
    pub raw: String,
    pub bytes: u64,
}

impl SizeLiteral {
    /// Parse `15M`, `192k`, `1.5GB`; `None` when malformed.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim_end_matches(['b', 'B']);
        let unit = trimmed.chars().last()?;
        let number: f64 = trimmed[..trimmed.len() - unit.len_utf8()].parse().ok()?;
        let multiplier: u64 = match unit.to_ascii_lowercase() {
            'k' => 1 << 10,
            'm' => 1 << 20,
            'g' => 1 << 30,
            't' => 1 << 40,
            _ => return None,
        };
        Some(Self {
            raw: raw.to_string(),
            bytes: (number * multiplier as f64).round() as u64,
        })
    }
}

/// A literal on the right-hand side of a comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Value {
    /// Quoted string or bare identifier.
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Size(SizeLiteral),
    List(Vec<Value>),
}

impl Value {
    /// Numeric view: integers, floats and sizes (in bytes).
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            Self::Size(s) => Some(s.bytes as f64),
            Self::Text(t) => t.parse().ok(),
            _ => None,
        }
    }

    /// Convert to a metadata scalar; lists have no scalar form.
    pub fn to_scalar(&self) -> Option<Scalar> {
        match self {
            Self::Text(t) => Some(Scalar::Text(t.clone())),
            Self::Int(i) => Some(Scalar::Int(*i)),
            Self::Float(f) => Some(Scalar::Float(*f)),
            Self::Bool(b) => Some(Scalar::Bool(*b)),
            Self::Size(s) => i64::try_from(s.bytes).ok().map(Scalar::Int),
            Self::List(_) => None,
        }
    }
}

/// An opaque scalar supplied by plugins, container tags or caller fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Scalar {
    /// Numeric view without parsing text.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Numeric view that also parses textual numbers.
    pub fn coerce_f64(&self) -> Option<f64> {
        match self {
            Self::Text(t) => t.trim().parse().ok(),
            other => other.as_f64(),
        }
    }

    /// Equality that ignores case for text and compares numbers by value.
    pub fn loose_eq(&self, other: &Scalar) -> bool {
        match (self, other) {
            (Self::Text(a), Self::Text(b)) => a.to_lowercase() == b.to_lowercase(),
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Text(_), _) | (_, Self::Text(_)) | (Self::Bool(_), _) | (_, Self::Bool(_)) => {
                false
            }
            (a, b) => a.as_f64() == b.as_f64(),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Text(t) => f.write_str(t),
        }
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Scalar {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<i64> for Scalar {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<f64> for Scalar {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<bool> for Scalar {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_literals() {
        assert_eq!(SizeLiteral::parse("15M").unwrap().bytes, 15 * 1024 * 1024);
        assert_eq!(SizeLiteral::parse("192k").unwrap().bytes, 192 * 1024);
        assert_eq!(
            SizeLiteral::parse("1.5GB").unwrap().bytes,
            3 * 512 * 1024 * 1024
        );
        assert!(SizeLiteral::parse("15").is_none());
    }

    #[test]
    fn operator_compare() {
        assert!(Operator::Gte.compare(&2, &2));
        assert!(Operator::Lt.compare(&1.5, &2.0));
        assert!(Operator::Neq.compare("a", "b"));
        assert!(!Operator::In.compare(&1, &1));
    }

    #[test]
    fn metadata_equality_ignores_case() {
        let actual = Scalar::from("JPN");
        assert!(MetadataOp::Eq.apply(&actual, Some(&Scalar::from("jpn")), false));
        assert!(!MetadataOp::Neq.apply(&actual, Some(&Scalar::from("jpn")), false));
        assert!(MetadataOp::Contains.apply(&Scalar::from("Anime Movie"), Some(&"anime".into()), false));
    }

    #[test]
    fn metadata_ordering_needs_numbers() {
        let year = Scalar::Int(1999);
        assert!(MetadataOp::Lt.apply(&year, Some(&Scalar::Int(2000)), false));
        assert!(!MetadataOp::Lt.apply(&Scalar::from("1999"), Some(&Scalar::Int(2000)), false));
        assert!(MetadataOp::Lt.apply(&Scalar::from("1999"), Some(&Scalar::Int(2000)), true));
        assert!(!MetadataOp::Gt.apply(&year, Some(&Scalar::from("x")), false));
    }

    #[test]
    fn scalar_from_json() {
        let s: Scalar = serde_json::from_str("\"eng\"").unwrap();
        assert_eq!(s, Scalar::from("eng"));
        let n: Scalar = serde_json::from_str("7.5").unwrap();
        assert_eq!(n, Scalar::Float(7.5));
        let i: Scalar = serde_json::from_str("3").unwrap();
        assert_eq!(i, Scalar::Int(3));
    }
}
