//! The closed set of conditions a policy can test.
//!
//! A [`Condition`] is an immutable tree. It is evaluated by
//! [`Condition::evaluate`](crate::evaluate) and rendered back to expression
//! text by [`serialize`](crate::serializer::serialize).
//!
//! `Serialize` and `Deserialize` go through the expression language: a
//! condition is stored in policy documents as its expression string.

use std::fmt;
use std::str::FromStr;

use mp_core::TrackKind;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ExprError;
use crate::value::{MetadataOp, Operator, Scalar, Value};

/// Default secondary-language share for `multi_language()`.
pub const DEFAULT_MULTI_LANGUAGE_THRESHOLD: f64 = 0.05;

/// Default minimum confidence for `is_original()` / `is_dubbed()`.
pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.7;

/// One string or a list of alternatives (`lang == eng`, `lang in [eng, jpn]`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StringMatch {
    One(String),
    AnyOf(Vec<String>),
}

impl StringMatch {
    pub fn values(&self) -> &[String] {
        match self {
            Self::One(v) => std::slice::from_ref(v),
            Self::AnyOf(vs) => vs,
        }
    }
}

/// Numeric track attribute test (`channels >= 6`, `height == 2160`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NumericFilter {
    pub op: Operator,
    pub value: i64,
}

/// Predicate applied to each track by `exists()` and `count()`.
///
/// A filter on an attribute the track does not carry never matches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackFilters {
    pub language: Option<StringMatch>,
    pub codec: Option<StringMatch>,
    pub channels: Option<NumericFilter>,
    pub height: Option<NumericFilter>,
    pub width: Option<NumericFilter>,
    pub is_default: Option<bool>,
    pub is_forced: Option<bool>,
    /// Case-insensitive substring of the track title.
    pub title: Option<String>,
    pub not_commentary: Option<bool>,
}

impl TrackFilters {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Parameters of `is_original()` / `is_dubbed()`.
#[derive(Debug, Clone, PartialEq)]
pub struct OriginCheck {
    pub value: bool,
    pub min_confidence: f64,
    pub language: Option<String>,
}

impl Default for OriginCheck {
    fn default() -> Self {
        Self {
            value: true,
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            language: None,
        }
    }
}

/// Case-insensitive title regex, compiled once when the expression is parsed.
#[derive(Debug, Clone)]
pub struct TitlePattern {
    source: String,
    regex: Regex,
}

impl TitlePattern {
    pub fn new(source: impl Into<String>) -> Result<Self, regex::Error> {
        let source = source.into();
        let regex = RegexBuilder::new(&source).case_insensitive(true).build()?;
        Ok(Self { source, regex })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn is_match(&self, title: &str) -> bool {
        self.regex.is_match(title)
    }
}

impl PartialEq for TitlePattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

/// A condition over a file's tracks and context.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// At least one track of the type passes the filters.
    Exists {
        track_type: TrackKind,
        filters: TrackFilters,
    },
    /// The number of passing tracks compares to `value`.
    Count {
        track_type: TrackKind,
        filters: TrackFilters,
        op: Operator,
        value: u64,
    },
    /// File-level field comparison (`container == mkv`, `file_size > 15M`).
    Comparison {
        field: String,
        op: Operator,
        value: Value,
    },
    /// Any (optionally typed) track title matches the case-insensitive regex.
    TitleMatch {
        track_type: Option<TrackKind>,
        pattern: TitlePattern,
    },
    And(Vec<Condition>),
    Or(Vec<Condition>),
    Not(Box<Condition>),
    AudioIsMultiLanguage {
        threshold: f64,
        track_index: Option<usize>,
        primary_language: Option<String>,
    },
    PluginMetadata {
        plugin: String,
        field: String,
        op: MetadataOp,
        value: Option<Scalar>,
    },
    ContainerMetadata {
        field: String,
        op: MetadataOp,
        value: Option<Scalar>,
    },
    IsOriginal(OriginCheck),
    IsDubbed(OriginCheck),
}

impl Condition {
    /// Shorthand for `exists(track_type)` with no filters.
    pub fn exists(track_type: TrackKind) -> Self {
        Self::Exists {
            track_type,
            filters: TrackFilters::default(),
        }
    }

    /// Negate this condition.
    pub fn negate(self) -> Self {
        Self::Not(Box::new(self))
    }

    /// Nesting depth as the parser counts it on the canonical text: one per
    /// `not` and one per parenthesized group.
    pub fn nesting_depth(&self) -> usize {
        fn grouped(child: &Condition, binds_tighter_than_or: bool) -> usize {
            let needs_parens = match child {
                Condition::Or(_) => true,
                Condition::And(_) => binds_tighter_than_or,
                _ => false,
            };
            usize::from(needs_parens) + child.nesting_depth()
        }
        match self {
            Self::Or(parts) => parts.iter().map(|p| grouped(p, false)).max().unwrap_or(0),
            Self::And(parts) => parts.iter().map(|p| grouped(p, true)).max().unwrap_or(0),
            Self::Not(inner) => 1 + grouped(inner, true),
            _ => 0,
        }
    }
}

impl FromStr for Condition {
    type Err = ExprError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        crate::parser::parse(s)
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&crate::serializer::serialize(self))
    }
}

impl Serialize for Condition {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&crate::serializer::serialize(self))
    }
}

impl<'de> Deserialize<'de> for Condition {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        crate::parser::parse(&text).map_err(serde::de::Error::custom)
    }
}
