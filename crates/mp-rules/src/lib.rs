//! # mp-rules
//!
//! The condition expression language and the conditional rule engine.
//!
//! Policies describe when something should happen with small expressions such
//! as `exists(audio, lang == eng) and not count(subtitle) > 3`. This crate
//! lexes, parses, serializes and evaluates those expressions, and runs the
//! actions attached to conditional rules.
//!
//! ## Overview
//!
//! - [`lexer`] -- logos tokenizer with line/column tracking.
//! - [`parser`] -- recursive-descent parser producing a [`Condition`].
//! - [`serializer`] -- canonical text form of a [`Condition`].
//! - [`Condition`] -- the closed condition model, evaluated against tracks
//!   and an [`EvalContext`].
//! - [`Action`] -- what a rule branch does; executed into [`RuleChange`]s.
//! - [`ConditionalRule`] / [`RuleSet`] -- named rules and match modes.
//! - [`evaluate_rules`] -- runs a rule set and returns a [`ConditionalResult`].

pub mod action;
pub mod condition;
pub mod context;
pub mod engine;
pub mod error;
pub mod evaluate;
pub mod lexer;
pub mod parser;
pub mod rule;
pub mod serializer;
pub mod value;

pub use action::{
    execute_actions, Action, ActionOutcome, ControlSignal, FlagKind, PluginRef, RuleChange,
    SkipFlags, SkipScope, TrackSelector,
};
pub use condition::{Condition, NumericFilter, OriginCheck, StringMatch, TitlePattern, TrackFilters};
pub use context::{
    CommentaryMatcher, EvalContext, LanguageAnalysis, LanguageShare, OriginStatus,
    PluginMetadata, TrackOrigin,
};
pub use engine::{evaluate_rules, Branch, ConditionalResult, RuleEvaluation};
pub use error::{ExprError, ExprErrorKind};
pub use evaluate::matches_track;
pub use parser::{parse, parse_with_max_depth};
pub use rule::{ConditionalRule, MatchMode, RuleSet};
pub use serializer::serialize;
pub use value::{MetadataOp, Operator, Scalar, SizeLiteral, Value};

/// Deserialize a rule set from a JSON string.
///
/// Conditions are stored as expression text and parsed on the way in, so an
/// invalid expression fails the whole document.
pub fn rule_set_from_json(json: &str) -> Result<RuleSet, serde_json::Error> {
    serde_json::from_str(json)
}

/// Serialize a rule set to a pretty-printed JSON string.
pub fn rule_set_to_json(rules: &RuleSet) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(rules)
}
