//! Conditional rules and rule sets.

use serde::{Deserialize, Serialize};

use crate::action::Action;
use crate::condition::Condition;

/// A named condition with the actions to run when it holds or fails.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionalRule {
    pub name: String,
    /// Stored as expression text in policy documents.
    pub when: Condition,
    #[serde(default)]
    pub then: Vec<Action>,
    #[serde(default, rename = "else", skip_serializing_if = "Option::is_none")]
    pub else_actions: Option<Vec<Action>>,
}

impl ConditionalRule {
    pub fn new(name: impl Into<String>, when: Condition) -> Self {
        Self {
            name: name.into(),
            when,
            then: Vec::new(),
            else_actions: None,
        }
    }

    pub fn then(mut self, action: Action) -> Self {
        self.then.push(action);
        self
    }

    pub fn otherwise(mut self, action: Action) -> Self {
        self.else_actions.get_or_insert_with(Vec::new).push(action);
        self
    }
}

/// How a [`RuleSet`] picks the rules that run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    /// The first matching rule runs; later rules are not evaluated.
    #[default]
    First,
    /// Every rule runs its `then` or `else` branch.
    All,
}

/// An ordered list of rules evaluated together.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleSet {
    #[serde(default)]
    pub match_mode: MatchMode,
    pub rules: Vec<ConditionalRule>,
}

impl RuleSet {
    pub fn new(rules: Vec<ConditionalRule>) -> Self {
        Self {
            match_mode: MatchMode::First,
            rules,
        }
    }

    pub fn with_match_mode(mut self, mode: MatchMode) -> Self {
        self.match_mode = mode;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
