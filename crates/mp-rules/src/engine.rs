//! Rule-set evaluation producing a [`ConditionalResult`].

use std::fmt;

use mp_core::TrackInfo;
use serde::{Deserialize, Serialize};

use crate::action::{execute_actions, ActionOutcome, ControlSignal, RuleChange, SkipFlags};
use crate::context::EvalContext;
use crate::rule::{ConditionalRule, MatchMode, RuleSet};

/// Which branch of a rule ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Branch {
    Then,
    Else,
}

impl fmt::Display for Branch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Then => write!(f, "then"),
            Self::Else => write!(f, "else"),
        }
    }
}

/// One line of the evaluation trace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleEvaluation {
    pub rule_name: String,
    pub matched: bool,
    pub reason: String,
}

/// Result of evaluating a [`RuleSet`] against one file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConditionalResult {
    /// The rule whose branch ran first, if any.
    pub matched_rule: Option<String>,
    pub matched_branch: Option<Branch>,
    pub warnings: Vec<String>,
    pub trace: Vec<RuleEvaluation>,
    pub skip_flags: SkipFlags,
    pub changes: Vec<RuleChange>,
    pub signal: Option<ControlSignal>,
}

impl ConditionalResult {
    /// No branch ran, or the branch produced nothing.
    pub fn is_noop(&self) -> bool {
        self.warnings.is_empty()
            && self.changes.is_empty()
            && !self.skip_flags.any()
            && self.signal.is_none()
    }

    fn record(&mut self, rule: &ConditionalRule, branch: Branch, outcome: ActionOutcome) {
        if self.matched_rule.is_none() {
            self.matched_rule = Some(rule.name.clone());
            self.matched_branch = Some(branch);
        }
        self.warnings.extend(outcome.warnings);
        self.changes.extend(outcome.changes);
        self.skip_flags.merge(outcome.skip_flags);
        if self.signal.is_none() {
            self.signal = outcome.signal;
        }
    }
}

/// Evaluate every applicable rule of `rules` and run the chosen branches.
///
/// In `first` mode the first matching rule's `then` branch runs and no later
/// rule is evaluated. When no rule matches, the last rule's `else` branch
/// runs if it has one; otherwise the result is a no-op. In `all` mode each
/// rule runs `then` or `else` on its own, stopping early on a signal.
pub fn evaluate_rules(rules: &RuleSet, tracks: &[TrackInfo], ctx: &EvalContext) -> ConditionalResult {
    let mut result = ConditionalResult::default();

    match rules.match_mode {
        MatchMode::First => {
            for rule in &rules.rules {
                let matched = trace_rule(&mut result, rule, tracks, ctx);
                if matched {
                    let outcome = execute_actions(&rule.then, &rule.name, tracks, ctx);
                    result.record(rule, Branch::Then, outcome);
                    return result;
                }
            }
            if let Some(last) = rules.rules.last() {
                if let Some(actions) = &last.else_actions {
                    let outcome = execute_actions(actions, &last.name, tracks, ctx);
                    result.record(last, Branch::Else, outcome);
                }
            }
        }
        MatchMode::All => {
            for rule in &rules.rules {
                let matched = trace_rule(&mut result, rule, tracks, ctx);
                let (branch, actions) = if matched {
                    (Branch::Then, Some(rule.then.as_slice()))
                } else {
                    (Branch::Else, rule.else_actions.as_deref())
                };
                if let Some(actions) = actions {
                    let outcome = execute_actions(actions, &rule.name, tracks, ctx);
                    result.record(rule, branch, outcome);
                }
                if result.signal.is_some() {
                    break;
                }
            }
        }
    }

    if result.matched_rule.is_none() {
        tracing::debug!("No conditional rule matched");
    }
    result
}

fn trace_rule(
    result: &mut ConditionalResult,
    rule: &ConditionalRule,
    tracks: &[TrackInfo],
    ctx: &EvalContext,
) -> bool {
    let (matched, reason) = rule.when.evaluate_traced(tracks, ctx);
    tracing::debug!(rule = %rule.name, matched, "{reason}");
    result.trace.push(RuleEvaluation {
        rule_name: rule.name.clone(),
        matched,
        reason,
    });
    matched
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{Action, SkipScope};
    use mp_core::TrackKind;

    fn make_tracks() -> Vec<TrackInfo> {
        let mut audio = TrackInfo::new(1, TrackKind::Audio);
        audio.language = Some("jpn".into());
        vec![TrackInfo::new(0, TrackKind::Video), audio]
    }

    fn warn(msg: &str) -> Action {
        Action::Warn {
            message: msg.into(),
        }
    }

    fn rule(name: &str, when: &str) -> ConditionalRule {
        ConditionalRule::new(name, when.parse().unwrap())
    }

    #[test]
    fn first_match_wins() {
        let set = RuleSet::new(vec![
            rule("english", "exists(audio, lang == eng)").then(warn("eng")),
            rule("japanese", "exists(audio, lang == jpn)").then(warn("jpn")),
            rule("video", "exists(video)").then(warn("video")),
        ]);
        let result = evaluate_rules(&set, &make_tracks(), &EvalContext::new());
        assert_eq!(result.matched_rule.as_deref(), Some("japanese"));
        assert_eq!(result.matched_branch, Some(Branch::Then));
        assert_eq!(result.warnings, vec!["jpn".to_string()]);
        // The third rule is never evaluated.
        assert_eq!(result.trace.len(), 2);
        assert!(!result.trace[0].matched);
        assert!(result.trace[1].matched);
    }

    #[test]
    fn matched_rule_else_not_run() {
        let set = RuleSet::new(vec![
            rule("a", "exists(video)").then(warn("then")).otherwise(warn("else")),
        ]);
        let result = evaluate_rules(&set, &make_tracks(), &EvalContext::new());
        assert_eq!(result.warnings, vec!["then".to_string()]);
    }

    #[test]
    fn no_match_runs_last_else() {
        let set = RuleSet::new(vec![
            rule("a", "exists(subtitle)").then(warn("a")).otherwise(warn("a-else")),
            rule("b", "exists(attachment)").then(warn("b")).otherwise(warn("b-else")),
        ]);
        let result = evaluate_rules(&set, &make_tracks(), &EvalContext::new());
        assert_eq!(result.matched_rule.as_deref(), Some("b"));
        assert_eq!(result.matched_branch, Some(Branch::Else));
        assert_eq!(result.warnings, vec!["b-else".to_string()]);
    }

    #[test]
    fn no_match_without_else_is_noop() {
        let set = RuleSet::new(vec![rule("a", "exists(subtitle)").then(warn("a"))]);
        let result = evaluate_rules(&set, &make_tracks(), &EvalContext::new());
        assert!(result.is_noop());
        assert_eq!(result.matched_rule, None);
        assert_eq!(result.trace.len(), 1);
    }

    #[test]
    fn all_mode_runs_each_rule() {
        let set = RuleSet::new(vec![
            rule("a", "exists(video)").then(Action::Skip {
                scope: SkipScope::VideoTranscode,
            }),
            rule("b", "exists(subtitle)").otherwise(warn("no subs")),
            rule("c", "exists(audio)").then(warn("audio")),
        ])
        .with_match_mode(MatchMode::All);
        let result = evaluate_rules(&set, &make_tracks(), &EvalContext::new());
        assert_eq!(result.matched_rule.as_deref(), Some("a"));
        assert!(result.skip_flags.skip_video_transcode);
        assert_eq!(result.warnings, vec!["no subs".to_string(), "audio".to_string()]);
        assert_eq!(result.trace.len(), 3);
    }

    #[test]
    fn all_mode_stops_on_signal() {
        let set = RuleSet::new(vec![
            rule("stop", "exists(video)").then(Action::Fail {
                message: "nope".into(),
            }),
            rule("later", "exists(audio)").then(warn("later")),
        ])
        .with_match_mode(MatchMode::All);
        let result = evaluate_rules(&set, &make_tracks(), &EvalContext::new());
        assert!(matches!(result.signal, Some(ControlSignal::Fail { .. })));
        assert!(result.warnings.is_empty());
        assert_eq!(result.trace.len(), 1);
    }
}
