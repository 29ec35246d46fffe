//! Actions a conditional rule can take, and their execution.
//!
//! Executing actions never mutates tracks. It produces [`RuleChange`]s that
//! the plan builder turns into planned actions, plus warnings, skip flags and
//! at most one [`ControlSignal`].

use std::fmt;

use mp_core::{languages_match, Error, TrackInfo, TrackKind};
use serde::{Deserialize, Serialize};

use crate::context::{EvalContext, MetadataLookup};
use crate::rule::ConditionalRule;

// ---------------------------------------------------------------------------
// Action model
// ---------------------------------------------------------------------------

/// What a `skip` action skips.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipScope {
    /// The rest of the current phase.
    Phase,
    /// The rest of the file.
    File,
    VideoTranscode,
    AudioTranscode,
    TrackFilter,
}

/// Tracks of one type, optionally restricted to a language.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackSelector {
    pub track_type: TrackKind,
    #[serde(default)]
    pub language: Option<String>,
}

impl TrackSelector {
    pub fn new(track_type: TrackKind) -> Self {
        Self {
            track_type,
            language: None,
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    fn select<'a>(&self, tracks: &'a [TrackInfo]) -> Vec<&'a TrackInfo> {
        select_tracks(tracks, self.track_type, self.language.as_deref())
    }
}

/// Reference to a plugin-supplied metadata field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginRef {
    pub plugin: String,
    pub field: String,
}

/// An action executed when a rule's branch runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    Skip {
        scope: SkipScope,
    },
    /// Record a warning; `{filename}`, `{path}` and `{rule_name}` are expanded.
    Warn {
        message: String,
    },
    /// Abort with an error; placeholders as for `Warn`.
    Fail {
        message: String,
    },
    SetDefault(TrackSelector),
    ClearDefault(TrackSelector),
    SetForced(TrackSelector),
    ClearForced(TrackSelector),
    SetLanguage {
        track_type: TrackKind,
        #[serde(default)]
        language: Option<String>,
        #[serde(default)]
        from_plugin: Option<PluginRef>,
        /// Only retag tracks whose current language matches.
        #[serde(default)]
        match_language: Option<String>,
    },
    SetTitle {
        track_type: TrackKind,
        #[serde(default)]
        language: Option<String>,
        title: String,
    },
    /// Set a container tag; an empty value clears it.
    SetContainerMetadata {
        field: String,
        #[serde(default)]
        value: Option<String>,
        #[serde(default)]
        from_plugin: Option<PluginRef>,
    },
    Conditional(Box<ConditionalRule>),
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Skip flags consulted by later operations of the same phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SkipFlags {
    pub skip_video_transcode: bool,
    pub skip_audio_transcode: bool,
    pub skip_track_filter: bool,
}

impl SkipFlags {
    pub fn merge(&mut self, other: SkipFlags) {
        self.skip_video_transcode |= other.skip_video_transcode;
        self.skip_audio_transcode |= other.skip_audio_transcode;
        self.skip_track_filter |= other.skip_track_filter;
    }

    pub fn any(&self) -> bool {
        self.skip_video_transcode || self.skip_audio_transcode || self.skip_track_filter
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlagKind {
    Default,
    Forced,
}

impl fmt::Display for FlagKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => write!(f, "default"),
            Self::Forced => write!(f, "forced"),
        }
    }
}

/// A metadata change requested by a rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "change", rename_all = "snake_case")]
pub enum RuleChange {
    Flag {
        track_index: usize,
        flag: FlagKind,
        value: bool,
    },
    Language {
        track_index: usize,
        language: String,
    },
    Title {
        track_index: usize,
        title: String,
    },
    ContainerMetadata {
        field: String,
        value: String,
    },
}

/// Control flow requested by a rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "signal", rename_all = "snake_case")]
pub enum ControlSignal {
    SkipPhase { rule_name: String },
    SkipFile { rule_name: String },
    Fail { rule_name: String, message: String },
}

impl ControlSignal {
    pub fn rule_name(&self) -> &str {
        match self {
            Self::SkipPhase { rule_name }
            | Self::SkipFile { rule_name }
            | Self::Fail { rule_name, .. } => rule_name,
        }
    }

    /// The error a `Fail` signal stands for.
    pub fn to_error(&self) -> Option<Error> {
        match self {
            Self::Fail { rule_name, message } => {
                Some(Error::conditional_fail(rule_name.as_str(), message.as_str()))
            }
            _ => None,
        }
    }
}

impl fmt::Display for ControlSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SkipPhase { rule_name } => write!(f, "skip phase (rule '{rule_name}')"),
            Self::SkipFile { rule_name } => write!(f, "skip file (rule '{rule_name}')"),
            Self::Fail { rule_name, message } => write!(f, "fail (rule '{rule_name}'): {message}"),
        }
    }
}

/// Everything produced by executing one branch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub changes: Vec<RuleChange>,
    pub warnings: Vec<String>,
    pub skip_flags: SkipFlags,
    pub signal: Option<ControlSignal>,
}

impl ActionOutcome {
    /// Fold `other` into `self`; the first signal wins.
    pub fn merge(&mut self, other: ActionOutcome) {
        self.changes.extend(other.changes);
        self.warnings.extend(other.warnings);
        self.skip_flags.merge(other.skip_flags);
        if self.signal.is_none() {
            self.signal = other.signal;
        }
    }
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

fn select_tracks<'a>(
    tracks: &'a [TrackInfo],
    track_type: TrackKind,
    language: Option<&str>,
) -> Vec<&'a TrackInfo> {
    tracks
        .iter()
        .filter(|t| t.is(track_type))
        .filter(|t| match language {
            Some(lang) => t.language.as_deref().is_some_and(|l| languages_match(l, lang)),
            None => true,
        })
        .collect()
}

/// Expand `{filename}`, `{path}` and `{rule_name}`; other braces are kept.
pub fn substitute_placeholders(message: &str, rule_name: &str, ctx: &EvalContext) -> String {
    message
        .replace("{filename}", &ctx.file_name())
        .replace("{path}", &ctx.path_display())
        .replace("{rule_name}", rule_name)
}

fn resolve_plugin_value(reference: &PluginRef, ctx: &EvalContext, action: &str) -> Option<String> {
    match ctx.plugin_metadata.lookup(&reference.plugin, &reference.field) {
        MetadataLookup::Value(Some(value)) => Some(value.to_string()),
        MetadataLookup::Value(None) | MetadataLookup::FieldMissing => {
            tracing::warn!(
                "{action}: field '{}' not found in plugin '{}' metadata, skipping",
                reference.field,
                reference.plugin
            );
            None
        }
        MetadataLookup::PluginMissing => {
            tracing::warn!(
                "{action}: plugin '{}' not found in metadata, skipping",
                reference.plugin
            );
            None
        }
    }
}

fn warn_no_match(action: &str, track_type: TrackKind, language: Option<&str>, ctx: &EvalContext) {
    let filter = language
        .map(|l| format!(" (language={l})"))
        .unwrap_or_default();
    tracing::warn!(
        "{action}: no matching {track_type} tracks{filter} in {}",
        ctx.path_display()
    );
}

fn flag_changes(
    selector: &TrackSelector,
    flag: FlagKind,
    value: bool,
    first_only: bool,
    tracks: &[TrackInfo],
    ctx: &EvalContext,
    outcome: &mut ActionOutcome,
) {
    let mut matching = selector.select(tracks);
    if matching.is_empty() {
        warn_no_match(
            &format!("set {flag}"),
            selector.track_type,
            selector.language.as_deref(),
            ctx,
        );
        return;
    }
    if first_only {
        matching.truncate(1);
    }
    for track in matching {
        tracing::debug!("track[{}] {flag}={value}", track.index);
        outcome.changes.push(RuleChange::Flag {
            track_index: track.index,
            flag,
            value,
        });
    }
}

/// Execute `actions` in order for the rule named `rule_name`.
///
/// A `Fail` or a phase/file `Skip` records a signal and stops the branch.
pub fn execute_actions(
    actions: &[Action],
    rule_name: &str,
    tracks: &[TrackInfo],
    ctx: &EvalContext,
) -> ActionOutcome {
    let mut outcome = ActionOutcome::default();

    for action in actions {
        match action {
            Action::Skip { scope } => match scope {
                SkipScope::Phase => {
                    outcome.signal = Some(ControlSignal::SkipPhase {
                        rule_name: rule_name.to_string(),
                    });
                }
                SkipScope::File => {
                    outcome.signal = Some(ControlSignal::SkipFile {
                        rule_name: rule_name.to_string(),
                    });
                }
                SkipScope::VideoTranscode => outcome.skip_flags.skip_video_transcode = true,
                SkipScope::AudioTranscode => outcome.skip_flags.skip_audio_transcode = true,
                SkipScope::TrackFilter => outcome.skip_flags.skip_track_filter = true,
            },
            Action::Warn { message } => {
                let message = substitute_placeholders(message, rule_name, ctx);
                tracing::warn!(rule = rule_name, "{message}");
                outcome.warnings.push(message);
            }
            Action::Fail { message } => {
                let message = substitute_placeholders(message, rule_name, ctx);
                tracing::error!(rule = rule_name, "{message}");
                outcome.signal = Some(ControlSignal::Fail {
                    rule_name: rule_name.to_string(),
                    message,
                });
            }
            Action::SetDefault(sel) => {
                flag_changes(sel, FlagKind::Default, true, true, tracks, ctx, &mut outcome)
            }
            Action::ClearDefault(sel) => {
                flag_changes(sel, FlagKind::Default, false, true, tracks, ctx, &mut outcome)
            }
            Action::SetForced(sel) => {
                flag_changes(sel, FlagKind::Forced, true, false, tracks, ctx, &mut outcome)
            }
            Action::ClearForced(sel) => {
                flag_changes(sel, FlagKind::Forced, false, false, tracks, ctx, &mut outcome)
            }
            Action::SetLanguage {
                track_type,
                language,
                from_plugin,
                match_language,
            } => {
                let resolved = match (language, from_plugin) {
                    (Some(code), _) => Some(code.clone()),
                    (None, Some(reference)) => resolve_plugin_value(reference, ctx, "set_language"),
                    (None, None) => None,
                };
                let Some(new_language) = resolved else {
                    tracing::debug!("set_language: no language resolved, skipping");
                    continue;
                };
                let matching = select_tracks(tracks, *track_type, match_language.as_deref());
                if matching.is_empty() {
                    warn_no_match("set_language", *track_type, match_language.as_deref(), ctx);
                }
                for track in matching {
                    tracing::debug!("track[{}] language={new_language}", track.index);
                    outcome.changes.push(RuleChange::Language {
                        track_index: track.index,
                        language: new_language.clone(),
                    });
                }
            }
            Action::SetTitle {
                track_type,
                language,
                title,
            } => {
                let matching = select_tracks(tracks, *track_type, language.as_deref());
                if matching.is_empty() {
                    warn_no_match("set_title", *track_type, language.as_deref(), ctx);
                }
                for track in matching {
                    outcome.changes.push(RuleChange::Title {
                        track_index: track.index,
                        title: title.clone(),
                    });
                }
            }
            Action::SetContainerMetadata {
                field,
                value,
                from_plugin,
            } => {
                let resolved = match (value, from_plugin) {
                    (Some(v), _) => Some(v.clone()),
                    (None, Some(reference)) => {
                        resolve_plugin_value(reference, ctx, "set_container_metadata")
                    }
                    (None, None) => None,
                };
                if let Some(value) = resolved {
                    outcome.changes.push(RuleChange::ContainerMetadata {
                        field: field.to_lowercase(),
                        value,
                    });
                }
            }
            Action::Conditional(rule) => {
                let (matched, reason) = rule.when.evaluate_traced(tracks, ctx);
                tracing::debug!(rule = %rule.name, "{reason}");
                let branch = if matched {
                    Some(rule.then.as_slice())
                } else {
                    rule.else_actions.as_deref()
                };
                if let Some(branch) = branch {
                    outcome.merge(execute_actions(branch, &rule.name, tracks, ctx));
                }
            }
        }

        if outcome.signal.is_some() {
            break;
        }
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::PluginMetadata;
    use crate::value::Scalar;
    use std::path::PathBuf;

    fn make_tracks() -> Vec<TrackInfo> {
        let mut tracks = Vec::new();
        for (i, (kind, lang)) in [
            (TrackKind::Video, "und"),
            (TrackKind::Audio, "jpn"),
            (TrackKind::Audio, "eng"),
            (TrackKind::Subtitle, "eng"),
            (TrackKind::Subtitle, "eng"),
        ]
        .into_iter()
        .enumerate()
        {
            let mut t = TrackInfo::new(i, kind);
            t.language = Some(lang.into());
            tracks.push(t);
        }
        tracks
    }

    fn make_ctx() -> EvalContext {
        EvalContext {
            file_path: Some(PathBuf::from("/media/Show S01E01.mkv")),
            ..Default::default()
        }
    }

    #[test]
    fn warn_substitutes_placeholders() {
        let actions = [Action::Warn {
            message: "{rule_name}: {filename} at {path} {unknown}".into(),
        }];
        let out = execute_actions(&actions, "check", &make_tracks(), &make_ctx());
        assert_eq!(
            out.warnings,
            vec!["check: Show S01E01.mkv at /media/Show S01E01.mkv {unknown}".to_string()]
        );
        assert!(out.signal.is_none());
    }

    #[test]
    fn fail_stops_branch() {
        let actions = [
            Action::Fail {
                message: "bad {filename}".into(),
            },
            Action::Warn {
                message: "never".into(),
            },
        ];
        let out = execute_actions(&actions, "guard", &make_tracks(), &make_ctx());
        assert!(out.warnings.is_empty());
        let signal = out.signal.unwrap();
        assert_eq!(
            signal,
            ControlSignal::Fail {
                rule_name: "guard".into(),
                message: "bad Show S01E01.mkv".into(),
            }
        );
        let err = signal.to_error().unwrap();
        assert_eq!(err.kind(), mp_core::ErrorKind::Control);
    }

    #[test]
    fn skip_scopes() {
        let actions = [
            Action::Skip {
                scope: SkipScope::VideoTranscode,
            },
            Action::Skip {
                scope: SkipScope::TrackFilter,
            },
            Action::Skip {
                scope: SkipScope::Phase,
            },
            Action::Skip {
                scope: SkipScope::AudioTranscode,
            },
        ];
        let out = execute_actions(&actions, "r", &make_tracks(), &make_ctx());
        assert!(out.skip_flags.skip_video_transcode);
        assert!(out.skip_flags.skip_track_filter);
        assert!(!out.skip_flags.skip_audio_transcode);
        assert_eq!(
            out.signal,
            Some(ControlSignal::SkipPhase {
                rule_name: "r".into()
            })
        );
    }

    #[test]
    fn default_applies_to_first_match_forced_to_all() {
        let actions = [
            Action::SetDefault(TrackSelector::new(TrackKind::Audio)),
            Action::SetForced(TrackSelector::new(TrackKind::Subtitle).with_language("en")),
        ];
        let out = execute_actions(&actions, "r", &make_tracks(), &make_ctx());
        assert_eq!(
            out.changes,
            vec![
                RuleChange::Flag {
                    track_index: 1,
                    flag: FlagKind::Default,
                    value: true
                },
                RuleChange::Flag {
                    track_index: 3,
                    flag: FlagKind::Forced,
                    value: true
                },
                RuleChange::Flag {
                    track_index: 4,
                    flag: FlagKind::Forced,
                    value: true
                },
            ]
        );
    }

    #[test]
    fn set_language_from_plugin() {
        let mut md = PluginMetadata::new();
        md.insert("radarr", "original_language", Scalar::from("jpn"));
        let ctx = make_ctx().with_plugin_metadata(md);
        let actions = [Action::SetLanguage {
            track_type: TrackKind::Audio,
            language: None,
            from_plugin: Some(PluginRef {
                plugin: "Radarr".into(),
                field: "original_language".into(),
            }),
            match_language: Some("jpn".into()),
        }];
        let out = execute_actions(&actions, "r", &make_tracks(), &ctx);
        assert_eq!(
            out.changes,
            vec![RuleChange::Language {
                track_index: 1,
                language: "jpn".into()
            }]
        );

        let missing = execute_actions(&actions, "r", &make_tracks(), &make_ctx());
        assert!(missing.changes.is_empty());
    }

    #[test]
    fn titles_and_container_metadata() {
        let actions = [
            Action::SetTitle {
                track_type: TrackKind::Audio,
                language: Some("eng".into()),
                title: "English".into(),
            },
            Action::SetContainerMetadata {
                field: "Title".into(),
                value: Some(String::new()),
                from_plugin: None,
            },
        ];
        let out = execute_actions(&actions, "r", &make_tracks(), &make_ctx());
        assert_eq!(
            out.changes,
            vec![
                RuleChange::Title {
                    track_index: 2,
                    title: "English".into()
                },
                RuleChange::ContainerMetadata {
                    field: "title".into(),
                    value: String::new()
                },
            ]
        );
    }

    #[test]
    fn nested_conditional_runs_branch() {
        let nested = ConditionalRule {
            name: "inner".into(),
            when: "exists(audio, lang == fra)".parse().unwrap(),
            then: vec![Action::Warn {
                message: "has french".into(),
            }],
            else_actions: Some(vec![Action::Warn {
                message: "{rule_name} fallback".into(),
            }]),
        };
        let out = execute_actions(
            &[Action::Conditional(Box::new(nested))],
            "outer",
            &make_tracks(),
            &make_ctx(),
        );
        assert_eq!(out.warnings, vec!["inner fallback".to_string()]);
    }

    #[test]
    fn action_json_shape() {
        let json = r#"[
            {"type": "skip", "scope": "video_transcode"},
            {"type": "set_default", "track_type": "audio", "language": "eng"},
            {"type": "set_language", "track_type": "audio",
             "from_plugin": {"plugin": "radarr", "field": "original_language"}}
        ]"#;
        let actions: Vec<Action> = serde_json::from_str(json).unwrap();
        assert_eq!(
            actions[1],
            Action::SetDefault(TrackSelector::new(TrackKind::Audio).with_language("eng"))
        );
        assert!(matches!(
            actions[2],
            Action::SetLanguage { language: None, from_plugin: Some(_), .. }
        ));
    }
}
