//! Plan builder: one phase, one file, one [`Plan`].
//!
//! The builder is pure. Operation results are computed in this order:
//!
//! 1. conditional rules (their skip flags gate filtering and transcoding,
//!    their signals short-circuit the phase);
//! 2. pre-actions, classification and filtering;
//! 3. container conversion, over the kept tracks;
//! 4. ordering and default flags, over the kept tracks;
//! 5. rule changes, synthesis and transcoding.
//!
//! Actions are then emitted in the canonical operation order by diffing the
//! desired track state against the current one, so identical inputs always
//! produce identical plans.

use std::collections::BTreeMap;

use mp_core::{Container, Error, FileInfo, Result, TrackInfo, TrackKind};
use mp_rules::{
    evaluate_rules, CommentaryMatcher, ConditionalResult, ControlSignal, EvalContext, FlagKind, RuleChange,
};

use crate::classify::{ClassificationHints, Classifier, TrackType};
use crate::container::evaluate_container_change;
use crate::filter::{compute_track_dispositions, TrackFilterSet, TrackPreActions};
use crate::flags::{compute_default_flags, enforce_single_default, FlagPreferences};
use crate::order::{compute_desired_order, current_order};
use crate::plan::{ActionType, Plan, PlanValue, PlannedAction};
use crate::policy::{GlobalConfig, PhaseDefinition};
use crate::synthesis::plan_synthesis;
use crate::transcode::{plan_transcode, AudioTrackAction};

/// Metadata a track should end up with.
#[derive(Debug, Clone, PartialEq, Eq)]
struct TrackState {
    is_default: bool,
    is_forced: bool,
    title: Option<String>,
    language: Option<String>,
}

impl TrackState {
    fn of(track: &TrackInfo) -> Self {
        Self {
            is_default: track.is_default,
            is_forced: track.is_forced,
            title: track.title.clone(),
            language: track.language.clone(),
        }
    }
}

/// Builds plans for phases of one policy.
#[derive(Debug, Clone)]
pub struct PlanBuilder<'a> {
    global: &'a GlobalConfig,
    matcher: CommentaryMatcher,
    hints: ClassificationHints,
}

impl<'a> PlanBuilder<'a> {
    pub fn new(global: &'a GlobalConfig) -> Self {
        Self {
            global,
            matcher: CommentaryMatcher::new(&global.commentary_patterns),
            hints: ClassificationHints::new(),
        }
    }

    /// Caller-supplied classification hints (music, sfx, ...).
    pub fn with_hints(mut self, hints: ClassificationHints) -> Self {
        self.hints = hints;
        self
    }

    /// Build the plan for `phase` against `file`.
    ///
    /// A `fail` signal from conditional rules is returned as
    /// [`Error::ConditionalFail`]. A skip signal yields a plan carrying only
    /// the conditional result.
    pub fn build(&self, file: &FileInfo, phase: &PhaseDefinition, ctx: &EvalContext) -> Result<Plan> {
        let tracks = &file.tracks;
        if tracks.is_empty() {
            return Err(Error::NoTracks(file.path.display().to_string()));
        }

        let mut plan = Plan {
            file_path: file.path.clone(),
            container: file.container(),
            file_timestamp: phase.file_timestamp,
            transcription: phase.transcription.clone(),
            ..Default::default()
        };

        // Conditional rules run against the file as introspected.
        let conditional = phase
            .conditional_rules
            .as_ref()
            .map(|rules| evaluate_rules(rules, tracks, ctx));
        if let Some(result) = &conditional {
            tracing::debug!(
                phase = %phase.name,
                matched = ?result.matched_rule,
                "Conditional rules evaluated"
            );
            plan.skip_flags = result.skip_flags;
            plan.warnings.extend(result.warnings.iter().cloned());
            match &result.signal {
                Some(signal @ ControlSignal::Fail { .. }) => {
                    return Err(signal
                        .to_error()
                        .unwrap_or_else(|| Error::conditional_fail(signal.rule_name(), "rule failed")));
                }
                Some(signal) => {
                    tracing::info!(phase = %phase.name, %signal, "Phase short-circuited by rule");
                    plan.conditional_result = Some(result.clone());
                    return Ok(plan);
                }
                None => {}
            }
        }

        // Pre-actions shape the baseline desired state.
        let mut desired: BTreeMap<usize, TrackState> = tracks.iter().map(|t| (t.index, TrackState::of(t))).collect();
        apply_pre_actions(tracks, phase, &mut desired);

        let classifier = Classifier::new(&self.global.audio_languages, &self.matcher, &self.hints);
        let types = classifier.classify_all(tracks);

        // Filtering.
        let filters = TrackFilterSet {
            audio: phase.audio_filter.as_ref(),
            subtitle: phase.subtitle_filter.as_ref(),
            attachment: phase.attachment_filter.as_ref(),
            subtitle_forced_cleared: phase.subtitle_actions.as_ref().is_some_and(|a| a.clear_all_forced),
        };
        if filters.is_active() {
            if plan.skip_flags.skip_track_filter {
                tracing::debug!(phase = %phase.name, "Track filtering skipped by rule");
            } else {
                plan.track_dispositions = compute_track_dispositions(tracks, &types, &filters)?;
            }
        }
        let removed: Vec<usize> = plan
            .track_dispositions
            .iter()
            .filter(|d| d.is_removed())
            .map(|d| d.track_index)
            .collect();
        let (kept, kept_types): (Vec<TrackInfo>, Vec<TrackType>) = tracks
            .iter()
            .zip(&types)
            .filter(|(t, _)| !removed.contains(&t.index))
            .map(|(t, ty)| (t.clone(), *ty))
            .unzip();
        plan.tracks_removed = removed.len();
        plan.tracks_kept = kept.len();

        // Container.
        if let Some(config) = &phase.container {
            plan.container_change = evaluate_container_change(&kept, &file.container_format, config)?;
        }
        let effective = plan
            .container_change
            .as_ref()
            .map(|c| c.target_format)
            .or_else(|| Container::from_reported(&file.container_format));

        // Ordering.
        let mut reorder = None;
        if let Some(order) = &phase.track_order {
            let current = current_order(&kept);
            let target = compute_desired_order(&kept, &kept_types, order);
            if current != target {
                if effective.is_some_and(|c| c.supports_reorder()) {
                    reorder = Some(PlannedAction::reorder(current, target));
                } else {
                    let container = effective.map_or_else(|| plan.container.clone(), |c| c.to_string());
                    tracing::warn!(container = %container, "Track reordering is only supported for MKV; skipping");
                    plan.warnings
                        .push(format!("Track reordering skipped: not supported for {container}"));
                }
            }
        }

        // Default flags.
        if let Some(config) = &phase.default_flags {
            let prefs = FlagPreferences {
                audio_languages: &self.global.audio_languages,
                subtitle_languages: &self.global.subtitle_languages,
                matcher: &self.matcher,
            };
            let assignment = compute_default_flags(&kept, config, &prefs)?;
            for (index, value) in assignment.default {
                if let Some(state) = desired.get_mut(&index) {
                    state.is_default = value;
                }
            }
            for (index, value) in assignment.forced {
                if let Some(state) = desired.get_mut(&index) {
                    state.is_forced = value;
                }
            }
        }

        // Rule changes.
        let mut metadata_actions = Vec::new();
        if let Some(result) = &conditional {
            for change in &result.changes {
                self.apply_rule_change(change, &kept, &mut desired, ctx, &mut metadata_actions, &mut plan.warnings);
            }
        }

        // At most one default per type once this phase touches flags.
        if phase.default_flags.is_some() || conditional.is_some() {
            let mut defaults: BTreeMap<usize, bool> = kept
                .iter()
                .filter_map(|t| desired.get(&t.index).map(|s| (t.index, s.is_default)))
                .collect();
            enforce_single_default(&kept, &mut defaults);
            for (index, value) in defaults {
                if let Some(state) = desired.get_mut(&index) {
                    state.is_default = value;
                }
            }
        }

        // Emit, in canonical operation order.
        plan.actions.extend(reorder);
        for track in &kept {
            if let Some(state) = desired.get(&track.index) {
                push_track_diff(track, state, &mut plan.actions);
            }
        }
        if plan.actions.iter().any(|a| a.action_type.is_track_metadata()) {
            if let Some(container) = effective.filter(|c| !c.supports_track_metadata()) {
                return Err(Error::unsupported_container(container.to_string(), "track metadata changes"));
            }
        }
        plan.actions.extend(metadata_actions);

        if let Some(config) = &phase.audio_synthesis {
            let synthesis = plan_synthesis(&kept, config, &self.matcher, ctx)?;
            for op in &synthesis.operations {
                plan.actions.push(PlannedAction::track(
                    ActionType::SynthesizeAudio,
                    op.source.track_index,
                    None,
                    Some(PlanValue::Text(op.definition_name.clone())),
                ));
            }
            plan.synthesis = Some(synthesis);
        }

        if let Some(config) = &phase.transcode {
            let transcode = plan_transcode(&kept, config, plan.skip_flags);
            if let Some(video) = &transcode.video {
                plan.actions.push(PlannedAction::track(
                    ActionType::TranscodeVideo,
                    video.track_index,
                    video.source_codec.clone().map(PlanValue::Text),
                    Some(PlanValue::Text(video.target_codec.to_string())),
                ));
            }
            for audio in transcode.audio.iter().filter(|a| a.action == AudioTrackAction::Transcode) {
                plan.actions.push(PlannedAction::track(
                    ActionType::TranscodeAudio,
                    audio.track_index,
                    audio.source_codec.clone().map(PlanValue::Text),
                    audio.target_codec.clone().map(PlanValue::Text),
                ));
            }
            plan.transcode = Some(transcode);
        }

        plan.requires_remux = plan.tracks_removed > 0
            || plan.container_change.is_some()
            || plan.actions.iter().any(|a| {
                matches!(
                    a.action_type,
                    ActionType::Reorder
                        | ActionType::SynthesizeAudio
                        | ActionType::TranscodeVideo
                        | ActionType::TranscodeAudio
                )
            });
        plan.conditional_result = conditional;

        tracing::info!(
            phase = %phase.name,
            path = %file.path.display(),
            summary = %plan.summary(),
            "Plan built"
        );
        Ok(plan)
    }

    fn apply_rule_change(
        &self,
        change: &RuleChange,
        kept: &[TrackInfo],
        desired: &mut BTreeMap<usize, TrackState>,
        ctx: &EvalContext,
        metadata_actions: &mut Vec<PlannedAction>,
        warnings: &mut Vec<String>,
    ) {
        let track_index = match change {
            RuleChange::Flag { track_index, .. }
            | RuleChange::Language { track_index, .. }
            | RuleChange::Title { track_index, .. } => *track_index,
            RuleChange::ContainerMetadata { field, value } => {
                let current = ctx.container_tag(field).map(str::to_string);
                if current.as_deref().unwrap_or_default() != value {
                    metadata_actions.push(PlannedAction::container_metadata(field.as_str(), current, value.clone()));
                }
                return;
            }
        };
        let Some(track) = kept.iter().find(|t| t.index == track_index) else {
            warnings.push(format!("Rule change for removed track {track_index} ignored"));
            return;
        };
        match change {
            RuleChange::Flag { flag: FlagKind::Default, value, .. } => {
                if *value {
                    // A rule-chosen default replaces any other of its type.
                    for other in kept.iter().filter(|t| t.track_type == track.track_type) {
                        if let Some(state) = desired.get_mut(&other.index) {
                            state.is_default = other.index == track_index;
                        }
                    }
                } else if let Some(state) = desired.get_mut(&track_index) {
                    state.is_default = false;
                }
            }
            RuleChange::Flag { flag: FlagKind::Forced, value, .. } => {
                if let Some(state) = desired.get_mut(&track_index) {
                    state.is_forced = *value;
                }
            }
            RuleChange::Language { language, .. } => {
                if let Some(state) = desired.get_mut(&track_index) {
                    state.language = Some(language.clone());
                }
            }
            RuleChange::Title { title, .. } => {
                if let Some(state) = desired.get_mut(&track_index) {
                    state.title = Some(title.clone());
                }
            }
            RuleChange::ContainerMetadata { .. } => {}
        }
    }
}

fn apply_pre_actions(tracks: &[TrackInfo], phase: &PhaseDefinition, desired: &mut BTreeMap<usize, TrackState>) {
    let by_kind: [(TrackKind, Option<&TrackPreActions>); 3] = [
        (TrackKind::Video, phase.video_actions.as_ref()),
        (TrackKind::Audio, phase.audio_actions.as_ref()),
        (TrackKind::Subtitle, phase.subtitle_actions.as_ref()),
    ];
    for (kind, actions) in by_kind {
        let Some(actions) = actions.filter(|a| !a.is_noop()) else {
            continue;
        };
        for track in tracks.iter().filter(|t| t.is(kind)) {
            if let Some(state) = desired.get_mut(&track.index) {
                if actions.clear_all_forced {
                    state.is_forced = false;
                }
                if actions.clear_all_default {
                    state.is_default = false;
                }
                if actions.clear_all_titles {
                    state.title = None;
                }
            }
        }
    }
}

fn push_track_diff(track: &TrackInfo, state: &TrackState, actions: &mut Vec<PlannedAction>) {
    let index = track.index;
    if state.is_default != track.is_default {
        let ty = if state.is_default { ActionType::SetDefault } else { ActionType::ClearDefault };
        actions.push(PlannedAction::track(
            ty,
            index,
            Some(PlanValue::Flag(track.is_default)),
            Some(PlanValue::Flag(state.is_default)),
        ));
    }
    if state.is_forced != track.is_forced {
        let ty = if state.is_forced { ActionType::SetForced } else { ActionType::ClearForced };
        actions.push(PlannedAction::track(
            ty,
            index,
            Some(PlanValue::Flag(track.is_forced)),
            Some(PlanValue::Flag(state.is_forced)),
        ));
    }
    if state.title != track.title {
        actions.push(PlannedAction::track(
            ActionType::SetTitle,
            index,
            track.title.clone().map(PlanValue::Text),
            Some(PlanValue::Text(state.title.clone().unwrap_or_default())),
        ));
    }
    if state.language != track.language {
        actions.push(PlannedAction::track(
            ActionType::SetLanguage,
            index,
            track.language.clone().map(PlanValue::Text),
            state.language.clone().map(PlanValue::Text),
        ));
    }
}

/// Build the plan for `phase` with no classification hints.
pub fn build_plan(file: &FileInfo, phase: &PhaseDefinition, global: &GlobalConfig, ctx: &EvalContext) -> Result<Plan> {
    PlanBuilder::new(global).build(file, phase, ctx)
}

/// Whether the conditional result stops the phase before any work.
pub fn short_circuited(result: Option<&ConditionalResult>) -> bool {
    result.is_some_and(|r| matches!(r.signal, Some(ControlSignal::SkipPhase { .. } | ControlSignal::SkipFile { .. })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::{ContainerConfig, IncompatibleCodecMode};
    use crate::filter::AudioFilterConfig;
    use crate::flags::DefaultFlagsConfig;
    use crate::synthesis::{AudioCodec, AudioSynthesisConfig, ChannelSpec, SynthesisDefinition};
    use assert_matches::assert_matches;
    use mp_rules::{Action, ConditionalRule, RuleSet, SkipScope, TrackSelector};
    use std::path::PathBuf;

    fn make_track(index: usize, kind: TrackKind, lang: &str, codec: &str) -> TrackInfo {
        let mut t = TrackInfo::new(index, kind);
        t.language = Some(lang.into());
        t.codec = Some(codec.into());
        if kind == TrackKind::Audio {
            t.channels = Some(6);
        }
        t
    }

    fn make_file(container: &str, tracks: Vec<TrackInfo>) -> FileInfo {
        FileInfo {
            path: PathBuf::from("/media/movie.mkv"),
            container_format: container.into(),
            size_bytes: Some(1024),
            tracks,
        }
    }

    fn standard_tracks() -> Vec<TrackInfo> {
        let mut commentary = make_track(2, TrackKind::Audio, "eng", "ac3");
        commentary.title = Some("Director Commentary".into());
        commentary.is_default = true;
        let mut forced = make_track(4, TrackKind::Subtitle, "eng", "subrip");
        forced.is_forced = true;
        vec![
            make_track(0, TrackKind::Video, "und", "h264"),
            make_track(1, TrackKind::Audio, "eng", "truehd"),
            commentary,
            make_track(3, TrackKind::Subtitle, "eng", "subrip"),
            forced,
        ]
    }

    fn build(file: &FileInfo, phase: &PhaseDefinition) -> Result<Plan> {
        let global = GlobalConfig::default();
        build_plan(file, phase, &global, &EvalContext::for_file(file))
    }

    #[test]
    fn no_tracks_is_an_error() {
        let file = make_file("matroska,webm", vec![]);
        assert_matches!(build(&file, &PhaseDefinition::new("p")), Err(Error::NoTracks(_)));
    }

    #[test]
    fn empty_phase_gives_empty_plan() {
        let file = make_file("matroska,webm", standard_tracks());
        let plan = build(&file, &PhaseDefinition::new("p")).unwrap();
        assert!(plan.is_empty());
        assert_eq!(plan.container, "mkv");
        assert_eq!(plan.tracks_kept, 5);
    }

    #[test]
    fn reorder_and_flags() {
        let file = make_file("matroska,webm", standard_tracks());
        let mut phase = PhaseDefinition::new("normalize");
        phase.track_order = Some(vec![]);
        phase.default_flags = Some(DefaultFlagsConfig::default());
        let plan = build(&file, &phase).unwrap();

        assert_eq!(plan.actions[0], PlannedAction::reorder(vec![0, 1, 2, 3, 4], vec![0, 1, 3, 4, 2]));
        let types: Vec<(ActionType, Option<usize>)> =
            plan.actions[1..].iter().map(|a| (a.action_type, a.track_index)).collect();
        assert_eq!(
            types,
            vec![
                (ActionType::SetDefault, Some(0)),
                (ActionType::SetDefault, Some(1)),
                (ActionType::ClearDefault, Some(2)),
            ]
        );
        assert!(plan.requires_remux);
    }

    #[test]
    fn reorder_skipped_outside_mkv() {
        let file = make_file("mov,mp4,m4a,3gp,3g2,mj2", standard_tracks());
        let mut phase = PhaseDefinition::new("normalize");
        phase.track_order = Some(vec![]);
        let plan = build(&file, &phase).unwrap();
        assert!(plan.actions.is_empty());
        assert!(plan.warnings[0].contains("reordering skipped"));
    }

    #[test]
    fn avi_rejects_flag_changes() {
        let file = make_file("avi", standard_tracks());
        let mut phase = PhaseDefinition::new("flags");
        phase.default_flags = Some(DefaultFlagsConfig::default());
        let err = build(&file, &phase).unwrap_err();
        assert_matches!(err, Error::UnsupportedContainer { ref container, .. } if container == "avi");
    }

    #[test]
    fn incompatible_codec_error_mode() {
        let file = make_file("matroska", standard_tracks());
        let mut phase = PhaseDefinition::new("convert");
        phase.container = Some(ContainerConfig::new(Container::Mp4));
        assert_matches!(build(&file, &phase), Err(Error::IncompatibleCodec { .. }));

        phase.container = Some(ContainerConfig::new(Container::Mp4).with_mode(IncompatibleCodecMode::Skip));
        let plan = build(&file, &phase).unwrap();
        assert!(plan.container_change.is_none());
    }

    #[test]
    fn removed_tracks_are_not_container_checked() {
        let tracks = vec![
            make_track(0, TrackKind::Video, "und", "h264"),
            make_track(1, TrackKind::Audio, "eng", "aac"),
            make_track(2, TrackKind::Audio, "fra", "truehd"),
        ];
        let file = make_file("matroska", tracks);
        let mut phase = PhaseDefinition::new("convert");
        phase.audio_filter = Some(AudioFilterConfig::new(["eng"]));
        phase.container = Some(ContainerConfig::new(Container::Mp4));
        let plan = build(&file, &phase).unwrap();
        assert_eq!(plan.tracks_removed, 1);
        assert_eq!(plan.container_change.unwrap().target_format, Container::Mp4);
    }

    #[test]
    fn rule_signals() {
        let file = make_file("matroska", standard_tracks());
        let mut phase = PhaseDefinition::new("rules");
        phase.default_flags = Some(DefaultFlagsConfig::default());
        phase.conditional_rules = Some(RuleSet::new(vec![ConditionalRule::new(
            "has-truehd",
            "exists(audio, codec == truehd)".parse().unwrap(),
        )
        .then(Action::Skip { scope: SkipScope::Phase })]));
        let plan = build(&file, &phase).unwrap();
        assert!(plan.actions.is_empty());
        assert!(short_circuited(plan.conditional_result.as_ref()));

        phase.conditional_rules = Some(RuleSet::new(vec![ConditionalRule::new(
            "has-truehd",
            "exists(audio, codec == truehd)".parse().unwrap(),
        )
        .then(Action::Fail { message: "lossless in {filename}".into() })]));
        let err = build(&file, &phase).unwrap_err();
        assert_matches!(err, Error::ConditionalFail { ref message, .. } if message == "lossless in movie.mkv");
    }

    #[test]
    fn rule_default_replaces_other_defaults() {
        let file = make_file("matroska", standard_tracks());
        let mut phase = PhaseDefinition::new("rules");
        phase.conditional_rules = Some(RuleSet::new(vec![ConditionalRule::new(
            "english",
            "exists(audio, lang == eng)".parse().unwrap(),
        )
        .then(Action::SetDefault(TrackSelector::new(TrackKind::Audio).with_language("eng")))]));
        let plan = build(&file, &phase).unwrap();
        let types: Vec<ActionType> = plan.actions.iter().map(|a| a.action_type).collect();
        assert_eq!(types, vec![ActionType::SetDefault, ActionType::ClearDefault]);
    }

    #[test]
    fn synthesis_actions() {
        let file = make_file("matroska", standard_tracks());
        let mut phase = PhaseDefinition::new("compat");
        phase.audio_synthesis = Some(AudioSynthesisConfig {
            tracks: vec![SynthesisDefinition::new("stereo", AudioCodec::Aac, ChannelSpec::Count(2))],
        });
        let plan = build(&file, &phase).unwrap();
        let action = plan.actions_of(ActionType::SynthesizeAudio).next().unwrap();
        assert_eq!(action.track_index, Some(1));
        assert!(!plan.is_empty());
    }

    #[test]
    fn deterministic() {
        let file = make_file("matroska", standard_tracks());
        let mut phase = PhaseDefinition::new("all");
        phase.track_order = Some(vec![]);
        phase.default_flags = Some(DefaultFlagsConfig::default());
        phase.audio_filter = Some(AudioFilterConfig::new(["eng"]));
        let a = build(&file, &phase).unwrap();
        let b = build(&file, &phase).unwrap();
        assert_eq!(a, b);
        assert_eq!(serde_json::to_string(&a).unwrap(), serde_json::to_string(&b).unwrap());
    }
}
