//! Audio synthesis planning.
//!
//! A synthesis definition asks for a derived audio track (for example a
//! stereo AAC compatibility track built from a 5.1 source). Planning picks
//! the best source track, checks that the target never needs more channels
//! than the source provides, and describes the downmix the external encoder
//! must apply.

use std::fmt;

use mp_core::codecs::codec_matches;
use mp_core::{languages_match, Error, Result, TrackInfo, TrackKind, UNDETERMINED_LANGUAGE};
use mp_rules::{CommentaryMatcher, Condition, EvalContext};
use serde::{Deserialize, Deserializer, Serialize};

// ---------------------------------------------------------------------------
// Definitions
// ---------------------------------------------------------------------------

/// Codecs a synthesized track can be encoded with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioCodec {
    Eac3,
    Aac,
    Ac3,
    Opus,
    Flac,
}

impl AudioCodec {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eac3 => "eac3",
            Self::Aac => "aac",
            Self::Ac3 => "ac3",
            Self::Opus => "opus",
            Self::Flac => "flac",
        }
    }

    /// ffmpeg encoder name.
    pub fn encoder(&self) -> &'static str {
        match self {
            Self::Opus => "libopus",
            other => other.as_str(),
        }
    }

    /// Bitrate used when a definition does not set one. `None` for lossless.
    pub fn default_bitrate(&self, channels: u32) -> Option<&'static str> {
        let bucket = match channels {
            0..=2 => 0,
            3..=6 => 1,
            _ => 2,
        };
        match self {
            Self::Eac3 => Some(["384k", "640k", "768k"][bucket]),
            Self::Aac => Some(["192k", "384k", "512k"][bucket]),
            Self::Ac3 => Some(["192k", "448k", "448k"][bucket]),
            Self::Opus => Some(["128k", "256k", "384k"][bucket]),
            Self::Flac => None,
        }
    }
}

impl fmt::Display for AudioCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelLayout {
    #[serde(rename = "mono")]
    Mono,
    #[serde(rename = "stereo")]
    Stereo,
    #[serde(rename = "5.1")]
    Surround51,
    #[serde(rename = "7.1")]
    Surround71,
}

/// Target channel count, by name or number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChannelSpec {
    Count(u32),
    Layout(ChannelLayout),
}

impl ChannelSpec {
    pub fn count(&self) -> u32 {
        match self {
            Self::Count(n) => *n,
            Self::Layout(ChannelLayout::Mono) => 1,
            Self::Layout(ChannelLayout::Stereo) => 2,
            Self::Layout(ChannelLayout::Surround51) => 6,
            Self::Layout(ChannelLayout::Surround71) => 8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelExtreme {
    Max,
    Min,
}

/// Channel preference of a source criterion: `max`, `min` or an exact count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChannelPreference {
    Exact(u32),
    Extreme(ChannelExtreme),
}

/// Accept either a single string or a list of strings.
fn one_or_many<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Option<Vec<String>>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }
    Ok(Option::<OneOrMany>::deserialize(deserializer)?.map(|v| match v {
        OneOrMany::One(s) => vec![s],
        OneOrMany::Many(v) => v,
    }))
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreferenceCriterion {
    #[serde(default, deserialize_with = "one_or_many", skip_serializing_if = "Option::is_none")]
    pub language: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not_commentary: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channels: Option<ChannelPreference>,
    #[serde(default, deserialize_with = "one_or_many", skip_serializing_if = "Option::is_none")]
    pub codec: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcePreferences {
    pub prefer: Vec<PreferenceCriterion>,
    /// Pin the source to a specific track index.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub track_index: Option<usize>,
}

/// Skip the definition when an existing audio track matches all criteria.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SkipIfExists {
    #[serde(deserialize_with = "one_or_many")]
    pub codec: Option<Vec<String>>,
    pub channels: Option<u32>,
    #[serde(deserialize_with = "one_or_many")]
    pub language: Option<Vec<String>>,
    pub not_commentary: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NamedPosition {
    End,
    AfterSource,
}

/// Where the new track lands among the audio tracks; numbers are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TargetPosition {
    Index(usize),
    Named(NamedPosition),
}

impl Default for TargetPosition {
    fn default() -> Self {
        Self::Named(NamedPosition::End)
    }
}

pub const INHERIT: &str = "inherit";

fn inherit() -> String {
    INHERIT.to_string()
}

/// One requested synthesized track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesisDefinition {
    pub name: String,
    pub codec: AudioCodec,
    pub channels: ChannelSpec,
    #[serde(default)]
    pub source: SourcePreferences,
    #[serde(default)]
    pub bitrate: Option<String>,
    #[serde(default)]
    pub create_if: Option<Condition>,
    #[serde(default)]
    pub skip_if_exists: Option<SkipIfExists>,
    /// `inherit` copies the source title.
    #[serde(default = "inherit")]
    pub title: String,
    /// `inherit` copies the source language.
    #[serde(default = "inherit")]
    pub language: String,
    #[serde(default)]
    pub position: TargetPosition,
}

impl SynthesisDefinition {
    pub fn new(name: impl Into<String>, codec: AudioCodec, channels: ChannelSpec) -> Self {
        Self {
            name: name.into(),
            codec,
            channels,
            source: SourcePreferences::default(),
            bitrate: None,
            create_if: None,
            skip_if_exists: None,
            title: inherit(),
            language: inherit(),
            position: TargetPosition::default(),
        }
    }

    pub fn prefer(mut self, criterion: PreferenceCriterion) -> Self {
        self.source.prefer.push(criterion);
        self
    }

    pub fn target_channels(&self) -> u32 {
        self.channels.count()
    }

    /// Load-time problems with this definition.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.name.trim().is_empty() {
            problems.push("synthesis definition name cannot be empty".to_string());
        }
        if self.target_channels() == 0 {
            problems.push(format!("synthesis '{}': channels must be at least 1", self.name));
        }
        if self.position == TargetPosition::Index(0) {
            problems.push(format!("synthesis '{}': position is 1-based", self.name));
        }
        problems
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AudioSynthesisConfig {
    pub tracks: Vec<SynthesisDefinition>,
}

// ---------------------------------------------------------------------------
// Plan types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceTrackSelection {
    pub track_index: usize,
    pub channels: u32,
    pub score: i64,
    /// No criterion matched; the first qualifying track was used.
    pub is_fallback: bool,
    pub match_reasons: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LfeHandling {
    Drop,
    Keep,
    Absent,
}

/// Downmix parameters handed to the encoder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownmixFilter {
    pub source_channels: u32,
    pub target_channels: u32,
    pub lfe: LfeHandling,
    /// ffmpeg audio filter expression.
    pub graph: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynthesisOperation {
    pub definition_name: String,
    pub source: SourceTrackSelection,
    pub target_codec: AudioCodec,
    pub target_channels: u32,
    pub target_bitrate: Option<String>,
    pub target_title: String,
    pub target_language: String,
    /// 0-based position among the audio tracks after synthesis.
    pub target_position: usize,
    pub downmix: Option<DownmixFilter>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SynthesisSkipReason {
    ConditionNotMet,
    AlreadyExists,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedSynthesis {
    pub definition_name: String,
    pub reason: SynthesisSkipReason,
    pub details: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynthesisPlan {
    pub operations: Vec<SynthesisOperation>,
    pub skipped: Vec<SkippedSynthesis>,
}

impl SynthesisPlan {
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Source selection
// ---------------------------------------------------------------------------

const LANGUAGE_MATCH_SCORE: i64 = 100;
const NOT_COMMENTARY_SCORE: i64 = 80;
const EXACT_CHANNELS_SCORE: i64 = 80;
const CODEC_MATCH_SCORE: i64 = 20;
const CHANNEL_SCORE_PER_CHANNEL: i64 = 10;

/// Channels assumed for a track that does not report any.
const ASSUMED_CHANNELS: u32 = 2;

fn track_channels(track: &TrackInfo) -> u32 {
    track.channels.unwrap_or(ASSUMED_CHANNELS)
}

fn score_track(track: &TrackInfo, criterion: &PreferenceCriterion, matcher: &CommentaryMatcher) -> (i64, Vec<String>) {
    let mut score = 0;
    let mut reasons = Vec::new();

    if let (Some(languages), Some(lang)) = (&criterion.language, track.language.as_deref()) {
        if languages.iter().any(|l| languages_match(lang, l)) {
            score += LANGUAGE_MATCH_SCORE;
            reasons.push(format!("language={lang}"));
        }
    }
    if criterion.not_commentary == Some(true) && !matcher.is_commentary(track) {
        score += NOT_COMMENTARY_SCORE;
        reasons.push("not_commentary".to_string());
    }
    if let (Some(pref), Some(ch)) = (criterion.channels, track.channels) {
        match pref {
            ChannelPreference::Extreme(ChannelExtreme::Max) => {
                score += i64::from(ch) * CHANNEL_SCORE_PER_CHANNEL;
                reasons.push(format!("channels={ch}"));
            }
            ChannelPreference::Extreme(ChannelExtreme::Min) => {
                score -= i64::from(ch) * CHANNEL_SCORE_PER_CHANNEL;
                reasons.push(format!("channels={ch} (min preferred)"));
            }
            ChannelPreference::Exact(n) if n == ch => {
                score += EXACT_CHANNELS_SCORE;
                reasons.push(format!("channels={ch} (exact match)"));
            }
            ChannelPreference::Exact(_) => {}
        }
    }
    if let (Some(codecs), Some(codec)) = (&criterion.codec, track.codec.as_deref()) {
        if codecs.iter().any(|c| codec_matches(codec, c)) {
            score += CODEC_MATCH_SCORE;
            reasons.push(format!("codec={codec}"));
        }
    }
    (score, reasons)
}

/// Select the source track for `definition` among `audio`.
///
/// Tracks with fewer channels than the target are never candidates. A pinned
/// source with too few channels is a [`Error::DownmixNotSupported`].
pub fn select_source_track(
    audio: &[&TrackInfo],
    definition: &SynthesisDefinition,
    matcher: &CommentaryMatcher,
) -> Result<SourceTrackSelection> {
    let target = definition.target_channels();
    if audio.is_empty() {
        return Err(Error::source_not_found(&definition.name, "no audio tracks available"));
    }

    if let Some(pinned) = definition.source.track_index {
        let track = audio.iter().find(|t| t.index == pinned).ok_or_else(|| {
            Error::source_not_found(&definition.name, format!("track {pinned} is not an audio track"))
        })?;
        let channels = track_channels(track);
        if channels < target {
            return Err(Error::DownmixNotSupported {
                definition: definition.name.clone(),
                source_channels: channels,
                target_channels: target,
            });
        }
        return Ok(SourceTrackSelection {
            track_index: track.index,
            channels,
            score: 0,
            is_fallback: false,
            match_reasons: vec![format!("track_index={pinned}")],
        });
    }

    let candidates: Vec<&TrackInfo> = audio
        .iter()
        .copied()
        .filter(|t| track_channels(t) >= target)
        .collect();
    if candidates.is_empty() {
        return Err(Error::source_not_found(
            &definition.name,
            format!("no audio track has at least {target} channels"),
        ));
    }

    let mut best: Option<(&TrackInfo, i64, Vec<String>)> = None;
    for track in &candidates {
        let (score, reasons) = definition
            .source
            .prefer
            .iter()
            .map(|c| score_track(track, c, matcher))
            .fold((0, Vec::new()), |(total, mut all), (s, r)| {
                all.extend(r);
                (total + s, all)
            });
        if best.as_ref().map_or(true, |(_, top, _)| score > *top) {
            best = Some((track, score, reasons));
        }
    }

    let (track, score, reasons) = match best {
        Some((track, score, reasons)) if score > 0 || !reasons.is_empty() => (track, score, reasons),
        _ => {
            let first = candidates[0];
            tracing::debug!(
                definition = %definition.name,
                track = first.index,
                "No source preference matched, using first qualifying audio track"
            );
            return Ok(SourceTrackSelection {
                track_index: first.index,
                channels: track_channels(first),
                score: 0,
                is_fallback: true,
                match_reasons: vec!["fallback: first qualifying audio track".to_string()],
            });
        }
    };

    Ok(SourceTrackSelection {
        track_index: track.index,
        channels: track_channels(track),
        score,
        is_fallback: false,
        match_reasons: reasons,
    })
}

// ---------------------------------------------------------------------------
// Downmix
// ---------------------------------------------------------------------------

fn layout_name(channels: u32) -> String {
    match channels {
        1 => "mono".into(),
        2 => "stereo".into(),
        6 => "5.1".into(),
        8 => "7.1".into(),
        n => format!("{n}c"),
    }
}

fn has_lfe(channels: u32) -> bool {
    matches!(channels, 6 | 8)
}

/// Downmix needed to turn `source` channels into `target` channels.
///
/// Returns `None` when the counts are equal. Callers must reject
/// `target > source` before asking.
pub fn downmix_filter(source: u32, target: u32) -> Option<DownmixFilter> {
    if source == target {
        return None;
    }
    let graph = match (source, target) {
        (6, 2) => "pan=stereo|FL=FC+0.707*FL+0.707*BL|FR=FC+0.707*FR+0.707*BR".to_string(),
        (8, 2) => "pan=stereo|FL=FC+0.707*FL+0.707*BL+0.707*SL|FR=FC+0.707*FR+0.707*BR+0.707*SR"
            .to_string(),
        (8, 6) => "pan=5.1|FL=FL|FR=FR|FC=FC|LFE=LFE|BL=0.707*BL+0.707*SL|BR=0.707*BR+0.707*SR"
            .to_string(),
        (2, 1) => "pan=mono|c0=0.5*FL+0.5*FR".to_string(),
        (6, 1) => "pan=mono|c0=0.707*FC+0.5*FL+0.5*FR+0.354*BL+0.354*BR".to_string(),
        (8, 1) => "pan=mono|c0=0.707*FC+0.5*FL+0.5*FR+0.354*BL+0.354*BR+0.354*SL+0.354*SR"
            .to_string(),
        _ => format!("aformat=channel_layouts={}", layout_name(target)),
    };
    let lfe = match (has_lfe(source), has_lfe(target)) {
        (false, _) => LfeHandling::Absent,
        (true, true) => LfeHandling::Keep,
        (true, false) => LfeHandling::Drop,
    };
    Some(DownmixFilter {
        source_channels: source,
        target_channels: target,
        lfe,
        graph,
    })
}

// ---------------------------------------------------------------------------
// Planning
// ---------------------------------------------------------------------------

fn matching_existing_track(
    criteria: &SkipIfExists,
    audio: &[&TrackInfo],
    matcher: &CommentaryMatcher,
) -> Option<usize> {
    audio
        .iter()
        .find(|t| {
            let codec_ok = criteria.codec.as_ref().map_or(true, |codecs| {
                t.codec
                    .as_deref()
                    .is_some_and(|c| codecs.iter().any(|want| codec_matches(c, want)))
            });
            let channels_ok = criteria.channels.map_or(true, |n| t.channels == Some(n));
            let language_ok = criteria.language.as_ref().map_or(true, |langs| {
                t.language
                    .as_deref()
                    .is_some_and(|l| langs.iter().any(|want| languages_match(l, want)))
            });
            let commentary_ok = criteria.not_commentary != Some(true) || !matcher.is_commentary(t);
            codec_ok && channels_ok && language_ok && commentary_ok
        })
        .map(|t| t.index)
}

fn resolve_position(
    position: TargetPosition,
    source_index: usize,
    audio: &[&TrackInfo],
    planned: usize,
) -> usize {
    match position {
        TargetPosition::Index(n) => n.saturating_sub(1),
        TargetPosition::Named(NamedPosition::AfterSource) => audio
            .iter()
            .position(|t| t.index == source_index)
            .map_or(audio.len() + planned, |i| i + 1 + planned),
        TargetPosition::Named(NamedPosition::End) => audio.len() + planned,
    }
}

/// Plan every synthesis definition against `tracks`.
///
/// Definitions whose `create_if` is false or whose `skip_if_exists` matches
/// are recorded as skipped. A definition with no usable source fails the
/// whole plan.
pub fn plan_synthesis(
    tracks: &[TrackInfo],
    config: &AudioSynthesisConfig,
    matcher: &CommentaryMatcher,
    ctx: &EvalContext,
) -> Result<SynthesisPlan> {
    let audio: Vec<&TrackInfo> = tracks.iter().filter(|t| t.is(TrackKind::Audio)).collect();
    let mut plan = SynthesisPlan::default();

    for definition in &config.tracks {
        if let Some(condition) = &definition.create_if {
            let (holds, reason) = condition.evaluate_traced(tracks, ctx);
            if !holds {
                tracing::info!(definition = %definition.name, "Skipped synthesis: condition not met");
                plan.skipped.push(SkippedSynthesis {
                    definition_name: definition.name.clone(),
                    reason: SynthesisSkipReason::ConditionNotMet,
                    details: format!("Condition not satisfied: {reason}"),
                });
                continue;
            }
        }
        if let Some(criteria) = &definition.skip_if_exists {
            if let Some(existing) = matching_existing_track(criteria, &audio, matcher) {
                tracing::info!(definition = %definition.name, track = existing, "Skipped synthesis: already exists");
                plan.skipped.push(SkippedSynthesis {
                    definition_name: definition.name.clone(),
                    reason: SynthesisSkipReason::AlreadyExists,
                    details: format!("Track {existing} matches skip_if_exists criteria"),
                });
                continue;
            }
        }

        let source = select_source_track(&audio, definition, matcher)?;
        let target_channels = definition.target_channels();
        if target_channels > source.channels {
            return Err(Error::DownmixNotSupported {
                definition: definition.name.clone(),
                source_channels: source.channels,
                target_channels,
            });
        }

        let source_track = audio.iter().find(|t| t.index == source.track_index);
        let target_title = if definition.title == INHERIT {
            source_track.and_then(|t| t.title.clone()).unwrap_or_default()
        } else {
            definition.title.clone()
        };
        let target_language = if definition.language == INHERIT {
            source_track
                .and_then(|t| t.language.clone())
                .unwrap_or_else(|| UNDETERMINED_LANGUAGE.to_string())
        } else {
            definition.language.clone()
        };
        let target_position = resolve_position(
            definition.position,
            source.track_index,
            &audio,
            plan.operations.len(),
        );

        tracing::info!(
            definition = %definition.name,
            codec = %definition.codec,
            channels = target_channels,
            source = source.track_index,
            "Planned synthesis"
        );
        plan.operations.push(SynthesisOperation {
            definition_name: definition.name.clone(),
            downmix: downmix_filter(source.channels, target_channels),
            target_codec: definition.codec,
            target_channels,
            target_bitrate: definition
                .bitrate
                .clone()
                .or_else(|| definition.codec.default_bitrate(target_channels).map(String::from)),
            target_title,
            target_language,
            target_position,
            source,
        });
    }
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use proptest::prelude::*;

    fn make_audio(index: usize, lang: &str, codec: &str, channels: u32) -> TrackInfo {
        let mut t = TrackInfo::new(index, TrackKind::Audio);
        t.language = Some(lang.into());
        t.codec = Some(codec.into());
        t.channels = Some(channels);
        t
    }

    fn stereo_aac() -> SynthesisDefinition {
        SynthesisDefinition::new("compat", AudioCodec::Aac, ChannelSpec::Layout(ChannelLayout::Stereo))
    }

    fn plan(tracks: &[TrackInfo], defs: Vec<SynthesisDefinition>) -> Result<SynthesisPlan> {
        plan_synthesis(
            tracks,
            &AudioSynthesisConfig { tracks: defs },
            &CommentaryMatcher::default(),
            &EvalContext::new(),
        )
    }

    #[test]
    fn prefers_language_then_channels() {
        let tracks = vec![
            TrackInfo::new(0, TrackKind::Video),
            make_audio(1, "jpn", "truehd", 8),
            make_audio(2, "eng", "ac3", 6),
            make_audio(3, "eng", "dts", 8),
        ];
        let def = stereo_aac().prefer(PreferenceCriterion {
            language: Some(vec!["eng".into()]),
            channels: Some(ChannelPreference::Extreme(ChannelExtreme::Max)),
            ..Default::default()
        });
        let plan = plan(&tracks, vec![def]).unwrap();
        let op = &plan.operations[0];
        assert_eq!(op.source.track_index, 3);
        assert_eq!(op.source.score, 180);
        assert_eq!(op.target_channels, 2);
        assert_eq!(op.target_bitrate.as_deref(), Some("192k"));
        assert_eq!(op.target_language, "eng");
        assert_eq!(op.target_position, 3);
        let downmix = op.downmix.as_ref().unwrap();
        assert_eq!(downmix.lfe, LfeHandling::Drop);
        assert!(downmix.graph.starts_with("pan=stereo|"));
    }

    #[test]
    fn ties_keep_earliest_and_fallback() {
        let tracks = vec![make_audio(1, "eng", "ac3", 6), make_audio(2, "eng", "ac3", 6)];
        let def = stereo_aac().prefer(PreferenceCriterion {
            language: Some(vec!["eng".into()]),
            ..Default::default()
        });
        assert_eq!(plan(&tracks, vec![def]).unwrap().operations[0].source.track_index, 1);

        let plan = plan(&tracks, vec![stereo_aac()]).unwrap();
        assert!(plan.operations[0].source.is_fallback);
        assert_eq!(plan.operations[0].source.track_index, 1);
    }

    #[test]
    fn no_source_with_enough_channels() {
        let tracks = vec![make_audio(1, "eng", "aac", 2)];
        let def = SynthesisDefinition::new("surround", AudioCodec::Eac3, ChannelSpec::Layout(ChannelLayout::Surround51));
        let err = plan(&tracks, vec![def]).unwrap_err();
        assert_matches!(err, Error::SourceTrackNotFound { ref definition, .. } if definition == "surround");

        let err = plan(&[TrackInfo::new(0, TrackKind::Video)], vec![stereo_aac()]).unwrap_err();
        assert_matches!(err, Error::SourceTrackNotFound { .. });
    }

    #[test]
    fn pinned_source_cannot_upmix() {
        let tracks = vec![make_audio(1, "eng", "aac", 2), make_audio(2, "eng", "truehd", 8)];
        let mut def = SynthesisDefinition::new("surround", AudioCodec::Eac3, ChannelSpec::Count(6));
        def.source.track_index = Some(1);
        let err = plan(&tracks, vec![def]).unwrap_err();
        assert_matches!(
            err,
            Error::DownmixNotSupported { source_channels: 2, target_channels: 6, .. }
        );
    }

    #[test]
    fn skip_conditions() {
        let tracks = vec![make_audio(1, "eng", "truehd", 8), make_audio(2, "eng", "aac", 2)];
        let mut exists = stereo_aac();
        exists.skip_if_exists = Some(SkipIfExists {
            codec: Some(vec!["aac".into()]),
            channels: Some(2),
            ..Default::default()
        });
        let mut conditional = stereo_aac();
        conditional.name = "only-french".into();
        conditional.create_if = Some("exists(audio, lang == fra)".parse().unwrap());

        let plan = plan(&tracks, vec![exists, conditional]).unwrap();
        assert!(plan.operations.is_empty());
        assert_eq!(plan.skipped[0].reason, SynthesisSkipReason::AlreadyExists);
        assert_eq!(plan.skipped[1].reason, SynthesisSkipReason::ConditionNotMet);
    }

    #[test]
    fn positions_account_for_planned_tracks() {
        let tracks = vec![make_audio(1, "eng", "truehd", 8), make_audio(2, "fra", "ac3", 6)];
        let mut after = stereo_aac();
        after.position = TargetPosition::Named(NamedPosition::AfterSource);
        let mut second = stereo_aac();
        second.name = "second".into();
        second.title = "Stereo".into();
        second.position = TargetPosition::Index(1);

        let plan = plan(&tracks, vec![after, stereo_aac(), second]).unwrap();
        let positions: Vec<usize> = plan.operations.iter().map(|o| o.target_position).collect();
        assert_eq!(positions, vec![1, 3, 0]);
        assert_eq!(plan.operations[2].target_title, "Stereo");
    }

    #[test]
    fn definition_from_json() {
        let json = r#"{
            "name": "compat",
            "codec": "eac3",
            "channels": "5.1",
            "source": {"prefer": [{"language": "eng", "channels": "max"}, {"codec": ["truehd", "dts-hd"]}]},
            "position": "after_source"
        }"#;
        let def: SynthesisDefinition = serde_json::from_str(json).unwrap();
        assert_eq!(def.target_channels(), 6);
        assert_eq!(def.source.prefer[0].language, Some(vec!["eng".to_string()]));
        assert_eq!(
            def.source.prefer[0].channels,
            Some(ChannelPreference::Extreme(ChannelExtreme::Max))
        );
        assert_eq!(def.source.prefer[1].codec.as_ref().map(Vec::len), Some(2));
        assert_eq!(def.position, TargetPosition::Named(NamedPosition::AfterSource));
        assert_eq!(def.title, INHERIT);
        assert!(def.validate().is_empty());
    }

    #[test]
    fn default_bitrates() {
        assert_eq!(AudioCodec::Eac3.default_bitrate(6), Some("640k"));
        assert_eq!(AudioCodec::Ac3.default_bitrate(8), Some("448k"));
        assert_eq!(AudioCodec::Opus.default_bitrate(1), Some("128k"));
        assert_eq!(AudioCodec::Flac.default_bitrate(2), None);
    }

    proptest! {
        #[test]
        fn never_upmixes(sources in prop::collection::vec(1u32..=8, 0..6), target in 1u32..=8) {
            let tracks: Vec<TrackInfo> = sources
                .iter()
                .enumerate()
                .map(|(i, ch)| make_audio(i, "eng", "ac3", *ch))
                .collect();
            let def = SynthesisDefinition::new("p", AudioCodec::Aac, ChannelSpec::Count(target));
            match plan(&tracks, vec![def]) {
                Ok(plan) => {
                    for op in &plan.operations {
                        prop_assert!(op.target_channels <= op.source.channels);
                    }
                }
                Err(err) => prop_assert!(matches!(
                    err,
                    Error::SourceTrackNotFound { .. } | Error::DownmixNotSupported { .. }
                ), "unexpected error: {:?}", err),
            }
        }
    }
}
