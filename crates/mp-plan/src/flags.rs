//! Default and forced flag assignment.

use std::collections::BTreeMap;

use mp_core::codecs::codec_matches;
use mp_core::{languages_match, Error, Result, TrackInfo, TrackKind};
use mp_rules::CommentaryMatcher;
use serde::{Deserialize, Serialize};

/// How default/forced flags are assigned within a phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultFlagsConfig {
    pub set_first_video_default: bool,
    pub set_preferred_audio_default: bool,
    pub set_preferred_subtitle_default: bool,
    pub clear_other_defaults: bool,
    pub set_subtitle_default_when_audio_differs: bool,
    pub set_subtitle_forced_when_audio_differs: bool,
    /// Tie-breaker among audio tracks of the preferred language.
    pub preferred_audio_codec: Vec<String>,
}

impl Default for DefaultFlagsConfig {
    fn default() -> Self {
        Self {
            set_first_video_default: true,
            set_preferred_audio_default: true,
            set_preferred_subtitle_default: false,
            clear_other_defaults: true,
            set_subtitle_default_when_audio_differs: false,
            set_subtitle_forced_when_audio_differs: false,
            preferred_audio_codec: Vec::new(),
        }
    }
}

/// Desired flag values keyed by track index. Absent entries stay untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlagAssignment {
    pub default: BTreeMap<usize, bool>,
    pub forced: BTreeMap<usize, bool>,
}

/// Language preferences and commentary detection used to pick defaults.
#[derive(Debug, Clone, Copy)]
pub struct FlagPreferences<'a> {
    pub audio_languages: &'a [String],
    pub subtitle_languages: &'a [String],
    pub matcher: &'a CommentaryMatcher,
}

/// Pick the preferred track of a group.
///
/// Commentary is ignored unless every track is commentary. Candidates are
/// narrowed by the language preference list (in order), then by the codec
/// preference list, then the earliest track wins.
fn find_preferred<'t>(
    tracks: &[&'t TrackInfo],
    languages: &[String],
    codecs: &[String],
    matcher: &CommentaryMatcher,
) -> Option<&'t TrackInfo> {
    let non_commentary: Vec<&TrackInfo> = tracks
        .iter()
        .copied()
        .filter(|t| !matcher.is_commentary(t))
        .collect();
    if non_commentary.is_empty() {
        return tracks.first().copied();
    }

    let by_language = languages.iter().find_map(|lang| {
        let matching: Vec<&TrackInfo> = non_commentary
            .iter()
            .copied()
            .filter(|t| languages_match(t.language_or_und(), lang))
            .collect();
        (!matching.is_empty()).then_some(matching)
    });
    let pool = by_language.unwrap_or(non_commentary);

    codecs
        .iter()
        .find_map(|codec| {
            pool.iter()
                .copied()
                .find(|t| t.codec.as_deref().is_some_and(|c| codec_matches(c, codec)))
        })
        .or_else(|| pool.first().copied())
}

fn audio_matches_preference(audio: &[&TrackInfo], languages: &[String], matcher: &CommentaryMatcher) -> bool {
    audio
        .iter()
        .filter(|t| !matcher.is_commentary(t))
        .any(|t| languages.iter().any(|l| languages_match(t.language_or_und(), l)))
}

/// Mark `chosen` as the only default of its group.
fn assign_single(result: &mut BTreeMap<usize, bool>, group: &[&TrackInfo], chosen: &TrackInfo) {
    for track in group {
        result.insert(track.index, track.index == chosen.index);
    }
}

/// Compute desired default/forced flags for `tracks`.
pub fn compute_default_flags(
    tracks: &[TrackInfo],
    config: &DefaultFlagsConfig,
    prefs: &FlagPreferences<'_>,
) -> Result<FlagAssignment> {
    let mut out = FlagAssignment::default();
    let video = of_kind(tracks, TrackKind::Video);
    let audio = of_kind(tracks, TrackKind::Audio);
    let subtitles = of_kind(tracks, TrackKind::Subtitle);

    if config.set_first_video_default {
        if let Some(first) = video.first() {
            assign_single(&mut out.default, &video, first);
        }
    } else if config.clear_other_defaults {
        clear_all(&mut out.default, &video);
    }

    if config.set_preferred_audio_default {
        if let Some(chosen) = find_preferred(
            &audio,
            prefs.audio_languages,
            &config.preferred_audio_codec,
            prefs.matcher,
        ) {
            assign_single(&mut out.default, &audio, chosen);
        }
    } else if config.clear_other_defaults {
        clear_all(&mut out.default, &audio);
    }

    let mut subtitle_default_set = false;
    if config.set_preferred_subtitle_default {
        if let Some(chosen) = find_preferred(&subtitles, prefs.subtitle_languages, &[], prefs.matcher) {
            assign_single(&mut out.default, &subtitles, chosen);
            subtitle_default_set = true;
        }
    } else if config.clear_other_defaults {
        clear_all(&mut out.default, &subtitles);
    }

    let audio_differs = !subtitles.is_empty()
        && !audio_matches_preference(&audio, prefs.audio_languages, prefs.matcher);

    if audio_differs && config.set_subtitle_default_when_audio_differs && !subtitle_default_set {
        if let Some(chosen) = find_preferred(&subtitles, prefs.subtitle_languages, &[], prefs.matcher) {
            assign_single(&mut out.default, &subtitles, chosen);
        }
    }

    if audio_differs && config.set_subtitle_forced_when_audio_differs {
        if let Some(chosen) = find_preferred(&subtitles, prefs.subtitle_languages, &[], prefs.matcher) {
            out.forced.insert(chosen.index, true);
        }
    }

    check_single_default(tracks, &out.default)?;
    Ok(out)
}

fn of_kind(tracks: &[TrackInfo], kind: TrackKind) -> Vec<&TrackInfo> {
    tracks.iter().filter(|t| t.is(kind)).collect()
}

fn clear_all(result: &mut BTreeMap<usize, bool>, group: &[&TrackInfo]) {
    for track in group {
        result.insert(track.index, false);
    }
}

/// At most one track per type may end up default among the assigned ones.
fn check_single_default(tracks: &[TrackInfo], assigned: &BTreeMap<usize, bool>) -> Result<()> {
    for kind in [TrackKind::Video, TrackKind::Audio, TrackKind::Subtitle] {
        let count = tracks
            .iter()
            .filter(|t| t.is(kind) && assigned.get(&t.index).copied().unwrap_or(false))
            .count();
        if count > 1 {
            return Err(Error::Internal(format!(
                "{count} {kind} tracks assigned the default flag"
            )));
        }
    }
    Ok(())
}

/// Keep only the first default of each type in a final flag state.
///
/// `defaults` holds the complete desired default state; extra defaults are
/// cleared in index order.
pub fn enforce_single_default(tracks: &[TrackInfo], defaults: &mut BTreeMap<usize, bool>) {
    for kind in [TrackKind::Video, TrackKind::Audio, TrackKind::Subtitle] {
        let mut seen = false;
        let mut indices: Vec<usize> = tracks.iter().filter(|t| t.is(kind)).map(|t| t.index).collect();
        indices.sort_unstable();
        for index in indices {
            if let Some(flag) = defaults.get_mut(&index) {
                if *flag {
                    if seen {
                        *flag = false;
                    }
                    seen = true;
                }
            }
        }
    }
}
