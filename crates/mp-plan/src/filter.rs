//! Track filtering: which tracks a phase keeps and which it removes.

use std::fmt;

use mp_core::{languages_match, Error, Result, TrackInfo, TrackKind};
use serde::{Deserialize, Serialize};

use crate::classify::{is_music_title, is_sfx_title, TrackType};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// What to do when the language filter leaves too few audio tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackMode {
    /// Keep tracks matching the first audio track's language.
    ContentLanguage,
    KeepAll,
    /// Keep the first removed tracks until the minimum is met.
    KeepFirst,
    Error,
}

fn default_minimum() -> usize {
    1
}

fn default_true() -> bool {
    true
}

/// Audio language filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFilterConfig {
    pub languages: Vec<String>,
    #[serde(default)]
    pub fallback: Option<FallbackMode>,
    #[serde(default = "default_minimum")]
    pub minimum: usize,
    #[serde(default = "default_true")]
    pub keep_music: bool,
    #[serde(default = "default_true")]
    pub keep_sfx: bool,
    #[serde(default = "default_true")]
    pub keep_non_speech: bool,
    #[serde(default = "default_true")]
    pub exclude_music_from_language_filter: bool,
    #[serde(default = "default_true")]
    pub exclude_sfx_from_language_filter: bool,
    #[serde(default = "default_true")]
    pub exclude_non_speech_from_language_filter: bool,
}

impl AudioFilterConfig {
    pub fn new<S: Into<String>>(languages: impl IntoIterator<Item = S>) -> Self {
        Self {
            languages: languages.into_iter().map(Into::into).collect(),
            fallback: None,
            minimum: 1,
            keep_music: true,
            keep_sfx: true,
            keep_non_speech: true,
            exclude_music_from_language_filter: true,
            exclude_sfx_from_language_filter: true,
            exclude_non_speech_from_language_filter: true,
        }
    }

    pub fn with_fallback(mut self, fallback: FallbackMode) -> Self {
        self.fallback = Some(fallback);
        self
    }
}

/// Subtitle language filter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubtitleFilterConfig {
    /// `None` keeps every language.
    pub languages: Option<Vec<String>>,
    pub preserve_forced: bool,
    pub remove_all: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttachmentFilterConfig {
    pub remove_all: bool,
}

/// Metadata clean-up applied to one track type before filtering.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackPreActions {
    pub clear_all_forced: bool,
    pub clear_all_default: bool,
    pub clear_all_titles: bool,
}

impl TrackPreActions {
    pub fn is_noop(&self) -> bool {
        !(self.clear_all_forced || self.clear_all_default || self.clear_all_titles)
    }
}

// ---------------------------------------------------------------------------
// Dispositions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Disposition {
    Keep,
    Remove,
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Keep => write!(f, "keep"),
            Self::Remove => write!(f, "remove"),
        }
    }
}

/// Whether a track survives the phase, and why.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackDisposition {
    pub track_index: usize,
    pub track_type: TrackKind,
    pub codec: Option<String>,
    pub language: Option<String>,
    pub title: Option<String>,
    pub channels: Option<u32>,
    pub resolution: Option<String>,
    pub action: Disposition,
    pub reason: String,
}

impl TrackDisposition {
    fn new(track: &TrackInfo, action: Disposition, reason: impl Into<String>) -> Self {
        Self {
            track_index: track.index,
            track_type: track.track_type,
            codec: track.codec.clone(),
            language: track.language.clone(),
            title: track.title.clone(),
            channels: track.channels,
            resolution: track.resolution(),
            action,
            reason: reason.into(),
        }
    }

    pub fn is_removed(&self) -> bool {
        self.action == Disposition::Remove
    }
}

/// The filter configs active in one phase.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrackFilterSet<'a> {
    pub audio: Option<&'a AudioFilterConfig>,
    pub subtitle: Option<&'a SubtitleFilterConfig>,
    pub attachment: Option<&'a AttachmentFilterConfig>,
    /// Subtitle forced flags are cleared before filtering runs.
    pub subtitle_forced_cleared: bool,
}

impl TrackFilterSet<'_> {
    pub fn is_active(&self) -> bool {
        self.audio.is_some() || self.subtitle.is_some() || self.attachment.is_some()
    }
}

type Verdict = (Disposition, &'static str);

fn evaluate_audio(track: &TrackInfo, class: TrackType, config: &AudioFilterConfig) -> Verdict {
    let title = track.title.as_deref();
    if class == TrackType::AudioMusic || is_music_title(title) {
        if !config.keep_music {
            return (Disposition::Remove, "music track excluded by policy");
        }
        if config.exclude_music_from_language_filter {
            return (Disposition::Keep, "music track (exempt from language filter)");
        }
    }
    if class == TrackType::AudioSfx || is_sfx_title(title) {
        if !config.keep_sfx {
            return (Disposition::Remove, "sfx track excluded by policy");
        }
        if config.exclude_sfx_from_language_filter {
            return (Disposition::Keep, "sfx track (exempt from language filter)");
        }
    }
    if class == TrackType::AudioNonSpeech {
        if !config.keep_non_speech {
            return (Disposition::Remove, "non-speech track excluded by policy");
        }
        if config.exclude_non_speech_from_language_filter {
            return (Disposition::Keep, "non-speech track (exempt from language filter)");
        }
    }
    keep_if_language(track, &config.languages)
}

fn keep_if_language(track: &TrackInfo, languages: &[String]) -> Verdict {
    let lang = track.language_or_und();
    if languages.iter().any(|l| languages_match(lang, l)) {
        (Disposition::Keep, "language in keep list")
    } else {
        (Disposition::Remove, "language not in keep list")
    }
}

fn evaluate_subtitle(track: &TrackInfo, config: &SubtitleFilterConfig, forced_cleared: bool) -> Verdict {
    if config.remove_all {
        return (Disposition::Remove, "remove_all enabled");
    }
    if config.preserve_forced && !forced_cleared && track.is_forced {
        return (Disposition::Keep, "forced subtitle preserved");
    }
    match &config.languages {
        None => (Disposition::Keep, "no language filter applied"),
        Some(languages) => keep_if_language(track, languages),
    }
}

fn is_font(track: &TrackInfo) -> bool {
    let codec = track.codec_lower();
    matches!(codec.as_str(), "ttf" | "otf" | "ttc" | "woff" | "woff2")
        || codec.starts_with("font/")
        || matches!(
            codec.as_str(),
            "application/x-truetype-font" | "application/x-font-ttf" | "application/font-sfnt"
        )
}

fn has_styled_subtitles(tracks: &[TrackInfo]) -> bool {
    tracks.iter().any(|t| {
        t.is(TrackKind::Subtitle)
            && matches!(t.codec_lower().as_str(), "ass" | "ssa" | "ass_subtitle" | "ssa_subtitle")
    })
}

fn evaluate_attachment(track: &TrackInfo, config: &AttachmentFilterConfig, styled: bool) -> Verdict {
    if !config.remove_all {
        (Disposition::Keep, "attachment kept")
    } else if styled && is_font(track) {
        (
            Disposition::Remove,
            "remove_all enabled (font removed, styled subtitles may be affected)",
        )
    } else {
        (Disposition::Remove, "remove_all enabled")
    }
}

/// Compute a disposition for every track.
///
/// `types[i]` classifies `tracks[i]`. Raises
/// [`Error::InsufficientTracks`] when the audio filter keeps fewer than
/// `minimum` tracks and no fallback (or the `error` fallback) is set.
pub fn compute_track_dispositions(
    tracks: &[TrackInfo],
    types: &[TrackType],
    filters: &TrackFilterSet<'_>,
) -> Result<Vec<TrackDisposition>> {
    let styled = has_styled_subtitles(tracks);
    let mut dispositions: Vec<TrackDisposition> = tracks
        .iter()
        .zip(types)
        .map(|(track, class)| {
            let (action, reason) = match track.track_type {
                TrackKind::Audio => filters
                    .audio
                    .map(|c| evaluate_audio(track, *class, c)),
                TrackKind::Subtitle => filters
                    .subtitle
                    .map(|c| evaluate_subtitle(track, c, filters.subtitle_forced_cleared)),
                TrackKind::Attachment => filters
                    .attachment
                    .map(|c| evaluate_attachment(track, c, styled)),
                TrackKind::Video => None,
            }
            .unwrap_or((Disposition::Keep, "no filter applied"));
            TrackDisposition::new(track, action, reason)
        })
        .collect();

    if let Some(config) = filters.audio {
        apply_audio_fallback(tracks, &mut dispositions, config)?;
    }
    Ok(dispositions)
}

fn apply_audio_fallback(
    tracks: &[TrackInfo],
    dispositions: &mut [TrackDisposition],
    config: &AudioFilterConfig,
) -> Result<()> {
    let audio: Vec<usize> = dispositions
        .iter()
        .enumerate()
        .filter(|(_, d)| d.track_type == TrackKind::Audio)
        .map(|(i, _)| i)
        .collect();
    if audio.is_empty() {
        return Ok(());
    }
    let kept = audio
        .iter()
        .filter(|&&i| !dispositions[i].is_removed())
        .count();
    if kept >= config.minimum {
        return Ok(());
    }

    match config.fallback.unwrap_or(FallbackMode::Error) {
        FallbackMode::Error => Err(Error::InsufficientTracks {
            track_type: TrackKind::Audio.to_string(),
            required: config.minimum,
            available: kept,
            policy_languages: config.languages.clone(),
            file_languages: audio
                .iter()
                .map(|&i| tracks[i].language_or_und().to_string())
                .collect(),
        }),
        FallbackMode::KeepAll => {
            for &i in &audio {
                keep(&mut dispositions[i], "fallback: keep_all applied");
            }
            Ok(())
        }
        FallbackMode::KeepFirst => {
            let mut needed = config.minimum - kept;
            for &i in &audio {
                if needed == 0 {
                    break;
                }
                if dispositions[i].is_removed() {
                    keep(&mut dispositions[i], "fallback: keep_first applied");
                    needed -= 1;
                }
            }
            Ok(())
        }
        FallbackMode::ContentLanguage => {
            let content = tracks[audio[0]].language_or_und().to_string();
            tracing::debug!(language = %content, "Audio filter falling back to content language");
            for &i in &audio {
                if languages_match(tracks[i].language_or_und(), &content) {
                    keep(&mut dispositions[i], "fallback: content language match");
                }
            }
            Ok(())
        }
    }
}

fn keep(disposition: &mut TrackDisposition, reason: &str) {
    disposition.action = Disposition::Keep;
    disposition.reason = reason.to_string();
}
