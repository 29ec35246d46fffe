//! Semantic track classification.
//!
//! Every track is mapped onto a [`TrackType`], the unit the ordering and
//! filtering steps reason about. Audio tracks are inspected most closely:
//! title keywords come first, then commentary patterns, then hints supplied
//! by the caller (e.g. from transcription), and finally the language.

use std::collections::BTreeMap;
use std::fmt;

use mp_core::{languages_match, TrackInfo, TrackKind};
use mp_rules::CommentaryMatcher;
use serde::{Deserialize, Serialize};

/// Classification target used for ordering and filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackType {
    Video,
    AudioMain,
    AudioAlternate,
    AudioCommentary,
    AudioMusic,
    AudioSfx,
    AudioNonSpeech,
    SubtitleMain,
    SubtitleForced,
    SubtitleCommentary,
    Attachment,
}

/// The default track order.
pub const CANONICAL_ORDER: [TrackType; 11] = [
    TrackType::Video,
    TrackType::AudioMain,
    TrackType::AudioAlternate,
    TrackType::SubtitleMain,
    TrackType::SubtitleForced,
    TrackType::AudioCommentary,
    TrackType::AudioMusic,
    TrackType::AudioSfx,
    TrackType::AudioNonSpeech,
    TrackType::SubtitleCommentary,
    TrackType::Attachment,
];

impl TrackType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::AudioMain => "audio_main",
            Self::AudioAlternate => "audio_alternate",
            Self::AudioCommentary => "audio_commentary",
            Self::AudioMusic => "audio_music",
            Self::AudioSfx => "audio_sfx",
            Self::AudioNonSpeech => "audio_non_speech",
            Self::SubtitleMain => "subtitle_main",
            Self::SubtitleForced => "subtitle_forced",
            Self::SubtitleCommentary => "subtitle_commentary",
            Self::Attachment => "attachment",
        }
    }

    /// Position in [`CANONICAL_ORDER`].
    pub fn canonical_rank(&self) -> usize {
        CANONICAL_ORDER
            .iter()
            .position(|t| t == self)
            .unwrap_or(CANONICAL_ORDER.len())
    }

    /// The stream kind this classification belongs to.
    pub fn kind(&self) -> TrackKind {
        match self {
            Self::Video => TrackKind::Video,
            Self::AudioMain
            | Self::AudioAlternate
            | Self::AudioCommentary
            | Self::AudioMusic
            | Self::AudioSfx
            | Self::AudioNonSpeech => TrackKind::Audio,
            Self::SubtitleMain | Self::SubtitleForced | Self::SubtitleCommentary => {
                TrackKind::Subtitle
            }
            Self::Attachment => TrackKind::Attachment,
        }
    }
}

impl fmt::Display for TrackType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Title keywords
// ---------------------------------------------------------------------------

/// Title keywords identifying music-only audio.
pub const MUSIC_KEYWORDS: &[&str] = &[
    "music",
    "score",
    "soundtrack",
    "isolated score",
    "m&e",
    "music and effects",
    "ost",
    "theme",
    "instrumental",
    "orchestra",
    "songs only",
];

/// Title keywords identifying effects-only audio.
pub const SFX_KEYWORDS: &[&str] = &[
    "sfx",
    "sound effects",
    "effects only",
    "ambient",
    "foley",
    "environmental",
    "sounds only",
    "effects",
    "atmosphere",
];

fn title_has_keyword(title: Option<&str>, keywords: &[&str]) -> bool {
    match title {
        Some(t) if !t.is_empty() => {
            let lowered = t.to_lowercase();
            keywords.iter().any(|k| lowered.contains(k))
        }
        _ => false,
    }
}

pub fn is_music_title(title: Option<&str>) -> bool {
    title_has_keyword(title, MUSIC_KEYWORDS)
}

pub fn is_sfx_title(title: Option<&str>) -> bool {
    title_has_keyword(title, SFX_KEYWORDS)
}

// ---------------------------------------------------------------------------
// Caller hints
// ---------------------------------------------------------------------------

/// Content detected by an analyzer outside the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackHint {
    Commentary,
    Music,
    Sfx,
    NonSpeech,
    /// Dialog in several languages; treated as main dialog.
    MultiLanguage,
}

/// Hints keyed by track index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassificationHints(BTreeMap<usize, TrackHint>);

impl ClassificationHints {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, track_index: usize, hint: TrackHint) -> Self {
        self.0.insert(track_index, hint);
        self
    }

    pub fn get(&self, track_index: usize) -> Option<TrackHint> {
        self.0.get(&track_index).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Classifier
// ---------------------------------------------------------------------------

/// Classifies tracks against one policy's preferences.
#[derive(Debug, Clone)]
pub struct Classifier<'a> {
    audio_languages: &'a [String],
    matcher: &'a CommentaryMatcher,
    hints: &'a ClassificationHints,
}

impl<'a> Classifier<'a> {
    pub fn new(
        audio_languages: &'a [String],
        matcher: &'a CommentaryMatcher,
        hints: &'a ClassificationHints,
    ) -> Self {
        Self {
            audio_languages,
            matcher,
            hints,
        }
    }

    pub fn classify(&self, track: &TrackInfo) -> TrackType {
        match track.track_type {
            TrackKind::Video => TrackType::Video,
            TrackKind::Audio => self.classify_audio(track),
            TrackKind::Subtitle => {
                if self.matcher.is_commentary(track) {
                    TrackType::SubtitleCommentary
                } else if track.is_forced {
                    TrackType::SubtitleForced
                } else {
                    TrackType::SubtitleMain
                }
            }
            TrackKind::Attachment => TrackType::Attachment,
        }
    }

    /// Classify every track, in input order.
    pub fn classify_all(&self, tracks: &[TrackInfo]) -> Vec<TrackType> {
        tracks.iter().map(|t| self.classify(t)).collect()
    }

    fn classify_audio(&self, track: &TrackInfo) -> TrackType {
        let title = track.title.as_deref();
        if is_sfx_title(title) {
            return TrackType::AudioSfx;
        }
        if is_music_title(title) {
            return TrackType::AudioMusic;
        }
        if self.matcher.is_commentary(track) {
            return TrackType::AudioCommentary;
        }
        match self.hints.get(track.index) {
            Some(TrackHint::Sfx) => return TrackType::AudioSfx,
            Some(TrackHint::Music) => return TrackType::AudioMusic,
            Some(TrackHint::NonSpeech) => return TrackType::AudioNonSpeech,
            Some(TrackHint::Commentary) => return TrackType::AudioCommentary,
            Some(TrackHint::MultiLanguage) => return TrackType::AudioMain,
            None => {}
        }
        let lang = track.language_or_und();
        if self.audio_languages.iter().any(|p| languages_match(lang, p)) {
            TrackType::AudioMain
        } else {
            TrackType::AudioAlternate
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_audio(index: usize, lang: &str, title: Option<&str>) -> TrackInfo {
        let mut t = TrackInfo::new(index, TrackKind::Audio);
        t.language = Some(lang.into());
        t.title = title.map(Into::into);
        t
    }

    fn langs() -> Vec<String> {
        vec!["eng".into(), "und".into()]
    }

    #[test]
    fn audio_by_language() {
        let langs = langs();
        let matcher = CommentaryMatcher::default();
        let hints = ClassificationHints::new();
        let c = Classifier::new(&langs, &matcher, &hints);

        assert_eq!(c.classify(&make_audio(1, "eng", None)), TrackType::AudioMain);
        assert_eq!(c.classify(&make_audio(2, "en", None)), TrackType::AudioMain);
        assert_eq!(c.classify(&make_audio(3, "fra", None)), TrackType::AudioAlternate);
        assert_eq!(
            c.classify(&TrackInfo::new(4, TrackKind::Audio)),
            TrackType::AudioMain
        );
    }

    #[test]
    fn title_keywords_take_priority() {
        let langs = langs();
        let matcher = CommentaryMatcher::default();
        let hints = ClassificationHints::new();
        let c = Classifier::new(&langs, &matcher, &hints);

        assert_eq!(
            c.classify(&make_audio(1, "eng", Some("Sound Effects"))),
            TrackType::AudioSfx
        );
        assert_eq!(
            c.classify(&make_audio(1, "eng", Some("Isolated Score"))),
            TrackType::AudioMusic
        );
        assert_eq!(
            c.classify(&make_audio(1, "eng", Some("Director Commentary"))),
            TrackType::AudioCommentary
        );
    }

    #[test]
    fn hints_apply_after_titles() {
        let langs = langs();
        let matcher = CommentaryMatcher::default();
        let hints = ClassificationHints::new()
            .with(1, TrackHint::NonSpeech)
            .with(2, TrackHint::Commentary)
            .with(3, TrackHint::Music);
        let c = Classifier::new(&langs, &matcher, &hints);

        assert_eq!(c.classify(&make_audio(1, "eng", None)), TrackType::AudioNonSpeech);
        assert_eq!(c.classify(&make_audio(2, "eng", None)), TrackType::AudioCommentary);
        // Title keywords win over hints.
        assert_eq!(
            c.classify(&make_audio(3, "eng", Some("Foley"))),
            TrackType::AudioSfx
        );
    }

    #[test]
    fn subtitles() {
        let langs = langs();
        let matcher = CommentaryMatcher::default();
        let hints = ClassificationHints::new();
        let c = Classifier::new(&langs, &matcher, &hints);

        let mut forced = TrackInfo::new(3, TrackKind::Subtitle);
        forced.is_forced = true;
        let mut commentary = TrackInfo::new(4, TrackKind::Subtitle);
        commentary.title = Some("Commentary subs".into());
        commentary.is_forced = true;

        assert_eq!(
            c.classify(&TrackInfo::new(2, TrackKind::Subtitle)),
            TrackType::SubtitleMain
        );
        assert_eq!(c.classify(&forced), TrackType::SubtitleForced);
        assert_eq!(c.classify(&commentary), TrackType::SubtitleCommentary);
        assert_eq!(
            c.classify(&TrackInfo::new(5, TrackKind::Attachment)),
            TrackType::Attachment
        );
    }

    #[test]
    fn canonical_rank_and_kind() {
        assert_eq!(TrackType::Video.canonical_rank(), 0);
        assert_eq!(TrackType::SubtitleMain.canonical_rank(), 3);
        assert_eq!(TrackType::AudioCommentary.canonical_rank(), 5);
        assert_eq!(TrackType::Attachment.canonical_rank(), 10);
        assert_eq!(TrackType::AudioSfx.kind(), TrackKind::Audio);
        assert_eq!(TrackType::SubtitleForced.kind(), TrackKind::Subtitle);
    }

    #[test]
    fn serde_names() {
        let json = serde_json::to_string(&TrackType::AudioNonSpeech).unwrap();
        assert_eq!(json, "\"audio_non_speech\"");
        let back: TrackType = serde_json::from_str("\"subtitle_forced\"").unwrap();
        assert_eq!(back, TrackType::SubtitleForced);
    }
}
