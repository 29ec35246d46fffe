//! Media-domain types: track kinds, track and file metadata, containers.
//!
//! Enums serialize in lowercase (via `serde(rename_all = "lowercase")`) and
//! implement `Display` manually for consistent string representation.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// TrackKind
// ---------------------------------------------------------------------------

/// Stream type reported by introspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Video,
    Audio,
    Subtitle,
    Attachment,
}

impl TrackKind {
    /// All kinds, in stream order.
    pub const ALL: [TrackKind; 4] = [
        TrackKind::Video,
        TrackKind::Audio,
        TrackKind::Subtitle,
        TrackKind::Attachment,
    ];

    /// Lowercase name used in expressions and policy documents.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Subtitle => "subtitle",
            Self::Attachment => "attachment",
        }
    }
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrackKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "video" => Ok(Self::Video),
            "audio" => Ok(Self::Audio),
            "subtitle" => Ok(Self::Subtitle),
            "attachment" => Ok(Self::Attachment),
            other => Err(Error::Validation(format!(
                "unknown track type '{other}' (video, audio, subtitle, attachment)"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Container
// ---------------------------------------------------------------------------

/// Canonical container formats the engine reasons about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Container {
    Mkv,
    Mp4,
    Mov,
    Avi,
}

impl Container {
    /// Map a reported container identifier onto a canonical container.
    ///
    /// Returns `None` for formats outside the canonical set.
    pub fn from_reported(reported: &str) -> Option<Self> {
        match normalize_container_format(reported).as_str() {
            "mkv" => Some(Self::Mkv),
            "mp4" => Some(Self::Mp4),
            "mov" => Some(Self::Mov),
            "avi" => Some(Self::Avi),
            _ => None,
        }
    }

    /// Whether the container can carry a reordered track layout.
    pub fn supports_reorder(&self) -> bool {
        matches!(self, Self::Mkv)
    }

    /// Whether per-track flags, titles and languages can be rewritten.
    pub fn supports_track_metadata(&self) -> bool {
        !matches!(self, Self::Avi)
    }
}

impl fmt::Display for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mkv => write!(f, "mkv"),
            Self::Mp4 => write!(f, "mp4"),
            Self::Mov => write!(f, "mov"),
            Self::Avi => write!(f, "avi"),
        }
    }
}

/// Normalize a container identifier as reported by introspection tools.
///
/// Known aliases collapse to `mkv`, `mp4`, `mov` or `avi`; anything else is
/// returned lowercased and trimmed.
pub fn normalize_container_format(reported: &str) -> String {
    let c = reported.trim().to_lowercase();
    match c.as_str() {
        "matroska" | "matroska,webm" | "webm" => return "mkv".into(),
        "mov,mp4,m4a,3gp,3g2,mj2" => return "mp4".into(),
        "quicktime" => return "mov".into(),
        _ => {}
    }
    if c.contains("matroska") {
        "mkv".into()
    } else if ["mp4", "m4a", "m4v"].iter().any(|x| c.contains(x)) {
        "mp4".into()
    } else if c.contains("mov") || c.contains("quicktime") {
        "mov".into()
    } else if c.contains("avi") {
        "avi".into()
    } else {
        c
    }
}

// ---------------------------------------------------------------------------
// Languages
// ---------------------------------------------------------------------------

/// The language code used when a track carries no language tag.
pub const UNDETERMINED_LANGUAGE: &str = "und";

/// Compare two language codes (ISO 639-1 or 639-2/B) case-insensitively.
pub fn languages_match(a: &str, b: &str) -> bool {
    canonical_language(a) == canonical_language(b)
}

fn canonical_language(code: &str) -> String {
    let code = code.trim().to_lowercase();
    let mapped = match code.as_str() {
        "en" => "eng",
        "fr" | "fre" => "fra",
        "de" | "ger" => "deu",
        "es" => "spa",
        "it" => "ita",
        "ja" => "jpn",
        "ko" => "kor",
        "zh" | "chi" => "zho",
        "pt" => "por",
        "ru" => "rus",
        "nl" | "dut" => "nld",
        "sv" => "swe",
        _ => return code,
    };
    mapped.to_string()
}

// ---------------------------------------------------------------------------
// TrackInfo / FileInfo
// ---------------------------------------------------------------------------

/// Metadata for one track, as reported by the introspection collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackInfo {
    /// 0-based global track index in the file.
    pub index: usize,
    pub track_type: TrackKind,
    #[serde(default)]
    pub codec: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default)]
    pub is_forced: bool,
    #[serde(default)]
    pub channels: Option<u32>,
    #[serde(default)]
    pub channel_layout: Option<String>,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub duration_seconds: Option<f64>,
}

impl TrackInfo {
    /// Create a track with only index and kind set.
    pub fn new(index: usize, track_type: TrackKind) -> Self {
        Self {
            index,
            track_type,
            codec: None,
            language: None,
            title: None,
            is_default: false,
            is_forced: false,
            channels: None,
            channel_layout: None,
            width: None,
            height: None,
            duration_seconds: None,
        }
    }

    /// Language tag, or `und` when untagged.
    pub fn language_or_und(&self) -> &str {
        self.language.as_deref().unwrap_or(UNDETERMINED_LANGUAGE)
    }

    /// Lowercased codec, or an empty string when unknown.
    pub fn codec_lower(&self) -> String {
        self.codec.as_deref().unwrap_or_default().trim().to_lowercase()
    }

    /// `WIDTHxHEIGHT` when both dimensions are known.
    pub fn resolution(&self) -> Option<String> {
        match (self.width, self.height) {
            (Some(w), Some(h)) => Some(format!("{w}x{h}")),
            _ => None,
        }
    }

    pub fn is(&self, kind: TrackKind) -> bool {
        self.track_type == kind
    }
}

/// File-level introspection result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileInfo {
    pub path: PathBuf,
    /// Container identifier as reported (e.g. `matroska,webm`).
    pub container_format: String,
    #[serde(default)]
    pub size_bytes: Option<u64>,
    pub tracks: Vec<TrackInfo>,
}

impl FileInfo {
    /// The first video track, if any.
    pub fn primary_video(&self) -> Option<&TrackInfo> {
        self.tracks.iter().find(|t| t.is(TrackKind::Video))
    }

    /// Tracks of the given kind, in file order.
    pub fn tracks_of(&self, kind: TrackKind) -> impl Iterator<Item = &TrackInfo> {
        self.tracks.iter().filter(move |t| t.is(kind))
    }

    /// Normalized container name.
    pub fn container(&self) -> String {
        normalize_container_format(&self.container_format)
    }

    /// Duration of the longest track, when any track reports one.
    pub fn duration_seconds(&self) -> Option<f64> {
        self.tracks
            .iter()
            .filter_map(|t| t.duration_seconds)
            .fold(None, |acc: Option<f64>, d| Some(acc.map_or(d, |a| a.max(d))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn track_kind_roundtrip() {
        for kind in TrackKind::ALL {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{kind}\""));
            assert_eq!(kind.as_str().parse::<TrackKind>().unwrap(), kind);
        }
    }

    #[test]
    fn unknown_track_kind() {
        assert!("data".parse::<TrackKind>().is_err());
    }

    #[test]
    fn normalize_aliases() {
        assert_eq!(normalize_container_format("matroska,webm"), "mkv");
        assert_eq!(normalize_container_format("Matroska"), "mkv");
        assert_eq!(normalize_container_format("webm"), "mkv");
        assert_eq!(normalize_container_format("mov,mp4,m4a,3gp,3g2,mj2"), "mp4");
        assert_eq!(normalize_container_format("QuickTime"), "mov");
        assert_eq!(normalize_container_format(" avi "), "avi");
        assert_eq!(normalize_container_format("mpegts"), "mpegts");
    }

    #[test]
    fn container_from_reported() {
        assert_eq!(Container::from_reported("matroska"), Some(Container::Mkv));
        assert_eq!(Container::from_reported("m4v"), Some(Container::Mp4));
        assert_eq!(Container::from_reported("flv"), None);
        assert!(Container::Mkv.supports_reorder());
        assert!(!Container::Mp4.supports_reorder());
        assert!(!Container::Avi.supports_track_metadata());
    }

    #[test]
    fn language_aliases() {
        assert!(languages_match("eng", "EN"));
        assert!(languages_match("ger", "deu"));
        assert!(languages_match("jpn", "jpn"));
        assert!(!languages_match("eng", "fra"));
    }

    #[test]
    fn track_helpers() {
        let mut t = TrackInfo::new(0, TrackKind::Video);
        assert_eq!(t.language_or_und(), "und");
        assert_eq!(t.resolution(), None);
        t.width = Some(1920);
        t.height = Some(1080);
        t.codec = Some(" HEVC ".into());
        assert_eq!(t.resolution().as_deref(), Some("1920x1080"));
        assert_eq!(t.codec_lower(), "hevc");
    }

    #[test]
    fn file_duration_is_longest() {
        let mut a = TrackInfo::new(0, TrackKind::Video);
        a.duration_seconds = Some(10.0);
        let mut b = TrackInfo::new(1, TrackKind::Audio);
        b.duration_seconds = Some(12.5);
        let info = FileInfo {
            path: PathBuf::from("/m/a.mkv"),
            container_format: "matroska".into(),
            size_bytes: None,
            tracks: vec![a, b],
        };
        assert_eq!(info.duration_seconds(), Some(12.5));
        assert_eq!(info.container(), "mkv");
        assert_eq!(info.primary_video().map(|t| t.index), Some(0));
    }
}
