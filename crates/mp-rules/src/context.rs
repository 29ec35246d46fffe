//! Per-file evaluation context.
//!
//! An [`EvalContext`] is built once per file and passed by reference to every
//! condition and action. It carries everything a condition may look at beyond
//! the track list itself: file-level facts, plugin metadata, container tags,
//! language analysis and original/dubbed classification.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use mp_core::{FileInfo, TrackInfo};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::value::Scalar;

/// Title patterns that mark a track as commentary when none are configured.
pub const DEFAULT_COMMENTARY_PATTERNS: &[&str] = &["commentary", "director", "cast"];

// ---------------------------------------------------------------------------
// Commentary detection
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum TitlePattern {
    Regex(Regex),
    /// Lowercased literal, used when the pattern is not a valid regex.
    Substring(String),
}

/// Case-insensitive matcher for commentary track titles.
#[derive(Debug, Clone)]
pub struct CommentaryMatcher {
    patterns: Vec<TitlePattern>,
}

impl CommentaryMatcher {
    /// Compile `patterns`; an invalid regex falls back to a substring test.
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Self {
        let patterns = patterns
            .iter()
            .map(|p| {
                let p = p.as_ref();
                match RegexBuilder::new(p).case_insensitive(true).build() {
                    Ok(re) => TitlePattern::Regex(re),
                    Err(_) => TitlePattern::Substring(p.to_lowercase()),
                }
            })
            .collect();
        Self { patterns }
    }

    pub fn is_commentary_title(&self, title: &str) -> bool {
        let lowered = title.to_lowercase();
        self.patterns.iter().any(|p| match p {
            TitlePattern::Regex(re) => re.is_match(title),
            TitlePattern::Substring(s) => lowered.contains(s.as_str()),
        })
    }

    /// A track without a title is never commentary.
    pub fn is_commentary(&self, track: &TrackInfo) -> bool {
        track
            .title
            .as_deref()
            .is_some_and(|t| self.is_commentary_title(t))
    }
}

impl Default for CommentaryMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_COMMENTARY_PATTERNS)
    }
}

// ---------------------------------------------------------------------------
// Plugin metadata
// ---------------------------------------------------------------------------

/// Result of looking a field up in [`PluginMetadata`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetadataLookup<'a> {
    PluginMissing,
    FieldMissing,
    /// The field is known; `None` means it was reported without a value.
    Value(Option<&'a Scalar>),
}

/// Metadata supplied by external plugins, keyed `plugin -> field`.
///
/// Keys are stored lowercased, so lookups are case-insensitive.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PluginMetadata {
    plugins: BTreeMap<String, BTreeMap<String, Option<Scalar>>>,
}

impl PluginMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &mut self,
        plugin: &str,
        field: &str,
        value: impl Into<Option<Scalar>>,
    ) -> &mut Self {
        self.plugins
            .entry(plugin.to_lowercase())
            .or_default()
            .insert(field.to_lowercase(), value.into());
        self
    }

    pub fn lookup(&self, plugin: &str, field: &str) -> MetadataLookup<'_> {
        let Some(fields) = self.plugins.get(&plugin.to_lowercase()) else {
            return MetadataLookup::PluginMissing;
        };
        match fields.get(&field.to_lowercase()) {
            Some(value) => MetadataLookup::Value(value.as_ref()),
            None => MetadataLookup::FieldMissing,
        }
    }

    /// The value of `plugin.field`, when present and non-null.
    pub fn get(&self, plugin: &str, field: &str) -> Option<&Scalar> {
        match self.lookup(plugin, field) {
            MetadataLookup::Value(v) => v,
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Analysis results
// ---------------------------------------------------------------------------

/// Share of a secondary language within an audio track (0.0 to 1.0).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LanguageShare {
    pub language: String,
    pub share: f64,
}

/// Spoken-language analysis of one audio track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LanguageAnalysis {
    pub primary_language: String,
    pub primary_share: f64,
    #[serde(default)]
    pub secondary: Vec<LanguageShare>,
}

impl LanguageAnalysis {
    /// Whether any secondary language reaches `threshold`.
    pub fn has_secondary_above(&self, threshold: f64) -> bool {
        self.secondary.iter().any(|s| s.share >= threshold)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OriginStatus {
    Original,
    Dubbed,
    Unknown,
}

impl std::fmt::Display for OriginStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Original => write!(f, "original"),
            Self::Dubbed => write!(f, "dubbed"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Original/dubbed classification of one audio track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackOrigin {
    pub status: OriginStatus,
    pub confidence: f64,
    #[serde(default)]
    pub language: Option<String>,
}

// ---------------------------------------------------------------------------
// EvalContext
// ---------------------------------------------------------------------------

/// Everything conditions and actions can consult for one file.
#[derive(Debug, Clone, Default)]
pub struct EvalContext {
    pub file_path: Option<PathBuf>,
    /// Normalized container name (`mkv`, `mp4`, ...).
    pub container: Option<String>,
    pub file_size: Option<u64>,
    pub duration_seconds: Option<f64>,
    pub plugin_metadata: PluginMetadata,
    /// Container-level tags, keys lowercased.
    pub container_tags: BTreeMap<String, String>,
    /// Language analysis keyed by track index.
    pub language_analysis: BTreeMap<usize, LanguageAnalysis>,
    /// Original/dubbed classification keyed by track index.
    pub origins: BTreeMap<usize, TrackOrigin>,
    /// Extra named fields usable in field comparisons.
    pub fields: BTreeMap<String, Scalar>,
    pub commentary: CommentaryMatcher,
}

impl EvalContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed path, container, size and duration from introspection.
    pub fn for_file(file: &FileInfo) -> Self {
        Self {
            file_path: Some(file.path.clone()),
            container: Some(file.container()),
            file_size: file.size_bytes,
            duration_seconds: file.duration_seconds(),
            ..Self::default()
        }
    }

    pub fn with_plugin_metadata(mut self, metadata: PluginMetadata) -> Self {
        self.plugin_metadata = metadata;
        self
    }

    pub fn with_container_tag(mut self, key: &str, value: impl Into<String>) -> Self {
        self.container_tags.insert(key.to_lowercase(), value.into());
        self
    }

    pub fn with_language_analysis(mut self, track_index: usize, analysis: LanguageAnalysis) -> Self {
        self.language_analysis.insert(track_index, analysis);
        self
    }

    pub fn with_origin(mut self, track_index: usize, origin: TrackOrigin) -> Self {
        self.origins.insert(track_index, origin);
        self
    }

    pub fn with_field(mut self, name: &str, value: impl Into<Scalar>) -> Self {
        self.fields.insert(name.to_lowercase(), value.into());
        self
    }

    pub fn with_commentary_patterns<S: AsRef<str>>(mut self, patterns: &[S]) -> Self {
        self.commentary = CommentaryMatcher::new(patterns);
        self
    }

    pub fn container_tag(&self, key: &str) -> Option<&str> {
        self.container_tags.get(&key.to_lowercase()).map(String::as_str)
    }

    /// File name component of the path, or an empty string.
    pub fn file_name(&self) -> String {
        self.file_path
            .as_deref()
            .and_then(Path::file_name)
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn path_display(&self) -> String {
        self.file_path
            .as_deref()
            .map(|p| p.display().to_string())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mp_core::TrackKind;

    fn titled(title: &str) -> TrackInfo {
        let mut t = TrackInfo::new(1, TrackKind::Audio);
        t.title = Some(title.into());
        t
    }

    #[test]
    fn default_commentary_patterns() {
        let m = CommentaryMatcher::default();
        assert!(m.is_commentary(&titled("Director's Commentary")));
        assert!(m.is_commentary(&titled("COMMENTARY")));
        assert!(!m.is_commentary(&titled("English 5.1")));
        assert!(!m.is_commentary(&TrackInfo::new(1, TrackKind::Audio)));
    }

    #[test]
    fn invalid_regex_falls_back_to_substring() {
        let m = CommentaryMatcher::new(&["(bonus"]);
        assert!(m.is_commentary_title("Track (Bonus"));
        assert!(!m.is_commentary_title("Bonus"));
    }

    #[test]
    fn plugin_lookup_is_case_insensitive() {
        let mut md = PluginMetadata::new();
        md.insert("Radarr", "Original_Language", Scalar::from("jpn"))
            .insert("radarr", "tmdb_id", None::<Scalar>);
        assert_eq!(md.get("radarr", "original_language"), Some(&Scalar::from("jpn")));
        assert_eq!(md.lookup("RADARR", "tmdb_id"), MetadataLookup::Value(None));
        assert_eq!(md.lookup("radarr", "year"), MetadataLookup::FieldMissing);
        assert_eq!(md.lookup("sonarr", "year"), MetadataLookup::PluginMissing);
    }

    #[test]
    fn for_file_seeds_basics() {
        let mut video = TrackInfo::new(0, TrackKind::Video);
        video.duration_seconds = Some(5400.0);
        let file = FileInfo {
            path: PathBuf::from("/media/Movie.mkv"),
            container_format: "matroska,webm".into(),
            size_bytes: Some(4096),
            tracks: vec![video],
        };
        let ctx = EvalContext::for_file(&file).with_container_tag("TITLE", "Movie");
        assert_eq!(ctx.container.as_deref(), Some("mkv"));
        assert_eq!(ctx.file_size, Some(4096));
        assert_eq!(ctx.duration_seconds, Some(5400.0));
        assert_eq!(ctx.file_name(), "Movie.mkv");
        assert_eq!(ctx.container_tag("title"), Some("Movie"));
    }

    #[test]
    fn secondary_threshold() {
        let analysis = LanguageAnalysis {
            primary_language: "eng".into(),
            primary_share: 0.9,
            secondary: vec![LanguageShare {
                language: "fra".into(),
                share: 0.1,
            }],
        };
        assert!(analysis.has_secondary_above(0.05));
        assert!(!analysis.has_secondary_above(0.2));
    }
}
