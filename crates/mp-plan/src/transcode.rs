//! Video and audio transcode decisions.
//!
//! Transcoding itself is done by the execution collaborator; this module only
//! decides whether the primary video stream needs re-encoding and what happens
//! to each audio track alongside it.

use std::fmt;

use mp_core::codecs::codec_matches;
use mp_core::{TrackInfo, TrackKind};
use mp_rules::SkipFlags;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoCodec {
    Hevc,
    H264,
    Vp9,
    Av1,
}

impl VideoCodec {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hevc => "hevc",
            Self::H264 => "h264",
            Self::Vp9 => "vp9",
            Self::Av1 => "av1",
        }
    }

    /// Software encoder name.
    pub fn encoder(&self) -> &'static str {
        match self {
            Self::Hevc => "libx265",
            Self::H264 => "libx264",
            Self::Vp9 => "libvpx-vp9",
            Self::Av1 => "libsvtav1",
        }
    }

    /// Balanced-quality CRF used when the policy does not set one.
    pub fn default_crf(&self) -> u8 {
        match self {
            Self::H264 => 23,
            Self::Hevc => 28,
            Self::Vp9 => 31,
            Self::Av1 => 30,
        }
    }
}

impl fmt::Display for VideoCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Maximum dimensions of a named resolution preset.
pub fn resolution_bounds(preset: &str) -> Option<(u32, u32)> {
    match preset.to_ascii_lowercase().as_str() {
        "480p" => Some((854, 480)),
        "720p" => Some((1280, 720)),
        "1080p" => Some((1920, 1080)),
        "1440p" => Some((2560, 1440)),
        "2160p" | "4k" => Some((3840, 2160)),
        "8k" => Some((7680, 4320)),
        _ => None,
    }
}

pub const VALID_PRESETS: &[&str] = &[
    "ultrafast",
    "superfast",
    "veryfast",
    "faster",
    "fast",
    "medium",
    "slow",
    "slower",
    "veryslow",
];

/// Skip video transcoding when every given condition holds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoSkipCondition {
    pub codec_matches: Option<Vec<String>>,
    pub resolution_within: Option<String>,
}

impl VideoSkipCondition {
    pub fn is_empty(&self) -> bool {
        self.codec_matches.is_none() && self.resolution_within.is_none()
    }
}

fn default_preset() -> String {
    "medium".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualitySettings {
    #[serde(default)]
    pub crf: Option<u8>,
    #[serde(default = "default_preset")]
    pub preset: String,
    #[serde(default)]
    pub bitrate: Option<String>,
}

impl Default for QualitySettings {
    fn default() -> Self {
        Self {
            crf: None,
            preset: default_preset(),
            bitrate: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HardwareAcceleration {
    #[default]
    Auto,
    Nvenc,
    Qsv,
    Vaapi,
    None,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoTranscodeConfig {
    pub target_codec: VideoCodec,
    #[serde(default)]
    pub skip_if: Option<VideoSkipCondition>,
    #[serde(default)]
    pub quality: QualitySettings,
    #[serde(default)]
    pub hardware_acceleration: HardwareAcceleration,
}

impl VideoTranscodeConfig {
    pub fn new(target_codec: VideoCodec) -> Self {
        Self {
            target_codec,
            skip_if: None,
            quality: QualitySettings::default(),
            hardware_acceleration: HardwareAcceleration::default(),
        }
    }
}

fn default_preserve_codecs() -> Vec<String> {
    ["truehd", "dts-hd", "flac", "pcm_s24le"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_transcode_to() -> String {
    "aac".to_string()
}

fn default_transcode_bitrate() -> String {
    "192k".to_string()
}

/// Audio handling while the video is being transcoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioTranscodeConfig {
    #[serde(default = "default_preserve_codecs")]
    pub preserve_codecs: Vec<String>,
    #[serde(default = "default_transcode_to")]
    pub transcode_to: String,
    #[serde(default = "default_transcode_bitrate")]
    pub transcode_bitrate: String,
}

impl Default for AudioTranscodeConfig {
    fn default() -> Self {
        Self {
            preserve_codecs: default_preserve_codecs(),
            transcode_to: default_transcode_to(),
            transcode_bitrate: default_transcode_bitrate(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscodeConfig {
    pub video: Option<VideoTranscodeConfig>,
    pub audio: Option<AudioTranscodeConfig>,
}

impl TranscodeConfig {
    /// Load-time problems with this config.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if let Some(video) = &self.video {
            if let Some(crf) = video.quality.crf {
                if crf > 51 {
                    problems.push(format!("transcode: crf {crf} must be between 0 and 51"));
                }
            }
            if !VALID_PRESETS.contains(&video.quality.preset.as_str()) {
                problems.push(format!("transcode: unknown preset '{}'", video.quality.preset));
            }
            if let Some(skip) = &video.skip_if {
                if skip.is_empty() {
                    problems.push("transcode: skip_if needs at least one condition".to_string());
                }
                if let Some(res) = &skip.resolution_within {
                    if resolution_bounds(res).is_none() {
                        problems.push(format!("transcode: unknown resolution '{res}'"));
                    }
                }
            }
        }
        problems
    }
}

// ---------------------------------------------------------------------------
// Decisions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoTranscodePlan {
    pub track_index: usize,
    pub source_codec: Option<String>,
    pub target_codec: VideoCodec,
    pub encoder: String,
    pub crf: Option<u8>,
    pub bitrate: Option<String>,
    pub preset: String,
    pub hardware_acceleration: HardwareAcceleration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioTrackAction {
    Copy,
    Transcode,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioTrackPlan {
    pub track_index: usize,
    pub source_codec: Option<String>,
    pub action: AudioTrackAction,
    pub target_codec: Option<String>,
    pub target_bitrate: Option<String>,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscodePlan {
    pub video: Option<VideoTranscodePlan>,
    /// Why video transcoding was skipped.
    pub video_skip_reason: Option<String>,
    pub audio: Vec<AudioTrackPlan>,
}

impl TranscodePlan {
    /// True when some stream is re-encoded.
    pub fn has_work(&self) -> bool {
        self.video.is_some() || self.audio.iter().any(|a| a.action == AudioTrackAction::Transcode)
    }
}

/// Whether `video` already satisfies `skip_if`; the reason either way.
///
/// Every given condition must hold. An unknown resolution passes.
pub fn evaluate_video_skip(skip_if: &VideoSkipCondition, video: &TrackInfo) -> (bool, String) {
    let codec = video.codec.as_deref().unwrap_or("unknown");
    if let Some(codecs) = &skip_if.codec_matches {
        let matched = video
            .codec
            .as_deref()
            .is_some_and(|c| codecs.iter().any(|want| codec_matches(c, want)));
        if !matched {
            return (false, format!("codec '{codec}' not in skip list [{}]", codecs.join(", ")));
        }
    }
    if let Some(preset) = &skip_if.resolution_within {
        if let (Some((max_w, max_h)), Some(w), Some(h)) = (resolution_bounds(preset), video.width, video.height) {
            if w > max_w || h > max_h {
                return (false, format!("resolution {w}x{h} exceeds {preset}"));
            }
        }
    }

    let mut reasons = Vec::new();
    if skip_if.codec_matches.is_some() {
        reasons.push(format!("codec is {codec}"));
    }
    if let Some(preset) = &skip_if.resolution_within {
        reasons.push(format!(
            "resolution {} within {preset}",
            video.resolution().unwrap_or_else(|| "unknown".into())
        ));
    }
    (true, format!("Already compliant: {}", reasons.join(", ")))
}

fn plan_audio_track(track: &TrackInfo, config: &AudioTranscodeConfig) -> AudioTrackPlan {
    let codec = track.codec.as_deref().unwrap_or("unknown");
    let preserved = track
        .codec
        .as_deref()
        .is_some_and(|c| config.preserve_codecs.iter().any(|p| codec_matches(c, p)));
    if preserved {
        return AudioTrackPlan {
            track_index: track.index,
            source_codec: track.codec.clone(),
            action: AudioTrackAction::Copy,
            target_codec: None,
            target_bitrate: None,
            reason: format!("codec '{codec}' is preserved"),
        };
    }
    AudioTrackPlan {
        track_index: track.index,
        source_codec: track.codec.clone(),
        action: AudioTrackAction::Transcode,
        target_codec: Some(config.transcode_to.clone()),
        target_bitrate: Some(config.transcode_bitrate.clone()),
        reason: format!("transcoding '{codec}' to '{}'", config.transcode_to),
    }
}

/// Decide the transcode work for `tracks` under `config`.
///
/// Rule skip flags win over the config: a skipped stream type is left as is.
pub fn plan_transcode(tracks: &[TrackInfo], config: &TranscodeConfig, skip: SkipFlags) -> TranscodePlan {
    let mut plan = TranscodePlan::default();

    if let Some(video_config) = &config.video {
        let video = tracks.iter().find(|t| t.is(TrackKind::Video));
        match video {
            _ if skip.skip_video_transcode => {
                plan.video_skip_reason = Some("skipped by conditional rule".to_string());
            }
            None => plan.video_skip_reason = Some("no video track".to_string()),
            Some(video) => {
                let (skipped, reason) = match &video_config.skip_if {
                    Some(skip_if) => evaluate_video_skip(skip_if, video),
                    None => (false, String::new()),
                };
                if skipped {
                    tracing::debug!(track = video.index, %reason, "Video transcode skipped");
                    plan.video_skip_reason = Some(reason);
                } else {
                    let quality = &video_config.quality;
                    plan.video = Some(VideoTranscodePlan {
                        track_index: video.index,
                        source_codec: video.codec.clone(),
                        target_codec: video_config.target_codec,
                        encoder: video_config.target_codec.encoder().to_string(),
                        crf: match quality.bitrate {
                            Some(_) => quality.crf,
                            None => Some(quality.crf.unwrap_or(video_config.target_codec.default_crf())),
                        },
                        bitrate: quality.bitrate.clone(),
                        preset: quality.preset.clone(),
                        hardware_acceleration: video_config.hardware_acceleration,
                    });
                }
            }
        }
    }

    if let Some(audio_config) = &config.audio {
        if !skip.skip_audio_transcode {
            plan.audio = tracks
                .iter()
                .filter(|t| t.is(TrackKind::Audio))
                .map(|t| plan_audio_track(t, audio_config))
                .collect();
        }
    }
    plan
}
