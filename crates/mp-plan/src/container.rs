//! Container conversion planning.
//!
//! Decides whether a file must be remuxed into another container and, when
//! the target cannot hold some codecs, what to do about it. The three
//! [`IncompatibleCodecMode`]s are a contract: `error` fails the phase,
//! `skip` drops the conversion, `transcode` keeps it and plans per-track
//! fixes.

use std::collections::BTreeMap;
use std::fmt;

use mp_core::codecs::{audio_transcode_default, is_bitmap_subtitle, is_codec_compatible, is_text_subtitle};
use mp_core::{normalize_container_format, Container, Error, IncompatibleTrack, Result, TrackInfo, TrackKind};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IncompatibleCodecMode {
    #[default]
    Error,
    Skip,
    Transcode,
}

/// How one incompatible track is carried into the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackPlanAction {
    Transcode,
    Convert,
    Remove,
}

impl fmt::Display for TrackPlanAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transcode => write!(f, "transcode"),
            Self::Convert => write!(f, "convert"),
            Self::Remove => write!(f, "remove"),
        }
    }
}

/// Per-codec override for `transcode` mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodecMapping {
    pub codec: String,
    #[serde(default)]
    pub bitrate: Option<String>,
    /// Inferred from the track type when absent.
    #[serde(default)]
    pub action: Option<TrackPlanAction>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerConfig {
    pub target: Container,
    #[serde(default)]
    pub on_incompatible_codec: IncompatibleCodecMode,
    /// Keyed by source codec; keys match case-insensitively.
    #[serde(default)]
    pub codec_mappings: BTreeMap<String, CodecMapping>,
}

impl ContainerConfig {
    pub fn new(target: Container) -> Self {
        Self {
            target,
            on_incompatible_codec: IncompatibleCodecMode::Error,
            codec_mappings: BTreeMap::new(),
        }
    }

    pub fn with_mode(mut self, mode: IncompatibleCodecMode) -> Self {
        self.on_incompatible_codec = mode;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncompatibleTrackPlan {
    pub track_index: usize,
    pub track_type: TrackKind,
    pub source_codec: String,
    pub action: TrackPlanAction,
    pub target_codec: Option<String>,
    pub target_bitrate: Option<String>,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerTranscodePlan {
    pub track_plans: Vec<IncompatibleTrackPlan>,
    pub warnings: Vec<String>,
}

/// A requested container conversion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerChange {
    pub source_format: String,
    pub target_format: Container,
    pub warnings: Vec<String>,
    pub incompatible_tracks: Vec<usize>,
    #[serde(default)]
    pub transcode_plan: Option<ContainerTranscodePlan>,
}

fn plan_incompatible_track(track: &TrackInfo, mappings: &BTreeMap<String, CodecMapping>) -> IncompatibleTrackPlan {
    let codec = track.codec_lower();
    let plan = |action, target_codec: Option<String>, target_bitrate: Option<String>, reason: String| {
        IncompatibleTrackPlan {
            track_index: track.index,
            track_type: track.track_type,
            source_codec: codec.clone(),
            action,
            target_codec,
            target_bitrate,
            reason,
        }
    };

    let mapping = mappings
        .iter()
        .find(|(key, _)| key.trim().eq_ignore_ascii_case(&codec))
        .map(|(_, mapping)| mapping);
    if let Some(mapping) = mapping {
        let action = mapping.action.unwrap_or(match track.track_type {
            TrackKind::Subtitle if is_bitmap_subtitle(&codec) => TrackPlanAction::Remove,
            TrackKind::Subtitle => TrackPlanAction::Convert,
            _ => TrackPlanAction::Transcode,
        });
        return match action {
            TrackPlanAction::Remove => plan(action, None, None, format!("{codec} removed (custom mapping)")),
            TrackPlanAction::Transcode => plan(
                action,
                Some(mapping.codec.clone()),
                mapping.bitrate.clone(),
                format!("{codec} -> {} (custom mapping)", mapping.codec),
            ),
            TrackPlanAction::Convert => plan(
                action,
                Some(mapping.codec.clone()),
                None,
                format!("{codec} -> {} (custom mapping)", mapping.codec),
            ),
        };
    }

    match track.track_type {
        TrackKind::Audio => {
            let target = audio_transcode_default(&codec);
            plan(
                TrackPlanAction::Transcode,
                Some(target.codec.to_string()),
                Some(target.bitrate.to_string()),
                format!("{codec} is not MP4-compatible, transcoding to {}", target.codec),
            )
        }
        TrackKind::Subtitle if is_text_subtitle(&codec) => plan(
            TrackPlanAction::Convert,
            Some("mov_text".into()),
            None,
            format!("Converting {codec} to mov_text (styling may be lost)"),
        ),
        TrackKind::Subtitle if is_bitmap_subtitle(&codec) => plan(
            TrackPlanAction::Remove,
            None,
            None,
            format!("Removing {codec} (bitmap subtitles cannot be converted)"),
        ),
        TrackKind::Subtitle => plan(
            TrackPlanAction::Remove,
            None,
            None,
            format!("Removing {codec} (unknown subtitle format)"),
        ),
        TrackKind::Video | TrackKind::Attachment => plan(
            TrackPlanAction::Remove,
            None,
            None,
            format!("{codec} is not compatible with the target; track will be removed"),
        ),
    }
}

/// Evaluate a container conversion for the tracks that survive filtering.
///
/// Returns `Ok(None)` when no conversion is needed or when `skip` mode drops
/// it; raises [`Error::IncompatibleCodec`] in `error` mode.
pub fn evaluate_container_change(
    tracks: &[TrackInfo],
    source_format: &str,
    config: &ContainerConfig,
) -> Result<Option<ContainerChange>> {
    let source = normalize_container_format(source_format);
    let target = config.target;
    if source == target.to_string() {
        return Ok(None);
    }

    let incompatible: Vec<&TrackInfo> = tracks
        .iter()
        .filter(|t| !is_codec_compatible(&t.codec_lower(), target, t.track_type))
        .collect();
    let mut change = ContainerChange {
        source_format: source,
        target_format: target,
        warnings: incompatible
            .iter()
            .map(|t| {
                format!(
                    "Track {} ({}, {}) is not compatible with {target}",
                    t.index,
                    t.track_type,
                    t.codec_lower()
                )
            })
            .collect(),
        incompatible_tracks: incompatible.iter().map(|t| t.index).collect(),
        transcode_plan: None,
    };
    if incompatible.is_empty() {
        return Ok(Some(change));
    }

    match config.on_incompatible_codec {
        IncompatibleCodecMode::Error => Err(Error::IncompatibleCodec {
            target: target.to_string(),
            tracks: incompatible
                .iter()
                .map(|t| IncompatibleTrack {
                    index: t.index,
                    track_type: t.track_type.to_string(),
                    codec: t.codec.clone().unwrap_or_else(|| "unknown".into()),
                })
                .collect(),
        }),
        IncompatibleCodecMode::Skip => {
            tracing::warn!(
                target_container = %target,
                tracks = ?change.incompatible_tracks,
                "Skipping container conversion: incompatible codecs"
            );
            Ok(None)
        }
        IncompatibleCodecMode::Transcode => {
            let mut plan = ContainerTranscodePlan::default();
            for track in &incompatible {
                let track_plan = plan_incompatible_track(track, &config.codec_mappings);
                match track_plan.action {
                    TrackPlanAction::Remove => plan.warnings.push(format!(
                        "Track {} ({}) will be removed",
                        track_plan.track_index, track_plan.source_codec
                    )),
                    TrackPlanAction::Convert if matches!(track_plan.source_codec.as_str(), "ass" | "ssa") => {
                        plan.warnings.push(format!(
                            "Track {} ({}) will lose styling when converted to mov_text",
                            track_plan.track_index, track_plan.source_codec
                        ))
                    }
                    _ => {}
                }
                plan.track_plans.push(track_plan);
            }
            change.warnings.extend(plan.warnings.iter().cloned());
            change.transcode_plan = Some(plan);
            Ok(Some(change))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn make_track(index: usize, kind: TrackKind, codec: &str) -> TrackInfo {
        let mut t = TrackInfo::new(index, kind);
        t.codec = Some(codec.into());
        t
    }

    fn make_tracks() -> Vec<TrackInfo> {
        vec![
            make_track(0, TrackKind::Video, "hevc"),
            make_track(1, TrackKind::Audio, "truehd"),
            make_track(2, TrackKind::Audio, "aac"),
            make_track(3, TrackKind::Subtitle, "subrip"),
            make_track(4, TrackKind::Subtitle, "hdmv_pgs_subtitle"),
        ]
    }

    #[test]
    fn same_container_is_noop() {
        let config = ContainerConfig::new(Container::Mkv);
        assert_eq!(
            evaluate_container_change(&make_tracks(), "matroska,webm", &config).unwrap(),
            None
        );
    }

    #[test]
    fn mkv_accepts_everything() {
        let config = ContainerConfig::new(Container::Mkv);
        let change = evaluate_container_change(&make_tracks(), "mov,mp4,m4a,3gp,3g2,mj2", &config)
            .unwrap()
            .unwrap();
        assert_eq!(change.source_format, "mp4");
        assert!(change.incompatible_tracks.is_empty());
    }

    #[test]
    fn error_mode_lists_tracks() {
        let tracks = vec![make_track(0, TrackKind::Video, "h264"), make_track(1, TrackKind::Audio, "truehd")];
        let config = ContainerConfig::new(Container::Mp4);
        let err = evaluate_container_change(&tracks, "matroska", &config).unwrap_err();
        assert_matches!(err, Error::IncompatibleCodec { ref target, ref tracks } => {
            assert_eq!(target, "mp4");
            assert_eq!(tracks.len(), 1);
            assert_eq!(tracks[0].index, 1);
            assert_eq!(tracks[0].track_type, "audio");
            assert_eq!(tracks[0].codec, "truehd");
        });
    }

    #[test]
    fn skip_mode_drops_conversion() {
        let config = ContainerConfig::new(Container::Mp4).with_mode(IncompatibleCodecMode::Skip);
        assert_eq!(evaluate_container_change(&make_tracks(), "matroska", &config).unwrap(), None);
    }

    #[test]
    fn transcode_mode_plans_each_track() {
        let config = ContainerConfig::new(Container::Mp4).with_mode(IncompatibleCodecMode::Transcode);
        let change = evaluate_container_change(&make_tracks(), "matroska", &config)
            .unwrap()
            .unwrap();
        assert_eq!(change.incompatible_tracks, vec![1, 3, 4]);
        let plan = change.transcode_plan.unwrap();
        let summary: Vec<_> = plan
            .track_plans
            .iter()
            .map(|p| (p.track_index, p.action, p.target_codec.clone(), p.target_bitrate.clone()))
            .collect();
        assert_eq!(
            summary,
            vec![
                (1, TrackPlanAction::Transcode, Some("aac".into()), Some("256k".into())),
                (3, TrackPlanAction::Convert, Some("mov_text".into()), None),
                (4, TrackPlanAction::Remove, None, None),
            ]
        );
        assert_eq!(plan.warnings, vec!["Track 4 (hdmv_pgs_subtitle) will be removed".to_string()]);
    }

    #[test]
    fn custom_mapping_overrides_default() {
        let mut config = ContainerConfig::new(Container::Mp4).with_mode(IncompatibleCodecMode::Transcode);
        config.codec_mappings.insert(
            "truehd".into(),
            CodecMapping {
                codec: "eac3".into(),
                bitrate: Some("640k".into()),
                action: None,
            },
        );
        let tracks = vec![make_track(1, TrackKind::Audio, "truehd")];
        let change = evaluate_container_change(&tracks, "mkv", &config).unwrap().unwrap();
        let plan = &change.transcode_plan.unwrap().track_plans[0];
        assert_eq!(plan.target_codec.as_deref(), Some("eac3"));
        assert_eq!(plan.target_bitrate.as_deref(), Some("640k"));
        assert_eq!(plan.reason, "truehd -> eac3 (custom mapping)");
    }

    #[test]
    fn mapping_keys_ignore_case() {
        let config: ContainerConfig = serde_json::from_str(
            r#"{"target": "mp4", "on_incompatible_codec": "transcode",
                "codec_mappings": {"TrueHD": {"codec": "ac3", "bitrate": "448k"}}}"#,
        )
        .unwrap();
        let tracks = vec![make_track(1, TrackKind::Audio, "truehd")];
        let change = evaluate_container_change(&tracks, "mkv", &config).unwrap().unwrap();
        let plan = &change.transcode_plan.unwrap().track_plans[0];
        assert_eq!(plan.target_codec.as_deref(), Some("ac3"));
        assert_eq!(plan.reason, "truehd -> ac3 (custom mapping)");
    }
}
