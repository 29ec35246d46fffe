//! Plan value types.
//!
//! A [`Plan`] is everything one phase wants done to one file. It is a plain
//! value: building it never touches the filesystem, and the execution
//! collaborator receives it read-only.

use std::fmt;
use std::path::PathBuf;

use mp_rules::{ConditionalResult, SkipFlags};
use serde::{Deserialize, Serialize};

use crate::container::ContainerChange;
use crate::filter::TrackDisposition;
use crate::policy::{FileTimestampConfig, TimestampMode, TranscriptionConfig};
use crate::synthesis::SynthesisPlan;
use crate::transcode::TranscodePlan;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Reorder,
    SetDefault,
    ClearDefault,
    SetForced,
    ClearForced,
    SetTitle,
    SetLanguage,
    SetContainerMetadata,
    SynthesizeAudio,
    TranscodeVideo,
    TranscodeAudio,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reorder => "reorder",
            Self::SetDefault => "set_default",
            Self::ClearDefault => "clear_default",
            Self::SetForced => "set_forced",
            Self::ClearForced => "clear_forced",
            Self::SetTitle => "set_title",
            Self::SetLanguage => "set_language",
            Self::SetContainerMetadata => "set_container_metadata",
            Self::SynthesizeAudio => "synthesize_audio",
            Self::TranscodeVideo => "transcode_video",
            Self::TranscodeAudio => "transcode_audio",
        }
    }

    /// Changes per-track metadata in place.
    pub fn is_track_metadata(&self) -> bool {
        matches!(
            self,
            Self::SetDefault
                | Self::ClearDefault
                | Self::SetForced
                | Self::ClearForced
                | Self::SetTitle
                | Self::SetLanguage
        )
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Before/after value of a planned action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PlanValue {
    Flag(bool),
    Text(String),
    Order(Vec<usize>),
}

impl fmt::Display for PlanValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flag(b) => write!(f, "{b}"),
            Self::Text(s) => write!(f, "'{s}'"),
            Self::Order(order) => {
                let parts: Vec<String> = order.iter().map(|i| i.to_string()).collect();
                write!(f, "[{}]", parts.join(", "))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedAction {
    pub action_type: ActionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track_index: Option<usize>,
    #[serde(default)]
    pub current_value: Option<PlanValue>,
    #[serde(default)]
    pub desired_value: Option<PlanValue>,
    /// Container tag name for `set_container_metadata`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_field: Option<String>,
}

impl PlannedAction {
    pub fn track(action_type: ActionType, track_index: usize, current: Option<PlanValue>, desired: Option<PlanValue>) -> Self {
        Self {
            action_type,
            track_index: Some(track_index),
            current_value: current,
            desired_value: desired,
            container_field: None,
        }
    }

    pub fn reorder(current: Vec<usize>, desired: Vec<usize>) -> Self {
        Self {
            action_type: ActionType::Reorder,
            track_index: None,
            current_value: Some(PlanValue::Order(current)),
            desired_value: Some(PlanValue::Order(desired)),
            container_field: None,
        }
    }

    pub fn container_metadata(field: impl Into<String>, current: Option<String>, desired: String) -> Self {
        Self {
            action_type: ActionType::SetContainerMetadata,
            track_index: None,
            current_value: current.map(PlanValue::Text),
            desired_value: Some(PlanValue::Text(desired)),
            container_field: Some(field.into()),
        }
    }

    /// One-line human-readable description.
    pub fn description(&self) -> String {
        let track = self
            .track_index
            .map(|i| format!("track {i}"))
            .unwrap_or_else(|| "file".to_string());
        let desired = self.desired_value.as_ref().map(|v| v.to_string()).unwrap_or_default();
        match self.action_type {
            ActionType::Reorder => {
                let current = self.current_value.as_ref().map(|v| v.to_string()).unwrap_or_default();
                format!("Reorder tracks: {current} -> {desired}")
            }
            ActionType::SetDefault => format!("Set default on {track}"),
            ActionType::ClearDefault => format!("Clear default on {track}"),
            ActionType::SetForced => format!("Set forced on {track}"),
            ActionType::ClearForced => format!("Clear forced on {track}"),
            ActionType::SetTitle => format!("Set title of {track} to {desired}"),
            ActionType::SetLanguage => format!("Set language of {track} to {desired}"),
            ActionType::SetContainerMetadata => format!(
                "Set container tag '{}' to {desired}",
                self.container_field.as_deref().unwrap_or_default()
            ),
            ActionType::SynthesizeAudio => format!("Synthesize audio {desired} from {track}"),
            ActionType::TranscodeVideo => format!("Transcode video {track} to {desired}"),
            ActionType::TranscodeAudio => format!("Transcode audio {track} to {desired}"),
        }
    }
}

/// Everything one phase wants done to one file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub file_path: PathBuf,
    /// Normalized source container.
    pub container: String,
    pub actions: Vec<PlannedAction>,
    pub track_dispositions: Vec<TrackDisposition>,
    pub container_change: Option<ContainerChange>,
    pub synthesis: Option<SynthesisPlan>,
    pub transcode: Option<TranscodePlan>,
    pub file_timestamp: Option<FileTimestampConfig>,
    pub transcription: Option<TranscriptionConfig>,
    pub conditional_result: Option<ConditionalResult>,
    pub skip_flags: SkipFlags,
    pub requires_remux: bool,
    pub tracks_removed: usize,
    pub tracks_kept: usize,
    pub warnings: Vec<String>,
}

impl Plan {
    /// No actions, no removed tracks and no container change.
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty() && self.tracks_removed == 0 && self.container_change.is_none()
    }

    /// Whether the execution collaborator has anything to do.
    ///
    /// Timestamp handling other than `preserve` and enabled transcription run
    /// even on an otherwise empty plan.
    pub fn needs_execution(&self) -> bool {
        !self.is_empty()
            || self.file_timestamp.is_some_and(|t| t.mode != TimestampMode::Preserve)
            || self.transcription.as_ref().is_some_and(|t| t.enabled)
    }

    /// Actions plus removed tracks plus the container change, if any.
    pub fn change_count(&self) -> usize {
        self.actions.len() + self.tracks_removed + usize::from(self.container_change.is_some())
    }

    pub fn actions_of(&self, action_type: ActionType) -> impl Iterator<Item = &PlannedAction> {
        self.actions.iter().filter(move |a| a.action_type == action_type)
    }

    /// One-line summary for logs and job records.
    pub fn summary(&self) -> String {
        if self.is_empty() {
            return "No changes".to_string();
        }
        let mut parts = Vec::new();
        if !self.actions.is_empty() {
            parts.push(format!("{} action(s)", self.actions.len()));
        }
        if self.tracks_removed > 0 {
            parts.push(format!("{} track(s) removed", self.tracks_removed));
        }
        if let Some(change) = &self.container_change {
            parts.push(format!("container {} -> {}", change.source_format, change.target_format));
        }
        if self.requires_remux {
            parts.push("requires remux".to_string());
        }
        parts.join(", ")
    }

    /// Descriptions of every action, in execution order.
    pub fn describe(&self) -> Vec<String> {
        self.actions.iter().map(PlannedAction::description).collect()
    }
}
