//! Policy schema: global settings and ordered phases.
//!
//! A [`PolicySchema`] is loaded once per run and never mutated. Loading runs
//! [`PolicySchema::validate`], so every structural problem (bad names,
//! duplicate phases, forward dependencies, invalid operation settings) is
//! reported before any file is touched.

use std::collections::HashSet;
use std::fmt;

use mp_core::{Error, Result};
use mp_rules::{Condition, RuleSet};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::classify::TrackType;
use crate::container::ContainerConfig;
use crate::filter::{AttachmentFilterConfig, AudioFilterConfig, SubtitleFilterConfig, TrackPreActions};
use crate::flags::DefaultFlagsConfig;
use crate::synthesis::AudioSynthesisConfig;
use crate::transcode::TranscodeConfig;

/// The only schema version this crate understands.
pub const SCHEMA_VERSION: u32 = 1;

pub const PHASE_NAME_PATTERN: &str = r"^[A-Za-z][A-Za-z0-9_-]{0,63}$";

// ---------------------------------------------------------------------------
// Global settings
// ---------------------------------------------------------------------------

/// What happens to the rest of a file's phases when one phase errors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnErrorMode {
    /// Mark the phase skipped and carry on.
    Skip,
    /// Mark the phase failed and carry on.
    #[default]
    Continue,
    /// Mark the phase failed and stop processing the file.
    Fail,
}

impl fmt::Display for OnErrorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Skip => write!(f, "skip"),
            Self::Continue => write!(f, "continue"),
            Self::Fail => write!(f, "fail"),
        }
    }
}

fn default_languages() -> Vec<String> {
    vec!["eng".to_string(), "und".to_string()]
}

fn default_commentary_patterns() -> Vec<String> {
    ["commentary", "director", "audio description"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalConfig {
    /// Ordered audio language preference.
    #[serde(default = "default_languages")]
    pub audio_languages: Vec<String>,
    #[serde(default = "default_languages")]
    pub subtitle_languages: Vec<String>,
    #[serde(default = "default_commentary_patterns")]
    pub commentary_patterns: Vec<String>,
    #[serde(default)]
    pub on_error: OnErrorMode,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            audio_languages: default_languages(),
            subtitle_languages: default_languages(),
            commentary_patterns: default_commentary_patterns(),
            on_error: OnErrorMode::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Phase dependencies
// ---------------------------------------------------------------------------

/// Outcome of one phase for one file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhaseOutcome {
    #[default]
    Pending,
    Completed,
    Failed,
    Skipped,
}

impl PhaseOutcome {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for PhaseOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DependencyRepr {
    Name(String),
    Full {
        phase: String,
        #[serde(default = "completed")]
        outcome: PhaseOutcome,
    },
}

fn completed() -> PhaseOutcome {
    PhaseOutcome::Completed
}

/// A phase that must have reached `outcome` before this one runs.
///
/// Written either as a bare phase name (requiring `completed`) or as
/// `{"phase": ..., "outcome": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "DependencyRepr")]
pub struct PhaseDependency {
    pub phase: String,
    pub outcome: PhaseOutcome,
}

impl PhaseDependency {
    pub fn completed(phase: impl Into<String>) -> Self {
        Self {
            phase: phase.into(),
            outcome: PhaseOutcome::Completed,
        }
    }

    pub fn new(phase: impl Into<String>, outcome: PhaseOutcome) -> Self {
        Self {
            phase: phase.into(),
            outcome,
        }
    }
}

impl From<DependencyRepr> for PhaseDependency {
    fn from(repr: DependencyRepr) -> Self {
        match repr {
            DependencyRepr::Name(phase) => Self::completed(phase),
            DependencyRepr::Full { phase, outcome } => Self { phase, outcome },
        }
    }
}

/// Gate evaluated before a phase runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RunIf {
    /// Run only if the named earlier phase modified the file.
    PhaseModified { phase_modified: String },
    Condition(Condition),
}

// ---------------------------------------------------------------------------
// Post-processing settings carried through to the plan
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestampMode {
    /// Restore the original modification time.
    #[default]
    Preserve,
    ReleaseDate,
    Now,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimestampFallback {
    #[default]
    Preserve,
    Now,
    Skip,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DateSource {
    #[default]
    Auto,
    Radarr,
    Sonarr,
}

/// File modification time handling after the phase is applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileTimestampConfig {
    pub mode: TimestampMode,
    /// Used when `release_date` mode finds no date.
    pub fallback: TimestampFallback,
    pub date_source: DateSource,
}

fn default_confidence() -> f64 {
    0.8
}

/// Transcription-driven updates, executed by the collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptionConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub update_language_from_transcription: bool,
    #[serde(default)]
    pub update_title_from_classification: bool,
    #[serde(default = "default_confidence")]
    pub confidence_threshold: f64,
    #[serde(default)]
    pub detect_commentary: bool,
    #[serde(default)]
    pub reorder_commentary: bool,
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            update_language_from_transcription: false,
            update_title_from_classification: false,
            confidence_threshold: default_confidence(),
            detect_commentary: false,
            reorder_commentary: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Phases
// ---------------------------------------------------------------------------

/// Operations a phase can carry, in the order they always run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Container,
    AudioFilter,
    SubtitleFilter,
    AttachmentFilter,
    TrackOrder,
    DefaultFlags,
    Conditional,
    AudioSynthesis,
    Transcode,
    FileTimestamp,
    Transcription,
}

impl OperationKind {
    pub const CANONICAL_ORDER: [OperationKind; 11] = [
        Self::Container,
        Self::AudioFilter,
        Self::SubtitleFilter,
        Self::AttachmentFilter,
        Self::TrackOrder,
        Self::DefaultFlags,
        Self::Conditional,
        Self::AudioSynthesis,
        Self::Transcode,
        Self::FileTimestamp,
        Self::Transcription,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Container => "container",
            Self::AudioFilter => "audio_filter",
            Self::SubtitleFilter => "subtitle_filter",
            Self::AttachmentFilter => "attachment_filter",
            Self::TrackOrder => "track_order",
            Self::DefaultFlags => "default_flags",
            Self::Conditional => "conditional",
            Self::AudioSynthesis => "audio_synthesis",
            Self::Transcode => "transcode",
            Self::FileTimestamp => "file_timestamp",
            Self::Transcription => "transcription",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One named phase of a policy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhaseDefinition {
    pub name: String,

    pub container: Option<ContainerConfig>,
    pub audio_filter: Option<AudioFilterConfig>,
    pub subtitle_filter: Option<SubtitleFilterConfig>,
    pub attachment_filter: Option<AttachmentFilterConfig>,
    pub track_order: Option<Vec<TrackType>>,
    pub default_flags: Option<DefaultFlagsConfig>,
    pub conditional_rules: Option<RuleSet>,
    pub audio_synthesis: Option<AudioSynthesisConfig>,
    pub transcode: Option<TranscodeConfig>,
    pub file_timestamp: Option<FileTimestampConfig>,
    pub transcription: Option<TranscriptionConfig>,

    pub audio_actions: Option<TrackPreActions>,
    pub subtitle_actions: Option<TrackPreActions>,
    pub video_actions: Option<TrackPreActions>,

    pub skip_when: Option<Condition>,
    pub depends_on: Vec<PhaseDependency>,
    pub run_if: Option<RunIf>,
    /// Overrides the policy-wide mode.
    pub on_error: Option<OnErrorMode>,
}

impl PhaseDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Configured operations, in canonical order.
    pub fn operations(&self) -> Vec<OperationKind> {
        OperationKind::CANONICAL_ORDER
            .into_iter()
            .filter(|op| self.has_operation(*op))
            .collect()
    }

    pub fn has_operation(&self, op: OperationKind) -> bool {
        match op {
            OperationKind::Container => self.container.is_some(),
            OperationKind::AudioFilter => self.audio_filter.is_some(),
            OperationKind::SubtitleFilter => self.subtitle_filter.is_some(),
            OperationKind::AttachmentFilter => self.attachment_filter.is_some(),
            OperationKind::TrackOrder => self.track_order.is_some(),
            OperationKind::DefaultFlags => self.default_flags.is_some(),
            OperationKind::Conditional => self.conditional_rules.is_some(),
            OperationKind::AudioSynthesis => self.audio_synthesis.is_some(),
            OperationKind::Transcode => self.transcode.is_some(),
            OperationKind::FileTimestamp => self.file_timestamp.is_some(),
            OperationKind::Transcription => self.transcription.is_some(),
        }
    }

    pub fn effective_on_error(&self, global: &GlobalConfig) -> OnErrorMode {
        self.on_error.unwrap_or(global.on_error)
    }

    fn validate_operations(&self, problems: &mut Vec<String>) {
        let name = &self.name;
        if let Some(order) = &self.track_order {
            let mut seen = HashSet::new();
            for ty in order {
                if !seen.insert(*ty) {
                    problems.push(format!("phase '{name}': track_order lists '{ty}' more than once"));
                }
            }
        }
        if let Some(synthesis) = &self.audio_synthesis {
            let mut seen = HashSet::new();
            for def in &synthesis.tracks {
                problems.extend(def.validate().into_iter().map(|p| format!("phase '{name}': {p}")));
                if !seen.insert(def.name.to_lowercase()) {
                    problems.push(format!("phase '{name}': duplicate synthesis name '{}'", def.name));
                }
            }
        }
        if let Some(transcode) = &self.transcode {
            problems.extend(transcode.validate().into_iter().map(|p| format!("phase '{name}': {p}")));
        }
        if let Some(transcription) = &self.transcription {
            if !(0.0..=1.0).contains(&transcription.confidence_threshold) {
                problems.push(format!(
                    "phase '{name}': confidence_threshold {} must be between 0.0 and 1.0",
                    transcription.confidence_threshold
                ));
            }
            if transcription.reorder_commentary && !transcription.detect_commentary {
                problems.push(format!(
                    "phase '{name}': reorder_commentary requires detect_commentary"
                ));
            }
        }
        if let Some(rules) = &self.conditional_rules {
            if rules.is_empty() {
                problems.push(format!("phase '{name}': conditional_rules has no rules"));
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicySchema {
    pub schema_version: u32,
    #[serde(default)]
    pub global_config: GlobalConfig,
    pub phases: Vec<PhaseDefinition>,
}

impl PolicySchema {
    pub fn new(phases: Vec<PhaseDefinition>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            global_config: GlobalConfig::default(),
            phases,
        }
    }

    /// Parse and validate a policy document.
    pub fn from_json(json: &str) -> Result<Self> {
        let policy: Self = serde_json::from_str(json)
            .map_err(|e| Error::Validation(format!("policy parse error: {e}")))?;
        policy.validate()?;
        Ok(policy)
    }

    /// Parse and validate a policy document, rejecting expressions nested
    /// deeper than `max_depth`.
    pub fn from_json_with_max_depth(json: &str, max_depth: usize) -> Result<Self> {
        let policy = Self::from_json(json)?;
        policy.check_expression_depth(max_depth)?;
        Ok(policy)
    }

    /// Every condition in the document, labelled by where it appears.
    pub fn conditions(&self) -> Vec<(String, &Condition)> {
        let mut found = Vec::new();
        for phase in &self.phases {
            let name = &phase.name;
            if let Some(cond) = &phase.skip_when {
                found.push((format!("phase '{name}' skip_when"), cond));
            }
            if let Some(RunIf::Condition(cond)) = &phase.run_if {
                found.push((format!("phase '{name}' run_if"), cond));
            }
            for rule in phase.conditional_rules.iter().flat_map(|r| &r.rules) {
                found.push((format!("phase '{name}' rule '{}'", rule.name), &rule.when));
            }
            for def in phase.audio_synthesis.iter().flat_map(|s| &s.tracks) {
                if let Some(cond) = &def.create_if {
                    found.push((format!("phase '{name}' synthesis '{}' create_if", def.name), cond));
                }
            }
        }
        found
    }

    /// Reject any condition nested deeper than `max_depth`.
    pub fn check_expression_depth(&self, max_depth: usize) -> Result<()> {
        let problems: Vec<String> = self
            .conditions()
            .into_iter()
            .filter(|(_, cond)| cond.nesting_depth() > max_depth)
            .map(|(location, cond)| {
                format!(
                    "{location}: expression nesting depth {} exceeds maximum of {max_depth}",
                    cond.nesting_depth()
                )
            })
            .collect();
        if problems.is_empty() {
            Ok(())
        } else {
            Err(Error::Validation(problems.join("; ")))
        }
    }

    pub fn phase(&self, name: &str) -> Option<&PhaseDefinition> {
        self.phases.iter().find(|p| p.name.eq_ignore_ascii_case(name))
    }

    pub fn phase_names(&self) -> Vec<&str> {
        self.phases.iter().map(|p| p.name.as_str()).collect()
    }

    /// Check every load-time invariant, reporting all problems at once.
    pub fn validate(&self) -> Result<()> {
        let name_pattern =
            Regex::new(PHASE_NAME_PATTERN).map_err(|e| Error::Internal(format!("phase name pattern: {e}")))?;
        let mut problems = Vec::new();

        if self.schema_version != SCHEMA_VERSION {
            problems.push(format!(
                "unsupported schema_version {} (expected {SCHEMA_VERSION})",
                self.schema_version
            ));
        }
        if self.phases.is_empty() {
            problems.push("policy must define at least one phase".to_string());
        }

        // Lowercased names of the phases declared so far.
        let mut earlier: Vec<String> = Vec::new();
        for phase in &self.phases {
            let name = &phase.name;
            if !name_pattern.is_match(name) {
                problems.push(format!(
                    "invalid phase name '{name}': must match {PHASE_NAME_PATTERN}"
                ));
            }
            let lower = name.to_lowercase();
            if earlier.contains(&lower) {
                problems.push(format!("duplicate phase name '{name}' (names are case-insensitive)"));
            }

            for dep in &phase.depends_on {
                if dep.outcome == PhaseOutcome::Pending {
                    problems.push(format!(
                        "phase '{name}': depends_on '{}' cannot require outcome 'pending'",
                        dep.phase
                    ));
                }
                if !earlier.contains(&dep.phase.to_lowercase()) {
                    problems.push(format!(
                        "phase '{name}': depends_on '{}' must name an earlier phase",
                        dep.phase
                    ));
                }
            }
            if let Some(RunIf::PhaseModified { phase_modified }) = &phase.run_if {
                if !earlier.contains(&phase_modified.to_lowercase()) {
                    problems.push(format!(
                        "phase '{name}': run_if phase_modified '{phase_modified}' must name an earlier phase"
                    ));
                }
            }
            phase.validate_operations(&mut problems);
            earlier.push(lower);
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(Error::Validation(problems.join("; ")))
        }
    }
}
