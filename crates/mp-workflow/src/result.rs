//! Per-phase and per-file results.
//!
//! These are plain records handed back to whoever tracks jobs: outcomes,
//! counts, durations and the before/after file snapshots.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use mp_core::{ErrorKind, FileInfo, RunId};
use mp_plan::{Plan, PhaseOutcome};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReasonKind {
    /// A `depends_on` entry did not have the required outcome.
    Dependency,
    /// `run_if` did not hold.
    RunIf,
    /// `skip_when` held.
    Condition,
    /// The phase errored under `on_error = skip`.
    ErrorMode,
    /// A conditional rule asked to skip the phase or file.
    Signal,
}

impl fmt::Display for SkipReasonKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Dependency => "dependency",
            Self::RunIf => "run_if",
            Self::Condition => "condition",
            Self::ErrorMode => "error_mode",
            Self::Signal => "signal",
        };
        f.write_str(s)
    }
}

/// Why a phase was skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkipReason {
    pub kind: SkipReasonKind,
    pub message: String,
}

impl SkipReason {
    pub fn new(kind: SkipReasonKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Result of one phase for one file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseResult {
    pub phase_name: String,
    pub outcome: PhaseOutcome,
    pub duration: Duration,
    /// Number of changes applied (or planned, in dry-run mode).
    pub changes: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<Plan>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<SkipReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    /// Whether the execution collaborator changed the file.
    pub file_modified: bool,
}

impl PhaseResult {
    /// A phase that has not run.
    pub fn pending(phase_name: impl Into<String>) -> Self {
        Self {
            phase_name: phase_name.into(),
            outcome: PhaseOutcome::Pending,
            duration: Duration::ZERO,
            changes: 0,
            plan: None,
            skip_reason: None,
            error: None,
            error_kind: None,
            file_modified: false,
        }
    }

    pub fn skipped(phase_name: impl Into<String>, reason: SkipReason) -> Self {
        Self {
            outcome: PhaseOutcome::Skipped,
            skip_reason: Some(reason),
            ..Self::pending(phase_name)
        }
    }

    pub fn is_skipped_because(&self, kind: SkipReasonKind) -> bool {
        self.skip_reason.as_ref().is_some_and(|r| r.kind == kind)
    }
}

/// Aggregate result of running every phase against one file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileProcessingResult {
    pub path: PathBuf,
    pub run_id: RunId,
    /// No phase failed and processing was not cancelled.
    pub success: bool,
    pub cancelled: bool,
    pub phase_results: Vec<PhaseResult>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub total_duration: Duration,
    pub total_changes: usize,
    pub phases_completed: usize,
    pub phases_failed: usize,
    pub phases_skipped: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_phase: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_before: Option<FileInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_after: Option<FileInfo>,
}

impl FileProcessingResult {
    pub(crate) fn start(path: PathBuf, run_id: RunId) -> Self {
        let now = Utc::now();
        Self {
            path,
            run_id,
            success: false,
            cancelled: false,
            phase_results: Vec::new(),
            started_at: now,
            finished_at: now,
            total_duration: Duration::ZERO,
            total_changes: 0,
            phases_completed: 0,
            phases_failed: 0,
            phases_skipped: 0,
            failed_phase: None,
            error_message: None,
            file_before: None,
            file_after: None,
        }
    }

    /// Recompute counters from `phase_results` and stamp the finish time.
    pub(crate) fn finish(mut self, total_duration: Duration) -> Self {
        self.finished_at = Utc::now();
        self.total_duration = total_duration;
        self.total_changes = self.phase_results.iter().map(|r| r.changes).sum();
        self.phases_completed = self.count(PhaseOutcome::Completed);
        self.phases_failed = self.count(PhaseOutcome::Failed);
        self.phases_skipped = self.count(PhaseOutcome::Skipped);
        self.success = self.phases_failed == 0 && !self.cancelled && self.error_message.is_none();
        self
    }

    fn count(&self, outcome: PhaseOutcome) -> usize {
        self.phase_results.iter().filter(|r| r.outcome == outcome).count()
    }

    pub fn phase(&self, name: &str) -> Option<&PhaseResult> {
        self.phase_results.iter().find(|r| r.phase_name.eq_ignore_ascii_case(name))
    }

    pub fn outcome_of(&self, name: &str) -> Option<PhaseOutcome> {
        self.phase(name).map(|r| r.outcome)
    }

    /// One-line summary for logs and job records.
    pub fn summary(&self) -> String {
        let mut line = format!(
            "{} completed, {} failed, {} skipped, {} change(s) in {:.2}s",
            self.phases_completed,
            self.phases_failed,
            self.phases_skipped,
            self.total_changes,
            self.total_duration.as_secs_f64()
        );
        if self.cancelled {
            line.push_str(" (cancelled)");
        }
        if let Some(phase) = &self.failed_phase {
            line.push_str(&format!(" (failed at {phase})"));
        }
        line
    }
}
