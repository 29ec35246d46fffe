//! Traits for the external collaborators the phase executor drives.
//!
//! The core never touches media files itself. Reading a file's tracks and
//! applying a [`Plan`] both go through these traits, so tests can swap in
//! in-memory fakes and production code can wrap real media tools.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use mp_core::{FileInfo, Result};
use mp_plan::Plan;
use serde::{Deserialize, Serialize};

/// Reads container and track information from a media file.
#[async_trait]
pub trait Introspector: Send + Sync {
    /// Return the current state of `path`.
    ///
    /// Unreadable or corrupt files should surface as
    /// [`mp_core::Error::Introspection`].
    async fn get_file_info(&self, path: &Path) -> Result<FileInfo>;
}

/// Applies a plan to the file it was built for.
///
/// A call to [`execute`](PlanExecutor::execute) is atomic from the caller's
/// point of view: either every change in the plan is applied or the file is
/// left as it was.
#[async_trait]
pub trait PlanExecutor: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &'static str;

    /// Whether this executor can apply `plan` (container, tooling, ...).
    fn can_handle(&self, plan: &Plan) -> bool;

    async fn execute(&self, plan: &Plan, keep_backup: bool, keep_original: bool) -> Result<ExecutionOutcome>;
}

/// What the execution collaborator reports back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub success: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_path: Option<PathBuf>,
    /// Where the file lives now, when a container change renamed it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,
}

impl ExecutionOutcome {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            backup_path: None,
            output_path: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            backup_path: None,
            output_path: None,
        }
    }

    pub fn with_backup(mut self, path: impl Into<PathBuf>) -> Self {
        self.backup_path = Some(path.into());
        self
    }

    pub fn with_output(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_path = Some(path.into());
        self
    }
}
