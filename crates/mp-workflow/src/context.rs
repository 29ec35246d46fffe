//! Per-run context shared by every phase of a file.

use std::sync::Arc;

use mp_core::config::ExecutionConfig;
use mp_core::{FileInfo, RunId};
use mp_plan::{ClassificationHints, GlobalConfig};
use mp_rules::{EvalContext, LanguageAnalysis, PluginMetadata, TrackOrigin};
use tokio_util::sync::CancellationToken;

/// Sender for reporting progress while a file is processed.
///
/// Wraps a callback that receives a progress percentage (0.0 -- 100.0) and a
/// human-readable step description.
pub struct ProgressSender {
    callback: Box<dyn Fn(f32, &str) + Send + Sync>,
}

impl ProgressSender {
    pub fn new(callback: impl Fn(f32, &str) + Send + Sync + 'static) -> Self {
        Self {
            callback: Box::new(callback),
        }
    }

    /// A sender that discards all reports.
    pub fn noop() -> Self {
        Self {
            callback: Box::new(|_, _| {}),
        }
    }

    pub fn send(&self, progress: f32, step: &str) {
        (self.callback)(progress, step);
    }
}

impl std::fmt::Debug for ProgressSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressSender").finish_non_exhaustive()
    }
}

/// Context for one [`process_file`](crate::WorkflowExecutor::process_file) call.
///
/// Enrichment data (plugin metadata, language analysis, track origins and
/// classification hints) is assembled by the caller before processing starts
/// and is read-only from then on.
#[derive(Debug, Clone)]
pub struct WorkflowContext {
    /// Correlates every log line of this run.
    pub run_id: RunId,
    /// Build plans but never hand them to the execution collaborator.
    pub dry_run: bool,
    pub keep_backup: bool,
    pub keep_original: bool,
    /// Checked before each phase.
    pub cancellation: CancellationToken,
    pub progress: Arc<ProgressSender>,
    pub plugin_metadata: PluginMetadata,
    pub language_analysis: Vec<(usize, LanguageAnalysis)>,
    pub origins: Vec<(usize, TrackOrigin)>,
    pub hints: ClassificationHints,
}

impl Default for WorkflowContext {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkflowContext {
    pub fn new() -> Self {
        Self {
            run_id: RunId::new(),
            dry_run: false,
            keep_backup: true,
            keep_original: false,
            cancellation: CancellationToken::new(),
            progress: Arc::new(ProgressSender::noop()),
            plugin_metadata: PluginMetadata::new(),
            language_analysis: Vec::new(),
            origins: Vec::new(),
            hints: ClassificationHints::new(),
        }
    }

    /// Seed the execution switches from configuration.
    pub fn from_config(config: &ExecutionConfig) -> Self {
        Self::new()
            .with_dry_run(config.dry_run)
            .with_backups(config.keep_backup, config.keep_original)
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_backups(mut self, keep_backup: bool, keep_original: bool) -> Self {
        self.keep_backup = keep_backup;
        self.keep_original = keep_original;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn with_progress(mut self, progress: ProgressSender) -> Self {
        self.progress = Arc::new(progress);
        self
    }

    pub fn with_plugin_metadata(mut self, metadata: PluginMetadata) -> Self {
        self.plugin_metadata = metadata;
        self
    }

    pub fn with_language_analysis(mut self, track_index: usize, analysis: LanguageAnalysis) -> Self {
        self.language_analysis.push((track_index, analysis));
        self
    }

    pub fn with_origin(mut self, track_index: usize, origin: TrackOrigin) -> Self {
        self.origins.push((track_index, origin));
        self
    }

    pub fn with_hints(mut self, hints: ClassificationHints) -> Self {
        self.hints = hints;
        self
    }

    /// Evaluation context for the file's current state.
    ///
    /// Rebuilt before every phase because an earlier phase may have changed
    /// the container or tracks.
    pub fn eval_context(&self, file: &FileInfo, global: &GlobalConfig) -> EvalContext {
        let mut ctx = EvalContext::for_file(file)
            .with_plugin_metadata(self.plugin_metadata.clone())
            .with_commentary_patterns(&global.commentary_patterns);
        for (index, analysis) in &self.language_analysis {
            ctx = ctx.with_language_analysis(*index, analysis.clone());
        }
        for (index, origin) in &self.origins {
            ctx = ctx.with_origin(*index, origin.clone());
        }
        ctx
    }
}
