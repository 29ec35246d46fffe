//! Phase executor: runs every phase of a policy against one file.
//!
//! Each phase starts `Pending` and ends in exactly one terminal outcome.
//! The gates are checked in a fixed order (dependencies, `run_if`,
//! `skip_when`); a phase that passes them gets a plan, which is handed to
//! the execution collaborator. Errors are turned into outcomes here and
//! nowhere else.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use mp_core::{Error, ErrorKind, FileInfo, Result};
use mp_plan::{
    short_circuited, OnErrorMode, PhaseDefinition, PhaseOutcome, Plan, PlanBuilder, PolicySchema, RunIf,
};
use mp_rules::{ControlSignal, EvalContext};
use tracing::Instrument;

use crate::collaborator::{Introspector, PlanExecutor};
use crate::context::WorkflowContext;
use crate::result::{FileProcessingResult, PhaseResult, SkipReason, SkipReasonKind};

/// What the loop does after a phase reaches its outcome.
enum Flow {
    Next,
    /// Skip every remaining phase with this reason.
    SkipRest(SkipReason),
    /// Leave every remaining phase `Pending`.
    Abort,
    /// Abort, and the in-memory file no longer matches what is on disk.
    AbortStale,
}

/// Drives a [`PolicySchema`] over files using the given collaborators.
///
/// The policy is shared read-only, so one executor can process many files
/// concurrently.
pub struct WorkflowExecutor {
    policy: Arc<PolicySchema>,
    introspector: Arc<dyn Introspector>,
    executor: Arc<dyn PlanExecutor>,
}

impl WorkflowExecutor {
    pub fn new(
        policy: Arc<PolicySchema>,
        introspector: Arc<dyn Introspector>,
        executor: Arc<dyn PlanExecutor>,
    ) -> Self {
        Self {
            policy,
            introspector,
            executor,
        }
    }

    pub fn policy(&self) -> &PolicySchema {
        &self.policy
    }

    /// Run every phase against `path`, in declaration order.
    ///
    /// Never returns an error: introspection failures, phase failures and
    /// cancellation are all reported in the returned result.
    pub async fn process_file(&self, path: &Path, ctx: &WorkflowContext) -> FileProcessingResult {
        let span = tracing::info_span!("process_file", run_id = %ctx.run_id, path = %path.display());
        self.process(path, ctx).instrument(span).await
    }

    async fn process(&self, path: &Path, ctx: &WorkflowContext) -> FileProcessingResult {
        let started = Instant::now();
        let phases = &self.policy.phases;
        let mut result = FileProcessingResult::start(path.to_path_buf(), ctx.run_id);
        result.phase_results = phases.iter().map(|p| PhaseResult::pending(&p.name)).collect();

        let mut file = match self.introspector.get_file_info(path).await {
            Ok(file) => file,
            Err(e) => {
                tracing::error!("Introspection failed: {e}");
                result.error_message = Some(e.to_string());
                return result.finish(started.elapsed());
            }
        };
        result.file_before = Some(file.clone());

        let total = phases.len();
        let mut skip_rest: Option<SkipReason> = None;
        let mut file_known = true;

        for (i, phase) in phases.iter().enumerate() {
            if let Some(reason) = &skip_rest {
                result.phase_results[i] = PhaseResult::skipped(&phase.name, reason.clone());
                continue;
            }
            if ctx.cancellation.is_cancelled() {
                tracing::info!("Cancelled before phase '{}'", phase.name);
                result.cancelled = true;
                break;
            }

            let (phase_result, flow) = self.run_phase(phase, &mut file, &result.phase_results[..i], ctx).await;

            let step = format!("Phase {}/{} [{}]: {}", i + 1, total, phase.name, outcome_label(&phase_result));
            tracing::info!("{step}");
            ctx.progress.send(((i + 1) as f32 / total as f32) * 100.0, &step);

            if phase_result.outcome == PhaseOutcome::Failed && result.failed_phase.is_none() {
                result.failed_phase = Some(phase.name.clone());
                result.error_message = phase_result.error.clone();
            }
            result.phase_results[i] = phase_result;

            match flow {
                Flow::Next => {}
                Flow::SkipRest(reason) => skip_rest = Some(reason),
                Flow::Abort => {
                    tracing::warn!("Aborting remaining phases after '{}'", phase.name);
                    break;
                }
                Flow::AbortStale => {
                    tracing::warn!("File state unknown after '{}'; aborting remaining phases", phase.name);
                    file_known = false;
                    break;
                }
            }
        }

        result.file_after = file_known.then_some(file);
        let result = result.finish(started.elapsed());
        tracing::info!("File processed: {}", result.summary());
        result
    }

    async fn run_phase(
        &self,
        phase: &PhaseDefinition,
        file: &mut FileInfo,
        earlier: &[PhaseResult],
        ctx: &WorkflowContext,
    ) -> (PhaseResult, Flow) {
        let started = Instant::now();
        let global = &self.policy.global_config;

        if let Some(reason) = unmet_dependency(phase, earlier) {
            return (PhaseResult::skipped(&phase.name, reason), Flow::Next);
        }

        let eval = ctx.eval_context(file, global);

        if let Some(run_if) = &phase.run_if {
            if let Some(reason) = run_if_blocks(run_if, file, &eval, earlier) {
                return (PhaseResult::skipped(&phase.name, reason), Flow::Next);
            }
        }

        if let Some(condition) = &phase.skip_when {
            let (matched, trace) = condition.evaluate_traced(&file.tracks, &eval);
            tracing::debug!(phase = %phase.name, "skip_when: {trace}");
            if matched {
                let reason = SkipReason::new(SkipReasonKind::Condition, format!("skip_when matched: {condition}"));
                return (PhaseResult::skipped(&phase.name, reason), Flow::Next);
            }
        }

        let applied = self
            .apply_phase(phase, file, &eval, ctx)
            .await
            .and_then(|(plan, written)| match signal_of(&plan).and_then(ControlSignal::to_error) {
                Some(e) => Err(e),
                None => Ok((plan, written)),
            });

        let mut result = PhaseResult::pending(&phase.name);
        let flow = match applied {
            Ok((plan, written)) => match signal_of(&plan).cloned() {
                Some(signal) => {
                    let reason = SkipReason::new(SkipReasonKind::Signal, signal.to_string());
                    let flow = match signal {
                        ControlSignal::SkipFile { .. } => Flow::SkipRest(reason.clone()),
                        _ => Flow::Next,
                    };
                    result.outcome = PhaseOutcome::Skipped;
                    result.skip_reason = Some(reason);
                    result.plan = Some(plan);
                    flow
                }
                None => {
                    result.changes = plan.change_count();
                    result.file_modified = written.is_some();
                    result.plan = Some(plan);
                    match written {
                        Some(path) => self.reintrospect(phase, &path, file, &mut result).await,
                        None => {
                            result.outcome = PhaseOutcome::Completed;
                            Flow::Next
                        }
                    }
                }
            },
            Err(e) => {
                let kind = e.kind();
                result.error = Some(e.to_string());
                result.error_kind = Some(kind);
                if kind == ErrorKind::Control {
                    tracing::error!(phase = %phase.name, "Phase failed: {e}");
                    result.outcome = PhaseOutcome::Failed;
                    Flow::Abort
                } else {
                    match phase.effective_on_error(global) {
                        OnErrorMode::Skip => {
                            tracing::warn!(phase = %phase.name, "Phase skipped after error: {e}");
                            result.outcome = PhaseOutcome::Skipped;
                            result.skip_reason = Some(SkipReason::new(SkipReasonKind::ErrorMode, e.to_string()));
                            Flow::Next
                        }
                        OnErrorMode::Continue => {
                            tracing::error!(phase = %phase.name, "Phase failed: {e}");
                            result.outcome = PhaseOutcome::Failed;
                            Flow::Next
                        }
                        OnErrorMode::Fail => {
                            tracing::error!(phase = %phase.name, "Phase failed: {e}");
                            result.outcome = PhaseOutcome::Failed;
                            Flow::Abort
                        }
                    }
                }
            }
        };
        result.duration = started.elapsed();
        (result, flow)
    }

    /// Refresh `file` after the collaborator wrote `path`.
    ///
    /// A failure here leaves the phase `Failed` but modified, and aborts the
    /// file regardless of `on_error`: later phases would plan against tracks
    /// that no longer exist.
    async fn reintrospect(
        &self,
        phase: &PhaseDefinition,
        path: &Path,
        file: &mut FileInfo,
        result: &mut PhaseResult,
    ) -> Flow {
        match self.introspector.get_file_info(path).await {
            Ok(fresh) => {
                *file = fresh;
                result.outcome = PhaseOutcome::Completed;
                Flow::Next
            }
            Err(e) => {
                let e = Error::execution(
                    &phase.name,
                    format!("changes applied but re-reading {} failed: {e}", path.display()),
                );
                tracing::error!(phase = %phase.name, "Phase failed: {e}");
                result.outcome = PhaseOutcome::Failed;
                result.error = Some(e.to_string());
                result.error_kind = Some(e.kind());
                Flow::AbortStale
            }
        }
    }

    /// Build the plan and, unless short-circuited or dry-run, apply it.
    ///
    /// Returns the plan and, when the collaborator changed the file, the
    /// path to re-introspect.
    async fn apply_phase(
        &self,
        phase: &PhaseDefinition,
        file: &FileInfo,
        eval: &EvalContext,
        ctx: &WorkflowContext,
    ) -> Result<(Plan, Option<PathBuf>)> {
        let plan = PlanBuilder::new(&self.policy.global_config)
            .with_hints(ctx.hints.clone())
            .build(file, phase, eval)?;

        if short_circuited(plan.conditional_result.as_ref()) {
            return Ok((plan, None));
        }
        for warning in &plan.warnings {
            tracing::warn!(phase = %phase.name, "{warning}");
        }
        if ctx.dry_run {
            tracing::info!(phase = %phase.name, "Dry run, not applying: {}", plan.summary());
            return Ok((plan, None));
        }
        if !plan.needs_execution() {
            return Ok((plan, None));
        }
        if !self.executor.can_handle(&plan) {
            return Err(Error::execution(
                &phase.name,
                format!("executor '{}' cannot handle {} plan", self.executor.name(), plan.container),
            ));
        }

        let outcome = self
            .executor
            .execute(&plan, ctx.keep_backup, ctx.keep_original)
            .await
            .map_err(|e| match e {
                Error::Execution { .. } => e,
                other => Error::execution(&phase.name, other.to_string()),
            })?;
        if !outcome.success {
            return Err(Error::execution(&phase.name, outcome.message));
        }
        if let Some(backup) = &outcome.backup_path {
            tracing::debug!(phase = %phase.name, "Backup kept at {}", backup.display());
        }

        let written = (!plan.is_empty()).then(|| outcome.output_path.unwrap_or_else(|| file.path.clone()));
        Ok((plan, written))
    }
}

fn signal_of(plan: &Plan) -> Option<&ControlSignal> {
    plan.conditional_result.as_ref().and_then(|r| r.signal.as_ref())
}

/// First `depends_on` entry whose phase did not reach the required outcome.
fn unmet_dependency(phase: &PhaseDefinition, earlier: &[PhaseResult]) -> Option<SkipReason> {
    phase.depends_on.iter().find_map(|dep| {
        let actual = earlier
            .iter()
            .find(|r| r.phase_name.eq_ignore_ascii_case(&dep.phase))
            .map_or(PhaseOutcome::Pending, |r| r.outcome);
        (actual != dep.outcome).then(|| {
            SkipReason::new(
                SkipReasonKind::Dependency,
                format!("phase '{}' is {actual}, requires {}", dep.phase, dep.outcome),
            )
        })
    })
}

fn run_if_blocks(run_if: &RunIf, file: &FileInfo, eval: &EvalContext, earlier: &[PhaseResult]) -> Option<SkipReason> {
    match run_if {
        RunIf::PhaseModified { phase_modified } => {
            let modified = earlier
                .iter()
                .any(|r| r.phase_name.eq_ignore_ascii_case(phase_modified) && r.file_modified);
            (!modified).then(|| {
                SkipReason::new(SkipReasonKind::RunIf, format!("phase '{phase_modified}' did not modify the file"))
            })
        }
        RunIf::Condition(condition) => {
            let (matched, trace) = condition.evaluate_traced(&file.tracks, eval);
            tracing::debug!("run_if: {trace}");
            (!matched).then(|| SkipReason::new(SkipReasonKind::RunIf, format!("run_if not satisfied: {condition}")))
        }
    }
}

fn outcome_label(result: &PhaseResult) -> String {
    match result.outcome {
        PhaseOutcome::Completed => format!("Completed ({} changes)", result.changes),
        PhaseOutcome::Skipped => match &result.skip_reason {
            Some(reason) => format!("Skipped ({})", reason.kind),
            None => "Skipped".to_string(),
        },
        PhaseOutcome::Failed => format!("Failed ({})", result.error.as_deref().unwrap_or("unknown error")),
        PhaseOutcome::Pending => "Pending".to_string(),
    }
}
