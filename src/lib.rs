//! mediapolicy - declarative policy engine for media files.
//!
//! This crate ties the workspace together for callers and integration
//! tests:
//!
//! - [`mp_core`] -- errors, media types and configuration.
//! - [`mp_rules`] -- the expression language, conditions and rules.
//! - [`mp_plan`] -- policy schema and plan construction.
//! - [`mp_workflow`] -- the per-file phase executor.

pub mod logging;

use std::path::Path;

pub use mp_core;
pub use mp_plan;
pub use mp_rules;
pub use mp_workflow;

pub use logging::init_tracing;
pub use mp_core::config::WorkflowConfig;
pub use mp_core::{Error, ErrorKind, FileInfo, Result, TrackInfo, TrackKind};
pub use mp_plan::{build_plan, Plan, PolicySchema};
pub use mp_rules::{parse, serialize, Condition, EvalContext};
pub use mp_workflow::{FileProcessingResult, WorkflowContext, WorkflowExecutor};

/// Read and validate a policy document from disk with default limits.
pub fn load_policy(path: &Path) -> Result<PolicySchema> {
    load_policy_with_config(path, &WorkflowConfig::default())
}

/// Read and validate a policy document, applying the configured expression
/// nesting limit to every condition it contains.
pub fn load_policy_with_config(path: &Path, config: &WorkflowConfig) -> Result<PolicySchema> {
    let json = std::fs::read_to_string(path)?;
    let policy = PolicySchema::from_json_with_max_depth(&json, config.expressions.max_depth)?;
    tracing::info!(
        "Loaded policy {} ({} phase(s))",
        path.display(),
        policy.phases.len()
    );
    Ok(policy)
}

/// Parse a standalone expression under the configured nesting limit.
pub fn parse_expression(source: &str, config: &WorkflowConfig) -> Result<Condition> {
    Ok(mp_rules::parse_with_max_depth(source, config.expressions.max_depth)?)
}
