//! # mp-workflow
//!
//! The per-file phase state machine.
//!
//! [`WorkflowExecutor`] walks a policy's phases in declaration order,
//! gating each one on its dependencies, `run_if` and `skip_when`, building a
//! plan and handing it to a [`PlanExecutor`]. File state comes from an
//! [`Introspector`] and is refreshed after every phase that changed the file.
//!
//! - [`collaborator`] -- introspection and execution traits.
//! - [`context`] -- per-run switches, cancellation, progress and enrichment.
//! - [`result`] -- phase and file results.
//! - [`executor`] -- the state machine itself.

pub mod collaborator;
pub mod context;
pub mod executor;
pub mod result;

pub use collaborator::{ExecutionOutcome, Introspector, PlanExecutor};
pub use context::{ProgressSender, WorkflowContext};
pub use executor::WorkflowExecutor;
pub use result::{FileProcessingResult, PhaseResult, SkipReason, SkipReasonKind};
