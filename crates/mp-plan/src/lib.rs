//! # mp-plan
//!
//! Policy schema and plan construction.
//!
//! Given one file's tracks and one phase of a [`PolicySchema`], this crate
//! decides what should change: which tracks are kept, their order and flags,
//! whether the container changes, which audio tracks are synthesized and
//! what gets transcoded. The result is a [`Plan`], a plain value handed to an
//! execution collaborator.
//!
//! ## Overview
//!
//! - [`policy`] -- schema types and load-time validation.
//! - [`classify`] / [`order`] -- track classification and canonical order.
//! - [`flags`] -- default and forced flag assignment.
//! - [`filter`] -- keep/remove dispositions.
//! - [`container`] -- container conversion and codec compatibility.
//! - [`synthesis`] -- derived audio tracks and downmix parameters.
//! - [`transcode`] -- video/audio transcode decisions.
//! - [`builder`] -- combines all of the above into a [`Plan`].

pub mod builder;
pub mod classify;
pub mod container;
pub mod filter;
pub mod flags;
pub mod order;
pub mod plan;
pub mod policy;
pub mod synthesis;
pub mod transcode;

pub use builder::{build_plan, short_circuited, PlanBuilder};
pub use classify::{ClassificationHints, Classifier, TrackHint, TrackType, CANONICAL_ORDER};
pub use container::{
    evaluate_container_change, CodecMapping, ContainerChange, ContainerConfig, ContainerTranscodePlan,
    IncompatibleCodecMode, IncompatibleTrackPlan, TrackPlanAction,
};
pub use filter::{
    compute_track_dispositions, AttachmentFilterConfig, AudioFilterConfig, Disposition, FallbackMode,
    SubtitleFilterConfig, TrackDisposition, TrackFilterSet, TrackPreActions,
};
pub use flags::{compute_default_flags, enforce_single_default, DefaultFlagsConfig, FlagAssignment, FlagPreferences};
pub use order::{compute_desired_order, current_order};
pub use plan::{ActionType, Plan, PlanValue, PlannedAction};
pub use policy::{
    FileTimestampConfig, GlobalConfig, OnErrorMode, OperationKind, PhaseDefinition, PhaseDependency,
    PhaseOutcome, PolicySchema, RunIf, TranscriptionConfig, SCHEMA_VERSION,
};
pub use synthesis::{
    downmix_filter, plan_synthesis, select_source_track, AudioCodec, AudioSynthesisConfig, ChannelSpec,
    DownmixFilter, SkippedSynthesis, SourceTrackSelection, SynthesisDefinition, SynthesisOperation,
    SynthesisPlan,
};
pub use transcode::{plan_transcode, TranscodeConfig, TranscodePlan, VideoCodec};
