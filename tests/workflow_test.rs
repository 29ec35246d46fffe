//! Phase executor integration tests.
//!
//! Policies are loaded from JSON and run against [`MemoryMedia`], which
//! applies plans in memory so later phases and later runs see the result.

mod common;

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use common::{five_track_movie, make_audio, make_file, make_subtitle, make_video, with_title, MemoryMedia};
use mediapolicy::mp_plan::PhaseOutcome;
use mediapolicy::mp_workflow::SkipReasonKind;
use mediapolicy::{load_policy, load_policy_with_config, FileInfo, PolicySchema, WorkflowConfig, WorkflowContext, WorkflowExecutor};
use tokio_util::sync::CancellationToken;

fn make_executor(policy: PolicySchema, media: &Arc<MemoryMedia>) -> WorkflowExecutor {
    WorkflowExecutor::new(Arc::new(policy), Arc::clone(media) as _, Arc::clone(media) as _)
}

async fn run(policy_json: &str, file: FileInfo) -> (mediapolicy::FileProcessingResult, Arc<MemoryMedia>) {
    let policy = PolicySchema::from_json(policy_json).unwrap();
    let media = Arc::new(MemoryMedia::new(file));
    let executor = make_executor(policy, &media);
    let result = executor
        .process_file(Path::new("/library/Movie (2010)/movie.mkv"), &WorkflowContext::new())
        .await;
    (result, media)
}

#[tokio::test]
async fn dependency_on_condition_skipped_phase() {
    let policy = r#"{
        "schema_version": 1,
        "phases": [
            {"name": "A", "skip_when": "exists(video)", "default_flags": {}},
            {"name": "B", "depends_on": [{"phase": "A", "outcome": "completed"}], "default_flags": {}}
        ]
    }"#;
    let (result, media) = run(policy, five_track_movie()).await;

    let a = result.phase("A").unwrap();
    assert_eq!(a.outcome, PhaseOutcome::Skipped);
    assert!(a.is_skipped_because(SkipReasonKind::Condition));
    let b = result.phase("B").unwrap();
    assert_eq!(b.outcome, PhaseOutcome::Skipped);
    assert!(b.is_skipped_because(SkipReasonKind::Dependency));
    assert_eq!(media.executions(), 0);
    assert!(result.success);
}

/// `B` is skipped whenever `A` did not complete, whatever `B`'s own gates say.
#[tokio::test]
async fn dependency_skip_ignores_own_gates() {
    // A fails: truehd cannot go into mp4. A skips: its skip_when holds.
    let a_variants = [
        (r#"{"name": "A", "container": {"target": "mp4"}}"#, PhaseOutcome::Failed),
        (r#"{"name": "A", "skip_when": "exists(audio)"}"#, PhaseOutcome::Skipped),
    ];
    let b_gates = [
        "",
        r#", "skip_when": "not exists(video)""#,
        r#", "skip_when": "exists(video)""#,
        r#", "run_if": "exists(audio)""#,
        r#", "run_if": "not exists(audio)""#,
    ];

    for (a, a_outcome) in a_variants {
        for gate in b_gates {
            let policy = format!(
                r#"{{"schema_version": 1, "phases": [{a}, {{"name": "B", "depends_on": ["A"], "default_flags": {{}}{gate}}}]}}"#
            );
            let (result, _) = run(&policy, five_track_movie()).await;
            assert_eq!(result.outcome_of("A"), Some(a_outcome), "policy: {policy}");
            let b = result.phase("B").unwrap();
            assert!(b.is_skipped_because(SkipReasonKind::Dependency), "policy: {policy}");
        }
    }
}

const NORMALIZE: &str = r#"{
    "schema_version": 1,
    "global_config": {"audio_languages": ["eng"], "subtitle_languages": ["eng"]},
    "phases": [
        {
            "name": "filter",
            "audio_filter": {"languages": ["eng"]},
            "subtitle_filter": {"languages": ["eng"]}
        },
        {
            "name": "arrange",
            "track_order": [],
            "default_flags": {}
        },
        {
            "name": "report",
            "run_if": {"phase_modified": "arrange"},
            "conditional_rules": {"rules": [
                {"name": "lossless", "when": "exists(audio, codec == truehd)",
                 "then": [{"type": "warn", "message": "{filename} keeps lossless audio"}]}
            ]}
        }
    ]
}"#;

fn foreign_movie() -> FileInfo {
    make_file(
        "matroska,webm",
        vec![
            make_video(0, "hevc"),
            make_audio(1, "fre", "ac3", 6),
            with_title(make_audio(2, "eng", "ac3", 2), "Commentary"),
            make_audio(3, "eng", "truehd", 8),
            make_subtitle(4, "fre"),
            make_subtitle(5, "eng"),
        ],
    )
}

#[tokio::test]
async fn multi_phase_run_is_idempotent() {
    let policy = PolicySchema::from_json(NORMALIZE).unwrap();
    let media = Arc::new(MemoryMedia::new(foreign_movie()));
    let executor = make_executor(policy, &media);
    let path = Path::new("/library/Movie (2010)/movie.mkv");

    let first = executor.process_file(path, &WorkflowContext::new()).await;
    assert!(first.success, "{}", first.summary());
    assert_eq!(first.phases_completed, 3);
    assert_eq!(first.phase("filter").unwrap().changes, 2);
    assert!(first.phase("arrange").unwrap().file_modified);
    let report = first.phase("report").unwrap().plan.as_ref().unwrap();
    let warnings = &report.conditional_result.as_ref().unwrap().warnings;
    assert_eq!(warnings, &vec!["movie.mkv keeps lossless audio".to_string()]);

    let after = media.snapshot();
    let layout: Vec<(Option<&str>, bool)> = after
        .tracks
        .iter()
        .map(|t| (t.codec.as_deref(), t.is_default))
        .collect();
    assert_eq!(
        layout,
        vec![
            (Some("hevc"), true),
            (Some("truehd"), true),
            (Some("subrip"), false),
            (Some("ac3"), false),
        ]
    );
    assert_eq!(first.file_after.as_ref(), Some(&after));
    assert_eq!(first.file_before.as_ref().map(|f| f.tracks.len()), Some(6));

    let executions = media.executions();
    let second = executor.process_file(path, &WorkflowContext::new()).await;
    assert_eq!(second.total_changes, 0);
    assert_eq!(media.executions(), executions);
    // Nothing was modified, so the report phase is gated off.
    assert!(second.phase("report").unwrap().is_skipped_because(SkipReasonKind::RunIf));
}

#[tokio::test]
async fn dry_run_leaves_file_untouched() {
    let policy = PolicySchema::from_json(NORMALIZE).unwrap();
    let media = Arc::new(MemoryMedia::new(foreign_movie()));
    let executor = make_executor(policy, &media);
    let ctx = WorkflowContext::from_config(&WorkflowConfig::from_json(r#"{"execution": {"dry_run": true}}"#).unwrap().execution);

    let result = executor.process_file(Path::new("/library/Movie (2010)/movie.mkv"), &ctx).await;
    assert!(result.success);
    assert!(result.total_changes > 0);
    assert_eq!(media.executions(), 0);
    assert_eq!(media.snapshot(), foreign_movie());
}

#[tokio::test]
async fn cancellation_between_phases() {
    let policy = PolicySchema::from_json(NORMALIZE).unwrap();
    let media = Arc::new(MemoryMedia::new(foreign_movie()));
    let executor = make_executor(policy, &media);

    let token = CancellationToken::new();
    let trigger = token.clone();
    // Cancel as soon as the first phase reports progress.
    let ctx = WorkflowContext::new()
        .with_cancellation(token)
        .with_progress(mediapolicy::mp_workflow::ProgressSender::new(move |_, _| trigger.cancel()));

    let result = executor.process_file(Path::new("/library/Movie (2010)/movie.mkv"), &ctx).await;
    assert!(result.cancelled);
    assert!(!result.success);
    assert_eq!(result.outcome_of("filter"), Some(PhaseOutcome::Completed));
    assert_eq!(result.outcome_of("arrange"), Some(PhaseOutcome::Pending));
    assert_eq!(result.outcome_of("report"), Some(PhaseOutcome::Pending));
    assert_eq!(media.executions(), 1);
}

#[test]
fn policy_and_config_load_from_disk() {
    let mut policy_file = tempfile::NamedTempFile::new().unwrap();
    policy_file.write_all(NORMALIZE.as_bytes()).unwrap();
    let policy = load_policy(policy_file.path()).unwrap();
    assert_eq!(policy.phase_names(), vec!["filter", "arrange", "report"]);

    let mut config_file = tempfile::NamedTempFile::new().unwrap();
    config_file
        .write_all(br#"{"execution": {"keep_backup": false}, "logging": {"level": "debug"}}"#)
        .unwrap();
    let config = WorkflowConfig::load_or_default(Some(config_file.path()));
    assert!(!config.execution.keep_backup);
    assert_eq!(config.logging.level, "debug");
    assert!(config.validate().is_empty());

    let missing = WorkflowConfig::load_or_default(Some(Path::new("/nonexistent/mediapolicy.json")));
    assert_eq!(missing, WorkflowConfig::default());
}

#[test]
fn configured_depth_applies_to_policy_files() {
    let mut policy_file = tempfile::NamedTempFile::new().unwrap();
    policy_file
        .write_all(
            br#"{"schema_version": 1, "phases": [{
                "name": "gated",
                "skip_when": "not (exists(audio, lang == eng) or exists(subtitle, lang == eng))",
                "default_flags": {}
            }]}"#,
        )
        .unwrap();

    // Well within the default limit.
    assert!(load_policy(policy_file.path()).is_ok());

    let strict = WorkflowConfig::from_json(r#"{"expressions": {"max_depth": 1}}"#).unwrap();
    let err = load_policy_with_config(policy_file.path(), &strict).unwrap_err();
    assert_eq!(err.kind(), mediapolicy::ErrorKind::Validation);
    assert!(err.to_string().contains("phase 'gated' skip_when"), "{err}");

    let roomy = WorkflowConfig::from_json(r#"{"expressions": {"max_depth": 2}}"#).unwrap();
    assert!(load_policy_with_config(policy_file.path(), &roomy).is_ok());
}

#[test]
fn bad_policy_fails_to_load() {
    let mut policy_file = tempfile::NamedTempFile::new().unwrap();
    policy_file
        .write_all(br#"{"schema_version": 1, "phases": [{"name": "a", "depends_on": ["b"]}, {"name": "b"}]}"#)
        .unwrap();
    let err = load_policy(policy_file.path()).unwrap_err();
    assert_eq!(err.kind(), mediapolicy::ErrorKind::Validation);
    assert!(load_policy(Path::new("/nonexistent/policy.json")).is_err());
}
