//! Shared fixtures for integration tests.
//!
//! [`MemoryMedia`] stands in for both collaborators: it serves a file's
//! state from memory and applies plans to that state, renumbering tracks the
//! way a real remux would.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use mediapolicy::mp_core::{FileInfo, Result, TrackInfo, TrackKind};
use mediapolicy::mp_plan::{ActionType, Disposition, Plan, PlanValue};
use mediapolicy::mp_workflow::{ExecutionOutcome, Introspector, PlanExecutor};

// ---------------------------------------------------------------------------
// Track fixtures
// ---------------------------------------------------------------------------

pub fn make_video(index: usize, codec: &str) -> TrackInfo {
    let mut t = TrackInfo::new(index, TrackKind::Video);
    t.codec = Some(codec.into());
    t.width = Some(1920);
    t.height = Some(1080);
    t
}

pub fn make_audio(index: usize, lang: &str, codec: &str, channels: u32) -> TrackInfo {
    let mut t = TrackInfo::new(index, TrackKind::Audio);
    t.language = Some(lang.into());
    t.codec = Some(codec.into());
    t.channels = Some(channels);
    t
}

pub fn make_subtitle(index: usize, lang: &str) -> TrackInfo {
    let mut t = TrackInfo::new(index, TrackKind::Subtitle);
    t.language = Some(lang.into());
    t.codec = Some("subrip".into());
    t
}

pub fn with_title(mut track: TrackInfo, title: &str) -> TrackInfo {
    track.title = Some(title.into());
    track
}

pub fn forced(mut track: TrackInfo) -> TrackInfo {
    track.is_forced = true;
    track
}

pub fn make_file(container: &str, tracks: Vec<TrackInfo>) -> FileInfo {
    FileInfo {
        path: PathBuf::from("/library/Movie (2010)/movie.mkv"),
        container_format: container.into(),
        size_bytes: Some(8 * 1024 * 1024 * 1024),
        tracks,
    }
}

/// The five-track layout used by the ordering scenarios.
pub fn five_track_movie() -> FileInfo {
    make_file(
        "matroska,webm",
        vec![
            make_video(0, "h264"),
            make_audio(1, "eng", "truehd", 8),
            with_title(make_audio(2, "eng", "ac3", 2), "Director Commentary"),
            make_subtitle(3, "eng"),
            forced(make_subtitle(4, "eng")),
        ],
    )
}

// ---------------------------------------------------------------------------
// In-memory collaborators
// ---------------------------------------------------------------------------

/// One in-memory file plus counters for how it was used.
pub struct MemoryMedia {
    file: Mutex<FileInfo>,
    pub introspections: AtomicUsize,
    pub executions: AtomicUsize,
}

impl MemoryMedia {
    pub fn new(file: FileInfo) -> Self {
        Self {
            file: Mutex::new(file),
            introspections: AtomicUsize::new(0),
            executions: AtomicUsize::new(0),
        }
    }

    pub fn snapshot(&self) -> FileInfo {
        self.file.lock().unwrap().clone()
    }

    pub fn executions(&self) -> usize {
        self.executions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Introspector for MemoryMedia {
    async fn get_file_info(&self, _path: &Path) -> Result<FileInfo> {
        self.introspections.fetch_add(1, Ordering::SeqCst);
        Ok(self.snapshot())
    }
}

#[async_trait]
impl PlanExecutor for MemoryMedia {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn can_handle(&self, _plan: &Plan) -> bool {
        true
    }

    async fn execute(&self, plan: &Plan, _keep_backup: bool, _keep_original: bool) -> Result<ExecutionOutcome> {
        self.executions.fetch_add(1, Ordering::SeqCst);
        apply_plan(&mut self.file.lock().unwrap(), plan);
        Ok(ExecutionOutcome::success(plan.summary()))
    }
}

/// Apply flag, title, language, removal, reorder and container changes.
pub fn apply_plan(file: &mut FileInfo, plan: &Plan) {
    for action in &plan.actions {
        let Some(index) = action.track_index else {
            continue;
        };
        let Some(track) = file.tracks.iter_mut().find(|t| t.index == index) else {
            continue;
        };
        match (action.action_type, &action.desired_value) {
            (ActionType::SetDefault, _) => track.is_default = true,
            (ActionType::ClearDefault, _) => track.is_default = false,
            (ActionType::SetForced, _) => track.is_forced = true,
            (ActionType::ClearForced, _) => track.is_forced = false,
            (ActionType::SetTitle, Some(PlanValue::Text(title))) => track.title = Some(title.clone()),
            (ActionType::SetLanguage, Some(PlanValue::Text(lang))) => track.language = Some(lang.clone()),
            _ => {}
        }
    }

    file.tracks.retain(|t| {
        !plan
            .track_dispositions
            .iter()
            .any(|d| d.track_index == t.index && d.action == Disposition::Remove)
    });

    if let Some(PlanValue::Order(order)) = plan
        .actions_of(ActionType::Reorder)
        .next()
        .and_then(|a| a.desired_value.as_ref())
    {
        file.tracks
            .sort_by_key(|t| order.iter().position(|i| *i == t.index).unwrap_or(usize::MAX));
    }

    if let Some(change) = &plan.container_change {
        file.container_format = change.target_format.to_string();
    }

    for (i, track) in file.tracks.iter_mut().enumerate() {
        track.index = i;
    }
}
