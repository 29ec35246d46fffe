//! Benchmarks for plan construction
//!
//! Builds plans for phases of increasing scope against files with growing
//! track counts.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use mediapolicy::mp_core::{FileInfo, TrackInfo, TrackKind};
use mediapolicy::mp_plan::{GlobalConfig, PhaseDefinition};
use mediapolicy::{build_plan, EvalContext};
use std::path::PathBuf;

const FULL_PHASE: &str = r#"{
    "name": "normalize",
    "audio_filter": {"languages": ["eng", "jpn"]},
    "subtitle_filter": {"languages": ["eng"], "preserve_forced": true},
    "track_order": [],
    "default_flags": {"set_preferred_subtitle_default": true},
    "conditional_rules": {"rules": [
        {"name": "lossless", "when": "exists(audio, codec == truehd)",
         "then": [{"type": "warn", "message": "lossless audio in {filename}"}]}
    ]},
    "audio_synthesis": {"tracks": [
        {"name": "stereo", "codec": "aac", "channels": "stereo",
         "source": {"prefer": [{"language": "eng"}, {"not_commentary": true}, {"channels": "max"}]}}
    ]}
}"#;

/// A file with `audio` audio tracks and twice as many subtitles
fn make_file(audio: usize) -> FileInfo {
    let langs = ["eng", "jpn", "fre", "ger"];
    let mut tracks = vec![TrackInfo::new(0, TrackKind::Video)];
    tracks[0].codec = Some("hevc".into());
    for i in 0..audio {
        let mut t = TrackInfo::new(tracks.len(), TrackKind::Audio);
        t.language = Some(langs[i % langs.len()].into());
        t.codec = Some(if i % 2 == 0 { "truehd" } else { "ac3" }.into());
        t.channels = Some(if i % 2 == 0 { 8 } else { 6 });
        if i == audio - 1 {
            t.title = Some("Director's Commentary".into());
        }
        tracks.push(t);
    }
    for i in 0..audio * 2 {
        let mut t = TrackInfo::new(tracks.len(), TrackKind::Subtitle);
        t.language = Some(langs[i % langs.len()].into());
        t.codec = Some("subrip".into());
        t.is_forced = i == 1;
        tracks.push(t);
    }
    FileInfo {
        path: PathBuf::from("/movies/movie.mkv"),
        container_format: "matroska,webm".into(),
        size_bytes: Some(30 * 1024 * 1024 * 1024),
        tracks,
    }
}

fn bench_empty_phase(c: &mut Criterion) {
    let file = make_file(4);
    let phase = PhaseDefinition::new("noop");
    let global = GlobalConfig::default();
    let ctx = EvalContext::for_file(&file);
    c.bench_function("build_plan/empty_phase", |b| {
        b.iter(|| build_plan(black_box(&file), black_box(&phase), &global, &ctx));
    });
}

fn bench_full_phase(c: &mut Criterion) {
    let mut group = c.benchmark_group("build_plan/full_phase");
    let phase: PhaseDefinition = serde_json::from_str(FULL_PHASE).expect("benchmark phase parses");
    let global = GlobalConfig::default();
    for audio in [2usize, 8, 32] {
        let file = make_file(audio);
        let ctx = EvalContext::for_file(&file);
        group.bench_with_input(BenchmarkId::from_parameter(file.tracks.len()), &file, |b, file| {
            b.iter(|| build_plan(black_box(file), black_box(&phase), &global, &ctx));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_empty_phase, bench_full_phase);
criterion_main!(benches);
