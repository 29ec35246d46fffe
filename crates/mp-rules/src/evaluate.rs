//! Condition evaluation against a track list and an [`EvalContext`].
//!
//! [`Condition::evaluate_traced`] also yields a short human-readable reason,
//! used in rule traces and debug logs. [`Condition::evaluate`] takes the same
//! path with tracing compiled out, so no reason strings are built.

use mp_core::codecs::codec_matches;
use mp_core::{languages_match, TrackInfo, TrackKind};

use crate::condition::{Condition, NumericFilter, OriginCheck, StringMatch, TrackFilters};
use crate::context::{CommentaryMatcher, EvalContext, MetadataLookup, OriginStatus};
use crate::serializer::serialize;
use crate::value::{MetadataOp, Operator, Scalar, Value};

impl Condition {
    /// Evaluate to a boolean.
    pub fn evaluate(&self, tracks: &[TrackInfo], ctx: &EvalContext) -> bool {
        self.eval::<false>(tracks, ctx).0
    }

    /// Evaluate, returning the result and a reason for it.
    pub fn evaluate_traced(&self, tracks: &[TrackInfo], ctx: &EvalContext) -> (bool, String) {
        self.eval::<true>(tracks, ctx)
    }

    /// With `TRACE` off every reason is an empty string.
    fn eval<const TRACE: bool>(&self, tracks: &[TrackInfo], ctx: &EvalContext) -> (bool, String) {
        match self {
            Condition::And(parts) => {
                for part in parts {
                    let (ok, reason) = part.eval::<TRACE>(tracks, ctx);
                    if !ok {
                        return (false, detail::<TRACE>(|| format!("and → False ({reason})")));
                    }
                }
                (true, detail::<TRACE>(|| "and → True (all conditions true)".into()))
            }
            Condition::Or(parts) => {
                for part in parts {
                    let (ok, reason) = part.eval::<TRACE>(tracks, ctx);
                    if ok {
                        return (true, detail::<TRACE>(|| format!("or → True ({reason})")));
                    }
                }
                (false, detail::<TRACE>(|| "or → False (no condition true)".into()))
            }
            Condition::Not(inner) => {
                let (ok, reason) = inner.eval::<TRACE>(tracks, ctx);
                (!ok, detail::<TRACE>(|| format!("not → {} ({reason})", label(!ok))))
            }
            Condition::Exists {
                track_type,
                filters,
            } => {
                let found = tracks
                    .iter()
                    .find(|t| t.is(*track_type) && matches_track(filters, t, &ctx.commentary));
                self.leaf::<TRACE>(found.is_some(), || match found {
                    Some(t) => format!("track[{}] matches", t.index),
                    None => "no matching track".into(),
                })
            }
            Condition::Count {
                track_type,
                filters,
                op,
                value,
            } => {
                let count = tracks
                    .iter()
                    .filter(|t| t.is(*track_type) && matches_track(filters, t, &ctx.commentary))
                    .count() as u64;
                self.leaf::<TRACE>(op.compare(&count, value), || format!("count={count}"))
            }
            Condition::Comparison { field, op, value } => {
                let (ok, reason) = compare_field::<TRACE>(field, *op, value, tracks, ctx);
                self.leaf::<TRACE>(ok, || reason)
            }
            Condition::TitleMatch {
                track_type,
                pattern,
            } => {
                let found = tracks
                    .iter()
                    .filter(|t| track_type.map_or(true, |k| t.is(k)))
                    .find(|t| t.title.as_deref().is_some_and(|title| pattern.is_match(title)));
                self.leaf::<TRACE>(found.is_some(), || match found {
                    Some(t) => format!("track[{}] title matches", t.index),
                    None => "no matching title".into(),
                })
            }
            Condition::AudioIsMultiLanguage {
                threshold,
                track_index,
                primary_language,
            } => {
                let (ok, reason) = multi_language::<TRACE>(
                    *threshold,
                    *track_index,
                    primary_language.as_deref(),
                    tracks,
                    ctx,
                );
                self.leaf::<TRACE>(ok, || reason)
            }
            Condition::PluginMetadata {
                plugin,
                field,
                op,
                value,
            } => {
                let (ok, reason) = match ctx.plugin_metadata.lookup(plugin, field) {
                    MetadataLookup::PluginMissing => {
                        (false, detail::<TRACE>(|| format!("plugin '{plugin}' not in metadata")))
                    }
                    MetadataLookup::FieldMissing => {
                        (false, detail::<TRACE>(|| format!("field '{field}' not found")))
                    }
                    MetadataLookup::Value(actual) => {
                        metadata_compare::<TRACE>(actual, *op, value.as_ref(), false)
                    }
                };
                self.leaf::<TRACE>(ok, || reason)
            }
            Condition::ContainerMetadata { field, op, value } => {
                let (ok, reason) = match ctx.container_tag(field) {
                    None => (false, detail::<TRACE>(|| format!("tag '{field}' not found"))),
                    Some(actual) => {
                        let actual = Scalar::Text(actual.to_string());
                        metadata_compare::<TRACE>(Some(&actual), *op, value.as_ref(), true)
                    }
                };
                self.leaf::<TRACE>(ok, || reason)
            }
            Condition::IsOriginal(check) => {
                let (ok, reason) = origin::<TRACE>(check, OriginStatus::Original, tracks, ctx);
                self.leaf::<TRACE>(ok, || reason)
            }
            Condition::IsDubbed(check) => {
                let (ok, reason) = origin::<TRACE>(check, OriginStatus::Dubbed, tracks, ctx);
                self.leaf::<TRACE>(ok, || reason)
            }
        }
    }

    fn leaf<const TRACE: bool>(&self, result: bool, describe: impl FnOnce() -> String) -> (bool, String) {
        let reason = detail::<TRACE>(|| format!("{} → {} ({})", serialize(self), label(result), describe()));
        (result, reason)
    }
}

/// Build a reason only when tracing.
fn detail<const TRACE: bool>(reason: impl FnOnce() -> String) -> String {
    if TRACE {
        reason()
    } else {
        String::new()
    }
}

fn label(result: bool) -> &'static str {
    if result {
        "True"
    } else {
        "False"
    }
}

// ---------------------------------------------------------------------------
// Track filters
// ---------------------------------------------------------------------------

fn matches_strings(actual: Option<&str>, expected: &StringMatch, eq: fn(&str, &str) -> bool) -> bool {
    actual.is_some_and(|a| expected.values().iter().any(|e| eq(a, e)))
}

fn matches_numeric(actual: Option<u32>, filter: &NumericFilter) -> bool {
    actual.is_some_and(|a| filter.op.compare(&i64::from(a), &filter.value))
}

/// Whether `track` passes every filter that is set.
pub fn matches_track(filters: &TrackFilters, track: &TrackInfo, commentary: &CommentaryMatcher) -> bool {
    if let Some(lang) = &filters.language {
        if !matches_strings(track.language.as_deref(), lang, languages_match) {
            return false;
        }
    }
    if let Some(codec) = &filters.codec {
        if !matches_strings(track.codec.as_deref(), codec, codec_matches) {
            return false;
        }
    }
    if let Some(f) = &filters.channels {
        if !matches_numeric(track.channels, f) {
            return false;
        }
    }
    if let Some(f) = &filters.height {
        if !matches_numeric(track.height, f) {
            return false;
        }
    }
    if let Some(f) = &filters.width {
        if !matches_numeric(track.width, f) {
            return false;
        }
    }
    if filters.is_default.is_some_and(|d| d != track.is_default) {
        return false;
    }
    if filters.is_forced.is_some_and(|f| f != track.is_forced) {
        return false;
    }
    if let Some(needle) = &filters.title {
        let hit = track
            .title
            .as_deref()
            .is_some_and(|t| t.to_lowercase().contains(&needle.to_lowercase()));
        if !hit {
            return false;
        }
    }
    if let Some(want) = filters.not_commentary {
        if commentary.is_commentary(track) == want {
            return false;
        }
    }
    true
}

// ---------------------------------------------------------------------------
// File-level comparisons
// ---------------------------------------------------------------------------

enum FieldValue {
    Number(f64),
    Text(String),
}

fn resolve_field(field: &str, tracks: &[TrackInfo], ctx: &EvalContext) -> Option<FieldValue> {
    let primary_video = || tracks.iter().find(|t| t.is(TrackKind::Video));
    match field {
        "container" => ctx.container.clone().map(FieldValue::Text),
        "file_size" | "size" => ctx.file_size.map(|s| FieldValue::Number(s as f64)),
        "duration" => ctx.duration_seconds.map(FieldValue::Number),
        "video_codec" => primary_video()
            .and_then(|t| t.codec.clone())
            .map(FieldValue::Text),
        "width" => primary_video()
            .and_then(|t| t.width)
            .map(|w| FieldValue::Number(f64::from(w))),
        "height" => primary_video()
            .and_then(|t| t.height)
            .map(|h| FieldValue::Number(f64::from(h))),
        "audio_channels" => tracks
            .iter()
            .filter(|t| t.is(TrackKind::Audio))
            .filter_map(|t| t.channels)
            .max()
            .map(|c| FieldValue::Number(f64::from(c))),
        "track_count" => Some(FieldValue::Number(tracks.len() as f64)),
        other => ctx.fields.get(other).map(|v| match v {
            Scalar::Int(i) => FieldValue::Number(*i as f64),
            Scalar::Float(f) => FieldValue::Number(*f),
            Scalar::Bool(b) => FieldValue::Text(b.to_string()),
            Scalar::Text(t) => FieldValue::Text(t.clone()),
        }),
    }
}

fn field_equals(field: &str, actual: &FieldValue, expected: &Value) -> bool {
    match (actual, expected) {
        (FieldValue::Text(a), Value::Text(e)) if field == "video_codec" => codec_matches(a, e),
        (FieldValue::Text(a), Value::Text(e)) => a.eq_ignore_ascii_case(e),
        (FieldValue::Text(a), Value::Bool(b)) => a.eq_ignore_ascii_case(&b.to_string()),
        (FieldValue::Number(a), e) => e.as_f64().is_some_and(|e| *a == e),
        _ => false,
    }
}

fn compare_field<const TRACE: bool>(
    field: &str,
    op: Operator,
    expected: &Value,
    tracks: &[TrackInfo],
    ctx: &EvalContext,
) -> (bool, String) {
    let Some(actual) = resolve_field(field, tracks, ctx) else {
        return (false, detail::<TRACE>(|| format!("'{field}' not available")));
    };
    let result = match op {
        Operator::In => match expected {
            Value::List(items) => items.iter().any(|e| field_equals(field, &actual, e)),
            single => field_equals(field, &actual, single),
        },
        Operator::Eq => field_equals(field, &actual, expected),
        Operator::Neq => !field_equals(field, &actual, expected),
        ordering => match (&actual, expected.as_f64()) {
            (FieldValue::Number(a), Some(e)) => ordering.compare(a, &e),
            (FieldValue::Text(a), Some(e)) => a.parse::<f64>().is_ok_and(|a| ordering.compare(&a, &e)),
            _ => false,
        },
    };
    let reason = detail::<TRACE>(|| match &actual {
        FieldValue::Number(n) => format!("actual={n}"),
        FieldValue::Text(t) => format!("actual={t}"),
    });
    (result, reason)
}

// ---------------------------------------------------------------------------
// Metadata, language analysis, origin
// ---------------------------------------------------------------------------

fn metadata_compare<const TRACE: bool>(
    actual: Option<&Scalar>,
    op: MetadataOp,
    expected: Option<&Scalar>,
    coerce: bool,
) -> (bool, String) {
    let Some(actual) = actual else {
        return (false, detail::<TRACE>(|| "field value is null".into()));
    };
    (op.apply(actual, expected, coerce), detail::<TRACE>(|| format!("actual={actual}")))
}

fn multi_language<const TRACE: bool>(
    threshold: f64,
    track_index: Option<usize>,
    primary_language: Option<&str>,
    tracks: &[TrackInfo],
    ctx: &EvalContext,
) -> (bool, String) {
    if ctx.language_analysis.is_empty() {
        return (false, detail::<TRACE>(|| "no language analysis available".into()));
    }
    let audio: Vec<&TrackInfo> = tracks
        .iter()
        .filter(|t| t.is(TrackKind::Audio))
        .filter(|t| track_index.map_or(true, |i| t.index == i))
        .collect();
    if let (Some(index), true) = (track_index, audio.is_empty()) {
        return (false, detail::<TRACE>(|| format!("track {index} not found")));
    }

    for track in audio {
        let Some(analysis) = ctx.language_analysis.get(&track.index) else {
            continue;
        };
        if primary_language.is_some_and(|p| !languages_match(&analysis.primary_language, p)) {
            continue;
        }
        if analysis.has_secondary_above(threshold) {
            let reason = detail::<TRACE>(|| {
                format!(
                    "track[{}] {} {:.0}%, secondary above {:.0}%",
                    track.index,
                    analysis.primary_language,
                    analysis.primary_share * 100.0,
                    threshold * 100.0
                )
            });
            return (true, reason);
        }
    }
    (false, detail::<TRACE>(|| "no multi-language audio tracks".into()))
}

fn origin<const TRACE: bool>(
    check: &OriginCheck,
    target: OriginStatus,
    tracks: &[TrackInfo],
    ctx: &EvalContext,
) -> (bool, String) {
    if ctx.origins.is_empty() {
        return (false, detail::<TRACE>(|| "no classification results available".into()));
    }
    for track in tracks.iter().filter(|t| t.is(TrackKind::Audio)) {
        let Some(origin) = ctx.origins.get(&track.index) else {
            continue;
        };
        if origin.confidence < check.min_confidence {
            continue;
        }
        if let Some(lang) = &check.language {
            match &origin.language {
                Some(actual) if languages_match(actual, lang) => {}
                _ => continue,
            }
        }
        if (origin.status == target) == check.value {
            let reason = detail::<TRACE>(|| {
                format!(
                    "track[{}] is {}, confidence={:.0}%",
                    track.index,
                    origin.status,
                    origin.confidence * 100.0
                )
            });
            return (true, reason);
        }
    }
    let reason = detail::<TRACE>(|| {
        if check.value {
            format!("no {target} tracks found")
        } else {
            format!("no not {target} tracks found")
        }
    });
    (false, reason)
}
