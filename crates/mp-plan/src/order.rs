//! Target track order.

use mp_core::TrackInfo;

use crate::classify::{TrackType, CANONICAL_ORDER};

/// Rank of `track_type` within `order`; types missing from the list sort last.
pub fn rank_in(order: &[TrackType], track_type: TrackType) -> usize {
    order
        .iter()
        .position(|t| *t == track_type)
        .unwrap_or(order.len())
}

/// Compute the desired order of `tracks` as a list of track indices.
///
/// `types[i]` is the classification of `tracks[i]`. The result is a stable
/// sort by `(rank, original index)`, so two tracks of the same type never
/// swap. An empty `order` falls back to [`CANONICAL_ORDER`].
pub fn compute_desired_order(tracks: &[TrackInfo], types: &[TrackType], order: &[TrackType]) -> Vec<usize> {
    let order = if order.is_empty() {
        &CANONICAL_ORDER[..]
    } else {
        order
    };
    let mut keyed: Vec<(usize, usize)> = tracks
        .iter()
        .zip(types)
        .map(|(track, ty)| (rank_in(order, *ty), track.index))
        .collect();
    keyed.sort();
    keyed.into_iter().map(|(_, index)| index).collect()
}

/// Current order of `tracks` by index.
pub fn current_order(tracks: &[TrackInfo]) -> Vec<usize> {
    let mut indices: Vec<usize> = tracks.iter().map(|t| t.index).collect();
    indices.sort_unstable();
    indices
}
