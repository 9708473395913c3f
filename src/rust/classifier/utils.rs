use std::cmp::Ordering;

/// Indices and values of the `k` largest entries, highest first.
///
/// The sort is stable, so equal values keep ascending index order. `k` is clamped to
/// the length of `values`. NaN compares equal to everything and so stays in place
/// relative to its neighbours.
pub(crate) fn top_k(values: &[f32], k: usize) -> Vec<(usize, f32)> {
    let mut ranked: Vec<(usize, f32)> = values.iter().copied().enumerate().collect();
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
    ranked.truncate(k.min(values.len()));
    ranked
}
