//! Numeric helpers shared by the scoring and topology stages.

use ahash::{AHashMap, AHashSet};
use std::hash::Hash;

/// Jaccard similarity of the whitespace-separated token sets of two
/// signatures.
///
/// Returns a value in `[0, 1]`; `1.0` iff the token sets are equal and
/// non-empty. Either signature being empty yields `0.0`.
pub fn jaccard_similarity(sig1: &str, sig2: &str) -> f64 {
    if sig1.is_empty() || sig2.is_empty() {
        return 0.0;
    }

    let tokens1: AHashSet<&str> = sig1.split_whitespace().collect();
    let tokens2: AHashSet<&str> = sig2.split_whitespace().collect();

    if tokens1.is_empty() || tokens2.is_empty() {
        return 0.0;
    }

    let intersection = tokens1.intersection(&tokens2).count();
    let union = tokens1.union(&tokens2).count();

    if union == 0 {
        return 0.0;
    }

    intersection as f64 / union as f64
}

/// min/max ratio similarity of two non-negative quantities.
///
/// Both zero compares as identical (`1.0`); exactly one zero as fully
/// dissimilar (`0.0`).
pub fn ratio_similarity(a: f64, b: f64) -> f64 {
    if a <= 0.0 && b <= 0.0 {
        return 1.0;
    }
    if a <= 0.0 || b <= 0.0 {
        return 0.0;
    }
    if a <= b {
        a / b
    } else {
        b / a
    }
}

/// Most frequent value in `values`, or `None` when empty.
///
/// Ties resolve to the smallest value so repeated runs over the same
/// input produce the same representative.
pub fn most_common<T>(values: &[T]) -> Option<T>
where
    T: Copy + Eq + Hash + Ord,
{
    let mut counts: AHashMap<T, usize> = AHashMap::new();
    for v in values {
        *counts.entry(*v).or_insert(0) += 1;
    }

    counts
        .into_iter()
        .max_by(|(va, ca), (vb, cb)| ca.cmp(cb).then(vb.cmp(va)))
        .map(|(v, _)| v)
}

/// Median of an integer sample, or `None` when empty.
///
/// Uses the upper-middle element of the sorted sample; stable against a
/// single outlier in multi-path hop measurements.
pub fn median<T>(values: &[T]) -> Option<T>
where
    T: Copy + Ord,
{
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    Some(sorted[sorted.len() / 2])
}
