use crate::models::{MatchBatch, RankedMatch};
use std::cmp::Ordering;

/// Sort results and partition them at `threshold`
///
/// Sorting is by score descending. The sort is stable and the input is
/// expected in roster order, so equal scores keep their roster order;
/// `roster_index` is compared as well so the output does not depend on the
/// input order. `matches_found` counts results with `score >= threshold`.
pub fn rank(mut results: Vec<RankedMatch>, threshold: f64) -> MatchBatch {
    results.sort_by(|a, b| {
        b.score()
            .partial_cmp(&a.score())
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.roster_index.cmp(&b.roster_index))
    });

    // Sorted descending, so the matches are a prefix
    let matches_found = results.partition_point(|m| m.score() >= threshold);

    MatchBatch {
        total_speakers: results.len(),
        matches_found,
        threshold,
        results,
    }
}
