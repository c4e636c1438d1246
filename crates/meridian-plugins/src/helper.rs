//! Helpers shared by score plugins.

use meridian_core::NodeScore;

/// Scale scores so the highest becomes `max_priority`.
///
/// With `reverse` the scale is flipped, so the lowest raw score ends up
/// highest. When every raw score is zero the scores stay zero, or become
/// `max_priority` when reversed.
pub fn default_normalize_score(max_priority: i64, reverse: bool, scores: &mut [NodeScore]) {
    let max = scores.iter().map(|s| s.score).max().unwrap_or(0);

    if max == 0 {
        if reverse {
            for s in scores.iter_mut() {
                s.score = max_priority;
            }
        }
        return;
    }

    for s in scores.iter_mut() {
        let mut score = max_priority * s.score / max;
        if reverse {
            score = max_priority - score;
        }
        s.score = score;
    }
}

/// Round a `0.0..=1.0` fraction onto the `0..=max_priority` scale.
pub(crate) fn fraction_to_score(fraction: f64, max_priority: i64) -> i64 {
    (fraction.clamp(0.0, 1.0) * max_priority as f64).round() as i64
}
