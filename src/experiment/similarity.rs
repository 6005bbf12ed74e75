//! Overlap-based similarity between two sets of active columns.

use fxhash::FxHashSet;

/// Returns `|A ∩ B| / max(|A|, |B|)`, or 0.0 if either set is empty.
///
/// Duplicate indices count once. The measure is symmetric and equals 1.0 exactly when both
/// non-empty sets contain the same columns.
pub fn similarity(current: &[usize], previous: &[usize]) -> f64 {
    let current: FxHashSet<usize> = current.iter().copied().collect();
    let previous: FxHashSet<usize> = previous.iter().copied().collect();

    if current.is_empty() || previous.is_empty() {
        return 0.0;
    }

    let shared = current.intersection(&previous).count();
    shared as f64 / current.len().max(previous.len()) as f64
}
