//! Template similarity scoring.

use crate::types::FaceGrid;

/// Strategy for scoring a candidate grid against a stored template.
///
/// Higher = more similar. Implementations must be pure: identical inputs
/// always produce the identical score.
pub trait Similarity {
    fn score(&self, candidate: &FaceGrid, stored: &FaceGrid) -> f32;
}

/// Normalized cross-correlation (zero-mean, `TM_CCOEFF_NORMED` at the single
/// full-overlap offset).
#[derive(Debug, Clone, Copy, Default)]
pub struct NccScorer;

impl Similarity for NccScorer {
    fn score(&self, candidate: &FaceGrid, stored: &FaceGrid) -> f32 {
        normalized_cross_correlation(candidate.pixels(), stored.pixels())
    }
}

/// Correlation coefficient between two equally sized pixel buffers.
///
/// Returns a value in [-1, 1]. Returns 0.0 when either buffer has zero
/// variance, when the buffers are empty, or when their lengths differ.
pub fn normalized_cross_correlation(a: &[u8], b: &[u8]) -> f32 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }

    let n = a.len() as f64;
    let mean_a = a.iter().map(|&p| f64::from(p)).sum::<f64>() / n;
    let mean_b = b.iter().map(|&p| f64::from(p)).sum::<f64>() / n;

    let mut cross = 0.0f64;
    let mut var_a = 0.0f64;
    let mut var_b = 0.0f64;

    for (&pa, &pb) in a.iter().zip(b.iter()) {
        let da = f64::from(pa) - mean_a;
        let db = f64::from(pb) - mean_b;
        cross += da * db;
        var_a += da * da;
        var_b += db * db;
    }

    let denom = (var_a * var_b).sqrt();
    if !denom.is_finite() || denom <= f64::EPSILON {
        return 0.0;
    }

    (cross / denom).clamp(-1.0, 1.0) as f32
}
