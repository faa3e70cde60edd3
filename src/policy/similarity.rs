//! Cosine similarity over embedding vectors.
//!
//! All arithmetic accumulates in f64 so ranking does not wobble with summation order
//! on long f32 vectors.

use crate::error::{Error, Result};

pub fn dot(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| f64::from(*x) * f64::from(*y))
        .sum()
}

pub fn magnitude(v: &[f32]) -> f64 {
    v.iter().map(|x| f64::from(*x) * f64::from(*x)).sum::<f64>().sqrt()
}

/// `dot(a, b) / (|a| * |b|)`.
///
/// Fails with [`Error::Validation`] when the lengths differ or either vector has zero
/// magnitude, since the similarity is undefined there.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f64> {
    check_dimensions(a.len(), b.len())?;
    let norm_a = nonzero_magnitude(a, "first")?;
    let norm_b = nonzero_magnitude(b, "second")?;
    Ok(clamp(dot(a, b) / (norm_a * norm_b)))
}

/// Cosine similarity with both norms already known and nonzero.
pub(crate) fn cosine_with_norms(a: &[f32], norm_a: f64, b: &[f32], norm_b: f64) -> f64 {
    clamp(dot(a, b) / (norm_a * norm_b))
}

pub(crate) fn check_dimensions(expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(Error::Validation(format!(
            "dimension mismatch: expected {expected}, got {actual}"
        )));
    }
    Ok(())
}

pub(crate) fn nonzero_magnitude(v: &[f32], which: &str) -> Result<f64> {
    let norm = magnitude(v);
    if norm == 0.0 {
        return Err(Error::Validation(format!(
            "{which} vector has zero magnitude; cosine similarity is undefined"
        )));
    }
    Ok(norm)
}

// Rounding can push parallel vectors a hair past 1.0. Adding +0.0 folds -0.0 into
// +0.0 so orthogonal scores compare equal under `total_cmp`.
fn clamp(score: f64) -> f64 {
    score.clamp(-1.0, 1.0) + 0.0
}
