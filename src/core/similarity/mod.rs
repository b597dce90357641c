//! # Similarity Module
//!
//! Pairwise agreement metrics between two equally shaped tiles.
//!
//! ## Preprocessing
//! 1. Multi-channel tiles are reduced to intensity with the luminance weights
//!    `0.2989, 0.5870, 0.1140`.
//! 2. Each tile is normalised independently so the metrics ignore global
//!    brightness and contrast differences between the two stains:
//!    - min-max rescaled to `[0, 1]` for SSIM and MSE
//!    - standardised to zero mean / unit variance for NCC and Pearson
//!
//! ## Metrics
//! | Metric  | Range     | Identical tiles |
//! |---------|-----------|-----------------|
//! | SSIM    | [-1, 1]   | 1               |
//! | MSE     | [0, inf)  | 0               |
//! | NCC     | [-1, 1]   | 1               |
//! | Pearson | [-1, 1]   | 1               |
//!
//! ## Degenerate tiles
//! A tile with no intensity variation, a tile smaller than the SSIM window,
//! mismatched shapes or a non-finite result all map to
//! [`MetricScores::DEGENERATE`] (`ssim = 0, mse = inf, ncc = 0, pearson = 0`)
//! so one unusable tile never aborts a batch.

mod ssim;

pub use ssim::{mean_ssim, DEFAULT_WINDOW};

use crate::core::pixels::PixelArray;
use crate::error::MetricError;
use serde::{Deserialize, Serialize};

/// Scores for one tile pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricScores {
    /// Structural similarity (higher is better, max 1.0)
    pub ssim: f64,
    /// Mean squared error after rescaling (lower is better)
    pub mse: f64,
    /// Normalized cross-correlation (higher is better, max 1.0)
    pub ncc: f64,
    /// Pearson correlation coefficient (higher is better, max 1.0)
    pub pearson: f64,
}

impl MetricScores {
    /// Scores reported when a metric cannot be computed
    pub const DEGENERATE: MetricScores = MetricScores {
        ssim: 0.0,
        mse: f64::INFINITY,
        ncc: 0.0,
        pearson: 0.0,
    };

    /// Average each metric over a batch
    pub fn mean(scores: &[MetricScores]) -> Option<MetricScores> {
        if scores.is_empty() {
            return None;
        }
        let n = scores.len() as f64;
        Some(MetricScores {
            ssim: scores.iter().map(|s| s.ssim).sum::<f64>() / n,
            mse: scores.iter().map(|s| s.mse).sum::<f64>() / n,
            ncc: scores.iter().map(|s| s.ncc).sum::<f64>() / n,
            pearson: scores.iter().map(|s| s.pearson).sum::<f64>() / n,
        })
    }
}

/// Result of scoring a tile pair
#[derive(Debug, Clone, PartialEq)]
pub enum ScoreOutcome {
    /// All metrics computed
    Computed(MetricScores),
    /// A metric was undefined; the degenerate scores stand in
    Degenerate { reason: MetricError },
}

impl ScoreOutcome {
    pub fn scores(&self) -> MetricScores {
        match self {
            ScoreOutcome::Computed(scores) => *scores,
            ScoreOutcome::Degenerate { .. } => MetricScores::DEGENERATE,
        }
    }

    pub fn is_degenerate(&self) -> bool {
        matches!(self, ScoreOutcome::Degenerate { .. })
    }
}

/// Computes the fixed metric battery between tiles
#[derive(Debug, Clone)]
pub struct SimilarityEngine {
    window: usize,
}

impl Default for SimilarityEngine {
    fn default() -> Self {
        Self {
            window: DEFAULT_WINDOW,
        }
    }
}

impl SimilarityEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a different (odd) SSIM window size
    pub fn with_window(mut self, window: usize) -> Self {
        self.window = window;
        self
    }

    /// Score a pair, substituting the degenerate scores on failure
    pub fn score(&self, a: &PixelArray, b: &PixelArray) -> MetricScores {
        self.evaluate(a, b).scores()
    }

    /// Score a pair, keeping the failure reason when degenerate
    pub fn evaluate(&self, a: &PixelArray, b: &PixelArray) -> ScoreOutcome {
        match self.try_score(a, b) {
            Ok(scores) => ScoreOutcome::Computed(scores),
            Err(reason) => {
                tracing::warn!(%reason, "Metric computation failed; using degenerate scores");
                ScoreOutcome::Degenerate { reason }
            }
        }
    }

    /// Score a pair, propagating the first numerical failure
    pub fn try_score(&self, a: &PixelArray, b: &PixelArray) -> Result<MetricScores, MetricError> {
        if (a.height(), a.width()) != (b.height(), b.width()) {
            return Err(MetricError::ShapeMismatch {
                a_height: a.height(),
                a_width: a.width(),
                b_height: b.height(),
                b_width: b.width(),
            });
        }

        let intensity_a = a.intensity();
        let intensity_b = b.intensity();

        let rescaled_a = rescale_intensity(&intensity_a)?;
        let rescaled_b = rescale_intensity(&intensity_b)?;
        let (low, high) = value_range(&rescaled_a);
        let ssim = mean_ssim(
            &rescaled_a,
            &rescaled_b,
            a.width(),
            a.height(),
            self.window,
            high - low,
        )?;
        let mse = finite("mse", mean_squared_error(&rescaled_a, &rescaled_b))?;

        let standard_a = standardize(&intensity_a)?;
        let standard_b = standardize(&intensity_b)?;
        let ncc = finite("ncc", normalized_cross_correlation(&standard_a, &standard_b)?)?;
        let pearson = finite("pearson", pearson_correlation(&standard_a, &standard_b)?)?;

        Ok(MetricScores {
            ssim,
            mse,
            ncc,
            pearson,
        })
    }
}

fn finite(metric: &'static str, value: f64) -> Result<f64, MetricError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(MetricError::NonFinite { metric })
    }
}

fn value_range(values: &[f64]) -> (f64, f64) {
    values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)))
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Rescale to `[0, 1]` by the observed range
pub fn rescale_intensity(values: &[f64]) -> Result<Vec<f64>, MetricError> {
    let (low, high) = value_range(values);
    let range = high - low;
    if !(range > 0.0) {
        return Err(MetricError::ZeroRange);
    }
    Ok(values.iter().map(|v| (v - low) / range).collect())
}

/// Zero mean, unit (population) variance
pub fn standardize(values: &[f64]) -> Result<Vec<f64>, MetricError> {
    if values.is_empty() {
        return Err(MetricError::ZeroVariance);
    }
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    let std_dev = variance.sqrt();
    if !(std_dev > 0.0) {
        return Err(MetricError::ZeroVariance);
    }
    Ok(values.iter().map(|v| (v - m) / std_dev).collect())
}

/// Mean of squared pixel differences
pub fn mean_squared_error(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum::<f64>() / a.len() as f64
}

/// Dot product of the zero-mean images over the product of their norms
pub fn normalized_cross_correlation(a: &[f64], b: &[f64]) -> Result<f64, MetricError> {
    let (mean_a, mean_b) = (mean(a), mean(b));
    let mut dot = 0.0;
    let mut norm_a = 0.0;
    let mut norm_b = 0.0;

    for (x, y) in a.iter().zip(b) {
        let (da, db) = (x - mean_a, y - mean_b);
        dot += da * db;
        norm_a += da * da;
        norm_b += db * db;
    }

    let denominator = norm_a.sqrt() * norm_b.sqrt();
    if !(denominator > 0.0) {
        return Err(MetricError::ZeroVariance);
    }
    Ok(dot / denominator)
}

/// Correlation coefficient of the flattened intensity vectors
pub fn pearson_correlation(a: &[f64], b: &[f64]) -> Result<f64, MetricError> {
    let n = a.len() as f64;
    let (mean_a, mean_b) = (mean(a), mean(b));

    let covariance = a
        .iter()
        .zip(b)
        .map(|(x, y)| (x - mean_a) * (y - mean_b))
        .sum::<f64>()
        / n;
    let std_a = (a.iter().map(|x| (x - mean_a).powi(2)).sum::<f64>() / n).sqrt();
    let std_b = (b.iter().map(|y| (y - mean_b).powi(2)).sum::<f64>() / n).sqrt();

    if !(std_a > 0.0 && std_b > 0.0) {
        return Err(MetricError::ZeroVariance);
    }
    Ok((covariance / (std_a * std_b)).clamp(-1.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn textured(size: usize, seed: usize) -> PixelArray {
        PixelArray::gray_from_fn(size, size, |y, x| ((x * 31 + y * 17 + seed * 7) % 97) as u8 * 2)
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn identical_tiles_score_perfectly() {
        let tile = textured(32, 0);
        let scores = SimilarityEngine::new().score(&tile, &tile);

        assert!(approx(scores.ssim, 1.0), "ssim {}", scores.ssim);
        assert_eq!(scores.mse, 0.0);
        assert!(approx(scores.ncc, 1.0), "ncc {}", scores.ncc);
        assert!(approx(scores.pearson, 1.0), "pearson {}", scores.pearson);
    }

    #[test]
    fn identical_rgb_tiles_score_perfectly() {
        let tile = PixelArray::rgb_from_fn(16, 16, |y, x| [(x * 13) as u8, (y * 9) as u8, 40]);
        let scores = SimilarityEngine::new().score(&tile, &tile);

        assert!(approx(scores.ssim, 1.0));
        assert_eq!(scores.mse, 0.0);
        assert!(approx(scores.ncc, 1.0));
    }

    #[test]
    fn correlation_metrics_are_symmetric() {
        let engine = SimilarityEngine::new();
        let a = textured(24, 1);
        let b = textured(24, 5);

        let ab = engine.score(&a, &b);
        let ba = engine.score(&b, &a);

        assert!(approx(ab.ncc, ba.ncc));
        assert!(approx(ab.pearson, ba.pearson));
        assert!(approx(ab.mse, ba.mse));
    }

    #[test]
    fn brightness_offset_does_not_change_scores() {
        let base = PixelArray::gray_from_fn(20, 20, |y, x| ((x * 5 + y * 3) % 60) as u8);
        let brighter = PixelArray::gray_from_fn(20, 20, |y, x| ((x * 5 + y * 3) % 60) as u8 * 2 + 50);

        let scores = SimilarityEngine::new().score(&base, &brighter);

        assert!(approx(scores.ncc, 1.0));
        assert!(approx(scores.pearson, 1.0));
        assert!(scores.mse < 1e-12);
    }

    #[test]
    fn inverted_tile_is_anticorrelated() {
        let a = textured(16, 0);
        let inverted = PixelArray::gray_from_fn(16, 16, |y, x| 255 - ((x * 31 + y * 17) % 97) as u8 * 2);

        let scores = SimilarityEngine::new().score(&a, &inverted);

        assert!(approx(scores.ncc, -1.0));
        assert!(approx(scores.pearson, -1.0));
        assert!(scores.ssim < 0.0);
    }

    #[test]
    fn constant_tile_yields_degenerate_defaults() {
        let flat = PixelArray::gray_from_fn(16, 16, |_, _| 128);
        let textured_tile = textured(16, 0);

        let engine = SimilarityEngine::new();
        let outcome = engine.evaluate(&flat, &textured_tile);

        assert_eq!(outcome, ScoreOutcome::Degenerate { reason: MetricError::ZeroRange });
        let scores = outcome.scores();
        assert_eq!(scores.ssim, 0.0);
        assert!(scores.mse.is_infinite());
        assert_eq!(scores.ncc, 0.0);
        assert_eq!(scores.pearson, 0.0);
    }

    #[test]
    fn mismatched_shapes_are_degenerate() {
        let a = textured(16, 0);
        let b = textured(12, 0);

        let engine = SimilarityEngine::new();
        assert!(matches!(engine.try_score(&a, &b), Err(MetricError::ShapeMismatch { .. })));
        assert_eq!(engine.score(&a, &b), MetricScores::DEGENERATE);
    }

    #[test]
    fn tile_smaller_than_window_is_degenerate() {
        let a = textured(4, 0);
        let outcome = SimilarityEngine::new().evaluate(&a, &a);
        assert!(outcome.is_degenerate());
    }

    #[test]
    fn rescale_maps_to_unit_range() {
        let rescaled = rescale_intensity(&[10.0, 20.0, 30.0]).unwrap();
        assert_eq!(rescaled, vec![0.0, 0.5, 1.0]);
    }

    #[test]
    fn standardize_rejects_constant_input() {
        assert_eq!(standardize(&[3.0, 3.0, 3.0]), Err(MetricError::ZeroVariance));
    }

    #[test]
    fn mean_of_scores_averages_each_metric() {
        let a = MetricScores { ssim: 0.2, mse: 1.0, ncc: 0.4, pearson: 0.6 };
        let b = MetricScores { ssim: 0.4, mse: 3.0, ncc: 0.0, pearson: 0.2 };

        let mean = MetricScores::mean(&[a, b]).unwrap();

        assert!(approx(mean.ssim, 0.3));
        assert!(approx(mean.mse, 2.0));
        assert!(approx(mean.ncc, 0.2));
        assert!(approx(mean.pearson, 0.4));
        assert!(MetricScores::mean(&[]).is_none());
    }
}
