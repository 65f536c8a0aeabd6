use std::cmp::Reverse;

use ndarray::{Array1, ArrayView1};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::diagnosis::{ClassScore, Diagnosis, Status};
use crate::error::{DiagnosisError, Result};
use crate::mapping::ClassLabels;

pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.6;

/// What the model's output row holds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputKind {
    /// Probabilities when every value lies in `[0, 1]`, logits otherwise.
    #[default]
    Auto,
    Probabilities,
    Logits,
}

/// Applies softmax to a 1D array (slice) and returns a new Array1<f32>.
pub fn softmax(slice: ArrayView1<f32>) -> Array1<f32> {
    let slice = slice.mapv(|x| if x.is_nan() { f32::NEG_INFINITY } else { x.min(f32::MAX) });
    let max_val = slice.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let exp_vals: Array1<f32> = slice.mapv(|x| (x - max_val).exp());
    let sum_exp: f32 = exp_vals.sum();
    exp_vals.mapv(|v| v / sum_exp)
}

/// Index and value of the largest element; ties keep the lowest index.
pub fn argmax_and_max(probs: &Array1<f32>) -> (usize, f32) {
    probs
        .iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |(max_idx, max_val), (i, &val)| {
            if val > max_val { (i, val) } else { (max_idx, max_val) }
        })
}

/// Rounding slack allowed when `Auto` decides a row is already a distribution.
const PROBABILITY_TOLERANCE: f32 = 1e-4;

/// Converts one output row into per-class confidences within `[0, 1]`.
pub fn to_probabilities(row: ArrayView1<f32>, kind: OutputKind) -> Array1<f32> {
    let is_probability = |x: &f32| (-PROBABILITY_TOLERANCE..=1.0 + PROBABILITY_TOLERANCE).contains(x);
    let probs = match kind {
        OutputKind::Logits => softmax(row),
        OutputKind::Probabilities => row.to_owned(),
        OutputKind::Auto if row.iter().all(is_probability) => row.to_owned(),
        OutputKind::Auto => softmax(row),
    };
    probs.mapv(|p| if p.is_nan() { 0.0 } else { p.clamp(0.0, 1.0) })
}

/// Thresholds the top class and maps it to its label.
pub fn gate(probs: &Array1<f32>, threshold: f32, labels: &ClassLabels) -> Result<Diagnosis> {
    if probs.len() != labels.len() {
        return Err(DiagnosisError::ClassCountMismatch {
            expected: labels.len(),
            actual: probs.len(),
        });
    }

    let (idx, confidence) = argmax_and_max(probs);
    let confidence = if confidence.is_finite() { confidence.clamp(0.0, 1.0) } else { 0.0 };
    if confidence < threshold {
        return Ok(Diagnosis::uncertain(confidence));
    }

    let label = labels
        .get(idx)
        .ok_or(DiagnosisError::ClassCountMismatch { expected: labels.len(), actual: idx + 1 })?;

    let mut scores: Vec<ClassScore> = labels
        .iter()
        .zip(probs.iter())
        .map(|(label, &confidence)| ClassScore {
            label: label.to_string(),
            confidence,
        })
        .collect();
    scores.sort_by_key(|s| Reverse(OrderedFloat(s.confidence)));

    Ok(Diagnosis {
        status: Status::Confident,
        prediction: Some(label.to_string()),
        class_index: Some(idx),
        confidence,
        scores,
        gradcam: None,
    })
}
