//! # Model Output Decoding
//!
//! Turns the raw output rows of the classifier into a `PredictionResult`.
//!
//! ## Decoding Steps:
//! 1. Take the first row of the batch
//! 2. Apply softmax when the row does not already sum to 1 within 10%
//! 3. Pad with zeros or truncate to the label count on a length mismatch,
//!    with a warning. The padded/truncated row is deliberately NOT
//!    renormalized; downstream consumers rely on this exact behavior.
//! 4. Argmax over the row picks the label and confidence
//!
//! Any failure yields the fixed neutral fallback rather than an error.

use crate::inference::model::uniform_distribution;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

/// Relative tolerance for treating a row as already-normalized probabilities.
const PROB_SUM_RTOL: f32 = 0.1;

/// Label and confidence for the fallback result.
const FALLBACK_LABEL: &str = "neutral";
const FALLBACK_CONFIDENCE: f32 = 0.5;

/// One classification outcome, as served to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionResult {
    /// Winning emotion label
    pub label: String,
    /// Probability assigned to the winning label
    pub confidence: f32,
    /// Probability per label, keyed by label name
    pub class_probs: BTreeMap<String, f32>,
}

impl PredictionResult {
    /// The fixed result served when anything in scoring or decoding fails:
    /// neutral at 0.5 confidence over a uniform distribution.
    pub fn fallback(labels: &[String]) -> Self {
        Self {
            label: FALLBACK_LABEL.to_string(),
            confidence: FALLBACK_CONFIDENCE,
            class_probs: uniform_distribution(labels),
        }
    }
}

/// Decode raw model output rows against the configured label set.
pub fn decode_output(rows: &[Vec<f32>], labels: &[String]) -> Result<PredictionResult> {
    let row = rows
        .first()
        .filter(|r| !r.is_empty())
        .ok_or_else(|| anyhow::anyhow!("Model produced no output"))?;

    if labels.is_empty() {
        anyhow::bail!("No labels configured");
    }

    let sum: f32 = row.iter().sum();
    let mut probs = if (sum - 1.0).abs() > PROB_SUM_RTOL {
        softmax(row)
    } else {
        row.clone()
    };

    if probs.len() != labels.len() {
        warn!(
            outputs = probs.len(),
            labels = labels.len(),
            "Model output length does not match label count, padding/truncating"
        );
        probs.resize(labels.len(), 0.0);
    }

    let (best_idx, best_prob) = probs
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .ok_or_else(|| anyhow::anyhow!("Empty probability row"))?;

    let class_probs: BTreeMap<String, f32> = labels
        .iter()
        .cloned()
        .zip(probs.iter().copied())
        .collect();

    Ok(PredictionResult {
        label: labels[best_idx].clone(),
        confidence: *best_prob,
        class_probs,
    })
}

/// Numerically stable softmax (max subtracted before exponentiation).
fn softmax(values: &[f32]) -> Vec<f32> {
    let max = values.iter().fold(f32::NEG_INFINITY, |a, &b| a.max(b));
    let exps: Vec<f32> = values.iter().map(|v| (v - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.iter().map(|e| e / sum).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels() -> Vec<String> {
        ["neutral", "happy", "sad", "angry", "fear", "surprise"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    #[test]
    fn test_normalized_row_passes_through() {
        let rows = vec![vec![0.1, 0.6, 0.1, 0.1, 0.05, 0.05]];
        let result = decode_output(&rows, &labels()).unwrap();
        assert_eq!(result.label, "happy");
        assert!((result.confidence - 0.6).abs() < 1e-6);
        assert_eq!(result.class_probs.len(), 6);
    }

    #[test]
    fn test_logits_are_softmaxed() {
        let rows = vec![vec![1.0, 5.0, 2.0, 0.5, 0.0, -1.0]];
        let result = decode_output(&rows, &labels()).unwrap();
        // Softmax preserves the argmax
        assert_eq!(result.label, "happy");
        let sum: f32 = result.class_probs.values().sum();
        assert!((sum - 1.0).abs() < 1e-5);
        assert!(result
            .class_probs
            .values()
            .all(|&p| (0.0..=1.0).contains(&p)));
    }

    #[test]
    fn test_confidence_is_max_prob() {
        let rows = vec![vec![2.0, -1.0, 0.5, 0.0, 1.0, -2.0]];
        let result = decode_output(&rows, &labels()).unwrap();
        let max = result
            .class_probs
            .values()
            .fold(f32::NEG_INFINITY, |a, &b| a.max(b));
        assert!((result.confidence - max).abs() < 1e-6);
    }

    #[test]
    fn test_short_row_padded_to_label_count() {
        // Normalized 3-class output against 6 labels: padded with zeros,
        // not renormalized
        let rows = vec![vec![0.2, 0.7, 0.1]];
        let result = decode_output(&rows, &labels()).unwrap();
        assert_eq!(result.class_probs.len(), 6);
        assert_eq!(result.label, "happy");
        assert_eq!(result.class_probs["angry"], 0.0);
        let sum: f32 = result.class_probs.values().sum();
        assert!((sum - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_long_row_truncated_to_label_count() {
        let rows = vec![vec![0.1, 0.2, 0.3, 0.1, 0.1, 0.1, 0.05, 0.05]];
        let result = decode_output(&rows, &labels()).unwrap();
        assert_eq!(result.class_probs.len(), 6);
        assert_eq!(result.label, "sad");
    }

    #[test]
    fn test_empty_batch_is_error() {
        assert!(decode_output(&[], &labels()).is_err());
        assert!(decode_output(&[vec![]], &labels()).is_err());
    }

    #[test]
    fn test_fallback_shape() {
        let result = PredictionResult::fallback(&labels());
        assert_eq!(result.label, "neutral");
        assert!((result.confidence - 0.5).abs() < 1e-6);
        assert_eq!(result.class_probs.len(), 6);
        for p in result.class_probs.values() {
            assert!((p - 1.0 / 6.0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_result_serialization() {
        let result = PredictionResult::fallback(&labels());
        let json = serde_json::to_string(&result).unwrap();
        assert!(json.contains("\"label\":\"neutral\""));
        assert!(json.contains("class_probs"));

        let back: PredictionResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back.label, result.label);
    }
}
