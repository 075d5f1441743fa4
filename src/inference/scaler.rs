//! # Feature Scaling
//!
//! Affine per-feature standardization `(x - mean) / scale`, loaded from a
//! JSON artifact saved at training time. A missing or corrupt artifact falls
//! back to the identity scaler so the service can still run, and a dimension
//! mismatch at inference time falls back to the unscaled input.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// Per-feature standardization parameters.
///
/// Empty vectors mean the identity scaler: input passes through untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Scaler {
    pub mean: Vec<f32>,
    pub scale: Vec<f32>,
}

impl Scaler {
    /// The do-nothing scaler used when no artifact is available.
    pub fn identity() -> Self {
        Self::default()
    }

    /// True when this scaler passes input through unchanged.
    pub fn is_identity(&self) -> bool {
        self.mean.is_empty() && self.scale.is_empty()
    }

    /// Load the artifact, falling back to the identity scaler on failure.
    pub fn load_or_identity(path: &Path) -> Self {
        match Self::load(path) {
            Ok(scaler) => {
                info!(
                    path = %path.display(),
                    features = scaler.mean.len(),
                    "Loaded feature scaler"
                );
                scaler
            }
            Err(e) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "Could not load scaler, predictions will use unscaled features"
                );
                Self::identity()
            }
        }
    }

    fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let scaler: Scaler = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse {}", path.display()))?;

        if scaler.mean.len() != scaler.scale.len() {
            anyhow::bail!(
                "Scaler mean/scale length mismatch: {} vs {}",
                scaler.mean.len(),
                scaler.scale.len()
            );
        }
        Ok(scaler)
    }

    /// Standardize a feature vector. On a dimension mismatch the input is
    /// returned unscaled (with a warning) rather than failing the request.
    pub fn transform(&self, features: &[f32]) -> Vec<f32> {
        if self.is_identity() {
            return features.to_vec();
        }

        if self.mean.len() != features.len() {
            warn!(
                expected = self.mean.len(),
                actual = features.len(),
                "Scaler dimension mismatch, passing features through unscaled"
            );
            return features.to_vec();
        }

        features
            .iter()
            .zip(self.mean.iter().zip(&self.scale))
            .map(|(&x, (&m, &s))| if s != 0.0 { (x - m) / s } else { x - m })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_is_no_op() {
        let scaler = Scaler::identity();
        assert!(scaler.is_identity());
        let input = vec![1.0, -2.0, 3.5];
        assert_eq!(scaler.transform(&input), input);
    }

    #[test]
    fn test_transform() {
        let scaler = Scaler {
            mean: vec![1.0, 2.0],
            scale: vec![2.0, 4.0],
        };
        let out = scaler.transform(&[3.0, 10.0]);
        assert_eq!(out, vec![1.0, 2.0]);
    }

    #[test]
    fn test_zero_scale_guard() {
        let scaler = Scaler {
            mean: vec![1.0],
            scale: vec![0.0],
        };
        let out = scaler.transform(&[4.0]);
        assert_eq!(out, vec![3.0]);
    }

    #[test]
    fn test_dimension_mismatch_passes_through() {
        let scaler = Scaler {
            mean: vec![0.0, 0.0],
            scale: vec![1.0, 1.0],
        };
        let input = vec![1.0, 2.0, 3.0];
        assert_eq!(scaler.transform(&input), input);
    }

    #[test]
    fn test_missing_artifact_is_identity() {
        let scaler = Scaler::load_or_identity(Path::new("/nonexistent/scaler.json"));
        assert!(scaler.is_identity());
    }

    #[test]
    fn test_load_rejects_length_mismatch() {
        let dir = std::env::temp_dir().join("emotion-backend-scaler-test");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("bad_scaler.json");
        fs::write(&path, r#"{"mean": [1.0, 2.0], "scale": [1.0]}"#).unwrap();

        let scaler = Scaler::load_or_identity(&path);
        assert!(scaler.is_identity());

        fs::remove_file(&path).ok();
    }

    #[test]
    fn test_load_valid_artifact() {
        let dir = std::env::temp_dir().join("emotion-backend-scaler-test");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("scaler.json");
        fs::write(&path, r#"{"mean": [0.5], "scale": [2.0]}"#).unwrap();

        let scaler = Scaler::load_or_identity(&path);
        assert!(!scaler.is_identity());
        assert_eq!(scaler.transform(&[2.5]), vec![1.0]);

        fs::remove_file(&path).ok();
    }
}
