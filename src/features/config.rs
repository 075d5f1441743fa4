//! # Feature Extraction Parameters
//!
//! Side artifact saved alongside the model at training time. If the file is
//! missing or corrupt the hardcoded defaults are used so the service can
//! still start (degraded, and logged as such).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::warn;

/// Parameters the feature extractor was trained with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureConfig {
    /// Number of MFCC coefficients per frame
    pub n_mfcc: usize,
    /// Number of mel filterbank bands
    pub n_mels: usize,
    /// STFT hop length in samples
    pub hop_length: usize,
    /// STFT window size in samples
    pub n_fft: usize,
    /// Nominal clip duration in seconds
    pub duration: u32,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            n_mfcc: 13,
            n_mels: 128,
            hop_length: 512,
            n_fft: 2048,
            duration: 3,
        }
    }
}

impl FeatureConfig {
    /// Load the artifact, falling back to defaults on any failure.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "Could not load feature config, using defaults"
                );
                Self::default()
            }
        }
    }

    fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(config)
    }

    /// Persist the parameters next to the model artifacts.
    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = serde_json::to_string_pretty(self)?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    /// Length of the statistical feature vector produced with these
    /// parameters: mean and variance of n_mfcc MFCCs, 12 chroma bins, and
    /// four spectral scalars (centroid, rolloff, ZCR, bandwidth).
    pub fn feature_vector_len(&self) -> usize {
        2 * self.n_mfcc + 2 * 12 + 8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = FeatureConfig::default();
        assert_eq!(config.n_mfcc, 13);
        assert_eq!(config.n_mels, 128);
        assert_eq!(config.hop_length, 512);
        assert_eq!(config.n_fft, 2048);
        assert_eq!(config.duration, 3);
    }

    #[test]
    fn test_feature_vector_len() {
        let config = FeatureConfig::default();
        // 13 MFCC means + 13 vars + 12 chroma means + 12 vars + 8 scalars
        assert_eq!(config.feature_vector_len(), 58);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = FeatureConfig::load_or_default(Path::new("/nonexistent/feature_config.json"));
        assert_eq!(config, FeatureConfig::default());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = std::env::temp_dir().join("emotion-backend-feature-config-test");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("feature_config.json");

        let config = FeatureConfig {
            n_mfcc: 20,
            n_mels: 64,
            hop_length: 256,
            n_fft: 1024,
            duration: 5,
        };
        config.save(&path).unwrap();

        let loaded = FeatureConfig::load_or_default(&path);
        assert_eq!(loaded, config);

        fs::remove_file(&path).ok();
    }

    #[test]
    fn test_corrupt_file_uses_defaults() {
        let dir = std::env::temp_dir().join("emotion-backend-feature-config-test");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("corrupt.json");
        fs::write(&path, "{not valid json").unwrap();

        let config = FeatureConfig::load_or_default(&path);
        assert_eq!(config, FeatureConfig::default());

        fs::remove_file(&path).ok();
    }
}
