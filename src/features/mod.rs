//! # Feature Extraction Module
//!
//! Turns preprocessed mono audio into the fixed-length vector the classifier
//! consumes. Two modes exist, decided once at startup from the model's
//! declared input width:
//!
//! - **Statistical**: MFCC, spectral, and chroma statistics (the normal case)
//! - **RawWaveform**: the waveform itself, padded or truncated to the model's
//!   input width (for models trained directly on samples)

pub mod config;
pub mod extractor;

pub use config::FeatureConfig;
pub use extractor::FeatureExtractor;

/// Input width above which a model is assumed to consume raw samples rather
/// than a statistics vector.
const RAW_INPUT_THRESHOLD: usize = 1000;

/// How audio is converted into model input. Chosen once at startup and fixed
/// for the process lifetime.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ExtractionMode {
    /// Statistical feature vector (MFCC, spectral, chroma aggregates)
    Statistical,
    /// Raw waveform padded or truncated to the model's input width
    RawWaveform { expected_len: usize },
}

impl ExtractionMode {
    /// Decide the mode from the model's input width. Models without a
    /// declared width (the stub) use statistical features.
    pub fn from_input_dim(input_dim: Option<usize>) -> Self {
        match input_dim {
            Some(dim) if dim > RAW_INPUT_THRESHOLD => {
                ExtractionMode::RawWaveform { expected_len: dim }
            }
            _ => ExtractionMode::Statistical,
        }
    }

    /// Human-readable name, used by the health endpoint.
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionMode::Statistical => "statistical",
            ExtractionMode::RawWaveform { .. } => "raw_waveform",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_from_small_input_dim() {
        assert_eq!(
            ExtractionMode::from_input_dim(Some(58)),
            ExtractionMode::Statistical
        );
    }

    #[test]
    fn test_mode_from_large_input_dim() {
        assert_eq!(
            ExtractionMode::from_input_dim(Some(66150)),
            ExtractionMode::RawWaveform {
                expected_len: 66150
            }
        );
    }

    #[test]
    fn test_mode_from_unknown_input_dim() {
        assert_eq!(
            ExtractionMode::from_input_dim(None),
            ExtractionMode::Statistical
        );
    }

    #[test]
    fn test_threshold_is_exclusive() {
        assert_eq!(
            ExtractionMode::from_input_dim(Some(1000)),
            ExtractionMode::Statistical
        );
        assert_eq!(
            ExtractionMode::from_input_dim(Some(1001)),
            ExtractionMode::RawWaveform {
                expected_len: 1001
            }
        );
    }
}
