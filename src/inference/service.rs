//! # Prediction Service
//!
//! The facade the HTTP and WebSocket layers call into. Owns every pipeline
//! stage (preprocessor, feature extractor, scaler, model) plus the
//! extraction mode decided once at startup. All state is immutable after
//! construction, so the service is shared via `Arc` with no locking around
//! inference.

use crate::audio::preprocess::Preprocessor;
use crate::audio::Waveform;
use crate::config::AppConfig;
use crate::features::{ExtractionMode, FeatureConfig, FeatureExtractor};
use crate::inference::decoder::{decode_output, PredictionResult};
use crate::inference::model::EmotionModel;
use crate::inference::scaler::Scaler;
use anyhow::Result;
use std::path::Path;
use tracing::{debug, error, info};

/// End-to-end prediction pipeline with degrade-don't-die artifact loading.
pub struct PredictionService {
    model: EmotionModel,
    scaler: Scaler,
    extractor: FeatureExtractor,
    preprocessor: Preprocessor,
    mode: ExtractionMode,
    labels: Vec<String>,
}

impl PredictionService {
    /// Load all artifacts and fix the extraction mode. Never fails: missing
    /// artifacts degrade to the stub model, identity scaler, or default
    /// feature parameters, each one logged.
    pub fn initialize(config: &AppConfig) -> Self {
        let labels = config.model.emotion_labels.clone();

        let model = EmotionModel::load_or_stub(Path::new(&config.model.model_path), labels.len());
        let scaler = Scaler::load_or_identity(Path::new(&config.model.scaler_path));
        let feature_config =
            FeatureConfig::load_or_default(Path::new(&config.model.feature_config_path));

        let extractor = FeatureExtractor::new(config.audio.sample_rate, feature_config);
        let preprocessor = Preprocessor::new(config.audio.sample_rate);
        let mode = ExtractionMode::from_input_dim(model.input_dim());

        info!(
            model = model.kind(),
            scaler = if scaler.is_identity() { "identity" } else { "loaded" },
            mode = mode.as_str(),
            labels = labels.len(),
            "Prediction service initialized"
        );

        Self {
            model,
            scaler,
            extractor,
            preprocessor,
            mode,
            labels,
        }
    }

    /// Run the full pipeline on decoded audio. Pipeline failures never
    /// surface to the caller; they produce the fixed neutral fallback.
    pub fn predict_waveform(&self, waveform: Waveform) -> PredictionResult {
        match self.try_predict(waveform) {
            Ok(result) => result,
            Err(e) => {
                error!(error = %e, "Prediction failed, serving fallback result");
                PredictionResult::fallback(&self.labels)
            }
        }
    }

    /// Run the pipeline on already-mono samples from the streaming path.
    /// Chunks are assumed to arrive at the given rate.
    pub fn predict_samples(&self, samples: Vec<f32>, sample_rate: u32) -> PredictionResult {
        self.predict_waveform(Waveform::mono(samples, sample_rate))
    }

    fn try_predict(&self, waveform: Waveform) -> Result<PredictionResult> {
        debug!(
            duration_secs = waveform.duration_secs(),
            sample_rate = waveform.sample_rate,
            channels = waveform.channels,
            "Running prediction pipeline"
        );
        let samples = self.preprocessor.process(waveform)?;

        let features = match self.mode {
            ExtractionMode::Statistical => self.extractor.extract(&samples),
            ExtractionMode::RawWaveform { expected_len } => {
                FeatureExtractor::pad_or_truncate(&samples, expected_len)
            }
        };

        let scaled = self.scaler.transform(&features);
        let rows = self.model.predict(&scaled)?;
        decode_output(&rows, &self.labels)
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn extraction_mode(&self) -> ExtractionMode {
        self.mode
    }

    pub fn is_stub_model(&self) -> bool {
        self.model.is_stub()
    }

    pub fn model_kind(&self) -> &'static str {
        self.model.kind()
    }

    pub fn scaler_loaded(&self) -> bool {
        !self.scaler.is_identity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    /// Service built from default config: no artifacts on disk, so it runs
    /// with the stub model, identity scaler, and default feature parameters.
    fn degraded_service() -> PredictionService {
        let mut config = AppConfig::default();
        config.model.model_path = "/nonexistent/model.safetensors".to_string();
        config.model.scaler_path = "/nonexistent/scaler.json".to_string();
        config.model.feature_config_path = "/nonexistent/feature_config.json".to_string();
        PredictionService::initialize(&config)
    }

    fn sine(freq: f32, sample_rate: u32, frames: usize) -> Vec<f32> {
        (0..frames)
            .map(|i| {
                let t = i as f32 / sample_rate as f32;
                (t * freq * 2.0 * std::f32::consts::PI).sin()
            })
            .collect()
    }

    #[test]
    fn test_degraded_service_still_predicts() {
        let service = degraded_service();
        assert!(service.is_stub_model());
        assert!(!service.scaler_loaded());
        assert_eq!(service.extraction_mode(), ExtractionMode::Statistical);

        let result = service.predict_samples(sine(440.0, 22050, 22050), 22050);
        assert_eq!(result.class_probs.len(), 6);
        let sum: f32 = result.class_probs.values().sum();
        assert!((sum - 1.0).abs() < 1e-4);
        assert!(result.class_probs.contains_key(&result.label));
    }

    #[test]
    fn test_empty_audio_still_predicts() {
        let service = degraded_service();
        let result = service.predict_samples(vec![], 22050);
        assert_eq!(result.class_probs.len(), 6);
    }

    #[test]
    fn test_non_finite_audio_still_predicts() {
        let service = degraded_service();
        let result = service.predict_samples(vec![f32::NAN; 512], 22050);
        assert_eq!(result.class_probs.len(), 6);
        assert!(result.confidence.is_finite());
    }

    #[test]
    fn test_confidence_in_unit_interval() {
        let service = degraded_service();
        let result = service.predict_samples(sine(200.0, 22050, 11025), 22050);
        assert!((0.0..=1.0).contains(&result.confidence));
    }
}
