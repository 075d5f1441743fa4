//! # Configuration Management
//!
//! Loads application configuration from multiple sources:
//! - TOML configuration files (config.toml)
//! - Environment variables (with APP_ prefix)
//! - Default values (built into the code)
//!
//! ## Configuration Priority (highest to lowest):
//! 1. Plain deployment variables (HOST, PORT, MODEL_PATH, ...)
//! 2. Environment variables (APP_SERVER_HOST, APP_SERVER_PORT, etc.)
//! 3. Configuration file (config.toml)
//! 4. Default values (defined in the Default impl)

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;

/// Main application configuration that contains all settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub model: ModelConfig,
    pub audio: AudioConfig,
    pub limits: LimitsConfig,
}

/// Server-specific configuration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Model artifact locations and the label set the classifier predicts over.
///
/// The order of `emotion_labels` defines the index-to-label mapping used when
/// decoding model output, so it must match the order the model was trained with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub model_path: String,
    pub scaler_path: String,
    pub feature_config_path: String,
    pub emotion_labels: Vec<String>,
}

/// Audio processing settings shared by the file and streaming paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Target sample rate everything is resampled to before feature extraction
    pub sample_rate: u32,
    /// Nominal duration of one streaming chunk in seconds
    pub chunk_duration_secs: u32,
    /// STFT hop length in samples
    pub hop_length: usize,
    /// STFT window size in samples
    pub n_fft: usize,
}

impl AudioConfig {
    /// Samples in one nominal streaming chunk at the configured rate.
    pub fn nominal_chunk_samples(&self) -> usize {
        self.sample_rate as usize * self.chunk_duration_secs as usize
    }
}

/// Request and connection limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum accepted upload size in bytes
    pub max_file_size_bytes: usize,
    /// Lowercase file extensions accepted by the upload endpoint
    pub allowed_extensions: Vec<String>,
    /// Maximum number of concurrent streaming connections
    pub max_streaming_connections: usize,
    /// Streaming connections idle longer than this are closed
    pub streaming_idle_timeout_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8000,
            },
            model: ModelConfig {
                model_path: "models/emotion_model.safetensors".to_string(),
                scaler_path: "models/scaler.json".to_string(),
                feature_config_path: "models/feature_config.json".to_string(),
                emotion_labels: vec![
                    "neutral".to_string(),
                    "happy".to_string(),
                    "sad".to_string(),
                    "angry".to_string(),
                    "fear".to_string(),
                    "surprise".to_string(),
                ],
            },
            audio: AudioConfig {
                sample_rate: 22050,
                chunk_duration_secs: 3,
                hop_length: 512,
                n_fft: 2048,
            },
            limits: LimitsConfig {
                max_file_size_bytes: 10 * 1024 * 1024,
                allowed_extensions: vec![
                    "wav".to_string(),
                    "mp3".to_string(),
                    "m4a".to_string(),
                    "flac".to_string(),
                ],
                max_streaming_connections: 100,
                streaming_idle_timeout_secs: 300,
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, config.toml, and environment variables.
    ///
    /// Plain `HOST`, `PORT`, `MODEL_PATH`, `SCALER_PATH`, `FEATURE_CONFIG_PATH`,
    /// `SAMPLE_RATE` and `MAX_FILE_SIZE` variables are honored last so that
    /// deployment platforms that inject them win over everything else.
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("_"));

        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }
        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }
        if let Ok(path) = env::var("MODEL_PATH") {
            settings = settings.set_override("model.model_path", path)?;
        }
        if let Ok(path) = env::var("SCALER_PATH") {
            settings = settings.set_override("model.scaler_path", path)?;
        }
        if let Ok(path) = env::var("FEATURE_CONFIG_PATH") {
            settings = settings.set_override("model.feature_config_path", path)?;
        }
        if let Ok(rate) = env::var("SAMPLE_RATE") {
            settings = settings.set_override("audio.sample_rate", rate)?;
        }
        if let Ok(size) = env::var("MAX_FILE_SIZE") {
            settings = settings.set_override("limits.max_file_size_bytes", size)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.model.emotion_labels.is_empty() {
            return Err(anyhow::anyhow!("Emotion label list cannot be empty"));
        }

        if self.audio.sample_rate == 0 {
            return Err(anyhow::anyhow!("Sample rate must be greater than 0"));
        }

        if self.audio.n_fft == 0 || self.audio.hop_length == 0 {
            return Err(anyhow::anyhow!(
                "FFT size and hop length must be greater than 0"
            ));
        }

        if self.audio.hop_length > self.audio.n_fft {
            return Err(anyhow::anyhow!(
                "Hop length ({}) cannot exceed FFT size ({})",
                self.audio.hop_length,
                self.audio.n_fft
            ));
        }

        if self.limits.max_file_size_bytes == 0 {
            return Err(anyhow::anyhow!("Max file size must be greater than 0"));
        }

        if self.limits.allowed_extensions.is_empty() {
            return Err(anyhow::anyhow!("Allowed extension list cannot be empty"));
        }

        if self.limits.max_streaming_connections == 0 {
            return Err(anyhow::anyhow!(
                "Max streaming connections must be greater than 0"
            ));
        }

        Ok(())
    }

    /// Upload size limit expressed in whole megabytes, for error messages.
    pub fn max_file_size_mb(&self) -> usize {
        self.limits.max_file_size_bytes / (1024 * 1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.audio.sample_rate, 22050);
        assert_eq!(config.model.emotion_labels.len(), 6);
        assert_eq!(config.model.emotion_labels[0], "neutral");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_rejects_zero_port() {
        let mut config = AppConfig::default();
        config.server.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_rejects_empty_labels() {
        let mut config = AppConfig::default();
        config.model.emotion_labels.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_rejects_bad_hop() {
        let mut config = AppConfig::default();
        config.audio.hop_length = config.audio.n_fft + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_nominal_chunk_samples() {
        let config = AppConfig::default();
        // 3 seconds at 22050 Hz
        assert_eq!(config.audio.nominal_chunk_samples(), 66150);
    }

    #[test]
    fn test_max_file_size_mb() {
        let config = AppConfig::default();
        assert_eq!(config.max_file_size_mb(), 10);
    }
}
