//! # Audio Processing Module
//!
//! Everything that turns client bytes into clean mono samples ready for
//! feature extraction.
//!
//! ## Key Components:
//! - **Decoder**: Container decode (wav/mp3/m4a/flac) and headerless PCM chunks
//! - **Preprocessor**: Sanitizing, resampling, mono down-mix, peak normalization
//! - **Session Manager**: Tracks active streaming connections and their limits
//!
//! ## Raw Chunk Format (streaming path):
//! - **Encoding**: Little-endian PCM, interpreted as i16, i32, or f32
//! - **Channels**: Mono
//! - **Sample Rate**: Assumed to already match the configured target rate

pub mod decoder;
pub mod preprocess;
pub mod session;

/// Decoded audio prior to preprocessing.
///
/// Samples are interleaved when `channels > 1`. Values are nominally in
/// [-1.0, 1.0] but may contain non-finite entries until the preprocessor
/// has sanitized them.
#[derive(Debug, Clone)]
pub struct Waveform {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl Waveform {
    /// Wrap already-mono samples at a known rate.
    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
            channels: 1,
        }
    }

    /// Number of frames (samples per channel).
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / self.channels as usize
        }
    }

    /// Duration in seconds.
    pub fn duration_secs(&self) -> f32 {
        if self.sample_rate == 0 {
            0.0
        } else {
            self.frames() as f32 / self.sample_rate as f32
        }
    }

    /// Split the interleaved samples into one vector per channel.
    pub fn deinterleave(&self) -> Vec<Vec<f32>> {
        let channels = self.channels.max(1) as usize;
        let frames = self.frames();
        let mut planes = vec![Vec::with_capacity(frames); channels];
        for (i, &sample) in self.samples.iter().enumerate() {
            planes[i % channels].push(sample);
        }
        planes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_waveform_frames_and_duration() {
        let wave = Waveform {
            samples: vec![0.0; 32000],
            sample_rate: 16000,
            channels: 2,
        };
        assert_eq!(wave.frames(), 16000);
        assert!((wave.duration_secs() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_deinterleave_stereo() {
        let wave = Waveform {
            samples: vec![0.1, -0.1, 0.2, -0.2],
            sample_rate: 16000,
            channels: 2,
        };
        let planes = wave.deinterleave();
        assert_eq!(planes.len(), 2);
        assert_eq!(planes[0], vec![0.1, 0.2]);
        assert_eq!(planes[1], vec![-0.1, -0.2]);
    }
}
