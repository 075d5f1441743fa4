//! # Statistical Feature Extraction
//!
//! Computes the classifier's input vector from preprocessed mono audio:
//! per-frame MFCCs, spectral centroid, rolloff, bandwidth, zero-crossing
//! rate, and a 12-bin chroma, each reduced to its temporal mean and variance.
//!
//! ## Output Layout (fixed, matches training):
//! ```text
//! [mfcc_mean(n_mfcc), mfcc_var(n_mfcc),
//!  centroid_mean, centroid_var,
//!  rolloff_mean, rolloff_var,
//!  zcr_mean, zcr_var,
//!  chroma_mean(12), chroma_var(12),
//!  bandwidth_mean, bandwidth_var]
//! ```

use crate::features::FeatureConfig;
use ndarray::{Array1, Array2};
use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::sync::Arc;

/// Number of chroma pitch classes.
const CHROMA_BINS: usize = 12;

/// Floor applied before taking logs of mel energies.
const LOG_FLOOR: f32 = 1e-10;

/// Fraction of spectral energy below the rolloff frequency.
const ROLLOFF_FRACTION: f32 = 0.85;

/// Computes statistical audio features with a fixed FFT plan and mel
/// filterbank, both built once at construction.
pub struct FeatureExtractor {
    sample_rate: u32,
    config: FeatureConfig,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    mel_filters: Array2<f32>,
    bin_freqs: Vec<f32>,
}

impl FeatureExtractor {
    pub fn new(sample_rate: u32, config: FeatureConfig) -> Self {
        let n_fft = config.n_fft;
        let fft = FftPlanner::new().plan_fft_forward(n_fft);
        let window = hann_window(n_fft);
        let mel_filters = create_mel_filterbank(config.n_mels, n_fft, sample_rate);
        let bin_freqs = (0..n_fft / 2 + 1)
            .map(|k| k as f32 * sample_rate as f32 / n_fft as f32)
            .collect();

        Self {
            sample_rate,
            config,
            fft,
            window,
            mel_filters,
            bin_freqs,
        }
    }

    pub fn config(&self) -> &FeatureConfig {
        &self.config
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Length of the vector `extract` produces.
    pub fn output_len(&self) -> usize {
        self.config.feature_vector_len()
    }

    /// Compute the full statistical feature vector.
    pub fn extract(&self, samples: &[f32]) -> Vec<f32> {
        let spectrogram = self.compute_stft(samples);
        let n_frames = spectrogram.len();

        let mut mfccs: Vec<Vec<f32>> = Vec::with_capacity(n_frames);
        let mut centroids = Vec::with_capacity(n_frames);
        let mut rolloffs = Vec::with_capacity(n_frames);
        let mut bandwidths = Vec::with_capacity(n_frames);
        let mut chromas: Vec<[f32; CHROMA_BINS]> = Vec::with_capacity(n_frames);

        for magnitudes in &spectrogram {
            mfccs.push(self.mfcc_frame(magnitudes));
            let centroid = self.spectral_centroid(magnitudes);
            centroids.push(centroid);
            rolloffs.push(self.spectral_rolloff(magnitudes));
            bandwidths.push(self.spectral_bandwidth(magnitudes, centroid));
            chromas.push(self.chroma_frame(magnitudes));
        }

        let zcrs = self.zero_crossing_rates(samples);

        // Aggregate each family over time and concatenate in the layout the
        // model was trained with.
        let mut features = Vec::with_capacity(self.output_len());

        let (mfcc_means, mfcc_vars) = mean_var_columns(&mfccs, self.config.n_mfcc);
        features.extend_from_slice(&mfcc_means);
        features.extend_from_slice(&mfcc_vars);

        let (c_mean, c_var) = mean_var(&centroids);
        features.push(c_mean);
        features.push(c_var);

        let (r_mean, r_var) = mean_var(&rolloffs);
        features.push(r_mean);
        features.push(r_var);

        let (z_mean, z_var) = mean_var(&zcrs);
        features.push(z_mean);
        features.push(z_var);

        let chroma_rows: Vec<Vec<f32>> = chromas.iter().map(|c| c.to_vec()).collect();
        let (chroma_means, chroma_vars) = mean_var_columns(&chroma_rows, CHROMA_BINS);
        features.extend_from_slice(&chroma_means);
        features.extend_from_slice(&chroma_vars);

        let (b_mean, b_var) = mean_var(&bandwidths);
        features.push(b_mean);
        features.push(b_var);

        features
    }

    /// Pad with trailing zeros or truncate to exactly `len` samples, for
    /// models that consume the waveform directly.
    pub fn pad_or_truncate(samples: &[f32], len: usize) -> Vec<f32> {
        let mut out = Vec::with_capacity(len);
        out.extend_from_slice(&samples[..samples.len().min(len)]);
        out.resize(len, 0.0);
        out
    }

    /// Hann-windowed magnitude spectrogram, one row per frame.
    ///
    /// Input shorter than one window is zero-padded so there is always at
    /// least one frame.
    fn compute_stft(&self, samples: &[f32]) -> Vec<Vec<f32>> {
        let n_fft = self.config.n_fft;
        let hop = self.config.hop_length;
        let n_bins = n_fft / 2 + 1;

        let padded;
        let samples = if samples.len() < n_fft {
            let mut buf = samples.to_vec();
            buf.resize(n_fft, 0.0);
            padded = buf;
            &padded[..]
        } else {
            samples
        };

        let n_frames = 1 + (samples.len() - n_fft) / hop;
        let mut spectrogram = Vec::with_capacity(n_frames);
        let mut buffer = vec![Complex::new(0.0f32, 0.0); n_fft];
        let mut scratch = vec![Complex::new(0.0f32, 0.0); self.fft.get_inplace_scratch_len()];

        for frame in 0..n_frames {
            let start = frame * hop;
            for (i, slot) in buffer.iter_mut().enumerate() {
                *slot = Complex::new(samples[start + i] * self.window[i], 0.0);
            }

            self.fft.process_with_scratch(&mut buffer, &mut scratch);

            let magnitudes: Vec<f32> = buffer[..n_bins]
                .iter()
                .map(|c| (c.re * c.re + c.im * c.im).sqrt())
                .collect();
            spectrogram.push(magnitudes);
        }

        spectrogram
    }

    /// MFCCs for one frame: power spectrum -> mel filterbank -> log -> DCT-II.
    fn mfcc_frame(&self, magnitudes: &[f32]) -> Vec<f32> {
        let power: Array1<f32> = magnitudes.iter().map(|m| m * m).collect();
        let mel_energies = self.mel_filters.dot(&power);

        let log_mel: Vec<f32> = mel_energies
            .iter()
            .map(|&e| e.max(LOG_FLOOR).ln())
            .collect();

        dct_ii(&log_mel, self.config.n_mfcc)
    }

    /// Magnitude-weighted mean frequency. Zero for an all-zero frame.
    fn spectral_centroid(&self, magnitudes: &[f32]) -> f32 {
        let total: f32 = magnitudes.iter().sum();
        if total <= 0.0 {
            return 0.0;
        }
        let weighted: f32 = magnitudes
            .iter()
            .zip(&self.bin_freqs)
            .map(|(m, f)| m * f)
            .sum();
        weighted / total
    }

    /// Frequency below which `ROLLOFF_FRACTION` of the spectral energy lies.
    fn spectral_rolloff(&self, magnitudes: &[f32]) -> f32 {
        let total: f32 = magnitudes.iter().sum();
        if total <= 0.0 {
            return 0.0;
        }

        let threshold = ROLLOFF_FRACTION * total;
        let mut cumulative = 0.0;
        for (m, f) in magnitudes.iter().zip(&self.bin_freqs) {
            cumulative += m;
            if cumulative >= threshold {
                return *f;
            }
        }
        *self.bin_freqs.last().unwrap_or(&0.0)
    }

    /// Magnitude-weighted deviation around the centroid.
    fn spectral_bandwidth(&self, magnitudes: &[f32], centroid: f32) -> f32 {
        let total: f32 = magnitudes.iter().sum();
        if total <= 0.0 {
            return 0.0;
        }
        let weighted: f32 = magnitudes
            .iter()
            .zip(&self.bin_freqs)
            .map(|(m, f)| m * (f - centroid).powi(2))
            .sum();
        (weighted / total).sqrt()
    }

    /// Fold FFT bin energies into 12 pitch classes (A440 reference).
    fn chroma_frame(&self, magnitudes: &[f32]) -> [f32; CHROMA_BINS] {
        let mut chroma = [0.0f32; CHROMA_BINS];

        // Bin 0 is DC and has no pitch class
        for (m, f) in magnitudes.iter().zip(&self.bin_freqs).skip(1) {
            if *f <= 0.0 {
                continue;
            }
            let midi = 69.0 + 12.0 * (f / 440.0).log2();
            let pitch_class = (midi.round() as i64).rem_euclid(12) as usize;
            chroma[pitch_class] += m * m;
        }

        chroma
    }

    /// Zero-crossing rate per frame, computed on the time-domain signal with
    /// the same framing as the STFT.
    fn zero_crossing_rates(&self, samples: &[f32]) -> Vec<f32> {
        let n_fft = self.config.n_fft;
        let hop = self.config.hop_length;

        let padded;
        let samples = if samples.len() < n_fft {
            let mut buf = samples.to_vec();
            buf.resize(n_fft, 0.0);
            padded = buf;
            &padded[..]
        } else {
            samples
        };

        let n_frames = 1 + (samples.len() - n_fft) / hop;
        (0..n_frames)
            .map(|frame| {
                let window = &samples[frame * hop..frame * hop + n_fft];
                let crossings = window
                    .windows(2)
                    .filter(|pair| (pair[0] >= 0.0) != (pair[1] >= 0.0))
                    .count();
                crossings as f32 / n_fft as f32
            })
            .collect()
    }
}

/// Symmetric Hann window.
fn hann_window(size: usize) -> Vec<f32> {
    if size == 1 {
        return vec![1.0];
    }
    (0..size)
        .map(|i| {
            let x = 2.0 * std::f32::consts::PI * i as f32 / (size - 1) as f32;
            0.5 * (1.0 - x.cos())
        })
        .collect()
}

/// Triangular mel filterbank (HTK mel scale), `n_mels x (n_fft / 2 + 1)`.
fn create_mel_filterbank(n_mels: usize, n_fft: usize, sample_rate: u32) -> Array2<f32> {
    let n_bins = n_fft / 2 + 1;
    let mut filters = Array2::zeros((n_mels, n_bins));

    let mel_low = hz_to_mel(0.0);
    let mel_high = hz_to_mel(sample_rate as f32 / 2.0);

    // n_mels + 2 points: each filter spans three consecutive ones
    let bin_points: Vec<usize> = (0..n_mels + 2)
        .map(|i| {
            let mel = mel_low + (mel_high - mel_low) * i as f32 / (n_mels + 1) as f32;
            let hz = mel_to_hz(mel);
            (((n_fft + 1) as f32 * hz / sample_rate as f32) as usize).min(n_bins - 1)
        })
        .collect();

    for m in 0..n_mels {
        let (left, center, right) = (bin_points[m], bin_points[m + 1], bin_points[m + 2]);

        for k in left..center {
            if center > left {
                filters[[m, k]] = (k - left) as f32 / (center - left) as f32;
            }
        }
        for k in center..right {
            if right > center {
                filters[[m, k]] = (right - k) as f32 / (right - center) as f32;
            }
        }
    }

    filters
}

fn hz_to_mel(hz: f32) -> f32 {
    2595.0 * (1.0 + hz / 700.0).log10()
}

fn mel_to_hz(mel: f32) -> f32 {
    700.0 * (10.0f32.powf(mel / 2595.0) - 1.0)
}

/// Orthonormal DCT-II, keeping the first `n_out` coefficients.
fn dct_ii(input: &[f32], n_out: usize) -> Vec<f32> {
    let n = input.len();
    if n == 0 {
        return vec![0.0; n_out];
    }

    let scale0 = (1.0 / n as f32).sqrt();
    let scale = (2.0 / n as f32).sqrt();

    (0..n_out)
        .map(|k| {
            let sum: f32 = input
                .iter()
                .enumerate()
                .map(|(i, &x)| {
                    x * (std::f32::consts::PI * k as f32 * (i as f32 + 0.5) / n as f32).cos()
                })
                .sum();
            if k == 0 {
                sum * scale0
            } else {
                sum * scale
            }
        })
        .collect()
}

/// Population mean and variance of a series. Empty series yield zeros.
fn mean_var(values: &[f32]) -> (f32, f32) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f32;
    let mean = values.iter().sum::<f32>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / n;
    (mean, var)
}

/// Column-wise mean and variance over a list of equally sized rows.
fn mean_var_columns(rows: &[Vec<f32>], width: usize) -> (Vec<f32>, Vec<f32>) {
    let mut means = vec![0.0f32; width];
    let mut vars = vec![0.0f32; width];

    if rows.is_empty() {
        return (means, vars);
    }

    for col in 0..width {
        let column: Vec<f32> = rows.iter().map(|row| row[col]).collect();
        let (mean, var) = mean_var(&column);
        means[col] = mean;
        vars[col] = var;
    }

    (means, vars)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, sample_rate: u32, frames: usize) -> Vec<f32> {
        (0..frames)
            .map(|i| {
                let t = i as f32 / sample_rate as f32;
                (t * freq * 2.0 * std::f32::consts::PI).sin()
            })
            .collect()
    }

    fn extractor() -> FeatureExtractor {
        FeatureExtractor::new(22050, FeatureConfig::default())
    }

    #[test]
    fn test_output_length() {
        let ex = extractor();
        let features = ex.extract(&sine(440.0, 22050, 22050));
        assert_eq!(features.len(), 58);
        assert_eq!(features.len(), ex.output_len());
    }

    #[test]
    fn test_short_input_still_produces_full_vector() {
        let ex = extractor();
        // Shorter than one FFT window
        let features = ex.extract(&sine(440.0, 22050, 100));
        assert_eq!(features.len(), 58);
        assert!(features.iter().all(|f| f.is_finite()));
    }

    #[test]
    fn test_silence_features() {
        let ex = extractor();
        let features = ex.extract(&vec![0.0; 22050]);
        assert_eq!(features.len(), 58);
        // ZCR mean of silence is zero (layout: it sits after the MFCC block,
        // centroid, and rolloff pairs)
        let zcr_mean = features[2 * 13 + 4];
        assert_eq!(zcr_mean, 0.0);
        assert!(features.iter().all(|f| f.is_finite()));
    }

    #[test]
    fn test_sine_centroid_near_frequency() {
        let ex = extractor();
        let features = ex.extract(&sine(440.0, 22050, 44100));
        let centroid_mean = features[2 * 13];
        assert!(
            (centroid_mean - 440.0).abs() < 60.0,
            "centroid {} too far from 440 Hz",
            centroid_mean
        );
    }

    #[test]
    fn test_sine_chroma_peaks_at_pitch_class() {
        let ex = extractor();
        // A440 is pitch class 9
        let features = ex.extract(&sine(440.0, 22050, 44100));
        let chroma_means = &features[2 * 13 + 6..2 * 13 + 6 + 12];
        let peak = chroma_means
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .map(|(i, _)| i)
            .unwrap();
        assert_eq!(peak, 9);
    }

    #[test]
    fn test_variances_are_non_negative() {
        let ex = extractor();
        let features = ex.extract(&sine(300.0, 22050, 22050));
        // Variance slots: MFCC vars, then every second scalar slot
        for &var in &features[13..26] {
            assert!(var >= 0.0);
        }
    }

    #[test]
    fn test_pad_or_truncate() {
        let samples = vec![1.0, 2.0, 3.0];
        let padded = FeatureExtractor::pad_or_truncate(&samples, 5);
        assert_eq!(padded, vec![1.0, 2.0, 3.0, 0.0, 0.0]);

        let truncated = FeatureExtractor::pad_or_truncate(&samples, 2);
        assert_eq!(truncated, vec![1.0, 2.0]);

        let exact = FeatureExtractor::pad_or_truncate(&samples, 3);
        assert_eq!(exact, samples);
    }

    #[test]
    fn test_mel_filterbank_is_non_negative() {
        let filters = create_mel_filterbank(128, 2048, 22050);
        assert_eq!(filters.shape(), &[128, 1025]);
        assert!(filters.iter().all(|&v| v >= 0.0 && v <= 1.0));
    }

    #[test]
    fn test_hz_mel_round_trip() {
        for hz in [100.0f32, 440.0, 1000.0, 8000.0] {
            let back = mel_to_hz(hz_to_mel(hz));
            assert!((back - hz).abs() / hz < 1e-3);
        }
    }

    #[test]
    fn test_mean_var() {
        let (mean, var) = mean_var(&[1.0, 2.0, 3.0, 4.0]);
        assert!((mean - 2.5).abs() < 1e-6);
        assert!((var - 1.25).abs() < 1e-6);

        let (mean, var) = mean_var(&[]);
        assert_eq!((mean, var), (0.0, 0.0));
    }
}
