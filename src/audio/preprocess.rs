//! # Audio Preprocessing
//!
//! Normalizes decoded audio into the form the feature extractor expects:
//! finite mono samples at the configured sample rate, peak-normalized.
//!
//! ## Processing Order:
//! 1. Drop non-finite samples (NaN, infinity); empty input becomes silence
//! 2. Resample to the target rate (band-limited, via rubato)
//! 3. Down-mix interleaved multi-channel audio to mono
//! 4. Peak-normalize, unless the peak is exactly zero

use crate::audio::Waveform;
use anyhow::{Context, Result};
use rubato::{FftFixedIn, Resampler};
use tracing::{debug, warn};

/// Sample rate of the silence substituted for empty input.
const SILENCE_SAMPLE_RATE: u32 = 16000;

/// Frames fed to the resampler per processing block.
const RESAMPLE_CHUNK_SIZE: usize = 1024;

/// Stateless preprocessing front-end for the prediction pipeline.
#[derive(Debug, Clone)]
pub struct Preprocessor {
    target_sample_rate: u32,
}

impl Preprocessor {
    pub fn new(target_sample_rate: u32) -> Self {
        Self { target_sample_rate }
    }

    pub fn target_sample_rate(&self) -> u32 {
        self.target_sample_rate
    }

    /// Run the full preprocessing chain, returning mono samples at the
    /// target rate.
    pub fn process(&self, waveform: Waveform) -> Result<Vec<f32>> {
        let waveform = self.sanitize(waveform);
        let waveform = self.resample(waveform)?;
        let mono = mix_to_mono(&waveform);
        Ok(peak_normalize(mono))
    }

    /// Drop non-finite samples. If nothing survives, substitute one second
    /// of silence so the rest of the pipeline always has input to work with.
    ///
    /// Multi-channel audio is filtered a whole frame at a time: dropping a
    /// single sample from an interleaved buffer would shift every later
    /// frame's channel alignment and leave the planes unequal in length.
    fn sanitize(&self, waveform: Waveform) -> Waveform {
        let channels = waveform.channels.max(1) as usize;
        let before = waveform.samples.len();
        let samples: Vec<f32> = if channels == 1 {
            let mut samples = waveform.samples;
            samples.retain(|s| s.is_finite());
            samples
        } else {
            waveform
                .samples
                .chunks_exact(channels)
                .filter(|frame| frame.iter().all(|s| s.is_finite()))
                .flatten()
                .copied()
                .collect()
        };

        let dropped = before - samples.len();
        if dropped > 0 {
            warn!(dropped, "Dropped non-finite audio samples");
        }

        if samples.is_empty() {
            debug!("Empty audio after sanitizing, substituting silence");
            return Waveform::mono(
                vec![0.0; SILENCE_SAMPLE_RATE as usize],
                SILENCE_SAMPLE_RATE,
            );
        }

        Waveform {
            samples,
            sample_rate: waveform.sample_rate,
            channels: waveform.channels,
        }
    }

    /// Band-limited resampling to the target rate, channel by channel.
    fn resample(&self, waveform: Waveform) -> Result<Waveform> {
        if waveform.sample_rate == self.target_sample_rate {
            return Ok(waveform);
        }

        let channels = waveform.channels.max(1) as usize;
        let planes = waveform.deinterleave();
        let frames = planes[0].len();

        let mut resampler = FftFixedIn::<f32>::new(
            waveform.sample_rate as usize,
            self.target_sample_rate as usize,
            RESAMPLE_CHUNK_SIZE,
            2,
            channels,
        )
        .context("Failed to create resampler")?;

        let mut out_buffer = resampler.output_buffer_allocate(true);
        let mut output: Vec<Vec<f32>> = vec![Vec::new(); channels];

        let mut pos = 0;
        loop {
            let needed = resampler.input_frames_next();
            if pos + needed > frames {
                break;
            }
            let block: Vec<&[f32]> = planes.iter().map(|p| &p[pos..pos + needed]).collect();
            let (consumed, written) = resampler
                .process_into_buffer(&block, &mut out_buffer, None)
                .context("Resampler failed")?;
            pos += consumed;
            for (out, buf) in output.iter_mut().zip(out_buffer.iter()) {
                out.extend_from_slice(&buf[..written]);
            }
        }

        // Flush the remaining partial block so the tail is not lost
        if pos < frames {
            let block: Vec<&[f32]> = planes.iter().map(|p| &p[pos..]).collect();
            let (_, written) = resampler
                .process_partial_into_buffer(Some(block.as_slice()), &mut out_buffer, None)
                .context("Resampler failed on final block")?;
            for (out, buf) in output.iter_mut().zip(out_buffer.iter()) {
                out.extend_from_slice(&buf[..written]);
            }
        }

        debug!(
            from = waveform.sample_rate,
            to = self.target_sample_rate,
            in_frames = frames,
            out_frames = output[0].len(),
            "Resampled audio"
        );

        // Re-interleave for the mono mix step
        let out_frames = output[0].len();
        let mut interleaved = Vec::with_capacity(out_frames * channels);
        for i in 0..out_frames {
            for plane in &output {
                interleaved.push(plane[i]);
            }
        }

        Ok(Waveform {
            samples: interleaved,
            sample_rate: self.target_sample_rate,
            channels: channels as u16,
        })
    }
}

/// Average interleaved channels down to mono.
fn mix_to_mono(waveform: &Waveform) -> Vec<f32> {
    let channels = waveform.channels.max(1) as usize;
    if channels == 1 {
        return waveform.samples.clone();
    }

    waveform
        .samples
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

/// Scale samples so the absolute peak is 1.0. All-zero input is returned
/// unchanged rather than divided by zero.
fn peak_normalize(mut samples: Vec<f32>) -> Vec<f32> {
    let peak = samples.iter().fold(0.0f32, |acc, s| acc.max(s.abs()));
    if peak > 0.0 {
        for s in &mut samples {
            *s /= peak;
        }
    }
    samples
}
