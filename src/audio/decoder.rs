//! # Audio Decoding
//!
//! Two entry points into the prediction pipeline:
//! - `decode_file`: container decode (wav/mp3/m4a/flac) for uploaded files
//! - `decode_raw_chunk`: headerless PCM chunks from the streaming endpoint
//!
//! Raw chunks carry no format metadata, so the sample type is guessed from
//! the byte length: the first of i16, i32, f32 whose element size divides the
//! chunk length evenly wins. Integer samples are normalized to [-1.0, 1.0].

use crate::audio::Waveform;
use byteorder::{LittleEndian, ReadBytesExt};
use std::fmt;
use std::io::Cursor;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::debug;

/// Errors produced while decoding client audio.
#[derive(Debug)]
pub enum DecodeError {
    /// The payload was empty
    EmptyInput,
    /// The bytes could not be interpreted as any supported format
    UnsupportedFormat(String),
    /// The container was recognized but decoding failed partway
    DecodeFailed(String),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::EmptyInput => write!(f, "Empty audio payload"),
            DecodeError::UnsupportedFormat(msg) => write!(f, "Unsupported audio format: {}", msg),
            DecodeError::DecodeFailed(msg) => write!(f, "Audio decoding failed: {}", msg),
        }
    }
}

impl std::error::Error for DecodeError {}

/// Decode an audio container (wav, mp3, m4a, flac) into an interleaved waveform.
///
/// The optional extension is passed to the probe as a hint; symphonia will
/// still sniff the actual format from the content.
pub fn decode_file(data: &[u8], extension: Option<&str>) -> Result<Waveform, DecodeError> {
    if data.is_empty() {
        return Err(DecodeError::EmptyInput);
    }

    let source = Cursor::new(data.to_vec());
    let stream = MediaSourceStream::new(Box::new(source), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = extension {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            stream,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| DecodeError::UnsupportedFormat(e.to_string()))?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| DecodeError::UnsupportedFormat("no decodable audio track".to_string()))?;

    let track_id = track.id;
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| DecodeError::UnsupportedFormat("missing sample rate".to_string()))?;
    let channels = track
        .codec_params
        .channels
        .map(|c| c.count() as u16)
        .unwrap_or(1);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| DecodeError::UnsupportedFormat(e.to_string()))?;

    let mut samples: Vec<f32> = Vec::new();
    let mut sample_buf: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            // End of stream shows up as an IO error on the underlying cursor
            Err(SymphoniaError::IoError(_)) => break,
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(DecodeError::DecodeFailed(e.to_string())),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            // A corrupt packet is skippable; a hard error is not
            Err(SymphoniaError::DecodeError(e)) => {
                debug!("Skipping undecodable packet: {}", e);
                continue;
            }
            Err(e) => return Err(DecodeError::DecodeFailed(e.to_string())),
        };

        if sample_buf.is_none() {
            let spec = *decoded.spec();
            let capacity = decoded.capacity() as u64;
            sample_buf = Some(SampleBuffer::new(capacity, spec));
        }

        if let Some(buf) = &mut sample_buf {
            buf.copy_interleaved_ref(decoded);
            samples.extend_from_slice(buf.samples());
        }
    }

    if samples.is_empty() {
        return Err(DecodeError::DecodeFailed(
            "no audio samples decoded".to_string(),
        ));
    }

    debug!(
        sample_rate,
        channels,
        samples = samples.len(),
        "Decoded audio container"
    );

    Ok(Waveform {
        samples,
        sample_rate,
        channels,
    })
}

/// Sample encodings tried for headerless PCM chunks, in priority order.
#[derive(Debug, Clone, Copy, PartialEq)]
enum SampleEncoding {
    I16,
    I32,
    F32,
}

impl SampleEncoding {
    const CANDIDATES: [SampleEncoding; 3] =
        [SampleEncoding::I16, SampleEncoding::I32, SampleEncoding::F32];

    fn byte_width(self) -> usize {
        match self {
            SampleEncoding::I16 => 2,
            SampleEncoding::I32 => 4,
            SampleEncoding::F32 => 4,
        }
    }

    fn decode(self, data: &[u8]) -> Vec<f32> {
        let mut cursor = Cursor::new(data);
        let mut samples = Vec::with_capacity(data.len() / self.byte_width());
        match self {
            SampleEncoding::I16 => {
                while let Ok(sample) = cursor.read_i16::<LittleEndian>() {
                    samples.push(sample as f32 / 32768.0);
                }
            }
            SampleEncoding::I32 => {
                while let Ok(sample) = cursor.read_i32::<LittleEndian>() {
                    samples.push(sample as f32 / 2147483648.0);
                }
            }
            SampleEncoding::F32 => {
                while let Ok(sample) = cursor.read_f32::<LittleEndian>() {
                    samples.push(sample);
                }
            }
        }
        samples
    }
}

/// Interpret a headerless PCM chunk as mono f32 samples.
///
/// Candidates are tried in order: i16, i32, f32. The first candidate whose
/// element size divides the chunk length evenly wins, and integer samples are
/// normalized by the type's maximum magnitude.
pub fn decode_raw_chunk(data: &[u8]) -> Result<Vec<f32>, DecodeError> {
    if data.is_empty() {
        return Err(DecodeError::EmptyInput);
    }

    for encoding in SampleEncoding::CANDIDATES {
        if data.len() % encoding.byte_width() == 0 {
            return Ok(encoding.decode(data));
        }
    }

    Err(DecodeError::UnsupportedFormat(format!(
        "chunk length {} does not match any supported sample width",
        data.len()
    )))
}
