//! WAV file loading
//!
//! Reads 16 kHz audio into mono f32 samples for the speech runtime. No
//! resampling is done here.

use hound::{SampleFormat, WavReader};
use scribeloop_common::{Result, ScribeLoopError};
use std::path::Path;
use tracing::debug;

/// Sample rate expected by Whisper models
pub const WHISPER_SAMPLE_RATE: u32 = 16_000;

/// Load a WAV file as mono f32 samples in [-1, 1]
pub fn load_wav<P: AsRef<Path>>(path: P) -> Result<Vec<f32>> {
    let path = path.as_ref();
    let mut reader = WavReader::open(path)
        .map_err(|e| ScribeLoopError::audio(format!("failed to open {}: {}", path.display(), e)))?;
    let spec = reader.spec();

    if spec.sample_rate != WHISPER_SAMPLE_RATE {
        return Err(ScribeLoopError::audio(format!(
            "{} has sample rate {} Hz, expected {} Hz",
            path.display(),
            spec.sample_rate,
            WHISPER_SAMPLE_RATE
        )));
    }

    let samples = match spec.sample_format {
        SampleFormat::Int => {
            if spec.bits_per_sample != 16 {
                return Err(ScribeLoopError::audio(format!(
                    "{}: integer samples must be 16-bit, got {}-bit",
                    path.display(),
                    spec.bits_per_sample
                )));
            }
            reader
                .samples::<i16>()
                .map(|s| s.map(|v| v as f32 / i16::MAX as f32))
                .collect::<std::result::Result<Vec<f32>, _>>()
        }
        SampleFormat::Float => reader.samples::<f32>().collect::<std::result::Result<Vec<f32>, _>>(),
    }
    .map_err(|e| ScribeLoopError::audio(format!("failed to read samples from {}: {}", path.display(), e)))?;

    debug!(
        "Loaded {}: {} channel(s), {} samples",
        path.display(),
        spec.channels,
        samples.len()
    );

    Ok(downmix(samples, spec.channels as usize))
}

/// Average interleaved channels into one
fn downmix(samples: Vec<f32>, channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return samples;
    }
    samples
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}
