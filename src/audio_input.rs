//! WAV loading and stereo-to-mono downmix.
//!
//! The codec itself only ever sees `(sample_rate, mono f32 samples)`; this
//! module is the stock provider of that pair. Float and integer PCM both
//! land in [-1, 1], multi-channel audio is averaged per frame.

use std::io::Read;
use std::path::Path;

use hound::{SampleFormat, WavReader};

use crate::error::{FvzError, Result};

/// Mono audio ready for the frame pipeline.
#[derive(Clone, Debug)]
pub struct AudioData {
    pub sample_rate: u32,
    pub samples: Vec<f32>,
}

/// Load a WAV file from disk.
pub fn load_wav(path: &Path) -> Result<AudioData> {
    let reader =
        WavReader::open(path).map_err(|e| FvzError::AudioRead(format!("{:?}: {}", path, e)))?;
    read_samples(reader)
}

/// Load a WAV image from any byte source (in-memory buffers included).
pub fn load_wav_from<R: Read>(source: R) -> Result<AudioData> {
    let reader = WavReader::new(source).map_err(|e| FvzError::AudioRead(e.to_string()))?;
    read_samples(reader)
}

fn read_samples<R: Read>(mut reader: WavReader<R>) -> Result<AudioData> {
    let spec = reader.spec();

    // Read samples as f32 in [-1, 1]; unreadable samples decode to silence
    let mut samples: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader.samples::<f32>().map(|s| s.unwrap_or(0.0)).collect(),
        SampleFormat::Int => match spec.bits_per_sample {
            0..=16 => reader
                .samples::<i16>()
                .map(|s| s.unwrap_or(0) as f32 / 32768.0)
                .collect(),
            bits => {
                // 24/32-bit PCM arrives as i32 scaled to its own bit depth
                let scale = (1i64 << (bits - 1)) as f32;
                reader
                    .samples::<i32>()
                    .map(|s| s.unwrap_or(0) as f32 / scale)
                    .collect()
            }
        },
    };

    if spec.channels > 1 {
        samples = downmix_to_mono(&samples, spec.channels as usize);
    }

    tracing::debug!(
        "[Audio] {} ch @ {} Hz, {} bits -> {} mono samples",
        spec.channels,
        spec.sample_rate,
        spec.bits_per_sample,
        samples.len()
    );

    Ok(AudioData {
        sample_rate: spec.sample_rate,
        samples,
    })
}

/// Average interleaved channels into mono.
fn downmix_to_mono(samples: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }

    let frames = samples.len() / channels;
    let mut mono = Vec::with_capacity(frames);
    for f in 0..frames {
        let base = f * channels;
        let sum: f32 = samples[base..base + channels].iter().sum();
        mono.push(sum / channels as f32);
    }
    mono
}
