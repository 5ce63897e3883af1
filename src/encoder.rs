//! The encoder pipeline: load audio once, generate frames once, serialize
//! as often as you like.
//!
//! Frame generation is embarrassingly parallel - every frame reads the
//! shared sample buffer and writes only its own slot, so rayon fans the work
//! out with one `FrameBuilder` per worker and no locks. The header's
//! `max_amplitude` comes from a sequential reduction after the join.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
#[cfg(test)]
use std::sync::Arc;
use std::time::Instant;

use rayon::prelude::*;

use crate::audio_input::{self, AudioData};
use crate::config::{BinMapping, EncoderConfig};
use crate::decoder::VisFile;
use crate::error::{FvzError, Result};
use crate::frame_builder::FrameBuilder;
use crate::header::{Header, HEADER_LEN};
use crate::payload;

/// Fixed Zstd compression level for the FLAG_ZSTD stage
const ZSTD_LEVEL: i32 = 9;

/// Progress sink invoked as `(frames_done, total_frames)`. Called
/// concurrently from worker threads, so it has to be Sync.
pub type ProgressSink = dyn Fn(u32, u32) + Sync;

pub struct Encoder {
    config: EncoderConfig,
    audio: Option<AudioData>,
    frames: Option<Vec<Vec<f32>>>,
    max_amplitude: f32,
}

impl Encoder {
    /// Create an encoder with a validated configuration.
    pub fn new(config: EncoderConfig) -> Result<Self> {
        config.validate()?;

        if config.bin_mapping == BinMapping::Log10 {
            // Same math as Normalized; keep files honest about which name
            // they asked for, but don't let anyone think it differs
            tracing::warn!(
                "[Encoder] ⚠️ Log10 bin mapping is identical to Normalized, only the identifier differs"
            );
        }

        Ok(Self {
            config,
            audio: None,
            frames: None,
            max_amplitude: 0.0,
        })
    }

    /// Load a WAV file and downmix it to mono.
    pub fn load_audio_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let audio = audio_input::load_wav(path.as_ref())?;
        tracing::info!(
            "[Encoder] ✓ Loaded {:?}: {} samples @ {} Hz",
            path.as_ref(),
            audio.samples.len(),
            audio.sample_rate
        );
        self.set_audio(audio);
        Ok(())
    }

    /// Inject already-decoded mono samples.
    pub fn load_audio(&mut self, sample_rate: u32, samples: Vec<f32>) {
        self.set_audio(AudioData {
            sample_rate,
            samples,
        });
    }

    fn set_audio(&mut self, audio: AudioData) {
        self.audio = Some(audio);
        // New audio invalidates anything generated before
        self.frames = None;
        self.max_amplitude = 0.0;
    }

    /// Run the frame pipeline across the whole signal.
    ///
    /// Frame i covers `fft_resolution` samples starting at `round(i * hop)`
    /// where hop = sample_rate / fps; the tail past the signal end is
    /// zero-padded.
    pub fn generate_frames(&mut self, progress: Option<&ProgressSink>) -> Result<()> {
        let audio = self
            .audio
            .as_ref()
            .ok_or_else(|| FvzError::EncoderPrecondition("no audio loaded".into()))?;

        let n = self.config.fft_resolution;
        let len = audio.samples.len();
        let hop = audio.sample_rate as f64 / self.config.fps as f64;

        // ceil(max(0, (len - n)/hop + 1)): a signal within one hop of a full
        // window still yields one zero-padded frame
        let total = (((len as f64 - n as f64) / hop + 1.0).max(0.0)).ceil() as usize;
        if total > u32::MAX as usize {
            return Err(FvzError::EncoderPrecondition(format!(
                "{} frames exceed the format's u32 frame count",
                total
            )));
        }

        tracing::info!(
            "[Encoder] Generating {} frames ({} bars, fft {}, hop {:.1} samples)...",
            total,
            self.config.bar_count,
            n,
            hop
        );
        let started = Instant::now();

        let samples = &audio.samples;
        let sample_rate = audio.sample_rate;
        let config = &self.config;
        let done_counter = AtomicU32::new(0);

        let frames: Vec<Vec<f32>> = (0..total)
            .into_par_iter()
            .map_init(
                // One FrameBuilder per worker: FFT plan and buffers are
                // reused across every frame that worker picks up
                || FrameBuilder::new(config, sample_rate),
                |builder, i| {
                    let start = ((i as f64 * hop).round() as usize).min(len);
                    let end = (start + n).min(len);
                    let frame = builder.build(&samples[start..end]);

                    if let Some(sink) = progress {
                        let done = done_counter.fetch_add(1, Ordering::Relaxed) + 1;
                        sink(done, total as u32);
                    }
                    frame
                },
            )
            .collect();

        // Max-reduction after the join; workers never share a scalar
        let max_amplitude = frames
            .iter()
            .flatten()
            .fold(0.0f32, |acc, &v| acc.max(v));

        tracing::info!(
            "[Encoder] ✓ Generated {} frames in {:.1}ms (max amplitude {:.4})",
            total,
            started.elapsed().as_secs_f64() * 1000.0,
            max_amplitude
        );

        self.frames = Some(frames);
        self.max_amplitude = max_amplitude;
        Ok(())
    }

    fn build_header(&self, total_frames: u32) -> Header {
        let quantized = self.config.compression & crate::header::FLAG_QUANTIZE != 0;
        Header {
            fft_resolution: self.config.fft_resolution as u32,
            num_bands: self.config.bar_count as u16,
            frame_rate: self.config.fps,
            total_frames,
            max_amplitude: self.max_amplitude,
            compression: self.config.compression,
            // Meaningless without the Quantize bit; write it as zero then
            quantize_level: if quantized {
                self.config.quantize_level.to_byte()
            } else {
                0
            },
        }
    }

    /// Serialize header + transform cascade into one byte image.
    ///
    /// This is the only serialization path; `save_to_file` writes exactly
    /// these bytes.
    pub fn save_to_memory(&self) -> Result<Vec<u8>> {
        let frames = self.frames.as_ref().ok_or_else(|| {
            FvzError::EncoderPrecondition("generate_frames before saving".into())
        })?;

        let zstd = self.config.compression & crate::header::FLAG_ZSTD != 0;
        let quantize = self.config.compression & crate::header::FLAG_QUANTIZE != 0;
        let delta = self.config.compression & crate::header::FLAG_DELTA != 0;

        let payload = payload::encode_frames(frames, quantize, delta, self.config.quantize_level);

        let mut out = Vec::with_capacity(HEADER_LEN + payload.len() + 4);
        out.extend_from_slice(&self.build_header(frames.len() as u32).encode());

        if zstd {
            let compressed = zstd::encode_all(&payload[..], ZSTD_LEVEL)?;
            tracing::debug!(
                "[Encoder] Zstd {} -> {} bytes",
                payload.len(),
                compressed.len()
            );
            out.extend_from_slice(&(compressed.len() as i32).to_le_bytes());
            out.extend_from_slice(&compressed);
        } else {
            out.extend_from_slice(&payload);
        }

        Ok(out)
    }

    /// Write the `.fvz` file, appending the extension when the name has
    /// none. The byte image is built fully in memory first so a failure
    /// never leaves a partial file behind.
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<PathBuf> {
        let bytes = self.save_to_memory()?;

        let mut path = path.as_ref().to_path_buf();
        if path.extension().is_none() {
            path.set_extension("fvz");
        }

        std::fs::write(&path, &bytes)?;
        tracing::info!("[Encoder] ✓ Wrote {:?} ({} bytes)", path, bytes.len());
        Ok(path)
    }

    /// Hand the generated frames over as a decoded-file bundle without a
    /// serialization round trip.
    pub fn into_vis(mut self) -> Result<VisFile> {
        let frames = self.frames.take().ok_or_else(|| {
            FvzError::EncoderPrecondition("generate_frames before taking frames".into())
        })?;

        let header = self.build_header(frames.len() as u32);
        Ok(VisFile { header, frames })
    }

    pub fn frames(&self) -> Option<&[Vec<f32>]> {
        self.frames.as_deref()
    }

    pub fn max_amplitude(&self) -> f32 {
        self.max_amplitude
    }

    pub fn config(&self) -> &EncoderConfig {
        &self.config
    }
}

// ===========  Tests ===============
#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::{FLAG_DELTA, FLAG_QUANTIZE, FLAG_ZSTD};

    fn sine(freq: f64, sample_rate: u32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| {
                (2.0 * std::f64::consts::PI * freq * i as f64 / sample_rate as f64).sin() as f32
            })
            .collect()
    }

    fn small_config() -> EncoderConfig {
        EncoderConfig {
            bar_count: 32,
            fft_resolution: 1024,
            fps: 30,
            compression: 0,
            ..EncoderConfig::default()
        }
    }

    #[test]
    fn test_generate_without_audio_fails() {
        let mut encoder = Encoder::new(small_config()).unwrap();
        assert!(matches!(
            encoder.generate_frames(None),
            Err(FvzError::EncoderPrecondition(_))
        ));
    }

    #[test]
    fn test_save_before_generate_fails() {
        let mut encoder = Encoder::new(small_config()).unwrap();
        encoder.load_audio(48000, sine(440.0, 48000, 48000));
        assert!(matches!(
            encoder.save_to_memory(),
            Err(FvzError::EncoderPrecondition(_))
        ));
    }

    #[test]
    fn test_frame_count_formula() {
        // 44100 samples at 30 fps -> hop 1470; ceil((44100-1024)/1470 + 1) = 31
        let mut encoder = Encoder::new(small_config()).unwrap();
        encoder.load_audio(44100, sine(440.0, 44100, 44100));
        encoder.generate_frames(None).unwrap();
        assert_eq!(encoder.frames().unwrap().len(), 31);

        // Exactly one window of audio -> exactly one frame
        let mut encoder = Encoder::new(small_config()).unwrap();
        encoder.load_audio(44100, sine(440.0, 44100, 1024));
        encoder.generate_frames(None).unwrap();
        assert_eq!(encoder.frames().unwrap().len(), 1);

        // Shorter than a window but within one hop of it: still one
        // zero-padded frame, per ceil(max(0, (len-n)/hop + 1))
        let mut encoder = Encoder::new(small_config()).unwrap();
        encoder.load_audio(44100, sine(440.0, 44100, 1000));
        encoder.generate_frames(None).unwrap();
        assert_eq!(encoder.frames().unwrap().len(), 1);

        // More than a hop short of a window -> no frames at all
        let mut config = small_config();
        config.fps = 60; // hop 735 at 44.1k
        let mut encoder = Encoder::new(config).unwrap();
        encoder.load_audio(44100, sine(440.0, 44100, 100));
        encoder.generate_frames(None).unwrap();
        assert_eq!(encoder.frames().unwrap().len(), 0);
    }

    #[test]
    fn test_progress_sink_sees_every_frame() {
        let calls = Arc::new(AtomicU32::new(0));
        let highest = Arc::new(AtomicU32::new(0));
        let (calls_cb, highest_cb) = (calls.clone(), highest.clone());
        let sink = move |done: u32, total: u32| {
            calls_cb.fetch_add(1, Ordering::Relaxed);
            highest_cb.fetch_max(done, Ordering::Relaxed);
            assert_eq!(total, 31);
        };

        let mut encoder = Encoder::new(small_config()).unwrap();
        encoder.load_audio(44100, sine(440.0, 44100, 44100));
        encoder.generate_frames(Some(&sink)).unwrap();

        assert_eq!(calls.load(Ordering::Relaxed), 31);
        assert_eq!(highest.load(Ordering::Relaxed), 31);
    }

    #[test]
    fn test_max_amplitude_matches_frames() {
        let mut encoder = Encoder::new(small_config()).unwrap();
        encoder.load_audio(48000, sine(1000.0, 48000, 48000));
        encoder.generate_frames(None).unwrap();

        let expected = encoder
            .frames()
            .unwrap()
            .iter()
            .flatten()
            .fold(0.0f32, |m, &v| m.max(v));
        assert_eq!(encoder.max_amplitude(), expected);
        assert!(expected > 0.0, "a full-scale tone should light something up");
    }

    #[test]
    fn test_reloading_audio_invalidates_frames() {
        let mut encoder = Encoder::new(small_config()).unwrap();
        encoder.load_audio(48000, sine(440.0, 48000, 48000));
        encoder.generate_frames(None).unwrap();
        assert!(encoder.frames().is_some());

        encoder.load_audio(48000, sine(880.0, 48000, 24000));
        assert!(encoder.frames().is_none(), "stale frames survived a reload");
    }

    #[test]
    fn test_header_reflects_config() {
        let mut config = small_config();
        config.compression = FLAG_ZSTD | FLAG_QUANTIZE | FLAG_DELTA;
        config.quantize_level = crate::header::QuantizeLevel::Bit8;

        let mut encoder = Encoder::new(config).unwrap();
        encoder.load_audio(48000, sine(440.0, 48000, 48000));
        encoder.generate_frames(None).unwrap();

        let vis = encoder.into_vis().unwrap();
        assert_eq!(vis.header.fft_resolution, 1024);
        assert_eq!(vis.header.num_bands, 32);
        assert_eq!(vis.header.frame_rate, 30);
        assert_eq!(vis.header.total_frames as usize, vis.frames.len());
        assert_eq!(vis.header.compression, 0b111);
        assert_eq!(vis.header.quantize_level, 1);
    }

    #[test]
    fn test_quantize_level_byte_zeroed_without_quantize_bit() {
        let mut config = small_config();
        config.compression = 0;
        config.quantize_level = crate::header::QuantizeLevel::Bit8;

        let mut encoder = Encoder::new(config).unwrap();
        encoder.load_audio(48000, sine(440.0, 48000, 48000));
        encoder.generate_frames(None).unwrap();

        let vis = encoder.into_vis().unwrap();
        assert_eq!(vis.header.quantize_level, 0);
    }

    #[test]
    fn test_save_to_file_appends_extension() {
        let mut encoder = Encoder::new(small_config()).unwrap();
        encoder.load_audio(48000, sine(440.0, 48000, 48000));
        encoder.generate_frames(None).unwrap();

        let base = std::env::temp_dir().join(format!("fftvis-ext-test-{}", std::process::id()));
        let written = encoder.save_to_file(&base).unwrap();
        assert_eq!(written.extension().unwrap(), "fvz");

        let bytes = std::fs::read(&written).unwrap();
        assert_eq!(&bytes[0..6], b"FFTVIS");
        let _ = std::fs::remove_file(&written);
    }
}
