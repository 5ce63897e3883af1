//! Turns one FFT window of mono samples into a frame of bar amplitudes.
//!
//! The pipeline runs in a strict order: sanitize + DC removal, Hann window,
//! real FFT, frequency-to-bar accumulation, dB normalization, soft-knee gate
//! (log mappings only), neighbour smoothing. All spectral math is f64; the
//! finished frame narrows to f32.

use realfft::{RealFftPlanner, RealToComplex};
use std::sync::Arc;

use crate::bin_mapping::{
    accumulate_log_bars, accumulate_mel_bars, log_bar_edges, mel_edges,
};
use crate::config::{BinMapping, EncoderConfig};

/// Floor added before taking log10 so silent bars don't blow up
const DB_EPSILON: f64 = 1e-20;

/// Precomputed bar edges for the session's mapping
enum BarEdges {
    Log(Vec<f64>),
    Mel(Vec<f64>),
}

/// Reusable frame pipeline - one instance per worker, no per-frame allocation
/// beyond the output vectors.
pub struct FrameBuilder {
    config: EncoderConfig,
    sample_rate: u32,

    // FFT state (reusable across frames)
    fft: Arc<dyn RealToComplex<f64>>,
    input_buffer: Vec<f64>,
    spectrum: Vec<num_complex::Complex<f64>>,
    scratch: Vec<num_complex::Complex<f64>>,
    magnitudes: Vec<f64>,

    // Hann window (precomputed, never changes)
    hann_window: Vec<f64>,

    // Bar mapping edges (precomputed from config + sample rate)
    edges: BarEdges,
}

impl FrameBuilder {
    /// Build a frame pipeline for one encode session.
    ///
    /// Assumes a validated config (the encoder checks before it gets here).
    pub fn new(config: &EncoderConfig, sample_rate: u32) -> Self {
        let mut planner = RealFftPlanner::<f64>::new();
        let fft = planner.plan_fft_forward(config.fft_resolution);

        // Allocate all buffers upfront
        let input_buffer = vec![0.0; config.fft_resolution];
        let spectrum = fft.make_output_vec();
        let scratch = fft.make_scratch_vec();
        let magnitudes = vec![0.0; config.fft_resolution / 2 + 1];

        let hann_window = compute_hann_window(config.fft_resolution);

        let f_min = config.frequency_min;
        let f_max = config.resolved_max_frequency(sample_rate);
        let edges = match config.bin_mapping {
            BinMapping::Normalized | BinMapping::Log10 => {
                BarEdges::Log(log_bar_edges(config.bar_count, f_min, f_max))
            }
            BinMapping::Mel => BarEdges::Mel(mel_edges(config.bar_count, f_min, f_max)),
        };

        tracing::debug!(
            "[FrameBuilder] mapping={:?}, {} bars over {:.1}-{:.1} Hz, {:.2} Hz/bin",
            config.bin_mapping,
            config.bar_count,
            f_min,
            f_max,
            sample_rate as f64 / config.fft_resolution as f64
        );

        Self {
            config: config.clone(),
            sample_rate,
            fft,
            input_buffer,
            spectrum,
            scratch,
            magnitudes,
            hann_window,
            edges,
        }
    }

    /// Process one window of samples into `bar_count` amplitudes in [0,1].
    ///
    /// Windows shorter than the FFT resolution are zero-padded at the tail.
    pub fn build(&mut self, samples: &[f32]) -> Vec<f32> {
        let n = self.config.fft_resolution;
        let len = samples.len().min(n);

        // Step 1: Sanitize. Copy to f64, squash non-finite samples, zero-pad
        for i in 0..len {
            let s = samples[i] as f64;
            self.input_buffer[i] = if s.is_finite() { s } else { 0.0 };
        }
        for i in len..n {
            self.input_buffer[i] = 0.0;
        }

        // DC removal over the whole window, padding included
        let mean = self.input_buffer.iter().sum::<f64>() / n as f64;
        if mean.is_finite() {
            for v in &mut self.input_buffer {
                *v -= mean;
            }
        }

        // Step 2: Hann window
        for (v, w) in self.input_buffer.iter_mut().zip(&self.hann_window) {
            *v *= w;
        }

        // Step 3: FFT, then magnitudes
        self.fft
            .process_with_scratch(&mut self.input_buffer, &mut self.spectrum, &mut self.scratch)
            .expect("FFT processing failed");

        for (m, c) in self.magnitudes.iter_mut().zip(&self.spectrum) {
            let mag = c.norm();
            *m = if mag.is_finite() { mag } else { 0.0 };
        }

        // Step 4: fold bins into bars
        let mut power = vec![0.0f64; self.config.bar_count];
        let mut weight = vec![0.0f64; self.config.bar_count];
        match &self.edges {
            BarEdges::Log(edges) => accumulate_log_bars(
                &self.magnitudes,
                self.sample_rate,
                n,
                edges,
                &mut power,
                &mut weight,
            ),
            BarEdges::Mel(edges) => accumulate_mel_bars(
                &self.magnitudes,
                self.sample_rate,
                n,
                edges,
                &mut power,
                &mut weight,
            ),
        }

        // Steps 5+6: dB normalization, then the soft-knee gate (mel skips it)
        let apply_knee = self.config.bin_mapping != BinMapping::Mel;
        let mut frame = vec![0.0f32; self.config.bar_count];
        for r in 0..self.config.bar_count {
            if weight[r] <= 0.0 {
                continue; // empty bars stay at exactly 0
            }

            let rms = power[r].sqrt();
            let db = 20.0 * (rms + DB_EPSILON).log10();
            let mut value = ((db - self.config.db_floor) / self.config.db_range).clamp(0.0, 1.0);

            if apply_knee {
                value = soft_knee(value);
            }

            frame[r] = value as f32;
        }

        // Step 7: neighbour smoothing
        smooth(&frame, self.config.smoothness)
    }

    pub fn config(&self) -> &EncoderConfig {
        &self.config
    }
}

/// Sigmoid gate suppressing near-silent bars: 1/(1+e^(-15(x-0.4)))
fn soft_knee(x: f64) -> f64 {
    (1.0 / (1.0 + (-15.0 * (x - 0.4)).exp())).clamp(0.0, 1.0)
}

// Precompute Hann window
fn compute_hann_window(size: usize) -> Vec<f64> {
    (0..size)
        .map(|i| {
            let angle = 2.0 * std::f64::consts::PI * i as f64 / (size - 1) as f64;
            0.5 * (1.0 - angle.cos())
        })
        .collect()
}

/// Moving average over [r-radius, r+radius], out-of-range indices ignored.
pub(crate) fn smooth(frame: &[f32], radius: usize) -> Vec<f32> {
    if radius == 0 || frame.is_empty() {
        return frame.to_vec();
    }

    (0..frame.len())
        .map(|r| {
            let lo = r.saturating_sub(radius);
            let hi = (r + radius).min(frame.len() - 1);
            let sum: f32 = frame[lo..=hi].iter().sum();
            sum / (hi - lo + 1) as f32
        })
        .collect()
}
