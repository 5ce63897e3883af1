//! Encoder configuration.
//!
//! All knobs are fixed for the lifetime of one encode session. The struct is
//! serde-friendly so the CLI can load overrides from a settings file.

use serde::{Deserialize, Serialize};

use crate::error::{FvzError, Result};
use crate::header::{QuantizeLevel, FLAG_DELTA, FLAG_QUANTIZE, FLAG_ZSTD};

/// How FFT bins are folded into bars.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BinMapping {
    /// Log-frequency bar edges with TriEase spacing, soft-knee gate applied
    #[default]
    Normalized,
    /// Identical mapping to Normalized (kept as a separate identifier for
    /// files that declare it)
    Log10,
    /// Mel-scale triangular filterbank, no soft-knee
    Mel,
}

/// Per-session encoder settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EncoderConfig {
    /// Bars per frame (1..=65535)
    pub bar_count: usize,

    /// dB floor, negative (bars at or below this normalize to 0)
    pub db_floor: f64,

    /// dB span above the floor that maps onto [0,1]
    pub db_range: f64,

    /// Lower frequency bound in Hz, must be > 0
    pub frequency_min: f64,

    /// Upper frequency bound in Hz; -1.0 means Nyquist
    pub frequency_max: f64,

    /// Moving-average smoothing radius across neighbouring bars
    pub smoothness: usize,

    /// Frequency-to-bar mapping flavour
    pub bin_mapping: BinMapping,

    /// FFT window size; power of two in [1024, 32768]
    pub fft_resolution: usize,

    /// Output frames per second
    pub fps: u16,

    /// Transform cascade bitmask (FLAG_ZSTD | FLAG_QUANTIZE | FLAG_DELTA)
    pub compression: u16,

    /// Quantization width, used when FLAG_QUANTIZE is set
    pub quantize_level: QuantizeLevel,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            bar_count: 128,
            db_floor: -80.0,
            db_range: 90.0,
            frequency_min: 20.0,
            frequency_max: -1.0,
            smoothness: 1,
            bin_mapping: BinMapping::Normalized,
            fft_resolution: 4096,
            fps: 60,
            compression: FLAG_ZSTD | FLAG_QUANTIZE | FLAG_DELTA,
            quantize_level: QuantizeLevel::Bit16,
        }
    }
}

impl EncoderConfig {
    /// Check every knob once, up front, so the pipeline can assume sane input.
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| Err(FvzError::EncoderPrecondition(msg));

        if self.bar_count == 0 || self.bar_count > u16::MAX as usize {
            return fail(format!("bar_count {} out of range 1..=65535", self.bar_count));
        }
        if !self.fft_resolution.is_power_of_two()
            || !(1024..=32768).contains(&self.fft_resolution)
        {
            return fail(format!(
                "fft_resolution {} must be a power of two in [1024, 32768]",
                self.fft_resolution
            ));
        }
        if self.fps == 0 {
            return fail("fps must be at least 1".into());
        }
        if self.db_range <= 0.0 {
            return fail(format!("db_range {} must be positive", self.db_range));
        }
        if self.db_floor >= 0.0 {
            return fail(format!("db_floor {} must be negative", self.db_floor));
        }
        if self.frequency_min <= 0.0 {
            return fail(format!("frequency_min {} must be > 0", self.frequency_min));
        }
        if self.frequency_max != -1.0 && self.frequency_max <= self.frequency_min {
            return fail(format!(
                "frequency_max {} must be -1 (Nyquist) or above frequency_min {}",
                self.frequency_max, self.frequency_min
            ));
        }

        Ok(())
    }

    /// Upper frequency bound resolved against the actual sample rate.
    pub fn resolved_max_frequency(&self, sample_rate: u32) -> f64 {
        if self.frequency_max == -1.0 {
            sample_rate as f64 / 2.0
        } else {
            self.frequency_max
        }
    }
}

// ===========  Tests ===============
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(EncoderConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_fft_resolution() {
        let mut config = EncoderConfig::default();

        config.fft_resolution = 3000; // not a power of two
        assert!(config.validate().is_err());

        config.fft_resolution = 512; // too small
        assert!(config.validate().is_err());

        config.fft_resolution = 65536; // too large
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_bad_ranges() {
        let mut config = EncoderConfig::default();
        config.bar_count = 0;
        assert!(config.validate().is_err());

        let mut config = EncoderConfig::default();
        config.db_range = 0.0;
        assert!(config.validate().is_err());

        let mut config = EncoderConfig::default();
        config.frequency_max = 10.0; // below frequency_min
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_nyquist_resolution() {
        let config = EncoderConfig::default();
        assert_eq!(config.resolved_max_frequency(48000), 24000.0);

        let mut config = EncoderConfig::default();
        config.frequency_max = 16000.0;
        assert_eq!(config.resolved_max_frequency(48000), 16000.0);
    }

    #[test]
    fn test_settings_json_round_trip() {
        let config = EncoderConfig::default();
        let json = serde_json::to_string(&config).expect("serialize failed");
        let back: EncoderConfig = serde_json::from_str(&json).expect("parse failed");
        assert_eq!(back.bar_count, config.bar_count);
        assert_eq!(back.bin_mapping, config.bin_mapping);
        assert_eq!(back.quantize_level, config.quantize_level);
    }
}
