//! The fixed 36-byte `.fvz` file header.
//!
//! The layout mirrors the platform-padded record the format originated from,
//! so every field lives at an explicit byte offset and is written/read
//! little-endian by hand. Native struct layout is never relied on.

use serde::{Deserialize, Serialize};

use crate::error::{FvzError, Result};

/// 8-byte magic tag. Only the first 6 bytes ("FFTVIS") are significant,
/// the trailing two are zero padding.
pub const MAGIC: [u8; 8] = *b"FFTVIS\0\0";

/// The only supported format version.
pub const FORMAT_VERSION: i32 = 2;

/// Total header size in bytes.
pub const HEADER_LEN: usize = 36;

// Compression bitmask, one bit per cascade stage
pub const FLAG_ZSTD: u16 = 1 << 0;
pub const FLAG_QUANTIZE: u16 = 1 << 1;
pub const FLAG_DELTA: u16 = 1 << 2;

/// Quantization width when the Quantize bit is set.
///
/// On the wire this is a single byte: 0 means 16-bit, anything else 8-bit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum QuantizeLevel {
    #[default]
    Bit16,
    Bit8,
}

impl QuantizeLevel {
    pub fn from_byte(b: u8) -> Self {
        if b == 0 {
            QuantizeLevel::Bit16
        } else {
            QuantizeLevel::Bit8
        }
    }

    pub fn to_byte(self) -> u8 {
        match self {
            QuantizeLevel::Bit16 => 0,
            QuantizeLevel::Bit8 => 1,
        }
    }
}

/// Decoded header metadata for a single `.fvz` file.
#[derive(Clone, Debug, PartialEq)]
pub struct Header {
    /// FFT window size in samples (power of two, 1024..=32768)
    pub fft_resolution: u32,

    /// Number of bars per frame
    pub num_bands: u16,

    /// Frames per second
    pub frame_rate: u16,

    /// Number of frames in the payload
    pub total_frames: u32,

    /// Maximum bar value observed during encoding, after smoothing
    pub max_amplitude: f32,

    /// Transform cascade bitmask (FLAG_ZSTD | FLAG_QUANTIZE | FLAG_DELTA)
    pub compression: u16,

    /// Raw quantize level byte; meaningless unless FLAG_QUANTIZE is set
    pub quantize_level: u8,
}

impl Header {
    pub fn is_zstd(&self) -> bool {
        self.compression & FLAG_ZSTD != 0
    }

    pub fn is_quantized(&self) -> bool {
        self.compression & FLAG_QUANTIZE != 0
    }

    pub fn is_delta(&self) -> bool {
        self.compression & FLAG_DELTA != 0
    }

    pub fn quantize_level(&self) -> QuantizeLevel {
        QuantizeLevel::from_byte(self.quantize_level)
    }

    /// Serialize to the fixed 36-byte layout.
    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        buf[0..8].copy_from_slice(&MAGIC);
        buf[8..12].copy_from_slice(&FORMAT_VERSION.to_le_bytes());
        buf[12..16].copy_from_slice(&self.fft_resolution.to_le_bytes());
        buf[16..18].copy_from_slice(&self.num_bands.to_le_bytes());
        buf[18..20].copy_from_slice(&self.frame_rate.to_le_bytes());
        buf[20..24].copy_from_slice(&self.total_frames.to_le_bytes());
        buf[24..28].copy_from_slice(&self.max_amplitude.to_le_bytes());
        buf[28..30].copy_from_slice(&self.compression.to_le_bytes());
        // buf[30..32] stays zero (record padding)
        buf[32] = self.quantize_level;
        // buf[33..36] stays zero (record padding)
        buf
    }

    /// Parse and validate the first 36 bytes of a `.fvz` file.
    ///
    /// A short buffer, wrong magic, or a version other than 2 all come back
    /// as `UnsupportedFormat`.
    pub fn decode(bytes: &[u8]) -> Result<Header> {
        if bytes.len() < HEADER_LEN {
            return Err(FvzError::UnsupportedFormat(format!(
                "file too short for header ({} bytes)",
                bytes.len()
            )));
        }

        if &bytes[0..6] != b"FFTVIS" {
            return Err(FvzError::UnsupportedFormat("bad magic".into()));
        }

        let version = i32::from_le_bytes(bytes[8..12].try_into().unwrap());
        if version != FORMAT_VERSION {
            return Err(FvzError::UnsupportedFormat(format!(
                "version {} (only version {} is supported)",
                version, FORMAT_VERSION
            )));
        }

        Ok(Header {
            fft_resolution: u32::from_le_bytes(bytes[12..16].try_into().unwrap()),
            num_bands: u16::from_le_bytes(bytes[16..18].try_into().unwrap()),
            frame_rate: u16::from_le_bytes(bytes[18..20].try_into().unwrap()),
            total_frames: u32::from_le_bytes(bytes[20..24].try_into().unwrap()),
            max_amplitude: f32::from_le_bytes(bytes[24..28].try_into().unwrap()),
            compression: u16::from_le_bytes(bytes[28..30].try_into().unwrap()),
            quantize_level: bytes[32],
        })
    }
}
