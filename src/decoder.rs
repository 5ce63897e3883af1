//! The decoder pipeline: validate the header, invert the transform cascade
//! in reverse order, hand back every frame.
//!
//! Decoding is a single sequential pass and materializes all frames. The
//! Zstd stage is behind the `Decompressor` capability so the decoder never
//! binds to a specific compression library - inject the stock
//! `ZstdDecompressor`, a wasm shim, or a mock.

use std::path::Path;

use crate::error::{FvzError, Result};
use crate::header::{Header, HEADER_LEN};
use crate::payload;

/// Pluggable "decompress these bytes" capability.
///
/// Required whenever a file's Zstd bit is set; never touched otherwise.
pub trait Decompressor {
    fn decompress(
        &self,
        data: &[u8],
    ) -> std::result::Result<Vec<u8>, Box<dyn std::error::Error + Send + Sync>>;
}

/// Stock implementation backed by the zstd crate.
pub struct ZstdDecompressor;

impl Decompressor for ZstdDecompressor {
    fn decompress(
        &self,
        data: &[u8],
    ) -> std::result::Result<Vec<u8>, Box<dyn std::error::Error + Send + Sync>> {
        Ok(zstd::decode_all(data)?)
    }
}

/// A fully decoded `.fvz` file. Immutable after read.
#[derive(Clone, Debug)]
pub struct VisFile {
    pub header: Header,
    pub frames: Vec<Vec<f32>>,
}

impl VisFile {
    /// Nearest frame to a playback position, as a defensive copy.
    ///
    /// Rounds `ms` to the closest frame index and clamps to the valid
    /// range, so any finite timestamp yields a frame.
    pub fn frame_at_ms(&self, ms: f64) -> Vec<f32> {
        if self.frames.is_empty() {
            return Vec::new();
        }

        let frame_duration = 1000.0 / self.header.frame_rate as f64;
        let idx = (ms / frame_duration).round() as i64;
        let idx = idx.clamp(0, self.frames.len() as i64 - 1) as usize;
        self.frames[idx].clone()
    }

    pub fn total_frames(&self) -> usize {
        self.frames.len()
    }
}

/// Decode a complete `.fvz` byte image.
pub fn decode_bytes(bytes: &[u8], decompressor: Option<&dyn Decompressor>) -> Result<VisFile> {
    let header = Header::decode(bytes)?;

    let quantize = header.is_quantized();
    let delta = header.is_delta();
    let level = header.quantize_level();
    let total_frames = header.total_frames as usize;
    let num_bands = header.num_bands as usize;

    let expected = payload::encoded_len(total_frames, num_bands, quantize, level);
    let body = &bytes[HEADER_LEN..];

    let frames = if header.is_zstd() {
        // Capability first: without it there is no point reading further
        let decompressor = decompressor.ok_or(FvzError::MissingDecompressor)?;

        if body.len() < 4 {
            return Err(FvzError::TruncatedPayload {
                needed: 4,
                available: body.len(),
            });
        }
        let declared = i32::from_le_bytes(body[0..4].try_into().unwrap());
        if declared < 0 {
            return Err(FvzError::UnsupportedFormat(format!(
                "negative compressed length {}",
                declared
            )));
        }
        let declared = declared as usize;
        if body.len() - 4 < declared {
            return Err(FvzError::TruncatedPayload {
                needed: declared,
                available: body.len() - 4,
            });
        }

        let raw = decompressor
            .decompress(&body[4..4 + declared])
            .map_err(|e| FvzError::DecompressionFailed(e.to_string()))?;

        if raw.len() != expected {
            return Err(FvzError::TruncatedPayload {
                needed: expected,
                available: raw.len(),
            });
        }

        payload::decode_frames(&raw, total_frames, num_bands, quantize, delta, level)?
    } else {
        if body.len() < expected {
            return Err(FvzError::TruncatedPayload {
                needed: expected,
                available: body.len(),
            });
        }
        payload::decode_frames(&body[..expected], total_frames, num_bands, quantize, delta, level)?
    };

    tracing::debug!(
        "[Decoder] ✓ {} frames x {} bands, mask {:03b}",
        total_frames,
        num_bands,
        header.compression
    );

    Ok(VisFile { header, frames })
}

/// Read and decode a `.fvz` file from disk.
pub fn decode_file(path: impl AsRef<Path>, decompressor: Option<&dyn Decompressor>) -> Result<VisFile> {
    let bytes = std::fs::read(path.as_ref())?;
    decode_bytes(&bytes, decompressor)
}
