//! Error types shared across the codec.

use thiserror::Error;

/// Everything that can go wrong while encoding or decoding a `.fvz` file.
#[derive(Error, Debug)]
pub enum FvzError {
    /// Bad magic, file shorter than the header, or an unknown format version
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// The Zstd bit is set in the header but no decompressor was supplied
    #[error("Payload is Zstd-compressed but no decompressor was provided")]
    MissingDecompressor,

    /// The injected decompressor reported a failure
    #[error("Decompression failed: {0}")]
    DecompressionFailed(String),

    /// The payload is shorter than the header geometry demands
    #[error("Truncated payload: needed {needed} bytes, found {available}")]
    TruncatedPayload { needed: usize, available: usize },

    /// Underlying byte source failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Encoder called out of order (save before generate, generate before load)
    #[error("Encoder precondition failed: {0}")]
    EncoderPrecondition(String),

    /// The audio provider could not parse the input file
    #[error("Failed to read audio: {0}")]
    AudioRead(String),
}

pub type Result<T> = std::result::Result<T, FvzError>;
