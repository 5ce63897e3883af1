//! Encoder and decoder for the FFTVIS (`.fvz`) format: pre-rendered audio
//! spectrum visualizations as a time-ordered sequence of frames, each a
//! fixed number of bar amplitudes in [0,1].
//!
//! Encoding trades effort for playback cheapness - a player only has to look
//! up a frame by timestamp and draw bars. The pipeline windows mono PCM,
//! runs an FFT per frame, folds bins into bars (log-frequency or mel), and
//! serializes through an optional cascade of quantization, inter-frame delta
//! encoding, and Zstd compression. Every cascade combination decodes back
//! exactly (within the quantization step).
//!
//! ```no_run
//! use fftvis::{decode_file, Encoder, EncoderConfig, ZstdDecompressor};
//!
//! # fn main() -> fftvis::Result<()> {
//! let mut encoder = Encoder::new(EncoderConfig::default())?;
//! encoder.load_audio_file("song.wav")?;
//! encoder.generate_frames(None)?;
//! encoder.save_to_file("song.fvz")?;
//!
//! let vis = decode_file("song.fvz", Some(&ZstdDecompressor))?;
//! let bars = vis.frame_at_ms(1500.0);
//! # let _ = bars;
//! # Ok(())
//! # }
//! ```

pub mod audio_input;
pub mod bin_mapping;
pub mod config;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod frame_builder;
pub mod header;
pub mod payload;

pub use audio_input::AudioData;
pub use config::{BinMapping, EncoderConfig};
pub use decoder::{decode_bytes, decode_file, Decompressor, VisFile, ZstdDecompressor};
pub use encoder::{Encoder, ProgressSink};
pub use error::{FvzError, Result};
pub use header::{Header, QuantizeLevel, FLAG_DELTA, FLAG_QUANTIZE, FLAG_ZSTD};
