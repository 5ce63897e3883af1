use std::io::{self, Write};
use std::path::Path;
use std::thread;

use anyhow::{bail, Context};
use crossbeam_channel::bounded;
use tracing_subscriber::EnvFilter;

use fftvis::{decode_file, Encoder, EncoderConfig, ZstdDecompressor};

/// Optional settings file checked in the working directory
const SETTINGS_FILE: &str = "fvz-settings.json";

fn main() -> anyhow::Result<()> {
    // =====================================================================
    // 1. Setup logging (stderr, RUST_LOG-aware, default "info")
    // =====================================================================
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(env_filter)
        .init();

    tracing::info!("=== FFTVIS Codec v{} ===", env!("CARGO_PKG_VERSION"));

    // =====================================================================
    // 2. Menu
    // =====================================================================
    println!("1 - Decode");
    println!("2 - Encode");
    let choice = prompt("> ")?;
    let path = prompt("File path: ")?;
    if path.is_empty() {
        bail!("no file path given");
    }

    match choice.as_str() {
        "1" => decode(&path),
        "2" => encode(&path),
        other => bail!("unknown option '{}', expected 1 or 2", other),
    }
}

// ========================================================================
// DECODE
// ========================================================================
fn decode(path: &str) -> anyhow::Result<()> {
    let vis = decode_file(path, Some(&ZstdDecompressor))
        .with_context(|| format!("decoding {}", path))?;

    let header = &vis.header;
    let duration_s = if header.frame_rate > 0 {
        header.total_frames as f64 / header.frame_rate as f64
    } else {
        0.0
    };

    println!("Decoded {}", path);
    println!("  bands:          {}", header.num_bands);
    println!("  frame rate:     {} fps", header.frame_rate);
    println!("  total frames:   {} ({:.1}s)", header.total_frames, duration_s);
    println!("  fft resolution: {}", header.fft_resolution);
    println!("  max amplitude:  {:.4}", header.max_amplitude);
    println!(
        "  cascade:        zstd={} quantize={} delta={} ({:?})",
        header.is_zstd(),
        header.is_quantized(),
        header.is_delta(),
        header.quantize_level()
    );

    // A quick look at the opening frame so a decode feels like something
    let first = vis.frame_at_ms(0.0);
    if !first.is_empty() {
        let preview: String = first
            .iter()
            .take(32)
            .map(|&v| {
                // 0..1 mapped onto a five-step bar glyph
                const GLYPHS: [char; 5] = [' ', '.', ':', '|', '#'];
                GLYPHS[((v * 4.0).round() as usize).min(4)]
            })
            .collect();
        println!("  frame[0]:       [{}]", preview);
    }

    Ok(())
}

// ========================================================================
// ENCODE
// ========================================================================
fn encode(path: &str) -> anyhow::Result<()> {
    let config = load_settings();

    let mut encoder = Encoder::new(config)?;
    encoder
        .load_audio_file(path)
        .with_context(|| format!("loading {}", path))?;

    // Workers report progress into a bounded channel; a printer thread
    // drains it so the hot path never blocks on the terminal
    let (tx, rx) = bounded::<(u32, u32)>(64);
    let printer = thread::spawn(move || {
        for (done, total) in rx {
            if done % 50 == 0 || done == total {
                eprint!("\r[Encode] {}/{} frames", done, total);
                let _ = io::stderr().flush();
            }
        }
        eprintln!();
    });

    let sink = move |done: u32, total: u32| {
        // Dropped ticks are fine, the next one catches up
        let _ = tx.try_send((done, total));
    };
    let result = encoder.generate_frames(Some(&sink));
    drop(sink); // closes the channel so the printer can exit
    let _ = printer.join();
    result?;

    let out = Path::new(path).with_extension("fvz");
    let written = encoder.save_to_file(&out)?;
    println!(
        "Wrote {} ({} frames, max amplitude {:.4})",
        written.display(),
        encoder.frames().map_or(0, |f| f.len()),
        encoder.max_amplitude()
    );

    Ok(())
}

/// Read `fvz-settings.json` if present, otherwise fall back to defaults.
fn load_settings() -> EncoderConfig {
    match std::fs::read_to_string(SETTINGS_FILE) {
        Ok(text) => match serde_json::from_str(&text) {
            Ok(config) => {
                tracing::info!("[Main] ✓ Loaded {}", SETTINGS_FILE);
                config
            }
            Err(e) => {
                tracing::warn!(
                    "[Main] ⚠️ Ignoring malformed {}: {}",
                    SETTINGS_FILE,
                    e
                );
                EncoderConfig::default()
            }
        },
        Err(_) => EncoderConfig::default(),
    }
}

fn prompt(label: &str) -> io::Result<String> {
    print!("{}", label);
    io::stdout().flush()?;

    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_string())
}
