//! Frequency-to-bar mapping math.
//!
//! Two families of mappings fold FFT bins into bars:
//!
//! - `Normalized` / `Log10`: bar edges laid out in log-frequency space, with
//!   the TriEase curve warping the axis so the low end gets half the bars.
//!   Bin energy is split linearly between the two bars it straddles.
//! - `Mel`: a classic triangular mel filterbank with one filter per bar.

// TriEase section boundaries. Low frequencies get the first 50% of the
// output range, the top of the spectrum decompresses from a squeezed band.
const LOW_MID: f64 = 0.40;
const HIGH_MID: f64 = 0.95;
const BLEND_W: f64 = 0.02;

// Slope of the straight middle section
const MID_SLOPE: f64 = 0.4 / (HIGH_MID - LOW_MID);

fn ease_low(t: f64) -> f64 {
    0.5 * (t / LOW_MID).sqrt()
}

fn ease_low_deriv(t: f64) -> f64 {
    0.25 * (t / LOW_MID).powf(-0.5) / LOW_MID
}

fn ease_mid(t: f64) -> f64 {
    0.5 + 0.4 * (t - LOW_MID) / (HIGH_MID - LOW_MID)
}

fn ease_high(t: f64) -> f64 {
    0.9 + 0.1 * ((t - HIGH_MID) / (1.0 - HIGH_MID)).powf(0.9)
}

fn ease_high_deriv(t: f64) -> f64 {
    0.09 * ((t - HIGH_MID) / (1.0 - HIGH_MID)).powf(-0.1) / (1.0 - HIGH_MID)
}

/// Cubic Hermite blend between two section values with their analytic
/// derivatives, over [t1, t2].
fn hermite(t: f64, t1: f64, t2: f64, v1: f64, d1: f64, v2: f64, d2: f64) -> f64 {
    let span = t2 - t1;
    let s = (t - t1) / span;
    let s2 = s * s;
    let s3 = s2 * s;

    let h00 = 2.0 * s3 - 3.0 * s2 + 1.0;
    let h10 = s3 - 2.0 * s2 + s;
    let h01 = -2.0 * s3 + 3.0 * s2;
    let h11 = s3 - s2;

    h00 * v1 + h10 * span * d1 + h01 * v2 + h11 * span * d2
}

/// Piecewise frequency-axis easing with Hermite-smoothed seams.
pub fn tri_ease(t: f64) -> f64 {
    if t <= 0.0 {
        return 0.0;
    }
    if t >= 1.0 {
        return 1.0;
    }

    if t < LOW_MID - BLEND_W {
        ease_low(t)
    } else if t < LOW_MID + BLEND_W {
        let t1 = LOW_MID - BLEND_W;
        let t2 = LOW_MID + BLEND_W;
        hermite(t, t1, t2, ease_low(t1), ease_low_deriv(t1), ease_mid(t2), MID_SLOPE)
    } else if t < HIGH_MID - BLEND_W {
        ease_mid(t)
    } else if t < HIGH_MID + BLEND_W {
        let t1 = HIGH_MID - BLEND_W;
        let t2 = HIGH_MID + BLEND_W;
        hermite(t, t1, t2, ease_mid(t1), MID_SLOPE, ease_high(t2), ease_high_deriv(t2))
    } else {
        ease_high(t)
    }
}

/// Bar edges for the Normalized/Log10 mappings: `bar_count + 1` strictly
/// increasing frequencies from `f_min` to `f_max`, eased in log space.
pub fn log_bar_edges(bar_count: usize, f_min: f64, f_max: f64) -> Vec<f64> {
    let log_min = f_min.log10();
    let log_max = f_max.log10();

    (0..=bar_count)
        .map(|r| {
            let t = r as f64 / bar_count as f64;
            10f64.powf(log_min + tri_ease(t) * (log_max - log_min))
        })
        .collect()
}

pub fn hz_to_mel(hz: f64) -> f64 {
    2595.0 * (1.0 + hz / 700.0).log10()
}

pub fn mel_to_hz(mel: f64) -> f64 {
    700.0 * (10f64.powf(mel / 2595.0) - 1.0)
}

/// Mel filterbank edges: `bar_count + 2` frequencies evenly spaced in mel
/// space between `f_min` and `f_max`, mapped back to Hz.
pub fn mel_edges(bar_count: usize, f_min: f64, f_max: f64) -> Vec<f64> {
    let mel_min = hz_to_mel(f_min);
    let mel_max = hz_to_mel(f_max);
    let steps = bar_count + 1;

    (0..=steps)
        .map(|i| mel_to_hz(mel_min + (mel_max - mel_min) * i as f64 / steps as f64))
        .collect()
}

/// Accumulate FFT magnitudes into bars along log-spaced edges.
///
/// `edges` has `bar_count + 1` entries. Each in-range bin splits its energy
/// (magnitude squared) between the bar it lands in and the next one,
/// linearly by position; the split past the last bar is dropped.
pub fn accumulate_log_bars(
    magnitudes: &[f64],
    sample_rate: u32,
    fft_resolution: usize,
    edges: &[f64],
    power: &mut [f64],
    weight: &mut [f64],
) {
    let bar_count = edges.len() - 1;
    let bin_hz = sample_rate as f64 / fft_resolution as f64;

    // Bin 0 is DC, never mapped
    for (b, &mag) in magnitudes.iter().enumerate().skip(1) {
        let f = b as f64 * bin_hz;
        if f < edges[0] || f >= edges[bar_count] {
            continue;
        }

        // Last edge at or below f
        let k = edges.partition_point(|&e| e <= f) - 1;

        let alpha = (f - edges[k]) / (edges[k + 1] - edges[k]);
        let energy = mag * mag;

        power[k] += energy * (1.0 - alpha);
        weight[k] += 1.0 - alpha;
        if k + 1 < bar_count {
            power[k + 1] += energy * alpha;
            weight[k + 1] += alpha;
        }
    }
}

/// Accumulate FFT magnitudes into bars through the mel triangular filterbank.
///
/// `edges` has `bar_count + 2` entries; filter `k` (1-based) peaks at
/// `edges[k]` and feeds bar `k - 1`. The weight accumulator counts hits.
pub fn accumulate_mel_bars(
    magnitudes: &[f64],
    sample_rate: u32,
    fft_resolution: usize,
    edges: &[f64],
    power: &mut [f64],
    weight: &mut [f64],
) {
    let bar_count = edges.len() - 2;
    let bin_hz = sample_rate as f64 / fft_resolution as f64;

    for (b, &mag) in magnitudes.iter().enumerate().skip(1) {
        let f = b as f64 * bin_hz;
        if f < edges[0] || f >= edges[bar_count + 1] {
            continue;
        }

        let k = edges.partition_point(|&e| e <= f) - 1;
        if k < 1 || k > bar_count {
            continue;
        }

        let center = edges[k];
        let w = if f <= center {
            (f - edges[k - 1]) / (center - edges[k - 1])
        } else {
            (edges[k + 1] - f) / (edges[k + 1] - center)
        };

        power[k - 1] += mag * mag * w;
        weight[k - 1] += 1.0;
    }
}
