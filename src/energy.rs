//! Aggregation of FFT bins into per-band energies.

use crate::types::{Band, EnergyScale};

/// Bins at or below this level (and non-finite bins) count as silence.
pub const SILENCE_DB: f32 = -200.0;

/// Averages the dB bins inside each band. See [`compute_band_energies_with`].
pub fn compute_band_energies(
    spectrum: &[f32],
    bands: &[Band],
    sample_rate: f32,
    fft_size: usize,
) -> Vec<f32> {
    compute_band_energies_with(spectrum, bands, sample_rate, fft_size, EnergyScale::Decibel)
}

/// One energy per band, aligned with `bands`.
///
/// A band's bins are `floor(lo * N / sr) ..= min(ceil(hi * N / sr), len - 1)`.
/// A band whose range is empty gets energy 0. The result never contains NaN
/// or infinities.
pub fn compute_band_energies_with(
    spectrum: &[f32],
    bands: &[Band],
    sample_rate: f32,
    fft_size: usize,
    scale: EnergyScale,
) -> Vec<f32> {
    bands
        .iter()
        .map(|band| match bin_range(band, spectrum.len(), sample_rate, fft_size) {
            Some((lo, hi)) => average(&spectrum[lo..=hi], scale),
            None => 0.0,
        })
        .collect()
}

/// Inclusive bin range covered by `band`, or `None` when it holds no bins.
pub fn bin_range(band: &Band, len: usize, sample_rate: f32, fft_size: usize) -> Option<(usize, usize)> {
    if len == 0 || sample_rate <= 0.0 || !sample_rate.is_finite() {
        return None;
    }
    let per_hz = fft_size as f64 / sample_rate as f64;
    let lo = (band.start as f64 * per_hz).floor();
    let hi = (band.end as f64 * per_hz).ceil();
    if !lo.is_finite() || !hi.is_finite() || hi < 0.0 {
        return None;
    }

    let lo = lo.max(0.0) as usize;
    let hi = (hi as usize).min(len - 1);
    if hi < lo { None } else { Some((lo, hi)) }
}

fn sanitize(db: f32) -> f32 {
    if db.is_nan() || db < SILENCE_DB {
        SILENCE_DB
    } else {
        db.min(f32::MAX)
    }
}

fn average(bins: &[f32], scale: EnergyScale) -> f32 {
    let n = bins.len() as f64;
    match scale {
        EnergyScale::Decibel => {
            let sum: f64 = bins.iter().map(|&v| sanitize(v) as f64).sum();
            (sum / n) as f32
        }
        EnergyScale::Power => {
            let sum: f64 = bins
                .iter()
                .map(|&v| 10f64.powf(sanitize(v) as f64 / 10.0).min(f64::MAX / n))
                .sum();
            let db = 10.0 * (sum / n).log10();
            (db as f32).clamp(SILENCE_DB, f32::MAX)
        }
    }
}

/// Shifts dB energies so that `floor_db` maps to 0; anything quieter clamps to 0.
pub fn lift_above_floor(energies: &[f32], floor_db: f32) -> Vec<f32> {
    energies
        .iter()
        .map(|&e| {
            let level = e - floor_db;
            if level.is_finite() { level.max(0.0) } else { 0.0 }
        })
        .collect()
}
