//! Band definitions: split `[0, sampleRate/2]` into `bar_count` intervals.

use crate::error::{Result, VisualizerError};
use crate::types::{Band, BandStrategy, MIN_FREQ_HZ};

/// Computes the ordered frequency bands for one parameter set.
///
/// Pure and deterministic: identical inputs give bit-identical output.
///
/// The logarithmic strategy is a power-law approximation. Its first band
/// starts at `bw` rather than 0, and with `bar_count == 1` the base of the
/// power is 1 so the single band collapses to `[sr/2, sr/2)`.
pub fn compute_bands(sample_rate: f32, bar_count: usize, strategy: BandStrategy) -> Result<Vec<Band>> {
    if bar_count == 0 {
        return Err(VisualizerError::InvalidParameter(
            "bar count must be at least 1".into(),
        ));
    }
    if !sample_rate.is_finite() || sample_rate <= 0.0 {
        return Err(VisualizerError::InvalidParameter(format!(
            "sample rate must be positive, got {sample_rate}"
        )));
    }

    let nyquist = sample_rate / 2.0;
    let bands = match strategy {
        BandStrategy::Linear => linear_bands(nyquist, bar_count),
        BandStrategy::Logarithmic => power_law_bands(nyquist, bar_count),
        BandStrategy::StftLogged => {
            if nyquist <= MIN_FREQ_HZ {
                return Err(VisualizerError::InvalidParameter(format!(
                    "sample rate {sample_rate} Hz leaves no room above {MIN_FREQ_HZ} Hz"
                )));
            }
            log10_bands(nyquist, bar_count)
        }
    };
    Ok(bands)
}

fn linear_bands(nyquist: f32, bar_count: usize) -> Vec<Band> {
    let bandwidth = nyquist / bar_count as f32;
    (0..bar_count)
        .map(|i| {
            let start = i as f32 * bandwidth;
            // pin the last edge so rounding never leaves a gap below Nyquist
            let end = if i == bar_count - 1 {
                nyquist
            } else {
                (i + 1) as f32 * bandwidth
            };
            Band::new(start, end)
        })
        .collect()
}

fn power_law_bands(nyquist: f32, bar_count: usize) -> Vec<Band> {
    let n = bar_count as f32;
    let bandwidth = nyquist / n;
    let edge = |i: usize| n.powf(i as f32 / n) * bandwidth;
    (0..bar_count)
        .map(|i| Band::new(edge(i), edge(i + 1)))
        .collect()
}

fn log10_bands(nyquist: f32, bar_count: usize) -> Vec<Band> {
    let lo = MIN_FREQ_HZ.log10();
    let step = (nyquist.log10() - lo) / bar_count as f32;

    let mut edges: Vec<f32> = (0..=bar_count)
        .map(|i| 10f32.powf(lo + i as f32 * step))
        .collect();
    edges[0] = MIN_FREQ_HZ;
    edges[bar_count] = nyquist;

    edges.windows(2).map(|w| Band::new(w[0], w[1])).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn linear_scenario_48k_four_bars() {
        let bands = compute_bands(48_000.0, 4, BandStrategy::Linear).unwrap();
        assert_eq!(
            bands,
            vec![
                Band::new(0.0, 6000.0),
                Band::new(6000.0, 12000.0),
                Band::new(12000.0, 18000.0),
                Band::new(18000.0, 24000.0),
            ]
        );
    }

    #[test]
    fn linear_partitions_evenly() {
        for &(sr, n) in &[(44_100.0f32, 7usize), (48_000.0, 64), (8_000.0, 1), (96_000.0, 333)] {
            let bands = compute_bands(sr, n, BandStrategy::Linear).unwrap();
            assert_eq!(bands.len(), n);
            assert_eq!(bands[0].start, 0.0);
            assert_eq!(bands[n - 1].end, sr / 2.0);
            let bw = sr / 2.0 / n as f32;
            for w in bands.windows(2) {
                assert_eq!(w[0].end, w[1].start);
            }
            for b in &bands {
                assert!(b.start < b.end);
                assert_relative_eq!(b.width(), bw, max_relative = 1e-3);
            }
        }
    }

    #[test]
    fn stft_logged_covers_20hz_to_nyquist() {
        for &n in &[1usize, 4, 64, 200] {
            let bands = compute_bands(48_000.0, n, BandStrategy::StftLogged).unwrap();
            assert_eq!(bands.len(), n);
            assert_relative_eq!(bands[0].start, 20.0, epsilon = 1e-4);
            assert_relative_eq!(bands[n - 1].end, 24_000.0, epsilon = 1e-2);
            for w in bands.windows(2) {
                assert_eq!(w[0].end, w[1].start);
                assert!(w[0].start < w[1].start);
            }
        }
    }

    #[test]
    fn stft_logged_first_band_scenario() {
        let bands = compute_bands(48_000.0, 64, BandStrategy::StftLogged).unwrap();
        let expected_end =
            20.0f32 * 10f32.powf((24_000f32.log10() - 20f32.log10()) / 64.0);
        assert_relative_eq!(bands[0].start, 20.0, epsilon = 1e-4);
        assert_relative_eq!(bands[0].end, expected_end, max_relative = 1e-4);
    }

    #[test]
    fn power_law_follows_formula() {
        let n = 8usize;
        let bands = compute_bands(48_000.0, n, BandStrategy::Logarithmic).unwrap();
        let bw = 24_000.0f32 / n as f32;
        assert_relative_eq!(bands[0].start, bw, max_relative = 1e-5);
        assert_relative_eq!(bands[n - 1].end, 24_000.0, max_relative = 1e-4);
        for (i, b) in bands.iter().enumerate() {
            let expect = (n as f32).powf(i as f32 / n as f32) * bw;
            assert_relative_eq!(b.start, expect, max_relative = 1e-5);
            assert!(b.start < b.end);
        }
    }

    #[test]
    fn power_law_single_bar_is_degenerate() {
        let bands = compute_bands(48_000.0, 1, BandStrategy::Logarithmic).unwrap();
        assert_eq!(bands, vec![Band::new(24_000.0, 24_000.0)]);
    }

    #[test]
    fn rejects_bad_parameters() {
        assert!(matches!(
            compute_bands(48_000.0, 0, BandStrategy::Linear),
            Err(VisualizerError::InvalidParameter(_))
        ));
        assert!(matches!(
            compute_bands(0.0, 8, BandStrategy::Linear),
            Err(VisualizerError::InvalidParameter(_))
        ));
        assert!(matches!(
            compute_bands(f32::NAN, 8, BandStrategy::Logarithmic),
            Err(VisualizerError::InvalidParameter(_))
        ));
        assert!(matches!(
            compute_bands(30.0, 8, BandStrategy::StftLogged),
            Err(VisualizerError::InvalidParameter(_))
        ));
    }

    #[test]
    fn identical_inputs_are_bit_identical() {
        for strategy in [
            BandStrategy::Linear,
            BandStrategy::Logarithmic,
            BandStrategy::StftLogged,
        ] {
            let a = compute_bands(44_100.0, 37, strategy).unwrap();
            let b = compute_bands(44_100.0, 37, strategy).unwrap();
            let bits = |v: &[Band]| -> Vec<(u32, u32)> {
                v.iter().map(|b| (b.start.to_bits(), b.end.to_bits())).collect()
            };
            assert_eq!(bits(&a), bits(&b));
        }
    }
}
