use crate::types::NormalizeMode;

/// Rescales one frame of band energies into `[0, target_range]`.
///
/// Degenerate frames (all zero, all equal, non-positive reference) come back
/// as all zeros rather than an error. Output is always finite.
pub fn normalize(energies: &[f32], target_range: f32, mode: NormalizeMode) -> Vec<f32> {
    if !target_range.is_finite() || target_range <= 0.0 {
        return vec![0.0; energies.len()];
    }

    let (min, max) = finite_min_max(energies);
    let scaled: Vec<f32> = match mode {
        NormalizeMode::MaxRelative => {
            if max == 0.0 || !max.is_finite() {
                return vec![0.0; energies.len()];
            }
            energies.iter().map(|&e| e / max).collect()
        }
        NormalizeMode::MinMax => {
            let span = max - min;
            if span == 0.0 || !span.is_finite() {
                return vec![0.0; energies.len()];
            }
            energies.iter().map(|&e| (e - min) / span).collect()
        }
        NormalizeMode::Fixed { reference } => {
            if !reference.is_finite() || reference <= 0.0 {
                return vec![0.0; energies.len()];
            }
            energies.iter().map(|&e| e / reference).collect()
        }
    };

    scaled
        .into_iter()
        .map(|ratio| {
            if ratio.is_finite() {
                (ratio.clamp(0.0, 1.0) * target_range).min(target_range)
            } else {
                0.0
            }
        })
        .collect()
}

// Non-finite entries are ignored; an empty or all-non-finite frame reports (0, 0).
fn finite_min_max(values: &[f32]) -> (f32, f32) {
    let mut iter = values.iter().copied().filter(|v| v.is_finite());
    let Some(first) = iter.next() else {
        return (0.0, 0.0);
    };
    iter.fold((first, first), |(lo, hi), v| (lo.min(v), hi.max(v)))
}
