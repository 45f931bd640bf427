use clap::ValueEnum;

/// Lowest edge of the log-spaced bands, in Hz.
pub const MIN_FREQ_HZ: f32 = 20.0;

/// A half-open frequency interval `[start, end)` in Hz, drawn as one bar.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Band {
    pub start: f32,
    pub end: f32,
}

impl Band {
    pub fn new(start: f32, end: f32) -> Self {
        Self { start, end }
    }

    pub fn width(&self) -> f32 {
        self.end - self.start
    }
}

/// How `[0, sampleRate/2]` is split into bars.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, ValueEnum)]
pub enum BandStrategy {
    /// Equal-width bands from DC to Nyquist.
    Linear,
    /// Power-law widths `n^(i/n) * bw`.
    Logarithmic,
    /// Edges evenly spaced in log10 frequency from 20 Hz to Nyquist.
    #[value(name = "stft-logged", alias = "log10")]
    StftLogged,
}

impl BandStrategy {
    pub fn label(&self) -> &'static str {
        match self {
            BandStrategy::Linear => "Linear",
            BandStrategy::Logarithmic => "Logarithmic",
            BandStrategy::StftLogged => "STFT-logged",
        }
    }

    /// Cycles through the strategies in declaration order.
    pub fn next(&self) -> BandStrategy {
        match self {
            BandStrategy::Linear => BandStrategy::Logarithmic,
            BandStrategy::Logarithmic => BandStrategy::StftLogged,
            BandStrategy::StftLogged => BandStrategy::Linear,
        }
    }
}

/// How per-band energies are rescaled into bar heights.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum NormalizeMode {
    /// Divide by the loudest band of the frame.
    MaxRelative,
    /// Stretch the frame's `[min, max]` onto the full range.
    MinMax,
    /// Divide by a fixed reference level.
    Fixed { reference: f32 },
}

impl NormalizeMode {
    pub fn label(&self) -> &'static str {
        match self {
            NormalizeMode::MaxRelative => "max",
            NormalizeMode::MinMax => "min-max",
            NormalizeMode::Fixed { .. } => "fixed",
        }
    }
}

/// Domain in which bins are averaged into a band.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum EnergyScale {
    /// Average the dB values directly.
    #[default]
    Decibel,
    /// Convert to linear power, average, then back to dB.
    Power,
}

impl EnergyScale {
    pub fn label(&self) -> &'static str {
        match self {
            EnergyScale::Decibel => "dB",
            EnergyScale::Power => "power",
        }
    }
}

/// Draw parameters for a single bar. Lives for one draw call.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BarDraw {
    pub index: usize,
    pub height: f32,
    pub total_bars: usize,
}

/// Everything a tick needs to turn a spectrum into bar heights.
#[derive(Clone, Debug, PartialEq)]
pub struct PipelineConfig {
    pub sample_rate: f32,
    pub bar_count: usize,
    pub fft_size: usize,
    pub strategy: BandStrategy,
    pub target_amplitude: f32,
    pub normalize_mode: NormalizeMode,
    pub energy_scale: EnergyScale,
    /// Level treated as silence when lifting dB energies into `[0, ..)`.
    pub db_floor: f32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000.0,
            bar_count: 64,
            fft_size: 512,
            strategy: BandStrategy::StftLogged,
            target_amplitude: 100.0,
            normalize_mode: NormalizeMode::MaxRelative,
            energy_scale: EnergyScale::Decibel,
            db_floor: -100.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategy_cycle_visits_every_variant() {
        let mut s = BandStrategy::Linear;
        let mut seen = vec![s];
        for _ in 0..2 {
            s = s.next();
            seen.push(s);
        }
        assert_eq!(
            seen,
            vec![
                BandStrategy::Linear,
                BandStrategy::Logarithmic,
                BandStrategy::StftLogged
            ]
        );
        assert_eq!(s.next(), BandStrategy::Linear);
    }

    #[test]
    fn band_width() {
        assert_eq!(Band::new(100.0, 250.0).width(), 150.0);
    }
}
