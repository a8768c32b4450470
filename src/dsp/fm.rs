//! FM discriminator and de-emphasis.
//!
//! ```
//! use sdrscope::dsp::fm::{Deemphasis, Discriminator};
//! use num_complex::Complex;
//!
//! let mut discriminator = Discriminator::default();
//! let mut deemphasis = Deemphasis::new(240_000.0, Deemphasis::EUROPE);
//!
//! let mut audio = discriminator.process(&[Complex::new(0.5, 0.5); 100]);
//! deemphasis.apply(&mut audio);
//! assert_eq!(audio.len(), 100);
//! ```

use num_complex::Complex;

/// Polar discriminator: phase step between consecutive samples.
///
/// Outputs radians per sample; a deviation `f` at sample rate `fs` yields
/// `2π·f/fs`.
#[derive(Debug, Clone)]
pub struct Discriminator {
    previous: Complex<f32>,
}

impl Default for Discriminator {
    fn default() -> Self {
        Self {
            previous: Complex::new(1.0, 0.0),
        }
    }
}

impl Discriminator {
    pub fn process(&mut self, baseband: &[Complex<f32>]) -> Vec<f32> {
        let mut out = Vec::with_capacity(baseband.len());
        for &z in baseband {
            out.push((z * self.previous.conj()).arg());
            self.previous = z;
        }
        out
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// One-pole low-pass undoing broadcast pre-emphasis.
#[derive(Debug, Clone)]
pub struct Deemphasis {
    alpha: f32,
    state: f32,
}

impl Deemphasis {
    /// 50 µs time constant
    pub const EUROPE: f32 = 50e-6;
    /// 75 µs time constant
    pub const AMERICAS: f32 = 75e-6;

    pub fn new(sample_rate: f32, tau: f32) -> Self {
        Self {
            alpha: 1.0 - (-1.0 / (sample_rate * tau)).exp(),
            state: 0.0,
        }
    }

    /// Filters `samples` in place.
    pub fn apply(&mut self, samples: &mut [f32]) {
        for s in samples.iter_mut() {
            self.state += self.alpha * (*s - self.state);
            *s = self.state;
        }
    }

    pub fn reset(&mut self) {
        self.state = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f32::consts::TAU;

    fn carrier(cycles_per_sample: f32, n: usize) -> Vec<Complex<f32>> {
        (0..n)
            .map(|i| Complex::from_polar(0.7, TAU * cycles_per_sample * i as f32))
            .collect()
    }

    #[test]
    fn test_unmodulated_carrier_reads_zero() {
        let out = Discriminator::default().process(&carrier(0.0, 16));
        assert_eq!(out.len(), 16);
        assert!(out.iter().all(|d| d.abs() < 1e-6));
    }

    #[test]
    fn test_offset_carrier_reads_its_frequency() {
        for f in [0.05, -0.2] {
            let out = Discriminator::default().process(&carrier(f, 50));
            for &d in &out[1..] {
                assert_relative_eq!(d, TAU * f, epsilon = 1e-3);
            }
        }
    }

    #[test]
    fn test_discriminator_spans_blocks() {
        let samples = carrier(0.04, 64);
        let mut discriminator = Discriminator::default();
        let _ = discriminator.process(&samples[..10]);
        let rest = discriminator.process(&samples[10..]);
        assert_relative_eq!(rest[0], TAU * 0.04, epsilon = 1e-4);

        discriminator.reset();
        assert_eq!(discriminator.previous, Complex::new(1.0, 0.0));
    }

    #[test]
    fn test_deemphasis_passes_dc() {
        let mut deemphasis = Deemphasis::new(240_000.0, Deemphasis::EUROPE);
        let mut samples = vec![-0.3; 300];
        deemphasis.apply(&mut samples);
        assert_relative_eq!(samples[299], -0.3, epsilon = 1e-3);
    }

    #[test]
    fn test_deemphasis_step_response_is_monotonic() {
        let mut deemphasis = Deemphasis::new(48_000.0, Deemphasis::AMERICAS);
        let mut samples = vec![1.0; 20];
        deemphasis.apply(&mut samples);
        assert!(samples.windows(2).all(|w| w[1] > w[0]));
        assert!(samples[19] < 1.0);

        deemphasis.reset();
        let mut zeros = [0.0; 4];
        deemphasis.apply(&mut zeros);
        assert_eq!(zeros, [0.0; 4]);
    }

    #[test]
    fn test_longer_time_constant_is_slower() {
        let eu = Deemphasis::new(240_000.0, Deemphasis::EUROPE);
        let us = Deemphasis::new(240_000.0, Deemphasis::AMERICAS);
        assert!(us.alpha < eu.alpha);
    }
}
