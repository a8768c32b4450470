//! FIR design and a streaming real-valued low-pass filter.
//!
//! # Example
//!
//! ```
//! use sdrscope::dsp::filters::LowPassFir;
//!
//! // Mono audio band of a 240 kHz FM multiplex
//! let mut filter = LowPassFir::new(15_000.0, 240_000.0, 256);
//! let output = filter.process(&[0.5; 100]);
//! assert_eq!(output.len(), 100);
//! ```

use std::f32::consts::PI;

use super::window::blackman;

/// Windowed-sinc low-pass taps with unity DC gain.
///
/// `cutoff` is in cycles per sample, `window` sets the tap count.
pub fn windowed_sinc(cutoff: f32, window: &[f32]) -> Vec<f32> {
    let mid = (window.len() / 2) as f32;
    let mut taps: Vec<f32> = window
        .iter()
        .enumerate()
        .map(|(n, w)| {
            let t = n as f32 - mid;
            let ideal = if t == 0.0 {
                2.0 * cutoff
            } else {
                (2.0 * PI * cutoff * t).sin() / (PI * t)
            };
            ideal * w
        })
        .collect();

    let gain: f32 = taps.iter().sum();
    if gain != 0.0 {
        taps.iter_mut().for_each(|c| *c /= gain);
    }
    taps
}

/// Blackman-windowed sinc low-pass filter.
///
/// The filter is causal and keeps the last `taps - 1` input samples between
/// calls, so a signal may be fed in blocks of any size. The output is delayed
/// by `taps / 2` samples.
pub struct LowPassFir {
    coefficients: Vec<f32>,
    tail: Vec<f32>,
}

impl LowPassFir {
    /// Designs a filter passing up to `cutoff_freq`, both rates in Hz.
    ///
    /// # Panics
    ///
    /// On an empty filter or a non-positive sample rate.
    pub fn new(cutoff_freq: f32, sample_rate: f32, taps: usize) -> Self {
        assert!(taps >= 1, "low-pass filter needs at least one tap");
        assert!(sample_rate > 0.0, "low-pass filter needs a positive sample rate");

        Self {
            coefficients: windowed_sinc(cutoff_freq / sample_rate, &blackman(taps)),
            tail: vec![0.0; taps - 1],
        }
    }

    /// Filters a block, returning as many samples as were given.
    pub fn process(&mut self, samples: &[f32]) -> Vec<f32> {
        let n = self.coefficients.len();
        let mut line = std::mem::take(&mut self.tail);
        line.extend_from_slice(samples);

        let out = line
            .windows(n)
            .map(|w| {
                w.iter()
                    .rev()
                    .zip(&self.coefficients)
                    .map(|(x, c)| x * c)
                    .sum::<f32>()
            })
            .collect();

        line.drain(..line.len() - (n - 1));
        self.tail = line;
        out
    }

    pub fn taps(&self) -> usize {
        self.coefficients.len()
    }

    pub fn coefficients(&self) -> &[f32] {
        &self.coefficients
    }

    pub fn reset(&mut self) {
        self.tail.fill(0.0);
    }
}
