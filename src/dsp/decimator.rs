//! Integer-factor decimation of complex baseband.
//!
//! A Hamming-windowed sinc runs ahead of the downsampler to keep everything
//! above the new Nyquist rate out of the output. Filter history and the
//! decimation phase are carried across calls, so splitting the input into
//! blocks does not change the output.
//!
//! ```rust
//! use sdrscope::dsp::DspBlock;
//! use sdrscope::dsp::decimator::Decimator;
//! use num_complex::Complex;
//!
//! let mut decimator = Decimator::new(8);
//! let output = decimator.process(&vec![Complex::new(1.0, 0.0); 1024]);
//! assert_eq!(output.len(), 128);
//! ```
use num_complex::Complex;

use super::DspBlock;
use super::filters::windowed_sinc;
use super::window::hamming;

const DEFAULT_TAPS: usize = 31;

pub struct Decimator {
    factor: usize,
    fir: Vec<f32>,
    /// Last `taps - 1` input samples
    history: Vec<Complex<f32>>,
    /// Input samples to skip before the next output
    phase: usize,
}

impl Decimator {
    /// Keeps one sample in `factor`, with the cutoff at the output Nyquist rate.
    ///
    /// # Panics
    /// If `factor` is 0.
    pub fn new(factor: usize) -> Self {
        assert!(factor >= 1, "decimation factor must be at least 1");
        Self::with_params(factor, DEFAULT_TAPS, 0.5 / factor as f32)
    }

    /// Decimator with an explicit filter length and cutoff, the latter in
    /// cycles per input sample.
    ///
    /// # Panics
    /// If `factor` or `taps` is 0, or `cutoff` lies outside (0, 0.5].
    pub fn with_params(factor: usize, taps: usize, cutoff: f32) -> Self {
        assert!(factor >= 1, "decimation factor must be at least 1");
        assert!(taps >= 1, "anti-alias filter needs at least one tap");
        assert!(
            cutoff > 0.0 && cutoff <= 0.5,
            "anti-alias cutoff {cutoff} outside (0, 0.5]"
        );

        Self {
            factor,
            fir: windowed_sinc(cutoff, &hamming(taps)),
            history: vec![Complex::default(); taps - 1],
            phase: 0,
        }
    }

    pub fn factor(&self) -> usize {
        self.factor
    }

    pub fn taps(&self) -> usize {
        self.fir.len()
    }

    /// Clears the filter history and decimation phase.
    pub fn reset(&mut self) {
        self.history.fill(Complex::default());
        self.phase = 0;
    }
}

impl DspBlock for Decimator {
    fn process(&mut self, data: &[Complex<f32>]) -> Vec<Complex<f32>> {
        let taps = self.fir.len();
        let mut line = std::mem::take(&mut self.history);
        line.extend_from_slice(data);

        let output: Vec<Complex<f32>> = (self.phase..data.len())
            .step_by(self.factor)
            .map(|i| {
                // Newest sample of the window is input sample `i`
                line[i..i + taps]
                    .iter()
                    .rev()
                    .zip(&self.fir)
                    .map(|(&s, &c)| s * c)
                    .sum::<Complex<f32>>()
            })
            .collect();

        // Distance from the end of this block to the next kept sample
        let consumed = self.phase + output.len() * self.factor;
        self.phase = consumed.saturating_sub(data.len());

        line.drain(..line.len() - (taps - 1));
        self.history = line;
        output
    }
}
