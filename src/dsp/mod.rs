//! Signal processing building blocks.
//!
//! - [`window`]: Blackman-Harris windows for the spectrum path
//! - [`decimator`]: anti-aliased integer decimation of complex baseband
//! - [`filters`]: streaming low-pass FIR for real-valued signals
//! - [`fm`]: phase discriminator and de-emphasis
//! - [`resampler`]: fractional sample rate conversion to the audio rate
use num_complex::Complex;

pub mod decimator;
pub mod filters;
pub mod fm;
pub mod resampler;
pub mod window;

/// A stateful block operating on slices of complex samples.
pub trait DspBlock {
    fn process(&mut self, data: &[Complex<f32>]) -> Vec<Complex<f32>>;
}
