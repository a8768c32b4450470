//! Runtime parameters shared by the spectrum path and the receiver driver.

use crate::error::{Error, Result};

/// FFT sizes offered to the user, index `i` maps to `2^(i + 7)`.
pub const FFT_SIZES: [usize; 8] = [128, 256, 512, 1024, 2048, 4096, 8192, 16384];

/// Upper bound of the averaging control.
pub const MAX_AVERAGING_FACTOR: f32 = 16.0;

/**
 * Receiver and spectrum configuration
 */
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeParameters {
    /// Center frequency in Hz
    pub center_frequency: f64,
    /// Sample rate in Hz
    pub sample_rate: f64,
    /// Normalized gain (0.0 - 1.0)
    pub gain: f64,
    /// Index into the receiver's antenna list
    pub antenna_index: usize,
    /// FFT length, one of [`FFT_SIZES`]
    pub fft_size: usize,
    /// Temporal smoothing strength (>= 1, 1 disables smoothing)
    pub averaging_factor: f32,
    /// Receiver low-pass filter bandwidth in Hz
    pub lpf_bandwidth: f64,
    /// Receiver RX channel
    pub channel: usize,
}

impl Default for RuntimeParameters {
    fn default() -> Self {
        Self {
            center_frequency: 96.9e6,
            sample_rate: 2e6,
            gain: 0.4,
            antenna_index: 0,
            fft_size: 4096,
            averaging_factor: 4.5,
            lpf_bandwidth: 10e6,
            channel: 0,
        }
    }
}

impl RuntimeParameters {
    /// Check every field against its accepted range.
    pub fn validate(&self) -> Result<()> {
        validate_fft_size(self.fft_size)?;
        validate_gain(self.gain)?;
        validate_averaging_factor(self.averaging_factor)?;
        validate_sample_rate(self.sample_rate)?;
        Ok(())
    }
}

/// FFT size for a position in [`FFT_SIZES`].
pub fn fft_size_from_index(index: usize) -> Result<usize> {
    FFT_SIZES
        .get(index)
        .copied()
        .ok_or_else(|| Error::invalid_parameter(format!("FFT size index {} out of range", index)))
}

pub fn validate_fft_size(size: usize) -> Result<usize> {
    if FFT_SIZES.contains(&size) {
        Ok(size)
    } else {
        Err(Error::invalid_parameter(format!(
            "FFT size {} not one of {:?}",
            size, FFT_SIZES
        )))
    }
}

pub fn validate_gain(gain: f64) -> Result<f64> {
    if (0.0..=1.0).contains(&gain) {
        Ok(gain)
    } else {
        Err(Error::invalid_parameter(format!(
            "gain {} outside [0, 1]",
            gain
        )))
    }
}

pub fn validate_averaging_factor(factor: f32) -> Result<f32> {
    if factor.is_finite() && factor >= 1.0 {
        Ok(factor)
    } else {
        Err(Error::invalid_parameter(format!(
            "averaging factor {} must be >= 1",
            factor
        )))
    }
}

pub fn validate_sample_rate(rate: f64) -> Result<f64> {
    if rate.is_finite() && rate > 0.0 {
        Ok(rate)
    } else {
        Err(Error::invalid_parameter(format!(
            "sample rate {} must be positive",
            rate
        )))
    }
}
