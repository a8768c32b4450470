//! Digit-wise frequency selection.
//!
//! The readout is a ten-digit, zero-padded frequency in Hz. Each digit can be
//! stepped up or down by `10^n`, and the result is clamped to the receiver's
//! tuning range.

/// Number of digits in the frequency readout.
pub const DIGITS: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrequencySelector {
    frequency: u32,
    min_frequency: u32,
    max_frequency: u32,
}

impl FrequencySelector {
    /// Create a selector over `[min_frequency, max_frequency]`, starting at
    /// `min_frequency`.
    pub fn new(min_frequency: u32, max_frequency: u32) -> Self {
        Self {
            frequency: min_frequency,
            min_frequency,
            max_frequency,
        }
    }

    /// Set the frequency without clamping; the driver is the authority on
    /// the accepted range.
    pub fn set_frequency(&mut self, frequency: u32) {
        self.frequency = frequency;
    }

    pub fn frequency(&self) -> u32 {
        self.frequency
    }

    /// Raise the digit of weight `10^digit`, saturating at the maximum.
    pub fn step_up(&mut self, digit: u32) -> u32 {
        let step = 10i64.saturating_pow(digit);
        let target = self.frequency as i64 + step;
        self.frequency = if target > self.max_frequency as i64 {
            self.max_frequency
        } else {
            target as u32
        };
        self.frequency
    }

    /// Lower the digit of weight `10^digit`, saturating at the minimum.
    pub fn step_down(&mut self, digit: u32) -> u32 {
        let step = 10i64.saturating_pow(digit);
        let target = self.frequency as i64 - step;
        self.frequency = if target < self.min_frequency as i64 {
            self.min_frequency
        } else {
            target as u32
        };
        self.frequency
    }

    /// Zero-padded ten-digit readout, most significant digit first.
    pub fn digits(&self) -> String {
        format!("{:0width$}", self.frequency, width = DIGITS)
    }
}
