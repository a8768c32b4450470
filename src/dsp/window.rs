//! Window functions.
//!
//! The Blackman-Harris family is parameterised by the target sidelobe level;
//! the spectrum path uses the 61 dB variant. [`hamming`] and [`blackman`]
//! shape the FIR designs in [`super::filters`].
//!
//! # Example
//!
//! ```
//! use sdrscope::dsp::window::{Sidelobe, blackman_harris};
//!
//! let window = blackman_harris(1024, Sidelobe::Db61);
//! assert_eq!(window.len(), 1024);
//! ```

use std::f64::consts::PI;

/// Sidelobe attenuation targets with tabulated cosine-sum coefficients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sidelobe {
    Db61,
    Db67,
    Db74,
    Db92,
}

impl Sidelobe {
    fn coefficients(self) -> [f64; 4] {
        match self {
            Sidelobe::Db61 => [0.42323, 0.49755, 0.07922, 0.0],
            Sidelobe::Db67 => [0.44959, 0.49364, 0.05677, 0.0],
            Sidelobe::Db74 => [0.40271, 0.49704, 0.09392, 0.00183],
            Sidelobe::Db92 => [0.35875, 0.48829, 0.14128, 0.01168],
        }
    }
}

/// Symmetric generalized cosine window `Σ (-1)^k a_k cos(2πkn/(N-1))`.
fn cosine_sum(length: usize, a: [f64; 4]) -> Vec<f32> {
    if length < 2 {
        return vec![1.0; length];
    }
    let m = (length - 1) as f64;
    (0..length)
        .map(|n| {
            let x = 2.0 * PI * n as f64 / m;
            (a[0] - a[1] * x.cos() + a[2] * (2.0 * x).cos() - a[3] * (3.0 * x).cos()) as f32
        })
        .collect()
}

/// Symmetric Blackman-Harris window of `length` coefficients.
pub fn blackman_harris(length: usize, sidelobe: Sidelobe) -> Vec<f32> {
    cosine_sum(length, sidelobe.coefficients())
}

/// Classic Blackman window (a0 = 0.42).
pub fn blackman(length: usize) -> Vec<f32> {
    cosine_sum(length, [0.42, 0.5, 0.08, 0.0])
}

pub fn hamming(length: usize) -> Vec<f32> {
    cosine_sum(length, [0.54, 0.46, 0.0, 0.0])
}
