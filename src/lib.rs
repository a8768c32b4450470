#![doc = include_str!("../readme.md")]

use std::ops::Deref;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use num_complex::Complex;

pub mod audio;
pub mod demod;
pub mod device;
pub mod distributor;
pub mod dsp;
pub mod error;
pub mod iqread;
pub mod notation;
pub mod params;
pub mod pipeline;
pub mod presenter;
pub mod spectrum;
pub mod tuning;
pub mod waterfall;

pub use error::{Error, Result};
pub use params::RuntimeParameters;
pub use pipeline::{Pipeline, PipelineConfig, PipelineState};

/// Sample encoding of interleaved I/Q captures.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum IqFormat {
    /// Unsigned 8-bit, offset binary (RTL-SDR)
    Cu8,
    /// Signed 8-bit (HackRF)
    Cs8,
    /// Signed 16-bit little-endian
    Cs16,
    /// 32-bit float little-endian
    Cf32,
}

impl IqFormat {
    pub(crate) fn bytes_per_sample(self) -> usize {
        match self {
            IqFormat::Cu8 | IqFormat::Cs8 => 2,
            IqFormat::Cs16 => 4,
            IqFormat::Cf32 => 8,
        }
    }
}

impl FromStr for IqFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let format = match s.to_ascii_lowercase().as_str() {
            "cu8" | "u8" => IqFormat::Cu8,
            "cs8" | "s8" => IqFormat::Cs8,
            "cs16" | "s16" => IqFormat::Cs16,
            "cf32" | "f32" => IqFormat::Cf32,
            _ => return Err(Error::format(format!("unknown I/Q format {:?}", s))),
        };
        Ok(format)
    }
}

/**
 * One delivery of complex baseband samples from the receiver.
 *
 * The samples are shared read-only between the spectrum and demodulation
 * paths, so cloning a block is cheap.
 */
#[derive(Debug, Clone)]
pub struct SampleBlock {
    samples: Arc<[Complex<f32>]>,
    received_at: Instant,
}

impl SampleBlock {
    pub fn new(samples: Vec<Complex<f32>>) -> Self {
        Self {
            samples: samples.into(),
            received_at: Instant::now(),
        }
    }

    pub fn samples(&self) -> &[Complex<f32>] {
        &self.samples
    }

    /// Arrival timestamp, taken when the driver handed the block over.
    pub fn received_at(&self) -> Instant {
        self.received_at
    }

    /// The most recent `n` samples, if the block holds at least that many.
    pub fn tail(&self, n: usize) -> Option<&[Complex<f32>]> {
        let len = self.samples.len();
        if len < n {
            None
        } else {
            Some(&self.samples[len - n..])
        }
    }
}

impl Deref for SampleBlock {
    type Target = [Complex<f32>];

    fn deref(&self) -> &Self::Target {
        &self.samples
    }
}

impl From<Vec<Complex<f32>>> for SampleBlock {
    fn from(samples: Vec<Complex<f32>>) -> Self {
        SampleBlock::new(samples)
    }
}

impl IqFormat {
    /// Decodes one I or Q component, scaled to roughly [-1, 1).
    fn component(self, raw: &[u8]) -> f32 {
        match self {
            IqFormat::Cu8 => (raw[0] as f32 - 127.5) / 128.0,
            IqFormat::Cs8 => raw[0] as i8 as f32 / 128.0,
            IqFormat::Cs16 => i16::from_le_bytes([raw[0], raw[1]]) as f32 / 32768.0,
            IqFormat::Cf32 => f32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]),
        }
    }
}

/// Interleaved I/Q bytes to complex samples; a trailing partial sample is ignored.
fn convert_bytes_to_complex(format: IqFormat, buffer: &[u8]) -> Vec<Complex<f32>> {
    let half = format.bytes_per_sample() / 2;
    buffer
        .chunks_exact(2 * half)
        .map(|pair| {
            let (i, q) = pair.split_at(half);
            Complex::new(format.component(i), format.component(q))
        })
        .collect()
}
