//! Sample rate conversion to a fixed output chunk size.
//!
//! Wraps rubato's [`SincFixedOut`]: input of any length is buffered until the
//! resampler can produce a complete output chunk, so every call returns a
//! whole number of chunks.
use rubato::{
    Resampler, SincFixedOut, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

use crate::error::{Error, Result};

pub struct AudioResampler {
    resampler: SincFixedOut<f32>,
    leftover: Vec<f32>,
    chunk_size: usize,
}

impl AudioResampler {
    /// Mono resampler from `input_rate` to `output_rate`, producing chunks of
    /// `chunk_size` frames.
    pub fn new(input_rate: f64, output_rate: f64, chunk_size: usize) -> Result<Self> {
        if input_rate <= 0.0 || output_rate <= 0.0 {
            return Err(Error::invalid_parameter(format!(
                "resampling {} Hz to {} Hz",
                input_rate, output_rate
            )));
        }
        let params = SincInterpolationParameters {
            sinc_len: 256,
            f_cutoff: 0.95,
            interpolation: SincInterpolationType::Cubic,
            oversampling_factor: 160,
            window: WindowFunction::BlackmanHarris2,
        };
        let resampler =
            SincFixedOut::<f32>::new(output_rate / input_rate, 1.1, params, chunk_size, 1)
                .map_err(|e| Error::Resampler(e.to_string()))?;

        Ok(Self {
            resampler,
            leftover: Vec::new(),
            chunk_size,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Input frames buffered and not yet consumed.
    pub fn pending(&self) -> usize {
        self.leftover.len()
    }

    /// Pushes `input` and returns every complete output chunk now available.
    pub fn process(&mut self, input: &[f32]) -> Result<Vec<Vec<f32>>> {
        self.leftover.extend_from_slice(input);

        let mut chunks = Vec::new();
        loop {
            let needed = self.resampler.input_frames_next();
            if self.leftover.len() < needed {
                break;
            }
            let block = vec![self.leftover.drain(..needed).collect::<Vec<f32>>()];
            let mut output = self
                .resampler
                .process(&block, None)
                .map_err(|e| Error::Resampler(e.to_string()))?;
            if let Some(channel) = output.pop() {
                chunks.push(channel);
            }
        }
        Ok(chunks)
    }

    pub fn reset(&mut self) {
        self.resampler.reset();
        self.leftover.clear();
    }
}
