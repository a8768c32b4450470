//! Demodulators and the adapter feeding the audio ring.

use std::f32::consts::PI;
use std::sync::Arc;

use num_complex::Complex;
use tracing::{debug, warn};

use crate::SampleBlock;
use crate::audio::{AudioRingBuffer, split_chunks};
use crate::distributor::BlockSink;
use crate::dsp::DspBlock;
use crate::dsp::decimator::Decimator;
use crate::dsp::filters::LowPassFir;
use crate::dsp::fm::{Deemphasis, Discriminator};
use crate::dsp::resampler::AudioResampler;
use crate::error::{Error, Result};

/// Signal bandwidth of broadcast FM, in Hz.
pub const WBFM_BANDWIDTH: f64 = 192_000.0;

/// Peak deviation of broadcast FM, in Hz.
const WBFM_DEVIATION: f32 = 75_000.0;

/// Audio produced by one demodulation call.
#[derive(Debug, Clone, PartialEq)]
pub enum DemodOutput {
    Mono(Vec<f32>),
    Stereo { left: Vec<f32>, right: Vec<f32> },
}

impl DemodOutput {
    /// Samples for a mono output stream, stereo being averaged down.
    pub fn into_mono(self) -> Vec<f32> {
        match self {
            DemodOutput::Mono(samples) => samples,
            DemodOutput::Stereo { left, right } => left
                .iter()
                .zip(right.iter())
                .map(|(l, r)| 0.5 * (l + r))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            DemodOutput::Mono(samples) => samples.len(),
            DemodOutput::Stereo { left, .. } => left.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Turns complex baseband into audio.
pub trait Demodulator: Send {
    /// Demodulates `samples`; `None` when no audio is ready yet.
    fn demodulate(&mut self, samples: &[Complex<f32>]) -> Option<DemodOutput>;

    /// Bandwidth of the demodulated channel, drawn as an overlay.
    fn signal_bandwidth(&self) -> Option<f64> {
        None
    }

    /// Audio output rate in Hz.
    fn output_rate(&self) -> u32;
}

/**
 * Wide-band FM demodulator
 *
 * decimate to the signal bandwidth → discriminator → 15 kHz low-pass →
 * de-emphasis → resample to the output rate.
 */
pub struct WbfmDemodulator {
    decimator: Decimator,
    discriminator: Discriminator,
    lowpass: LowPassFir,
    deemphasis: Deemphasis,
    resampler: AudioResampler,
    gain: f32,
    bandwidth: f64,
    output_rate: u32,
}

impl WbfmDemodulator {
    /// `chunk_size` is the size of every audio run returned.
    pub fn new(
        sample_rate: f64,
        bandwidth: f64,
        output_rate: u32,
        chunk_size: usize,
    ) -> Result<Self> {
        if !(sample_rate > 0.0 && bandwidth > 0.0 && output_rate > 0 && chunk_size > 0) {
            return Err(Error::invalid_parameter(format!(
                "wbfm demodulator: rate {} Hz, bandwidth {} Hz, output {} Hz",
                sample_rate, bandwidth, output_rate
            )));
        }
        let factor = ((sample_rate / bandwidth).round() as usize).max(1);
        let mpx_rate = sample_rate / factor as f64;
        debug!(
            "wbfm: decimating {} Hz by {} to {} Hz",
            sample_rate, factor, mpx_rate
        );

        Ok(Self {
            decimator: Decimator::new(factor),
            discriminator: Discriminator::default(),
            lowpass: LowPassFir::new(15_000.0, mpx_rate as f32, 128),
            deemphasis: Deemphasis::new(mpx_rate as f32, Deemphasis::EUROPE),
            resampler: AudioResampler::new(mpx_rate, output_rate as f64, chunk_size)?,
            gain: mpx_rate as f32 / (2.0 * PI * WBFM_DEVIATION),
            bandwidth,
            output_rate,
        })
    }
}

impl Demodulator for WbfmDemodulator {
    fn demodulate(&mut self, samples: &[Complex<f32>]) -> Option<DemodOutput> {
        let baseband = self.decimator.process(samples);
        let phase = self.discriminator.process(&baseband);
        let mut audio = self.lowpass.process(&phase);
        self.deemphasis.apply(&mut audio);
        audio.iter_mut().for_each(|s| *s *= self.gain);

        match self.resampler.process(&audio) {
            Ok(chunks) if chunks.is_empty() => None,
            Ok(chunks) => Some(DemodOutput::Mono(chunks.concat())),
            Err(e) => {
                warn!("wbfm resampling failed: {}", e);
                self.resampler.reset();
                None
            }
        }
    }

    fn signal_bandwidth(&self) -> Option<f64> {
        Some(self.bandwidth)
    }

    fn output_rate(&self) -> u32 {
        self.output_rate
    }
}

/**
 * Demodulation path: demodulator output cut into chunks for the audio ring
 */
pub struct DemodPath {
    demodulator: Box<dyn Demodulator>,
    ring: Arc<AudioRingBuffer>,
}

impl DemodPath {
    pub fn new(demodulator: Box<dyn Demodulator>, ring: Arc<AudioRingBuffer>) -> Self {
        Self { demodulator, ring }
    }

    /// Demodulates one block and queues every complete chunk.
    ///
    /// Returns the number of chunks queued.
    pub fn push_samples(&mut self, samples: &[Complex<f32>]) -> usize {
        let Some(output) = self.demodulator.demodulate(samples) else {
            return 0;
        };
        let audio = output.into_mono();
        let mut queued = 0;
        for chunk in split_chunks(&audio, self.ring.chunk_size()) {
            self.ring.push(chunk);
            queued += 1;
        }
        queued
    }
}

impl BlockSink for DemodPath {
    fn process(&mut self, block: &SampleBlock) {
        self.push_samples(block.samples());
    }
}
