//! Spectral estimation with temporal and spectral smoothing.
//!
//! The engine keeps two independent locks: the input lock guards the latest
//! sample snapshot together with the runtime parameters and is held only to
//! copy them; the state lock guards the FFT plan, the window and the
//! smoothing cache for the duration of one computation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use tracing::{debug, trace};

use crate::SampleBlock;
use crate::dsp::window::{Sidelobe, blackman_harris};
use crate::error::{Error, Result};
use crate::params::{self, RuntimeParameters};

/// Weight of the previous (lower frequency) output bin in the inter-bin smoothing.
const SPECTRAL_PREVIOUS_WEIGHT: f32 = 0.4;
const SPECTRAL_CURRENT_WEIGHT: f32 = 0.6;

/**
 * Window coefficients for one FFT size
 */
#[derive(Debug, Clone)]
pub struct SpectralWindowConfig {
    fft_size: usize,
    coefficients: Vec<f32>,
}

impl SpectralWindowConfig {
    /// 61 dB Blackman-Harris window of `fft_size` coefficients.
    pub fn new(fft_size: usize) -> Self {
        Self {
            fft_size,
            coefficients: blackman_harris(fft_size, Sidelobe::Db61),
        }
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    pub fn coefficients(&self) -> &[f32] {
        &self.coefficients
    }

    /// Scales real and imaginary parts of each sample by its coefficient.
    pub fn apply(&self, samples: &mut [Complex<f32>]) {
        for (s, &w) in samples.iter_mut().zip(&self.coefficients) {
            s.re *= w;
            s.im *= w;
        }
    }
}

/**
 * Smoothed power spectrum in dB, natural FFT order (DC at bin 0)
 */
#[derive(Debug, Clone, PartialEq)]
pub struct SpectrumFrame {
    bins: Vec<f32>,
    center_frequency: f64,
    sample_rate: f64,
}

impl SpectrumFrame {
    pub fn new(bins: Vec<f32>, center_frequency: f64, sample_rate: f64) -> Self {
        Self {
            bins,
            center_frequency,
            sample_rate,
        }
    }

    pub fn bins(&self) -> &[f32] {
        &self.bins
    }

    pub fn fft_size(&self) -> usize {
        self.bins.len()
    }

    pub fn center_frequency(&self) -> f64 {
        self.center_frequency
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Index of the strongest bin.
    pub fn peak_bin(&self) -> Option<usize> {
        self.bins
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.total_cmp(b))
            .map(|(i, _)| i)
    }

    /// Frequency in Hz of bin `index`, bins above N/2 being negative offsets.
    pub fn bin_frequency(&self, index: usize) -> f64 {
        let n = self.bins.len() as f64;
        let offset = if index as f64 >= n / 2.0 {
            index as f64 - n
        } else {
            index as f64
        };
        self.center_frequency + offset * self.sample_rate / n
    }
}

/// FFT plan, window and smoothing cache, always sized together.
pub struct SpectrumState {
    planner: FftPlanner<f32>,
    fft: Arc<dyn Fft<f32>>,
    window: SpectralWindowConfig,
    cache: Vec<f32>,
}

impl SpectrumState {
    pub fn new(fft_size: usize) -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(fft_size);
        Self {
            planner,
            fft,
            window: SpectralWindowConfig::new(fft_size),
            cache: vec![0.0; fft_size],
        }
    }

    pub fn window(&self) -> &SpectralWindowConfig {
        &self.window
    }

    /// Temporally smoothed values kept from the previous frame.
    pub fn cache(&self) -> &[f32] {
        &self.cache
    }

    fn resize(&mut self, fft_size: usize) {
        if self.window.fft_size() != fft_size {
            debug!("regenerating window for fft size {}", fft_size);
            self.window = SpectralWindowConfig::new(fft_size);
            self.fft = self.planner.plan_fft_forward(fft_size);
        }
        if self.cache.len() != fft_size {
            self.cache = vec![0.0; fft_size];
        }
    }

    /// Computes one frame from a snapshot of exactly `params.fft_size` samples.
    pub fn compute(
        &mut self,
        snapshot: &[Complex<f32>],
        params: &RuntimeParameters,
    ) -> Result<SpectrumFrame> {
        let fft_size = params.fft_size;
        if snapshot.len() != fft_size {
            return Err(Error::InsufficientSamples {
                needed: fft_size,
                available: snapshot.len(),
            });
        }
        self.resize(fft_size);

        let mut buffer = snapshot.to_vec();
        self.window.apply(&mut buffer);
        self.fft.process(&mut buffer);

        let norm = (1.0 / params.sample_rate) as f32;
        let acc = params.averaging_factor;
        let mut bins = Vec::with_capacity(fft_size);
        let mut last = 0.0f32;

        for (i, x) in buffer.iter().enumerate() {
            let mut db = 10.0 * (x.norm_sqr() * norm).log10();
            if !db.is_finite() {
                db = 0.0;
            }
            let smoothed = (self.cache[i] * (acc - 1.0) + db) / acc;
            self.cache[i] = smoothed;

            let value = if i == 0 {
                smoothed
            } else {
                last * SPECTRAL_PREVIOUS_WEIGHT + smoothed * SPECTRAL_CURRENT_WEIGHT
            };
            bins.push(value);
            last = value;
        }

        Ok(SpectrumFrame::new(
            bins,
            params.center_frequency,
            params.sample_rate,
        ))
    }
}

struct SpectrumInput {
    snapshot: Vec<Complex<f32>>,
    params: RuntimeParameters,
}

/**
 * Shared spectrum engine
 *
 * `submit` is called from the spectrum worker with each forwarded block,
 * `compute` may run on any thread.
 */
pub struct SpectrumEngine {
    input: Mutex<SpectrumInput>,
    state: Mutex<SpectrumState>,
    frames: AtomicU64,
    skipped: AtomicU64,
}

impl SpectrumEngine {
    pub fn new(params: RuntimeParameters) -> Result<Self> {
        params.validate()?;
        let fft_size = params.fft_size;
        Ok(Self {
            input: Mutex::new(SpectrumInput {
                snapshot: Vec::new(),
                params,
            }),
            state: Mutex::new(SpectrumState::new(fft_size)),
            frames: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
        })
    }

    fn input(&self) -> MutexGuard<'_, SpectrumInput> {
        self.input.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Copies the most recent `fft_size` samples of `block` as the snapshot.
    pub fn submit(&self, block: &SampleBlock) -> Result<()> {
        let mut input = self.input();
        let fft_size = input.params.fft_size;
        match block.tail(fft_size) {
            Some(tail) => {
                input.snapshot.clear();
                input.snapshot.extend_from_slice(tail);
                Ok(())
            }
            None => {
                self.skipped.fetch_add(1, Ordering::Relaxed);
                Err(Error::InsufficientSamples {
                    needed: fft_size,
                    available: block.len(),
                })
            }
        }
    }

    /// Runs the FFT and smoothing over the current snapshot.
    pub fn compute(&self) -> Result<SpectrumFrame> {
        let (snapshot, params) = {
            let input = self.input();
            (input.snapshot.clone(), input.params.clone())
        };
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let frame = state.compute(&snapshot, &params)?;
        self.frames.fetch_add(1, Ordering::Relaxed);
        trace!("spectrum frame of {} bins", frame.fft_size());
        Ok(frame)
    }

    /// Submits `block` and computes a frame from it.
    pub fn process(&self, block: &SampleBlock) -> Result<SpectrumFrame> {
        self.submit(block)?;
        self.compute()
    }

    pub fn params(&self) -> RuntimeParameters {
        self.input().params.clone()
    }

    /// Applies `f` to a copy of the parameters and stores it if still valid.
    pub fn update_params<F>(&self, f: F) -> Result<RuntimeParameters>
    where
        F: FnOnce(&mut RuntimeParameters),
    {
        let mut input = self.input();
        let mut params = input.params.clone();
        f(&mut params);
        params.validate()?;
        if params.fft_size != input.params.fft_size {
            input.snapshot.clear();
        }
        input.params = params.clone();
        Ok(params)
    }

    pub fn set_fft_size(&self, fft_size: usize) -> Result<()> {
        let fft_size = params::validate_fft_size(fft_size)?;
        self.update_params(|p| p.fft_size = fft_size).map(|_| ())
    }

    pub fn set_averaging_factor(&self, factor: f32) -> Result<()> {
        let factor = params::validate_averaging_factor(factor)?;
        self.update_params(|p| p.averaging_factor = factor).map(|_| ())
    }

    /// Frames computed so far.
    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    /// Blocks rejected for being shorter than the FFT size.
    pub fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }

    /// Window size and cache size currently held by the state.
    pub fn state_sizes(&self) -> (usize, usize) {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        (state.window.fft_size(), state.cache.len())
    }
}
