//! Receiver pipeline: device, sample distribution, spectrum display and audio.
//!
//! A [`Pipeline`] owns everything that used to be process-wide state: the
//! runtime parameters (held by the spectrum engine), the display presenter,
//! the audio ring, and, once initialized, the open receiver and audio stream.
//! Lifecycle transitions happen under one lock so that readers never observe
//! a half-built session.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::audio::{AudioRenderer, AudioRingBuffer, DEFAULT_RING_CAPACITY, DEFAULT_SILENCE_PRELOAD};
use crate::demod::{DemodPath, Demodulator, WBFM_BANDWIDTH, WbfmDemodulator};
use crate::device::{AudioBackend, AudioStream, DeviceProvider, Receiver, StreamParams};
use crate::distributor::{self, DistributorStats, SPECTRUM_INTERVAL, SampleDistributor, Workers};
use crate::error::{Error, Result};
use crate::params::{self, RuntimeParameters};
use crate::presenter::{DisplayPresenter, SpectrumPath};
use crate::spectrum::SpectrumEngine;
use crate::tuning::FrequencySelector;
use crate::waterfall::DisplaySettings;

/// Builds the demodulator for the current parameters and output stream.
pub type DemodulatorFactory =
    Box<dyn Fn(&RuntimeParameters, &StreamParams) -> Result<Box<dyn Demodulator>> + Send + Sync>;

/**
 * Pipeline configuration
 */
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub params: RuntimeParameters,
    pub stream: StreamParams,
    /// Audio chunks held before the oldest is dropped
    pub ring_capacity: usize,
    /// Silence chunks queued before the audio stream opens
    pub silence_preload: usize,
    /// Signal bandwidth handed to the demodulator, in Hz
    pub demod_bandwidth: f64,
    pub display: DisplaySettings,
    pub spectrum_interval: Duration,
    /// Tuning range of the frequency selector, in Hz
    pub min_frequency: u32,
    pub max_frequency: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            params: RuntimeParameters::default(),
            stream: StreamParams::default(),
            ring_capacity: DEFAULT_RING_CAPACITY,
            silence_preload: DEFAULT_SILENCE_PRELOAD,
            demod_bandwidth: WBFM_BANDWIDTH,
            display: DisplaySettings::default(),
            spectrum_interval: SPECTRUM_INTERVAL,
            min_frequency: 100_000,
            max_frequency: 3_800_000_000,
        }
    }
}

/// Where the pipeline is in its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineState {
    Uninitialized,
    Loading,
    Ready,
    /// Initialization failed; the message is kept for display and a retry
    /// starts from scratch.
    Failed(String),
}

/// Everything that exists only between a successful initialize and close.
struct Session {
    device: Box<dyn Receiver>,
    device_name: String,
    stream: Box<dyn AudioStream>,
    distributor: Arc<SampleDistributor>,
    workers: Workers,
    antennas: Vec<String>,
}

struct Lifecycle {
    state: PipelineState,
    running: bool,
    session: Option<Session>,
}

pub struct Pipeline {
    config: PipelineConfig,
    provider: Box<dyn DeviceProvider>,
    audio: Box<dyn AudioBackend>,
    demodulator: DemodulatorFactory,
    engine: Arc<SpectrumEngine>,
    presenter: Arc<DisplayPresenter>,
    ring: Arc<AudioRingBuffer>,
    selector: Mutex<FrequencySelector>,
    lifecycle: Mutex<Lifecycle>,
}

fn wbfm(bandwidth: f64) -> DemodulatorFactory {
    Box::new(move |params: &RuntimeParameters, stream: &StreamParams| {
        let demod = WbfmDemodulator::new(
            params.sample_rate,
            bandwidth,
            stream.sample_rate,
            stream.frames_per_buffer,
        )?;
        Ok(Box::new(demod) as Box<dyn Demodulator>)
    })
}

fn configure(device: &mut dyn Receiver, params: &RuntimeParameters) -> Result<()> {
    let ch = params.channel;
    device.set_sample_rate(params.sample_rate)?;
    device.set_antenna(ch, params.antenna_index)?;
    device.set_gain(ch, params.gain)?;
    device.set_lpf(ch, params.lpf_bandwidth)?;
    device.set_center_frequency(ch, params.center_frequency)?;
    device.enable(ch)
}

fn attach(device: &mut dyn Receiver, distributor: &Arc<SampleDistributor>) {
    let distributor = distributor.clone();
    device.set_callback(Arc::new(move |block| distributor.on_samples(block)));
}

impl Pipeline {
    /// Creates an uninitialized pipeline; no device is touched until
    /// [`initialize`](Self::initialize).
    pub fn new(
        config: PipelineConfig,
        provider: Box<dyn DeviceProvider>,
        audio: Box<dyn AudioBackend>,
    ) -> Result<Self> {
        config.params.validate()?;
        config.display.validate()?;
        if config.ring_capacity == 0 {
            return Err(Error::invalid_parameter("audio ring capacity must be positive"));
        }

        let engine = Arc::new(SpectrumEngine::new(config.params.clone())?);
        let presenter = Arc::new(DisplayPresenter::new(config.display.clone())?);
        let ring = Arc::new(AudioRingBuffer::new(
            config.ring_capacity,
            config.stream.frames_per_buffer,
        ));
        let mut selector = FrequencySelector::new(config.min_frequency, config.max_frequency);
        selector.set_frequency(config.params.center_frequency as u32);

        Ok(Self {
            demodulator: wbfm(config.demod_bandwidth),
            config,
            provider,
            audio,
            engine,
            presenter,
            ring,
            selector: Mutex::new(selector),
            lifecycle: Mutex::new(Lifecycle {
                state: PipelineState::Uninitialized,
                running: false,
                session: None,
            }),
        })
    }

    /// Replaces the demodulator used by the next initialize or sample rate
    /// change.
    pub fn with_demodulator(mut self, factory: DemodulatorFactory) -> Self {
        self.demodulator = factory;
        self
    }

    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn selector(&self) -> MutexGuard<'_, FrequencySelector> {
        self.selector.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn spawn_paths(&self, params: &RuntimeParameters) -> Result<(Arc<SampleDistributor>, Workers)> {
        let demodulator = (self.demodulator)(params, &self.config.stream)?;
        let bandwidth = demodulator.signal_bandwidth();
        distributor::spawn(
            DemodPath::new(demodulator, self.ring.clone()),
            SpectrumPath::new(self.engine.clone(), self.presenter.clone(), bandwidth),
            self.config.spectrum_interval,
        )
    }

    fn open_session(&self, params: &RuntimeParameters) -> Result<Session> {
        let names = self.provider.devices()?;
        let Some(name) = names.first() else {
            return Err(Error::device("No devices found"));
        };
        info!("opening {}", name);
        let mut device = self.provider.open(name)?;

        let (distributor, workers) = self.spawn_paths(params)?;
        attach(device.as_mut(), &distributor);
        configure(device.as_mut(), params)?;
        let antennas = device.antennas(params.channel)?;
        debug!("antennas: {:?}", antennas);

        self.ring.clear();
        self.ring.preload_silence(self.config.silence_preload);
        let stream = self
            .audio
            .open_stream(self.config.stream, AudioRenderer::new(self.ring.clone()))?;

        Ok(Session {
            device,
            device_name: name.clone(),
            stream,
            distributor,
            workers,
            antennas,
        })
    }

    /**
     * Opens the first receiver and the audio stream.
     *
     * Failures leave the pipeline in [`PipelineState::Failed`] with nothing
     * held open, so calling again retries from scratch. Calling on a ready
     * pipeline does nothing.
     */
    pub fn initialize(&self) -> Result<()> {
        {
            let mut lifecycle = self.lifecycle();
            match lifecycle.state {
                PipelineState::Ready => return Ok(()),
                PipelineState::Loading => return Err(Error::NotReady),
                _ => lifecycle.state = PipelineState::Loading,
            }
        }

        let params = self.engine.params();
        let result = self.open_session(&params);

        let mut lifecycle = self.lifecycle();
        match result {
            Ok(session) => {
                info!("pipeline ready on {}", session.device_name);
                self.selector().set_frequency(params.center_frequency as u32);
                lifecycle.session = Some(session);
                lifecycle.state = PipelineState::Ready;
                Ok(())
            }
            Err(e) => {
                warn!("initialization failed: {}", e);
                lifecycle.state = PipelineState::Failed(e.to_string());
                Err(e)
            }
        }
    }

    /// Starts streaming. An audio stream that fails to start after a
    /// successful initialize is fatal.
    pub fn start(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle();
        if lifecycle.running {
            return Ok(());
        }
        let session = lifecycle.session.as_mut().ok_or(Error::NotReady)?;

        session.device.start()?;
        if let Err(e) = session.stream.start() {
            if let Err(stop) = session.device.stop() {
                warn!("stopping device: {}", stop);
            }
            return Err(Error::fatal(format!("audio stream failed to start: {}", e)));
        }
        session.distributor.throttle().reset();
        lifecycle.running = true;
        info!("started");
        Ok(())
    }

    /// Stops streaming; errors from the device or the stream are logged.
    pub fn stop(&self) {
        let mut lifecycle = self.lifecycle();
        Self::stop_session(&mut lifecycle);
    }

    fn stop_session(lifecycle: &mut Lifecycle) {
        if !lifecycle.running {
            return;
        }
        if let Some(session) = lifecycle.session.as_mut() {
            if let Err(e) = session.device.stop() {
                warn!("error stopping device: {}", e);
            }
            if let Err(e) = session.stream.stop() {
                warn!("error stopping audio: {}", e);
            }
        }
        lifecycle.running = false;
        info!("stopped");
    }

    /// Stops, closes the audio stream and releases the device.
    pub fn close(&self) {
        let mut lifecycle = self.lifecycle();
        Self::stop_session(&mut lifecycle);
        if let Some(mut session) = lifecycle.session.take() {
            if let Err(e) = session.stream.close() {
                warn!("error closing audio stream: {}", e);
            }
            session.workers.shutdown();
            debug!("closed {}", session.device_name);
        }
        lifecycle.state = PipelineState::Uninitialized;
    }

    /// Runs `f` on the open device while stopped, restarting afterwards if
    /// the pipeline was running.
    fn with_restart<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&Pipeline, &mut Session) -> Result<()>,
    {
        let mut lifecycle = self.lifecycle();
        let was_running = lifecycle.running;
        Self::stop_session(&mut lifecycle);

        let session = lifecycle.session.as_mut().ok_or(Error::NotReady)?;
        let result = f(self, session);
        drop(lifecycle);

        if was_running {
            self.start()?;
        }
        result
    }

    fn with_device<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut dyn Receiver) -> Result<()>,
    {
        let mut lifecycle = self.lifecycle();
        match lifecycle.session.as_mut() {
            Some(session) => f(session.device.as_mut()),
            None => Ok(()),
        }
    }

    pub fn set_gain(&self, gain: f64) -> Result<()> {
        let gain = params::validate_gain(gain)?;
        let params = self.engine.update_params(|p| p.gain = gain)?;
        self.with_device(|device| device.set_gain(params.channel, gain))
    }

    pub fn set_center_frequency(&self, frequency: f64) -> Result<()> {
        if !(frequency.is_finite() && frequency >= 0.0) {
            return Err(Error::invalid_parameter(format!("center frequency {}", frequency)));
        }
        let params = self.engine.update_params(|p| p.center_frequency = frequency)?;
        self.selector().set_frequency(frequency as u32);
        self.with_device(|device| device.set_center_frequency(params.channel, frequency))
    }

    pub fn set_lpf(&self, bandwidth: f64) -> Result<()> {
        if !(bandwidth.is_finite() && bandwidth > 0.0) {
            return Err(Error::invalid_parameter(format!("LPF bandwidth {}", bandwidth)));
        }
        let params = self.engine.update_params(|p| p.lpf_bandwidth = bandwidth)?;
        self.with_device(|device| device.set_lpf(params.channel, bandwidth))
    }

    /// Switches antenna, restarting the stream if it was running.
    pub fn set_antenna(&self, index: usize) -> Result<()> {
        let Some(session_antennas) = self.antennas() else {
            self.engine.update_params(|p| p.antenna_index = index)?;
            return Ok(());
        };
        if index >= session_antennas.len() {
            return Err(Error::invalid_parameter(format!(
                "antenna {} of {}",
                index,
                session_antennas.len()
            )));
        }
        let channel = self.engine.params().channel;
        self.with_restart(|pipeline, session| {
            session.device.set_antenna(channel, index)?;
            pipeline.engine.update_params(|p| p.antenna_index = index)?;
            info!("antenna {}", session.antennas[index]);
            Ok(())
        })
    }

    /// Changes the sample rate. The demodulator depends on it, so the
    /// processing paths are rebuilt and streaming restarted if running.
    pub fn set_sample_rate(&self, sample_rate: f64) -> Result<()> {
        let sample_rate = params::validate_sample_rate(sample_rate)?;
        if self.antennas().is_none() {
            self.engine.update_params(|p| p.sample_rate = sample_rate)?;
            return Ok(());
        }
        self.with_restart(|pipeline, session| {
            let previous = pipeline.engine.params();
            let candidate = RuntimeParameters {
                sample_rate,
                ..previous.clone()
            };
            candidate.validate()?;
            // Nothing is committed until the new paths exist
            let (distributor, workers) = pipeline.spawn_paths(&candidate)?;
            if let Err(e) = session.device.set_sample_rate(sample_rate) {
                workers.shutdown();
                if let Err(restore) = session.device.set_sample_rate(previous.sample_rate) {
                    warn!("restoring sample rate {} Hz: {}", previous.sample_rate, restore);
                }
                return Err(e);
            }
            pipeline.engine.update_params(|p| p.sample_rate = sample_rate)?;
            attach(session.device.as_mut(), &distributor);
            let old = std::mem::replace(&mut session.workers, workers);
            session.distributor = distributor;
            old.shutdown();
            info!("sample rate {} Hz", sample_rate);
            Ok(())
        })
    }

    pub fn set_fft_size(&self, fft_size: usize) -> Result<()> {
        self.engine.set_fft_size(fft_size)
    }

    pub fn set_averaging_factor(&self, factor: f32) -> Result<()> {
        self.engine.set_averaging_factor(factor)
    }

    /// Steps one digit of the frequency readout and tunes to the result.
    pub fn step_frequency(&self, digit: u32, up: bool) -> Result<f64> {
        let frequency = {
            let mut selector = self.selector();
            if up {
                selector.step_up(digit)
            } else {
                selector.step_down(digit)
            }
        } as f64;
        self.set_center_frequency(frequency)?;
        Ok(frequency)
    }

    /// Ten-digit frequency readout.
    pub fn frequency_digits(&self) -> String {
        self.selector().digits()
    }

    pub fn state(&self) -> PipelineState {
        self.lifecycle().state.clone()
    }

    /// Message of the last failed initialization.
    pub fn load_error(&self) -> Option<String> {
        match self.lifecycle().state {
            PipelineState::Failed(ref msg) => Some(msg.clone()),
            _ => None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.lifecycle().running
    }

    /// Antenna names of the open device.
    pub fn antennas(&self) -> Option<Vec<String>> {
        self.lifecycle().session.as_ref().map(|s| s.antennas.clone())
    }

    pub fn device_name(&self) -> Option<String> {
        self.lifecycle().session.as_ref().map(|s| s.device_name.clone())
    }

    pub fn stats(&self) -> Option<DistributorStats> {
        self.lifecycle().session.as_ref().map(|s| s.distributor.stats())
    }

    pub fn params(&self) -> RuntimeParameters {
        self.engine.params()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn engine(&self) -> &Arc<SpectrumEngine> {
        &self.engine
    }

    pub fn presenter(&self) -> &Arc<DisplayPresenter> {
        &self.presenter
    }

    pub fn ring(&self) -> &Arc<AudioRingBuffer> {
        &self.ring
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.close();
    }
}
