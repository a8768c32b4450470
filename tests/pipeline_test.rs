//! Integration tests for the pipeline lifecycle and sample distribution

mod helpers;

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use num_complex::Complex;

use helpers::{MockAudioBackend, MockProvider, SharedAudioLog, SharedDeviceLog};
use sdrscope::demod::{DemodOutput, Demodulator};
use sdrscope::device::StreamParams;
use sdrscope::{Error, Pipeline, PipelineConfig, PipelineState, RuntimeParameters, SampleBlock};

/// Returns `chunks` audio chunks per call, each filled with a running counter.
struct Counter {
    chunk: usize,
    chunks: usize,
    next: Arc<AtomicU32>,
}

impl Demodulator for Counter {
    fn demodulate(&mut self, _samples: &[Complex<f32>]) -> Option<DemodOutput> {
        let mut audio = Vec::with_capacity(self.chunk * self.chunks + 3);
        for _ in 0..self.chunks {
            let value = self.next.fetch_add(1, Ordering::SeqCst) as f32;
            audio.extend(std::iter::repeat_n(value, self.chunk));
        }
        // A trailing partial chunk, which must never reach the ring
        audio.extend([-1.0; 3]);
        Some(DemodOutput::Mono(audio))
    }

    fn output_rate(&self) -> u32 {
        48_000
    }
}

fn config() -> PipelineConfig {
    PipelineConfig {
        params: RuntimeParameters {
            fft_size: 128,
            ..RuntimeParameters::default()
        },
        stream: StreamParams {
            frames_per_buffer: 64,
            ..StreamParams::default()
        },
        spectrum_interval: Duration::ZERO,
        ..PipelineConfig::default()
    }
}

fn pipeline_with(
    config: PipelineConfig,
    devices: &[&str],
    chunks_per_block: usize,
) -> (Pipeline, SharedDeviceLog, SharedAudioLog, MockProvider) {
    let provider = MockProvider::new(devices);
    let handle = MockProvider {
        devices: provider.devices.clone(),
        log: provider.log.clone(),
    };
    let audio = MockAudioBackend::default();
    let device_log = provider.log.clone();
    let audio_log = audio.log.clone();

    let next = Arc::new(AtomicU32::new(1));
    let pipeline = Pipeline::new(config, Box::new(provider), Box::new(audio))
        .unwrap()
        .with_demodulator(Box::new(move |_params: &RuntimeParameters, stream: &StreamParams| {
            Ok(Box::new(Counter {
                chunk: stream.frames_per_buffer,
                chunks: chunks_per_block,
                next: next.clone(),
            }) as Box<dyn Demodulator>)
        }));
    (pipeline, device_log, audio_log, handle)
}

fn block(n: usize) -> SampleBlock {
    SampleBlock::new(helpers::complex_tone(100e3, 2e6, n))
}

#[test]
fn test_no_devices_fails_then_retry_succeeds() {
    let (pipeline, device_log, _, provider) = pipeline_with(config(), &[], 1);

    let err = pipeline.initialize().unwrap_err();
    assert!(!err.is_fatal());
    assert!(matches!(pipeline.state(), PipelineState::Failed(_)));
    assert!(pipeline.load_error().unwrap().contains("No devices found"));
    assert!(pipeline.antennas().is_none());
    assert!(matches!(pipeline.start(), Err(Error::NotReady)));

    // Retrying without a device fails the same way
    assert!(pipeline.initialize().is_err());

    provider.devices.lock().unwrap().push("lime0".to_string());
    pipeline.initialize().unwrap();
    assert_eq!(pipeline.state(), PipelineState::Ready);
    assert_eq!(pipeline.load_error(), None);
    assert_eq!(pipeline.device_name().as_deref(), Some("lime0"));
    assert_eq!(device_log.lock().unwrap().opened, 1);
}

#[test]
fn test_initialize_configures_device_and_audio() {
    let config = PipelineConfig {
        params: RuntimeParameters::default(),
        ..PipelineConfig::default()
    };
    let (pipeline, device_log, audio_log, _) = pipeline_with(config, &["lime0"], 1);
    pipeline.initialize().unwrap();

    assert_eq!(
        helpers::device_calls(&device_log),
        vec![
            "sample_rate 2000000",
            "antenna 0 0",
            "gain 0 0.4",
            "lpf 0 10000000",
            "frequency 0 96900000",
            "enable 0",
        ]
    );
    assert_eq!(
        pipeline.antennas().unwrap(),
        vec!["LNAW", "LNAH", "LNAL"]
    );
    assert_eq!(helpers::audio_calls(&audio_log), vec!["open"]);
    let params = audio_log.lock().unwrap().params.unwrap();
    assert_eq!((params.sample_rate, params.channels, params.frames_per_buffer), (48_000, 1, 8192));

    // Four silent chunks are waiting before streaming starts
    assert_eq!(pipeline.ring().len(), 4);
    let mut out = vec![1.0f32; 8192];
    assert!(helpers::render(&audio_log, &mut out));
    assert!(out.iter().all(|&s| s == 0.0));
    assert_eq!(pipeline.frequency_digits(), "0096900000");
}

#[test]
fn test_initialize_is_idempotent() {
    let (pipeline, device_log, audio_log, _) = pipeline_with(config(), &["lime0"], 1);
    pipeline.initialize().unwrap();
    pipeline.initialize().unwrap();
    assert_eq!(device_log.lock().unwrap().opened, 1);
    assert_eq!(helpers::audio_calls(&audio_log), vec!["open"]);
}

#[test]
fn test_start_and_stop() {
    let (pipeline, device_log, audio_log, _) = pipeline_with(config(), &["lime0"], 1);
    pipeline.initialize().unwrap();
    device_log.lock().unwrap().calls.clear();

    pipeline.start().unwrap();
    assert!(pipeline.is_running());
    assert!(device_log.lock().unwrap().running);
    pipeline.start().unwrap();
    assert_eq!(helpers::device_calls(&device_log), vec!["start"]);

    pipeline.stop();
    pipeline.stop();
    assert!(!pipeline.is_running());
    assert_eq!(helpers::device_calls(&device_log), vec!["start", "stop"]);
    assert_eq!(helpers::audio_calls(&audio_log), vec!["open", "start", "stop"]);
}

#[test]
fn test_audio_start_failure_is_fatal() {
    let (pipeline, device_log, audio_log, _) = pipeline_with(config(), &["lime0"], 1);
    audio_log.lock().unwrap().fail_start = true;
    pipeline.initialize().unwrap();

    let err = pipeline.start().unwrap_err();
    assert!(err.is_fatal());
    assert!(!pipeline.is_running());
    assert!(!device_log.lock().unwrap().running);
    // Still initialized: the failure is not a load failure
    assert_eq!(pipeline.state(), PipelineState::Ready);
}

#[test]
fn test_antenna_switch_restarts_streaming() {
    let (pipeline, device_log, _, _) = pipeline_with(config(), &["lime0"], 1);
    pipeline.initialize().unwrap();
    pipeline.start().unwrap();
    device_log.lock().unwrap().calls.clear();

    pipeline.set_antenna(2).unwrap();
    assert_eq!(
        helpers::device_calls(&device_log),
        vec!["stop", "antenna 0 2", "start"]
    );
    assert!(pipeline.is_running());
    assert_eq!(pipeline.params().antenna_index, 2);

    assert!(pipeline.set_antenna(3).is_err());
    assert_eq!(pipeline.params().antenna_index, 2);
}

#[test]
fn test_antenna_switch_while_stopped_stays_stopped() {
    let (pipeline, device_log, _, _) = pipeline_with(config(), &["lime0"], 1);
    pipeline.initialize().unwrap();
    device_log.lock().unwrap().calls.clear();

    pipeline.set_antenna(1).unwrap();
    assert_eq!(helpers::device_calls(&device_log), vec!["antenna 0 1"]);
    assert!(!pipeline.is_running());
}

#[test]
fn test_every_block_reaches_audio_and_display_updates() {
    let config = PipelineConfig {
        silence_preload: 0,
        ..config()
    };
    let (pipeline, device_log, _, _) = pipeline_with(config, &["lime0"], 2);
    pipeline.initialize().unwrap();
    pipeline.start().unwrap();

    for _ in 0..3 {
        assert!(helpers::deliver(&device_log, block(256)));
    }

    let ring = pipeline.ring().clone();
    assert!(helpers::wait_for(|| ring.len() == 6));
    let values: Vec<f32> = std::iter::from_fn(|| ring.pop())
        .map(|chunk| {
            assert_eq!(chunk.len(), 64);
            chunk[0]
        })
        .collect();
    assert_eq!(values, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);

    let presenter = pipeline.presenter().clone();
    assert!(helpers::wait_for(|| presenter.rendered() >= 1));
    assert!(presenter.take_if_updated().is_some());
    assert_eq!(pipeline.stats().unwrap().received, 3);
}

#[test]
fn test_audio_ring_drops_oldest_chunk() {
    let config = PipelineConfig {
        ring_capacity: 4,
        silence_preload: 0,
        ..config()
    };
    let (pipeline, device_log, _, _) = pipeline_with(config, &["lime0"], 1);
    pipeline.initialize().unwrap();
    pipeline.start().unwrap();

    for _ in 0..5 {
        helpers::deliver(&device_log, block(256));
    }
    let ring = pipeline.ring().clone();
    assert!(helpers::wait_for(|| ring.overflows() == 1));

    let values: Vec<f32> = (0..4).map(|_| ring.pop().unwrap()[0]).collect();
    assert_eq!(values, vec![2.0, 3.0, 4.0, 5.0]);
    assert!(ring.pop().is_none());
}

#[test]
fn test_undersized_blocks_skip_spectrum_only() {
    let config = PipelineConfig {
        silence_preload: 0,
        ..config()
    };
    let (pipeline, device_log, _, _) = pipeline_with(config, &["lime0"], 1);
    pipeline.initialize().unwrap();
    pipeline.start().unwrap();

    // Shorter than the 128-point FFT
    helpers::deliver(&device_log, block(100));
    let ring = pipeline.ring().clone();
    assert!(helpers::wait_for(|| ring.len() == 1));

    let engine = pipeline.engine().clone();
    assert!(helpers::wait_for(|| engine.skipped() == 1));
    assert_eq!(pipeline.presenter().rendered(), 0);
}

#[test]
fn test_sample_rate_change_rebuilds_paths() {
    let config = PipelineConfig {
        silence_preload: 0,
        ..config()
    };
    let (pipeline, device_log, _, _) = pipeline_with(config, &["lime0"], 1);
    pipeline.initialize().unwrap();
    pipeline.start().unwrap();
    device_log.lock().unwrap().calls.clear();

    pipeline.set_sample_rate(1e6).unwrap();
    assert_eq!(
        helpers::device_calls(&device_log),
        vec!["stop", "sample_rate 1000000", "start"]
    );
    assert_eq!(pipeline.params().sample_rate, 1e6);

    // Blocks go through the new distributor
    helpers::deliver(&device_log, block(256));
    let ring = pipeline.ring().clone();
    assert!(helpers::wait_for(|| ring.len() == 1));
    assert_eq!(pipeline.stats().unwrap().received, 1);
}

#[test]
fn test_rejected_sample_rate_keeps_previous_paths() {
    let config = PipelineConfig {
        silence_preload: 0,
        ..config()
    };
    let (pipeline, device_log, _, _) = pipeline_with(config, &["lime0"], 1);
    let next = Arc::new(AtomicU32::new(1));
    let pipeline = pipeline.with_demodulator(Box::new(
        move |params: &RuntimeParameters, stream: &StreamParams| {
            if params.sample_rate > 2.5e6 {
                return Err(Error::invalid_parameter("demodulator rate"));
            }
            Ok(Box::new(Counter {
                chunk: stream.frames_per_buffer,
                chunks: 1,
                next: next.clone(),
            }) as Box<dyn Demodulator>)
        },
    ));
    pipeline.initialize().unwrap();
    pipeline.start().unwrap();
    device_log.lock().unwrap().calls.clear();

    assert!(pipeline.set_sample_rate(3e6).is_err());
    assert_eq!(pipeline.params().sample_rate, 2e6);
    // The device never saw the new rate, streaming resumed as before
    assert_eq!(helpers::device_calls(&device_log), vec!["stop", "start"]);
    assert!(pipeline.is_running());

    helpers::deliver(&device_log, block(256));
    let ring = pipeline.ring().clone();
    assert!(helpers::wait_for(|| ring.len() == 1));
}

#[test]
fn test_step_frequency_tunes_device() {
    let (pipeline, device_log, _, _) = pipeline_with(config(), &["lime0"], 1);
    pipeline.initialize().unwrap();
    device_log.lock().unwrap().calls.clear();

    assert_eq!(pipeline.step_frequency(5, true).unwrap(), 97_000_000.0);
    assert_eq!(pipeline.frequency_digits(), "0097000000");
    assert_eq!(pipeline.params().center_frequency, 97e6);
    assert_eq!(
        helpers::device_calls(&device_log),
        vec!["frequency 0 97000000"]
    );
}

#[test]
fn test_parameter_validation() {
    let (pipeline, _, _, _) = pipeline_with(config(), &["lime0"], 1);
    assert!(pipeline.set_fft_size(1000).is_err());
    assert!(pipeline.set_gain(1.5).is_err());
    assert!(pipeline.set_averaging_factor(0.0).is_err());

    // Before initialize, values are kept for the device to come
    pipeline.set_fft_size(2048).unwrap();
    pipeline.set_gain(0.7).unwrap();
    assert_eq!(pipeline.params().fft_size, 2048);
    assert_eq!(pipeline.params().gain, 0.7);
}

#[test]
fn test_close_releases_session() {
    let (pipeline, device_log, audio_log, _) = pipeline_with(config(), &["lime0"], 1);
    pipeline.initialize().unwrap();
    pipeline.start().unwrap();
    pipeline.close();

    assert_eq!(pipeline.state(), PipelineState::Uninitialized);
    assert!(!pipeline.is_running());
    assert!(!device_log.lock().unwrap().running);
    assert_eq!(
        helpers::audio_calls(&audio_log),
        vec!["open", "start", "stop", "close"]
    );

    // Late deliveries from the driver thread are harmless
    helpers::deliver(&device_log, block(256));
}
