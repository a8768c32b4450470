//! Synthetic signals and recording mocks shared by the integration tests

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use num_complex::Complex;

use sdrscope::audio::AudioRenderer;
use sdrscope::device::{
    AudioBackend, AudioStream, DeviceProvider, Receiver, SampleCallback, StreamParams,
};
use sdrscope::{Error, IqFormat, Result, SampleBlock};

/// Interleaved I/Q bytes of a unit tone, encoded as `format`.
pub fn tone_bytes(format: IqFormat, frequency: f64, sample_rate: f64, n: usize) -> Vec<u8> {
    let mut out = Vec::new();
    for z in complex_tone(frequency, sample_rate, n) {
        for x in [z.re, z.im] {
            match format {
                IqFormat::Cu8 => out.push((x * 127.0 + 127.5).round() as u8),
                IqFormat::Cs8 => out.push((x * 127.0).round() as i8 as u8),
                IqFormat::Cs16 => out.extend_from_slice(&((x * 32767.0) as i16).to_le_bytes()),
                IqFormat::Cf32 => out.extend_from_slice(&x.to_le_bytes()),
            }
        }
    }
    out
}

/// Complex tone at `offset` Hz from the center frequency.
pub fn complex_tone(offset: f64, sample_rate: f64, num_samples: usize) -> Vec<Complex<f32>> {
    (0..num_samples)
        .map(|n| {
            // Phase in f64 keeps long tones on-bin
            let phase = 2.0 * std::f64::consts::PI * offset * n as f64 / sample_rate;
            Complex::new(phase.cos() as f32, phase.sin() as f32)
        })
        .collect()
}

/// Poll `cond` until it holds or five seconds elapse.
pub fn wait_for<F: FnMut() -> bool>(mut cond: F) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    cond()
}

/// Everything the mock receivers record.
#[derive(Default)]
pub struct DeviceLog {
    pub calls: Vec<String>,
    pub callback: Option<SampleCallback>,
    pub running: bool,
    pub opened: usize,
}

pub type SharedDeviceLog = Arc<Mutex<DeviceLog>>;

/// Calls recorded so far, oldest first.
pub fn device_calls(log: &SharedDeviceLog) -> Vec<String> {
    log.lock().unwrap().calls.clone()
}

/// Hands `block` to the registered callback, as a driver thread would.
pub fn deliver(log: &SharedDeviceLog, block: SampleBlock) -> bool {
    let callback = log.lock().unwrap().callback.clone();
    match callback {
        Some(callback) => {
            callback(block);
            true
        }
        None => false,
    }
}

pub struct MockReceiver {
    log: SharedDeviceLog,
    antennas: Vec<String>,
}

impl MockReceiver {
    fn record(&self, call: String) {
        self.log.lock().unwrap().calls.push(call);
    }
}

impl Receiver for MockReceiver {
    fn start(&mut self) -> Result<()> {
        self.record("start".to_string());
        self.log.lock().unwrap().running = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.record("stop".to_string());
        self.log.lock().unwrap().running = false;
        Ok(())
    }

    fn set_callback(&mut self, callback: SampleCallback) {
        self.log.lock().unwrap().callback = Some(callback);
    }

    fn set_sample_rate(&mut self, sample_rate: f64) -> Result<()> {
        self.record(format!("sample_rate {}", sample_rate));
        Ok(())
    }

    fn set_gain(&mut self, channel: usize, gain: f64) -> Result<()> {
        self.record(format!("gain {} {}", channel, gain));
        Ok(())
    }

    fn set_antenna(&mut self, channel: usize, antenna: usize) -> Result<()> {
        if antenna >= self.antennas.len() {
            return Err(Error::device(format!("no antenna {}", antenna)));
        }
        self.record(format!("antenna {} {}", channel, antenna));
        Ok(())
    }

    fn set_center_frequency(&mut self, channel: usize, frequency: f64) -> Result<()> {
        self.record(format!("frequency {} {}", channel, frequency));
        Ok(())
    }

    fn set_lpf(&mut self, channel: usize, bandwidth: f64) -> Result<()> {
        self.record(format!("lpf {} {}", channel, bandwidth));
        Ok(())
    }

    fn enable(&mut self, channel: usize) -> Result<()> {
        self.record(format!("enable {}", channel));
        Ok(())
    }

    fn antennas(&self, _channel: usize) -> Result<Vec<String>> {
        Ok(self.antennas.clone())
    }
}

/// Device provider whose device list can change between calls.
pub struct MockProvider {
    pub devices: Arc<Mutex<Vec<String>>>,
    pub log: SharedDeviceLog,
}

impl MockProvider {
    pub fn new(devices: &[&str]) -> Self {
        Self {
            devices: Arc::new(Mutex::new(devices.iter().map(|s| s.to_string()).collect())),
            log: Arc::new(Mutex::new(DeviceLog::default())),
        }
    }
}

impl DeviceProvider for MockProvider {
    fn devices(&self) -> Result<Vec<String>> {
        Ok(self.devices.lock().unwrap().clone())
    }

    fn open(&self, _name: &str) -> Result<Box<dyn Receiver>> {
        self.log.lock().unwrap().opened += 1;
        Ok(Box::new(MockReceiver {
            log: self.log.clone(),
            antennas: vec!["LNAW".to_string(), "LNAH".to_string(), "LNAL".to_string()],
        }))
    }
}

#[derive(Default)]
pub struct AudioLog {
    pub calls: Vec<String>,
    pub renderer: Option<Arc<Mutex<AudioRenderer>>>,
    pub fail_start: bool,
    pub params: Option<StreamParams>,
}

pub type SharedAudioLog = Arc<Mutex<AudioLog>>;

pub fn audio_calls(log: &SharedAudioLog) -> Vec<String> {
    log.lock().unwrap().calls.clone()
}

/// Pulls one buffer from the stream's renderer, as the audio callback would.
pub fn render(log: &SharedAudioLog, out: &mut [f32]) -> bool {
    let renderer = log.lock().unwrap().renderer.clone();
    match renderer {
        Some(renderer) => {
            renderer.lock().unwrap().render(out);
            true
        }
        None => false,
    }
}

#[derive(Default)]
pub struct MockAudioBackend {
    pub log: SharedAudioLog,
}

impl AudioBackend for MockAudioBackend {
    fn open_stream(
        &self,
        params: StreamParams,
        renderer: AudioRenderer,
    ) -> Result<Box<dyn AudioStream>> {
        let mut log = self.log.lock().unwrap();
        log.calls.push("open".to_string());
        log.params = Some(params);
        log.renderer = Some(Arc::new(Mutex::new(renderer)));
        Ok(Box::new(MockAudioStream {
            log: self.log.clone(),
        }))
    }
}

pub struct MockAudioStream {
    log: SharedAudioLog,
}

impl AudioStream for MockAudioStream {
    fn start(&mut self) -> Result<()> {
        let mut log = self.log.lock().unwrap();
        if log.fail_start {
            return Err(Error::audio("device busy"));
        }
        log.calls.push("start".to_string());
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.log.lock().unwrap().calls.push("stop".to_string());
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.log.lock().unwrap().calls.push("close".to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tone_bytes_width() {
        for (format, width) in [
            (IqFormat::Cu8, 2),
            (IqFormat::Cs8, 2),
            (IqFormat::Cs16, 4),
            (IqFormat::Cf32, 8),
        ] {
            assert_eq!(tone_bytes(format, 1e3, 96e3, 10).len(), 10 * width);
        }
    }

    #[test]
    fn test_complex_tone_unit_magnitude() {
        let tone = complex_tone(100e3, 1.024e6, 64);
        assert!(tone.iter().all(|c| (c.norm() - 1.0).abs() < 1e-5));
    }
}
