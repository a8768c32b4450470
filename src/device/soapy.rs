//! SoapySDR receivers
//! (requires the `soapy` feature)
//!
//! Samples are read as `Complex<i16>` on a dedicated thread, scaled to
//! `[-1, 1)` and handed to the callback. Device setup happens on the calling
//! thread so that configuration errors surface from `start`.

use std::sync::atomic::Ordering;

use num_complex::Complex;
use soapysdr::{Device, Direction};
use tracing::{debug, info, warn};

use super::{DeviceProvider, Receiver, SampleCallback, StreamThread};
use crate::SampleBlock;
use crate::error::{Error, Result};

const READ_TIMEOUT_US: i64 = 1_000_000;

pub struct SoapyReceiver {
    device: Device,
    channel: usize,
    callback: Option<SampleCallback>,
    streaming: Option<StreamThread>,
}

impl SoapyReceiver {
    /// Open a device from its arguments (e.g. `driver=rtlsdr`).
    pub fn open(args: &str) -> Result<Self> {
        let device = Device::new(args)?;
        Ok(Self {
            device,
            channel: 0,
            callback: None,
            streaming: None,
        })
    }
}

impl Receiver for SoapyReceiver {
    fn start(&mut self) -> Result<()> {
        if self.streaming.as_ref().is_some_and(StreamThread::is_alive) {
            return Ok(());
        }
        // Reap a reader that gave up on a stream error
        self.stop()?;

        let callback = self
            .callback
            .clone()
            .ok_or_else(|| Error::device("no sample callback registered"))?;

        let mut stream = self.device.rx_stream::<Complex<i16>>(&[self.channel])?;
        let mtu = stream.mtu().unwrap_or(16384);
        stream.activate(None)?;

        let thread = StreamThread::spawn("soapy-receiver", move |running| {
            let mut buffer = vec![Complex::new(0i16, 0i16); mtu];
            while running.load(Ordering::Acquire) {
                match stream.read(&mut [&mut buffer], READ_TIMEOUT_US) {
                    Ok(0) => continue,
                    Ok(len) => {
                        let samples: Vec<Complex<f32>> = buffer[..len]
                            .iter()
                            .map(|c| {
                                Complex::new(
                                    c.re as f32 / (1 << 15) as f32,
                                    c.im as f32 / (1 << 15) as f32,
                                )
                            })
                            .collect();
                        callback(SampleBlock::new(samples));
                    }
                    Err(e) if matches!(e.code, soapysdr::ErrorCode::Timeout) => continue,
                    Err(e) if matches!(e.code, soapysdr::ErrorCode::Overflow) => {
                        debug!("receiver overflow");
                    }
                    Err(e) => {
                        warn!("stream read failed: {}", e);
                        break;
                    }
                }
            }
            if let Err(e) = stream.deactivate(None) {
                warn!("deactivating stream: {}", e);
            }
        })?;

        info!("SoapySDR streaming on channel {}", self.channel);
        self.streaming = Some(thread);
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        if let Some(thread) = self.streaming.take() {
            thread.join()?;
            info!("SoapySDR streaming stopped");
        }
        Ok(())
    }

    fn set_callback(&mut self, callback: SampleCallback) {
        self.callback = Some(callback);
    }

    fn set_sample_rate(&mut self, sample_rate: f64) -> Result<()> {
        self.device
            .set_sample_rate(Direction::Rx, self.channel, sample_rate)?;
        Ok(())
    }

    fn set_gain(&mut self, channel: usize, gain: f64) -> Result<()> {
        let range = self.device.gain_range(Direction::Rx, channel)?;
        let db = range.minimum + gain.clamp(0.0, 1.0) * (range.maximum - range.minimum);
        debug!("gain {:.2} -> {:.1} dB", gain, db);
        self.device.set_gain(Direction::Rx, channel, db)?;
        Ok(())
    }

    fn set_antenna(&mut self, channel: usize, antenna: usize) -> Result<()> {
        let antennas = self.antennas(channel)?;
        let name = antennas
            .get(antenna)
            .ok_or_else(|| Error::device(format!("no antenna {} on channel {}", antenna, channel)))?;
        self.device.set_antenna(Direction::Rx, channel, name.as_str())?;
        Ok(())
    }

    fn set_center_frequency(&mut self, channel: usize, frequency: f64) -> Result<()> {
        self.device
            .set_frequency(Direction::Rx, channel, frequency, ())?;
        Ok(())
    }

    fn set_lpf(&mut self, channel: usize, bandwidth: f64) -> Result<()> {
        self.device.set_bandwidth(Direction::Rx, channel, bandwidth)?;
        Ok(())
    }

    fn enable(&mut self, channel: usize) -> Result<()> {
        self.channel = channel;
        Ok(())
    }

    fn antennas(&self, channel: usize) -> Result<Vec<String>> {
        Ok(self.device.antennas(Direction::Rx, channel)?)
    }
}

impl Drop for SoapyReceiver {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!("stopping SoapySDR receiver: {}", e);
        }
    }
}

/// Enumerates SoapySDR devices matching a filter (e.g. `driver=lime`).
pub struct SoapyDeviceProvider {
    filter: String,
}

impl SoapyDeviceProvider {
    pub fn new<S: Into<String>>(filter: S) -> Self {
        Self {
            filter: filter.into(),
        }
    }
}

impl DeviceProvider for SoapyDeviceProvider {
    fn devices(&self) -> Result<Vec<String>> {
        let found = soapysdr::enumerate(self.filter.as_str())?;
        Ok(found
            .iter()
            .map(|args| {
                args.iter()
                    .map(|(k, v)| format!("{}={}", k, v))
                    .collect::<Vec<_>>()
                    .join(",")
            })
            .collect())
    }

    fn open(&self, name: &str) -> Result<Box<dyn Receiver>> {
        Ok(Box::new(SoapyReceiver::open(name)?))
    }
}
