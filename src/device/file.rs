//! I/Q capture replayed as a receiver.
//!
//! The file is read in fixed-size chunks on a dedicated thread and delivered
//! to the callback, paced to the configured sample rate unless pacing is
//! turned off. Tuning calls are accepted and recorded but cannot change what
//! was captured.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::{DeviceProvider, Receiver, SampleCallback, StreamThread};
use crate::error::{Error, Result};
use crate::iqread::{IqRead, expanduser};
use crate::{IqFormat, SampleBlock};

type FileReader = IqRead<std::io::BufReader<std::fs::File>>;

/// Antenna name reported by file receivers.
pub const FILE_ANTENNA: &str = "FILE";

/**
 * File replay options
 */
#[derive(Debug, Clone, PartialEq)]
pub struct FileSourceConfig {
    pub path: PathBuf,
    pub format: IqFormat,
    /// Samples per delivered block
    pub chunk_size: usize,
    /// Restart from the beginning at end of file
    pub looping: bool,
    /// Deliver at the sample rate instead of as fast as possible
    pub realtime: bool,
}

impl FileSourceConfig {
    pub fn new<P: AsRef<Path>>(path: P, format: IqFormat) -> Self {
        Self {
            path: expanduser(path.as_ref().to_path_buf()),
            format,
            chunk_size: 16384,
            looping: true,
            realtime: true,
        }
    }
}

pub struct FileReceiver {
    config: FileSourceConfig,
    sample_rate: f64,
    center_frequency: f64,
    gain: f64,
    lpf: f64,
    antenna: usize,
    enabled: bool,
    callback: Option<SampleCallback>,
    streaming: Option<StreamThread>,
}

impl FileReceiver {
    pub fn new(config: FileSourceConfig) -> Self {
        Self {
            config,
            sample_rate: 2e6,
            center_frequency: 0.0,
            gain: 0.0,
            lpf: 0.0,
            antenna: 0,
            enabled: false,
            callback: None,
            streaming: None,
        }
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming.as_ref().is_some_and(StreamThread::is_alive)
    }

    pub fn center_frequency(&self) -> f64 {
        self.center_frequency
    }

    pub fn gain(&self) -> f64 {
        self.gain
    }

    pub fn lpf(&self) -> f64 {
        self.lpf
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn open_reader(config: &FileSourceConfig) -> Result<FileReader> {
        IqRead::from_file(&config.path, config.chunk_size, config.format)
    }

    fn check_channel(channel: usize) -> Result<()> {
        if channel != 0 {
            return Err(Error::device(format!("file source has no channel {}", channel)));
        }
        Ok(())
    }
}

fn replay(
    config: FileSourceConfig,
    sample_rate: f64,
    callback: SampleCallback,
    running: &AtomicBool,
    mut reader: FileReader,
) {
    let started = Instant::now();
    let mut delivered: u64 = 0;
    let mut rewound_at = 0;

    while running.load(Ordering::Acquire) {
        match reader.next() {
            Some(Ok(samples)) => {
                delivered += samples.len() as u64;
                callback(SampleBlock::new(samples));
                if config.realtime {
                    let due = started + Duration::from_secs_f64(delivered as f64 / sample_rate);
                    let now = Instant::now();
                    if due > now {
                        std::thread::sleep(due - now);
                    }
                }
            }
            Some(Err(e)) => {
                warn!("reading {}: {}", config.path.display(), e);
                break;
            }
            None if config.looping && delivered > rewound_at => {
                rewound_at = delivered;
                debug!("end of {}, rewinding", config.path.display());
                match FileReceiver::open_reader(&config) {
                    Ok(r) => reader = r,
                    Err(e) => {
                        warn!("reopening {}: {}", config.path.display(), e);
                        break;
                    }
                }
            }
            None => {
                info!("end of {}", config.path.display());
                break;
            }
        }
    }
}

impl Receiver for FileReceiver {
    fn start(&mut self) -> Result<()> {
        if self.is_streaming() {
            return Ok(());
        }
        // Reap a thread that reached end of file on its own
        self.stop()?;

        let callback = self
            .callback
            .clone()
            .ok_or_else(|| Error::device("no sample callback registered"))?;
        let reader = Self::open_reader(&self.config)?;
        let config = self.config.clone();
        let sample_rate = self.sample_rate;
        let thread = StreamThread::spawn("file-receiver", move |running| {
            replay(config, sample_rate, callback, running, reader)
        })?;

        info!("replaying {}", self.config.path.display());
        self.streaming = Some(thread);
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        if let Some(thread) = self.streaming.take() {
            thread.join()?;
        }
        Ok(())
    }

    fn set_callback(&mut self, callback: SampleCallback) {
        self.callback = Some(callback);
    }

    fn set_sample_rate(&mut self, sample_rate: f64) -> Result<()> {
        if !(sample_rate > 0.0) {
            return Err(Error::invalid_parameter(format!("sample rate {}", sample_rate)));
        }
        self.sample_rate = sample_rate;
        Ok(())
    }

    fn set_gain(&mut self, channel: usize, gain: f64) -> Result<()> {
        Self::check_channel(channel)?;
        self.gain = gain;
        Ok(())
    }

    fn set_antenna(&mut self, channel: usize, antenna: usize) -> Result<()> {
        Self::check_channel(channel)?;
        if antenna != 0 {
            return Err(Error::device(format!("file source has no antenna {}", antenna)));
        }
        self.antenna = antenna;
        Ok(())
    }

    fn set_center_frequency(&mut self, channel: usize, frequency: f64) -> Result<()> {
        Self::check_channel(channel)?;
        self.center_frequency = frequency;
        Ok(())
    }

    fn set_lpf(&mut self, channel: usize, bandwidth: f64) -> Result<()> {
        Self::check_channel(channel)?;
        self.lpf = bandwidth;
        Ok(())
    }

    fn enable(&mut self, channel: usize) -> Result<()> {
        Self::check_channel(channel)?;
        self.enabled = true;
        Ok(())
    }

    fn antennas(&self, channel: usize) -> Result<Vec<String>> {
        Self::check_channel(channel)?;
        Ok(vec![FILE_ANTENNA.to_string()])
    }
}

impl Drop for FileReceiver {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!("stopping file receiver: {}", e);
        }
    }
}

/// Offers a single capture file as a device, when it exists.
pub struct FileDeviceProvider {
    config: FileSourceConfig,
}

impl FileDeviceProvider {
    pub fn new(config: FileSourceConfig) -> Self {
        Self { config }
    }

    fn name(&self) -> String {
        format!("file:{}", self.config.path.display())
    }
}

impl DeviceProvider for FileDeviceProvider {
    fn devices(&self) -> Result<Vec<String>> {
        if self.config.path.is_file() {
            Ok(vec![self.name()])
        } else {
            Ok(Vec::new())
        }
    }

    fn open(&self, name: &str) -> Result<Box<dyn Receiver>> {
        if name != self.name() {
            return Err(Error::device(format!("unknown device {}", name)));
        }
        Ok(Box::new(FileReceiver::new(self.config.clone())))
    }
}
