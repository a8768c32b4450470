//! Collaborator interfaces: receiver drivers and audio output.
//!
//! The pipeline only talks to these traits. Implementations:
//! - [`file`]: replays an I/Q capture as a receiver
//! - [`soapy`]: SoapySDR receivers (requires the `soapy` feature)
//! - [`tinyaudio`]: default audio output device (requires the `audio` feature)
//! - [`null`]: audio sink consuming the ring at real-time pace without a device

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;

use crate::SampleBlock;
use crate::audio::AudioRenderer;
use crate::error::{Error, Result};

pub mod file;
pub mod null;
#[cfg(feature = "soapy")]
pub mod soapy;
#[cfg(feature = "audio")]
pub mod tinyaudio;

/// Called by a receiver on its delivery thread for every block.
pub type SampleCallback = Arc<dyn Fn(SampleBlock) + Send + Sync>;

/**
 * Receiver driver
 *
 * Per-channel setters take the RX channel index. Streaming starts with
 * [`start`](Receiver::start) and delivers blocks to the registered callback.
 */
pub trait Receiver: Send {
    fn start(&mut self) -> Result<()>;
    fn stop(&mut self) -> Result<()>;
    fn set_callback(&mut self, callback: SampleCallback);
    fn set_sample_rate(&mut self, sample_rate: f64) -> Result<()>;
    /// Normalized gain in `[0, 1]`.
    fn set_gain(&mut self, channel: usize, gain: f64) -> Result<()>;
    fn set_antenna(&mut self, channel: usize, antenna: usize) -> Result<()>;
    fn set_center_frequency(&mut self, channel: usize, frequency: f64) -> Result<()>;
    fn set_lpf(&mut self, channel: usize, bandwidth: f64) -> Result<()>;
    fn enable(&mut self, channel: usize) -> Result<()>;
    fn antennas(&self, channel: usize) -> Result<Vec<String>>;
}

/// Enumerates and opens receivers.
pub trait DeviceProvider: Send + Sync {
    fn devices(&self) -> Result<Vec<String>>;
    fn open(&self, name: &str) -> Result<Box<dyn Receiver>>;
}

/// Output stream parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamParams {
    pub sample_rate: u32,
    pub channels: usize,
    pub frames_per_buffer: usize,
}

impl Default for StreamParams {
    fn default() -> Self {
        Self {
            sample_rate: crate::audio::AUDIO_SAMPLE_RATE,
            channels: 1,
            frames_per_buffer: crate::audio::AUDIO_CHUNK_SIZE,
        }
    }
}

/// An open output stream, pulling audio from its renderer once started.
pub trait AudioStream: Send {
    fn start(&mut self) -> Result<()>;
    fn stop(&mut self) -> Result<()>;
    fn close(&mut self) -> Result<()>;
}

/// Opens output streams; the renderer is driven from the audio callback.
pub trait AudioBackend: Send + Sync {
    fn open_stream(
        &self,
        params: StreamParams,
        renderer: AudioRenderer,
    ) -> Result<Box<dyn AudioStream>>;
}

/// Clears the running flag however the delivery body ends, panics included.
struct Finished<'a>(&'a AtomicBool);

impl Drop for Finished<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/**
 * Delivery thread of a receiver
 *
 * The body polls the flag it is given and returns once it is cleared. A body
 * that returns on its own (end of file, read error) leaves the thread
 * finished but not yet joined: [`is_alive`](StreamThread::is_alive) is then
 * false and the owner reaps it with [`join`](StreamThread::join) before
 * starting again.
 */
pub(crate) struct StreamThread {
    running: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl StreamThread {
    pub(crate) fn spawn<F>(name: &str, body: F) -> Result<Self>
    where
        F: FnOnce(&AtomicBool) + Send + 'static,
    {
        let running = Arc::new(AtomicBool::new(true));
        let flag = running.clone();
        let handle = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let _finished = Finished(&flag);
                body(&flag);
            })?;
        Ok(Self { running, handle })
    }

    pub(crate) fn is_alive(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Asks the body to return and waits for the thread.
    pub(crate) fn join(self) -> Result<()> {
        self.running.store(false, Ordering::Release);
        let name = self.handle.thread().name().unwrap_or("receiver").to_string();
        self.handle
            .join()
            .map_err(|_| Error::device(format!("{} thread panicked", name)))
    }
}
