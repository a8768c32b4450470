//! Audio backend without an output device.
//!
//! A timer thread pulls one buffer per period from the renderer and discards
//! it, so the ring drains at the same pace as with real hardware.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam::channel::{self, RecvTimeoutError, Sender};
use tracing::debug;

use super::{AudioBackend, AudioStream, StreamParams};
use crate::audio::AudioRenderer;
use crate::error::{Error, Result};

#[derive(Debug, Default, Clone, Copy)]
pub struct NullAudioBackend;

impl AudioBackend for NullAudioBackend {
    fn open_stream(
        &self,
        params: StreamParams,
        renderer: AudioRenderer,
    ) -> Result<Box<dyn AudioStream>> {
        if params.sample_rate == 0 || params.frames_per_buffer == 0 || params.channels == 0 {
            return Err(Error::audio(format!("unsupported stream {:?}", params)));
        }
        Ok(Box::new(NullAudioStream {
            params,
            renderer: Arc::new(Mutex::new(renderer)),
            periods: Arc::new(AtomicU64::new(0)),
            worker: None,
            closed: false,
        }))
    }
}

struct Worker {
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

pub struct NullAudioStream {
    params: StreamParams,
    renderer: Arc<Mutex<AudioRenderer>>,
    periods: Arc<AtomicU64>,
    worker: Option<Worker>,
    closed: bool,
}

impl NullAudioStream {
    /// Buffers rendered since the stream was opened.
    pub fn periods(&self) -> u64 {
        self.periods.load(Ordering::Relaxed)
    }
}

impl AudioStream for NullAudioStream {
    fn start(&mut self) -> Result<()> {
        if self.closed {
            return Err(Error::audio("stream is closed"));
        }
        if self.worker.is_some() {
            return Ok(());
        }
        let period = Duration::from_secs_f64(
            self.params.frames_per_buffer as f64 / self.params.sample_rate as f64,
        );
        let (stop, stopped) = channel::bounded::<()>(0);
        let renderer = self.renderer.clone();
        let periods = self.periods.clone();
        let mut buffer = vec![0.0f32; self.params.frames_per_buffer];

        let handle = std::thread::Builder::new()
            .name("null-audio".to_string())
            .spawn(move || {
                let mut next = Instant::now() + period;
                loop {
                    let timeout = next.saturating_duration_since(Instant::now());
                    match stopped.recv_timeout(timeout) {
                        Err(RecvTimeoutError::Timeout) => {
                            renderer
                                .lock()
                                .unwrap_or_else(|e| e.into_inner())
                                .render(&mut buffer);
                            periods.fetch_add(1, Ordering::Relaxed);
                            next += period;
                        }
                        _ => break,
                    }
                }
            })?;

        debug!("null audio stream started, period {:?}", period);
        self.worker = Some(Worker { stop, handle });
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        if let Some(worker) = self.worker.take() {
            drop(worker.stop);
            worker
                .handle
                .join()
                .map_err(|_| Error::audio("null audio thread panicked"))?;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.stop()?;
        self.closed = true;
        Ok(())
    }
}

impl Drop for NullAudioStream {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}
