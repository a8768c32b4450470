//! Default audio output device through `tinyaudio`
//! (requires the `audio` feature)
//!
//! The device handle lives on a dedicated thread for as long as the stream
//! is started; the thread reports whether the device opened before `start`
//! returns.

use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use crossbeam::channel::{self, Sender};
use ::tinyaudio::prelude::*;
use tracing::{info, warn};

use super::{AudioBackend, AudioStream, StreamParams};
use crate::audio::AudioRenderer;
use crate::error::{Error, Result};

#[derive(Debug, Default, Clone, Copy)]
pub struct TinyAudioBackend;

impl AudioBackend for TinyAudioBackend {
    fn open_stream(
        &self,
        params: StreamParams,
        renderer: AudioRenderer,
    ) -> Result<Box<dyn AudioStream>> {
        if params.sample_rate == 0 || params.frames_per_buffer == 0 || params.channels == 0 {
            return Err(Error::audio(format!("unsupported stream {:?}", params)));
        }
        Ok(Box::new(TinyAudioStream {
            params,
            renderer: Arc::new(Mutex::new(renderer)),
            worker: None,
            closed: false,
        }))
    }
}

struct Worker {
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

pub struct TinyAudioStream {
    params: StreamParams,
    renderer: Arc<Mutex<AudioRenderer>>,
    worker: Option<Worker>,
    closed: bool,
}

/// Fills an interleaved device buffer from the mono renderer.
///
/// The renderer is only contended between two runs of this callback, never
/// with another thread; if it is somehow held, the period is silent.
/// Waits for the device thread to report whether the output opened.
fn await_open(init: &channel::Receiver<Result<()>>, handle: JoinHandle<()>) -> Result<JoinHandle<()>> {
    match init.recv() {
        Ok(Ok(())) => Ok(handle),
        Ok(Err(e)) => {
            let _ = handle.join();
            Err(e)
        }
        Err(_) => {
            let _ = handle.join();
            Err(Error::audio("audio thread exited before opening the device"))
        }
    }
}

fn fill(renderer: &Mutex<AudioRenderer>, mono: &mut Vec<f32>, data: &mut [f32], channels: usize) {
    let frames = data.len() / channels;
    mono.resize(frames, 0.0);
    match renderer.try_lock() {
        Ok(mut renderer) => renderer.render(mono),
        Err(_) => mono.iter_mut().for_each(|s| *s = 0.0),
    }
    for (frame, &sample) in data.chunks_exact_mut(channels).zip(mono.iter()) {
        frame.iter_mut().for_each(|s| *s = sample);
    }
}

impl AudioStream for TinyAudioStream {
    fn start(&mut self) -> Result<()> {
        if self.closed {
            return Err(Error::audio("stream is closed"));
        }
        if self.worker.is_some() {
            return Ok(());
        }

        let (stop, stopped) = channel::bounded::<()>(0);
        let (tx_init, rx_init) = channel::bounded::<Result<()>>(1);
        let params = self.params;
        let renderer = self.renderer.clone();

        let handle = std::thread::Builder::new()
            .name("tinyaudio".to_string())
            .spawn(move || {
                let config = OutputDeviceParameters {
                    channels_count: params.channels,
                    sample_rate: params.sample_rate as usize,
                    channel_sample_count: params.frames_per_buffer,
                };
                let mut mono = Vec::with_capacity(params.frames_per_buffer);
                let device = run_output_device(config, move |data| {
                    fill(&renderer, &mut mono, data, params.channels);
                });
                match device {
                    Ok(_device) => {
                        let _ = tx_init.send(Ok(()));
                        // Held until stop; dropping the device closes it
                        let _ = stopped.recv();
                    }
                    Err(e) => {
                        let _ = tx_init.send(Err(Error::audio(e.to_string())));
                    }
                }
            })?;

        let handle = await_open(&rx_init, handle)?;
        info!(
            "audio output started: {} Hz, {} channel(s), {} frames",
            self.params.sample_rate, self.params.channels, self.params.frames_per_buffer
        );
        self.worker = Some(Worker { stop, handle });
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        if let Some(worker) = self.worker.take() {
            drop(worker.stop);
            worker
                .handle
                .join()
                .map_err(|_| Error::audio("audio thread panicked"))?;
            info!("audio output stopped");
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.stop()?;
        self.closed = true;
        Ok(())
    }
}

impl Drop for TinyAudioStream {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!("closing audio output: {}", e);
        }
    }
}
