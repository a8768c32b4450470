//! Hand-off of rendered frames to the UI.
//!
//! The render lock is held for the whole of a render; the UI takes it for
//! reading only long enough to clone the image, at its own cadence.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::debug;

use crate::SampleBlock;
use crate::distributor::BlockSink;
use crate::error::{Error, Result};
use crate::params::RuntimeParameters;
use crate::spectrum::{SpectrumEngine, SpectrumFrame};
use crate::waterfall::{DisplaySettings, Image, Waterfall};

pub struct DisplayPresenter {
    waterfall: RwLock<Waterfall>,
    latest_frame: RwLock<Option<SpectrumFrame>>,
    updated: AtomicBool,
    rendered: AtomicU64,
}

impl DisplayPresenter {
    pub fn new(settings: DisplaySettings) -> Result<Self> {
        Ok(Self {
            waterfall: RwLock::new(Waterfall::new(settings)?),
            latest_frame: RwLock::new(None),
            updated: AtomicBool::new(false),
            rendered: AtomicU64::new(0),
        })
    }

    fn read(&self) -> RwLockReadGuard<'_, Waterfall> {
        self.waterfall.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Waterfall> {
        self.waterfall.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Renders `frame` into the waterfall and flags the image as changed.
    pub fn render(&self, frame: &SpectrumFrame, params: &RuntimeParameters, bandwidth: Option<f64>) {
        {
            let mut waterfall = self.write();
            waterfall.push_and_render(frame, params, bandwidth);
        }
        *self.latest_frame.write().unwrap_or_else(|e| e.into_inner()) = Some(frame.clone());
        self.rendered.fetch_add(1, Ordering::Relaxed);
        self.updated.store(true, Ordering::Release);
    }

    /// Whether a frame was rendered since the last [`take_if_updated`](Self::take_if_updated).
    pub fn is_updated(&self) -> bool {
        self.updated.load(Ordering::Acquire)
    }

    /// Copy of the current image, regardless of the changed flag.
    pub fn snapshot(&self) -> Image {
        self.read().image().clone()
    }

    /// Copy of the image if it changed since the last call, clearing the flag.
    pub fn take_if_updated(&self) -> Option<Image> {
        if self.updated.swap(false, Ordering::AcqRel) {
            Some(self.snapshot())
        } else {
            None
        }
    }

    pub fn latest_frame(&self) -> Option<SpectrumFrame> {
        self.latest_frame
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn settings(&self) -> DisplaySettings {
        self.read().settings().clone()
    }

    pub fn history_len(&self) -> usize {
        self.read().history().len()
    }

    /// Frames rendered so far.
    pub fn rendered(&self) -> u64 {
        self.rendered.load(Ordering::Relaxed)
    }

    /// Changes the display geometry, clearing the history on width or
    /// height change.
    pub fn resize(&self, width: usize, height: usize, plot_height: usize) -> Result<()> {
        let mut waterfall = self.write();
        let settings = DisplaySettings {
            width,
            height,
            plot_height,
            ..waterfall.settings().clone()
        };
        waterfall.set_settings(settings)
    }

    /// Sets the dB at the top of the plot and the pixels per dB.
    pub fn set_scale(&self, fft_offset: f32, fft_scale: f32) -> Result<()> {
        self.write().set_scale(fft_offset, fft_scale)
    }
}

/**
 * Spectrum path: engine then renderer, run on the spectrum worker
 */
pub struct SpectrumPath {
    engine: Arc<SpectrumEngine>,
    presenter: Arc<DisplayPresenter>,
    bandwidth: Option<f64>,
}

impl SpectrumPath {
    pub fn new(
        engine: Arc<SpectrumEngine>,
        presenter: Arc<DisplayPresenter>,
        bandwidth: Option<f64>,
    ) -> Self {
        Self {
            engine,
            presenter,
            bandwidth,
        }
    }

    /// Computes and renders one block; undersized blocks are skipped.
    pub fn update(&self, block: &SampleBlock) -> Result<()> {
        match self.engine.process(block) {
            Ok(frame) => {
                let params = self.engine.params();
                self.presenter.render(&frame, &params, self.bandwidth);
                Ok(())
            }
            Err(e @ Error::InsufficientSamples { .. }) => {
                debug!("skipping spectrum block: {}", e);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

impl BlockSink for SpectrumPath {
    fn process(&mut self, block: &SampleBlock) {
        if let Err(e) = self.update(block) {
            debug!("spectrum update failed: {}", e);
        }
    }
}
