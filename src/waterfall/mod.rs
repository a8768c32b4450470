//! Line plot and waterfall rendering.
//!
//! Each [`SpectrumFrame`] produces a line plot across the display width and
//! one new colour-mapped [`WaterfallRow`]. The image is laid out top to
//! bottom as the plot region (with grid and channel overlay) followed by the
//! history rows, newest directly below the plot.
//!
//! Text is not rasterised: labels are returned with their anchor so that a
//! front end with fonts can draw them over the pixels.

pub mod canvas;
pub mod history;
pub mod palette;

pub use canvas::{Canvas, Rgba};
pub use history::{WaterfallHistory, WaterfallRow};

use crate::error::{Error, Result};
use crate::notation::format_frequency;
use crate::params::RuntimeParameters;
use crate::spectrum::SpectrumFrame;

pub const LINE_COLOR: Rgba = Rgba::new(0, 127, 127, 255);
pub const GRID_COLOR: Rgba = Rgba::new(255, 127, 127, 127);
pub const CHANNEL_COLOR: Rgba = Rgba::new(192, 0, 0, 255);
pub const LABEL_COLOR: Rgba = Rgba::new(127, 127, 127, 255);

/**
 * Display geometry and scale
 */
#[derive(Debug, Clone, PartialEq)]
pub struct DisplaySettings {
    pub width: usize,
    pub height: usize,
    /// Height of the line plot region, the waterfall fills the rest
    pub plot_height: usize,
    /// dB value at the top of the plot
    pub fft_offset: f32,
    /// Pixels per dB
    pub fft_scale: f32,
    pub h_grid_steps: usize,
    pub v_grid_steps: usize,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            width: 1024,
            height: 512,
            plot_height: 256,
            fft_offset: -40.0,
            fft_scale: 4.0,
            h_grid_steps: 6,
            v_grid_steps: 8,
        }
    }
}

impl DisplaySettings {
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.plot_height == 0 || self.plot_height > self.height {
            return Err(Error::invalid_parameter(format!(
                "display {}x{} with a {} px plot",
                self.width, self.height, self.plot_height
            )));
        }
        if !(self.fft_scale.is_finite() && self.fft_scale > 0.0) || !self.fft_offset.is_finite() {
            return Err(Error::invalid_parameter(format!(
                "fft scale {} / offset {}",
                self.fft_scale, self.fft_offset
            )));
        }
        Ok(())
    }

    /// Rows available to the waterfall.
    pub fn history_capacity(&self) -> usize {
        self.height - self.plot_height
    }

    /// Visible dB range of the plot, `(min, max)`.
    pub fn visible_range(&self) -> (f64, f64) {
        let max = self.fft_offset as f64;
        let min = self.fft_offset as f64 - self.plot_height as f64 / self.fft_scale as f64;
        (min, max)
    }

    /// Plot row of a dB value, clamped to the plot region.
    pub fn db_to_pixel_y(&self, db: f32) -> f32 {
        ((self.fft_offset - db) * self.fft_scale).clamp(0.0, (self.plot_height - 1) as f32)
    }
}

/// Text to draw over the image, anchored at its baseline start.
#[derive(Debug, Clone, PartialEq)]
pub struct Label {
    pub x: f32,
    pub y: f32,
    pub size: f32,
    pub text: String,
    pub color: Rgba,
}

/// A rendered frame: pixels plus labels.
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    pub canvas: Canvas,
    pub labels: Vec<Label>,
}

impl Image {
    pub fn width(&self) -> usize {
        self.canvas.width()
    }

    pub fn height(&self) -> usize {
        self.canvas.height()
    }
}

/// Horizontal position of `frequency` on a display of `width` pixels.
///
/// Frequencies above the center land right of the middle, matching the
/// line plot and the grid labels.
pub fn frequency_to_pixel_x(frequency: f64, center: f64, sample_rate: f64, width: usize) -> f64 {
    let hz_per_pixel = sample_rate / width as f64;
    (width / 2) as f64 + (frequency - center) / hz_per_pixel
}

/**
 * Waterfall renderer
 *
 * Owns the history and the last rendered image.
 */
pub struct Waterfall {
    settings: DisplaySettings,
    history: WaterfallHistory,
    image: Image,
}

impl Waterfall {
    pub fn new(settings: DisplaySettings) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            history: WaterfallHistory::new(settings.history_capacity()),
            image: Image {
                canvas: Canvas::new(settings.width, settings.height),
                labels: Vec::new(),
            },
            settings,
        })
    }

    pub fn settings(&self) -> &DisplaySettings {
        &self.settings
    }

    pub fn history(&self) -> &WaterfallHistory {
        &self.history
    }

    pub fn image(&self) -> &Image {
        &self.image
    }

    /// Replaces the geometry; a new width or capacity clears the history.
    pub fn set_settings(&mut self, settings: DisplaySettings) -> Result<()> {
        settings.validate()?;
        if settings.width != self.settings.width {
            self.history.clear();
        }
        self.history.set_capacity(settings.history_capacity());
        self.settings = settings;
        Ok(())
    }

    /// Adjusts the dB scale without touching the geometry.
    pub fn set_scale(&mut self, fft_offset: f32, fft_scale: f32) -> Result<()> {
        let settings = DisplaySettings {
            fft_offset,
            fft_scale,
            ..self.settings.clone()
        };
        self.set_settings(settings)
    }

    /// Renders `frame`, pushes its waterfall row and returns the full image.
    ///
    /// `bandwidth` draws the demodulated channel edges when present.
    pub fn push_and_render(
        &mut self,
        frame: &SpectrumFrame,
        params: &RuntimeParameters,
        bandwidth: Option<f64>,
    ) -> &Image {
        let s = &self.settings;
        let mut canvas = Canvas::new(s.width, s.height);
        let mut labels = vec![Label {
            x: 10.0,
            y: 10.0,
            size: 32.0,
            text: "FFT".to_string(),
            color: LABEL_COLOR,
        }];

        let row = plot_line(&mut canvas, frame.bins(), s);
        self.history.push(row);
        for (i, row) in self.history.iter().enumerate() {
            canvas.blit_row(s.plot_height + i, row.pixels());
        }

        draw_grid(&mut canvas, &mut labels, s, params);
        if let Some(bandwidth) = bandwidth {
            draw_channel_overlay(&mut canvas, s, params, bandwidth);
        }

        self.image = Image { canvas, labels };
        &self.image
    }
}

/// Draws the line plot and returns the waterfall row of the same frame.
fn plot_line(canvas: &mut Canvas, bins: &[f32], s: &DisplaySettings) -> WaterfallRow {
    let n = bins.len();
    let mut row = vec![Rgba::BLACK; s.width];
    if n == 0 {
        return WaterfallRow::new(row);
    }
    let (min_db, max_db) = s.visible_range();
    let width_scale = n as f32 / s.width as f32;

    let mut last_x = 0.0f32;
    let mut last_y = 0.0f32;
    for i in 0..n {
        // DC in the middle
        let db = bins[(i + n / 2) % n];
        let y = s.db_to_pixel_y(db);
        let x = i as f32 / width_scale;
        if i != 0 {
            canvas.draw_line(last_x, last_y, x, y, LINE_COLOR);
        }

        let color = palette::color_for(db, min_db, max_db);
        let mut px = last_x;
        while px <= x {
            if let Some(p) = row.get_mut(px as usize) {
                *p = color;
            }
            px += 1.0;
        }

        last_x = x;
        last_y = y;
    }
    WaterfallRow::new(row)
}

fn draw_grid(
    canvas: &mut Canvas,
    labels: &mut Vec<Label>,
    s: &DisplaySettings,
    params: &RuntimeParameters,
) {
    let width = s.width as f64;
    let plot_height = s.plot_height as f64;

    for i in 0..s.h_grid_steps {
        let y = i as f64 * (plot_height / s.h_grid_steps as f64);
        let db = (s.fft_offset as f64 - y / s.fft_scale as f64) as i64;
        canvas.draw_line(0.0, y as f32, width as f32, y as f32, GRID_COLOR);
        labels.push(Label {
            x: 5.0,
            y: (y - 5.0) as f32,
            size: 10.0,
            text: format!("{} dB", db),
            color: LABEL_COLOR,
        });
    }

    let start_freq = params.center_frequency - params.sample_rate / 2.0;
    let hz_per_pixel = params.sample_rate / width;
    for i in 0..s.v_grid_steps {
        let x = (i as f64 * (width / s.v_grid_steps as f64)).round();
        canvas.draw_line(x as f32, 0.0, x as f32, plot_height as f32, GRID_COLOR);
        labels.push(Label {
            x: (x + 10.0) as f32,
            y: (plot_height - 10.0) as f32,
            size: 10.0,
            text: format_frequency(start_freq + x * hz_per_pixel),
            color: LABEL_COLOR,
        });
    }
}

fn draw_channel_overlay(
    canvas: &mut Canvas,
    s: &DisplaySettings,
    params: &RuntimeParameters,
    bandwidth: f64,
) {
    let center = params.center_frequency;
    let edges = [center - bandwidth / 2.0, center + bandwidth / 2.0];
    for edge in edges {
        let x = frequency_to_pixel_x(edge, center, params.sample_rate, s.width) as f32;
        for offset in [-1.0f32, 0.0] {
            canvas.draw_line(x + offset, 0.0, x + offset, s.plot_height as f32, CHANNEL_COLOR);
        }
    }
}
