//! Waterfall colour map, after the gqrx plotter palette.

use std::sync::OnceLock;

use super::canvas::Rgba;

fn lut_entry(i: usize) -> Rgba {
    let i = i as i32;
    let c = |v: i32| v as u8;
    match i {
        // black background
        0..=19 => Rgba::BLACK,
        // black -> blue
        20..=69 => Rgba::new(0, 0, c(140 * (i - 20) / 50), 255),
        // blue -> light blue / green
        70..=99 => Rgba::new(
            c(60 * (i - 70) / 30),
            c(125 * (i - 70) / 30),
            c(115 * (i - 70) / 30 + 140),
            255,
        ),
        // light blue -> yellow
        100..=149 => Rgba::new(
            c(195 * (i - 100) / 50 + 60),
            c(130 * (i - 100) / 50 + 125),
            c(255 - 255 * (i - 100) / 50),
            255,
        ),
        // yellow -> red
        150..=249 => Rgba::new(255, c(255 - 255 * (i - 150) / 100), 0, 255),
        // red -> white
        _ => Rgba::new(255, c(255 * (i - 250) / 5), c(255 * (i - 250) / 5), 255),
    }
}

/// The 256-entry lookup table.
pub fn waterfall_lut() -> &'static [Rgba; 256] {
    static LUT: OnceLock<[Rgba; 256]> = OnceLock::new();
    LUT.get_or_init(|| std::array::from_fn(lut_entry))
}

/// Maps a dB value onto the palette, `min_db` and `max_db` being the ends
/// of the visible range.
pub fn color_for(db: f32, min_db: f64, max_db: f64) -> Rgba {
    let delta = (max_db - min_db).abs();
    let z = if delta > 0.0 {
        ((db as f64 - min_db) * 256.0 / delta).clamp(0.0, 255.0)
    } else {
        0.0
    };
    waterfall_lut()[z as u8 as usize]
}
