//! RGBA pixel buffer with the few drawing primitives the display needs.

/// Straight (non premultiplied) 8-bit RGBA colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub const BLACK: Rgba = Rgba::new(0, 0, 0, 255);

    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub fn is_opaque(self) -> bool {
        self.a == 255
    }

    /// 16-bit premultiplied channels, `[r, g, b, a]`.
    fn premultiplied(self) -> [u32; 4] {
        let a = self.a as u32 * 0x101;
        let scale = |c: u8| c as u32 * 0x101 * a / 0xffff;
        [scale(self.r), scale(self.g), scale(self.b), a]
    }

    /// Channel-wise average of two colours, used for translucent overlays.
    pub fn average(self, other: Rgba) -> Rgba {
        let [r1, g1, b1, a1] = self.premultiplied();
        let [r2, g2, b2, a2] = other.premultiplied();
        Rgba::new(
            ((r1 + r2) >> 9) as u8,
            ((g1 + g2) >> 9) as u8,
            ((b1 + b2) >> 9) as u8,
            ((a1 + a2) >> 9) as u8,
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Canvas {
    width: usize,
    height: usize,
    pixels: Vec<Rgba>,
}

impl Canvas {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            pixels: vec![Rgba::BLACK; width * height],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Row-major pixels, `width * height` long.
    pub fn pixels(&self) -> &[Rgba] {
        &self.pixels
    }

    pub fn fill(&mut self, color: Rgba) {
        self.pixels.iter_mut().for_each(|p| *p = color);
    }

    pub fn get(&self, x: usize, y: usize) -> Option<Rgba> {
        if x < self.width && y < self.height {
            Some(self.pixels[y * self.width + x])
        } else {
            None
        }
    }

    /// Writes a pixel, ignoring coordinates outside the canvas.
    pub fn set(&mut self, x: i64, y: i64, color: Rgba) {
        if x >= 0 && y >= 0 && (x as usize) < self.width && (y as usize) < self.height {
            self.pixels[y as usize * self.width + x as usize] = color;
        }
    }

    /// Copies `row` into line `y`, truncating to the canvas width.
    pub fn blit_row(&mut self, y: usize, row: &[Rgba]) {
        if y >= self.height {
            return;
        }
        let n = row.len().min(self.width);
        let start = y * self.width;
        self.pixels[start..start + n].copy_from_slice(&row[..n]);
    }

    /// DDA line from `(x0, y0)` towards `(x1, y1)`, end point excluded.
    ///
    /// Translucent colours are averaged with the pixels underneath.
    pub fn draw_line(&mut self, x0: f32, y0: f32, x1: f32, y1: f32, color: Rgba) {
        let dx = x1 - x0;
        let dy = y1 - y0;
        let steps = dx.abs().max(dy.abs());
        if steps < 1.0 {
            return;
        }
        let blend = color.a != 255 && color.a != 0;
        let x_inc = dx / steps;
        let y_inc = dy / steps;

        let (mut x, mut y) = (x0, y0);
        for _ in 0..steps as usize {
            let (px, py) = (x as i64, y as i64);
            if blend {
                if let Some(under) = self.get_signed(px, py) {
                    self.set(px, py, under.average(color));
                }
            } else {
                self.set(px, py, color);
            }
            x += x_inc;
            y += y_inc;
        }
    }

    fn get_signed(&self, x: i64, y: i64) -> Option<Rgba> {
        if x < 0 || y < 0 {
            return None;
        }
        self.get(x as usize, y as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: Rgba = Rgba::new(255, 0, 0, 255);

    #[test]
    fn test_horizontal_line_excludes_end_point() {
        let mut canvas = Canvas::new(10, 3);
        canvas.draw_line(2.0, 1.0, 6.0, 1.0, RED);
        let drawn: Vec<usize> = (0..10)
            .filter(|&x| canvas.get(x, 1) == Some(RED))
            .collect();
        assert_eq!(drawn, vec![2, 3, 4, 5]);
    }

    #[test]
    fn test_steep_line_steps_along_y() {
        let mut canvas = Canvas::new(4, 20);
        canvas.draw_line(1.0, 0.0, 2.0, 10.0, RED);
        let count = canvas.pixels().iter().filter(|&&p| p == RED).count();
        assert_eq!(count, 10);
    }

    #[test]
    fn test_out_of_bounds_is_ignored() {
        let mut canvas = Canvas::new(4, 4);
        canvas.set(-1, 2, RED);
        canvas.set(4, 2, RED);
        canvas.draw_line(-5.0, -5.0, 10.0, 10.0, RED);
        assert_eq!(canvas.get(0, 0), Some(RED));
        assert_eq!(canvas.get(3, 3), Some(RED));
    }

    #[test]
    fn test_translucent_average() {
        let grid = Rgba::new(255, 127, 127, 127);
        let mixed = Rgba::BLACK.average(grid);
        assert_eq!(mixed, Rgba::new(63, 31, 31, 191));

        let mut canvas = Canvas::new(4, 1);
        canvas.draw_line(0.0, 0.0, 4.0, 0.0, grid);
        assert!(canvas.pixels().iter().all(|&p| p == mixed));
    }

    #[test]
    fn test_blit_row_truncates() {
        let mut canvas = Canvas::new(3, 2);
        canvas.blit_row(1, &[RED; 5]);
        assert_eq!(canvas.get(2, 1), Some(RED));
        assert_eq!(canvas.get(0, 0), Some(Rgba::BLACK));
    }
}
