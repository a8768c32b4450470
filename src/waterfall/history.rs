//! Scrolling history of colour-mapped spectrum rows.

use std::collections::VecDeque;

use super::canvas::Rgba;

/// One colour-mapped strip, one pixel per display column.
#[derive(Debug, Clone, PartialEq)]
pub struct WaterfallRow {
    pixels: Vec<Rgba>,
}

impl WaterfallRow {
    pub fn new(pixels: Vec<Rgba>) -> Self {
        Self { pixels }
    }

    pub fn width(&self) -> usize {
        self.pixels.len()
    }

    pub fn pixels(&self) -> &[Rgba] {
        &self.pixels
    }
}

/// Fixed-capacity row history, most recent first.
///
/// Rows of a different width than the stored ones, or a capacity change,
/// clear the history instead of rescaling it.
#[derive(Debug, Clone)]
pub struct WaterfallHistory {
    rows: VecDeque<WaterfallRow>,
    capacity: usize,
}

impl WaterfallHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            rows: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Width of the stored rows, if any.
    pub fn width(&self) -> Option<usize> {
        self.rows.front().map(WaterfallRow::width)
    }

    pub fn set_capacity(&mut self, capacity: usize) {
        if capacity != self.capacity {
            self.rows.clear();
            self.capacity = capacity;
        }
    }

    pub fn push(&mut self, row: WaterfallRow) {
        if self.width().is_some_and(|w| w != row.width()) {
            self.rows.clear();
        }
        if self.capacity == 0 {
            return;
        }
        self.rows.push_front(row);
        self.rows.truncate(self.capacity);
    }

    pub fn clear(&mut self) {
        self.rows.clear();
    }

    /// Rows from newest to oldest.
    pub fn iter(&self) -> impl Iterator<Item = &WaterfallRow> {
        self.rows.iter()
    }

    pub fn get(&self, index: usize) -> Option<&WaterfallRow> {
        self.rows.get(index)
    }
}
