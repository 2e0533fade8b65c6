#![forbid(unsafe_code)]

//! The frame: a passive cell grid with color state and dirty tracking.
//!
//! Coordinates are 1-based, matching the guest convention; out-of-range
//! reads return the blank sentinel and out-of-range writes clip (except the
//! scrolling cases below).
//!
//! # Invariants
//!
//! 1. After `set(x, y, cell)` the cell at `(x, y)` equals the last written
//!    cell until the next write or a resolution change not covering it.
//! 2. Every mutation marks the touched cells dirty; `take_dirty()` drains
//!    them in row-major order.
//! 3. On a scrolling frame, a write past the last row shifts all rows up by
//!    one and clears the new bottom row before the write lands.

use std::cell::RefCell;
use std::rc::Rc;

use unicode_segmentation::UnicodeSegmentation;

use crate::cell::{Cell, Color};
use crate::framer::FramerId;

/// Shared handle to a frame. The screen component and the owning framer
/// both hold one; all access happens on the single host thread.
pub type FrameHandle = Rc<RefCell<Frame>>;

/// A width×height grid of cells.
#[derive(Debug)]
pub struct Frame {
    width: u16,
    height: u16,
    cells: Vec<Cell>,
    fg: Color,
    bg: Color,
    scrolling: bool,
    framer: Option<FramerId>,
    dirty: Vec<bool>,
    resized: bool,
}

impl Frame {
    /// Create a frame at the given resolution, all cells blank.
    #[must_use]
    pub fn new(width: u16, height: u16) -> Self {
        let width = width.max(1);
        let height = height.max(1);
        let size = width as usize * height as usize;
        Self {
            width,
            height,
            cells: vec![Cell::blank(); size],
            fg: Color::WHITE,
            bg: Color::BLACK,
            scrolling: false,
            framer: None,
            dirty: vec![false; size],
            resized: false,
        }
    }

    /// Create a shared handle around a fresh frame.
    #[must_use]
    pub fn shared(width: u16, height: u16) -> FrameHandle {
        Rc::new(RefCell::new(Self::new(width, height)))
    }

    #[must_use]
    pub const fn width(&self) -> u16 {
        self.width
    }

    #[must_use]
    pub const fn height(&self) -> u16 {
        self.height
    }

    #[must_use]
    pub const fn resolution(&self) -> (u16, u16) {
        (self.width, self.height)
    }

    #[must_use]
    pub const fn scrolling(&self) -> bool {
        self.scrolling
    }

    pub fn set_scrolling(&mut self, enable: bool) {
        self.scrolling = enable;
    }

    #[must_use]
    pub const fn foreground(&self) -> Color {
        self.fg
    }

    pub fn set_foreground(&mut self, color: Color) {
        self.fg = color;
    }

    #[must_use]
    pub const fn background(&self) -> Color {
        self.bg
    }

    pub fn set_background(&mut self, color: Color) {
        self.bg = color;
    }

    // ── Framer back-link ─────────────────────────────────────────────────

    /// Identity of the owning framer, if attached. Never ownership.
    #[must_use]
    pub const fn framer(&self) -> Option<FramerId> {
        self.framer
    }

    pub fn attach(&mut self, framer: FramerId) {
        self.framer = Some(framer);
        // A newly attached frame is entirely unknown to its backend.
        self.mark_all_dirty();
    }

    pub fn detach(&mut self) {
        self.framer = None;
    }

    // ── Cell access ──────────────────────────────────────────────────────

    fn index(&self, x: i64, y: i64) -> Option<usize> {
        if x >= 1 && y >= 1 && x <= i64::from(self.width) && y <= i64::from(self.height) {
            Some((y as usize - 1) * self.width as usize + (x as usize - 1))
        } else {
            None
        }
    }

    /// The cell at `(x, y)`, or the blank sentinel outside the resolution.
    #[must_use]
    pub fn get(&self, x: i64, y: i64) -> Cell {
        self.index(x, y)
            .map_or_else(Cell::blank, |i| self.cells[i].clone())
    }

    /// Write one cell. Out-of-range writes clip unless the frame scrolls
    /// and the write lies past the last row.
    pub fn set(&mut self, x: i64, mut y: i64, cell: Cell) {
        y = self.scroll_into_range(y);
        if let Some(i) = self.index(x, y) {
            self.cells[i] = cell;
            self.dirty[i] = true;
        }
    }

    /// Write one cell per grapheme of `text` in the current colors.
    ///
    /// Writes past the right edge clip, unless the frame scrolls and the
    /// write is on the last row: the frame scrolls up one row and the
    /// remainder continues at column 1 of the new bottom row.
    pub fn set_text(&mut self, x: i64, y: i64, text: &str) {
        let (fg, bg) = (self.fg, self.bg);
        let cells: Vec<Cell> = text
            .graphemes(true)
            .map(|g| Cell::new(g, fg, bg))
            .collect();
        self.set_cells(x, y, &cells);
    }

    /// Write a run of scanned cells starting at `(x, y)`.
    pub fn set_cells(&mut self, x: i64, y: i64, cells: &[Cell]) {
        let mut x = x;
        let mut y = self.scroll_into_range(y);
        for cell in cells {
            if x > i64::from(self.width) {
                if self.scrolling && y == i64::from(self.height) {
                    self.scroll_up();
                    x = 1;
                } else {
                    break;
                }
            }
            self.set(x, y, cell.clone());
            x += 1;
            // set() cannot scroll here: y is already in range.
            debug_assert!(y <= i64::from(self.height));
            y = y.min(i64::from(self.height));
        }
    }

    /// Read `width` cells starting at `(x, y)`; positions outside the frame
    /// come back as the blank sentinel.
    #[must_use]
    pub fn scan(&self, x: i64, y: i64, width: usize) -> Vec<Cell> {
        (0..width as i64).map(|dx| self.get(x + dx, y)).collect()
    }

    fn scroll_into_range(&mut self, mut y: i64) -> i64 {
        if self.scrolling {
            while y > i64::from(self.height) {
                self.scroll_up();
                y -= 1;
            }
        }
        y
    }

    /// Shift every row up by one and clear the bottom row.
    pub fn scroll_up(&mut self) {
        let w = self.width as usize;
        self.cells.rotate_left(w);
        let len = self.cells.len();
        for cell in &mut self.cells[len - w..] {
            *cell = Cell::blank();
        }
        self.mark_all_dirty();
    }

    // ── Resolution ───────────────────────────────────────────────────────

    /// Reallocate the grid, preserving overlapping cells.
    ///
    /// Returns false (and changes nothing) when the resolution is already
    /// current. When `quiet` is false the change is reported to the framer
    /// on its next update via [`take_resized`](Self::take_resized).
    pub fn set_resolution(&mut self, width: u16, height: u16, quiet: bool) -> bool {
        let width = width.max(1);
        let height = height.max(1);
        if (width, height) == (self.width, self.height) {
            return false;
        }
        let size = width as usize * height as usize;
        let mut cells = vec![Cell::blank(); size];
        for y in 0..height.min(self.height) {
            for x in 0..width.min(self.width) {
                let src = y as usize * self.width as usize + x as usize;
                let dst = y as usize * width as usize + x as usize;
                cells[dst] = self.cells[src].clone();
            }
        }
        self.width = width;
        self.height = height;
        self.cells = cells;
        self.dirty = vec![true; size];
        if !quiet {
            self.resized = true;
        }
        true
    }

    // ── Invalidation ─────────────────────────────────────────────────────

    /// Mark a single cell dirty without changing it.
    pub fn invalidate(&mut self, x: i64, y: i64) {
        if let Some(i) = self.index(x, y) {
            self.dirty[i] = true;
        }
    }

    fn mark_all_dirty(&mut self) {
        self.dirty.fill(true);
    }

    #[must_use]
    pub fn has_dirty(&self) -> bool {
        self.dirty.iter().any(|d| *d)
    }

    /// Drain the dirty set in row-major order.
    pub fn take_dirty(&mut self) -> Vec<(u16, u16)> {
        let mut out = Vec::new();
        for y in 0..self.height {
            for x in 0..self.width {
                let i = y as usize * self.width as usize + x as usize;
                if self.dirty[i] {
                    self.dirty[i] = false;
                    out.push((x + 1, y + 1));
                }
            }
        }
        out
    }

    /// Whether a non-quiet resolution change happened since the last call.
    pub fn take_resized(&mut self) -> bool {
        std::mem::take(&mut self.resized)
    }
}
