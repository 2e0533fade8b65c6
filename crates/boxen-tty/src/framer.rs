#![forbid(unsafe_code)]

//! The ANSI framer: state-tracked flush of dirty cells.
//!
//! # Design
//!
//! - **State tracking**: the emitter remembers the cursor position and the
//!   current fg/bg, and skips any sequence that would not change terminal
//!   state. Within a run of identical attributes at most one color change
//!   and one cursor move are emitted.
//! - **Single write**: output is assembled in a buffer and written once per
//!   update. An update with no dirty cells writes zero bytes.
//! - **Failure**: a failed write re-invalidates every attached frame so the
//!   next update redraws what was lost; the caller decides when repeated
//!   failures escalate.

use std::io::{self, Write};

use boxen_frame::{AttachedFrames, Cell, Color, FrameHandle, Framer, FramerError, FramerId};
use unicode_width::UnicodeWidthStr;

use crate::ansi;

/// Framer writing ANSI escape sequences to a terminal (or any writer).
pub struct AnsiFramer<W: Write> {
    attached: AttachedFrames,
    out: W,
    opened: bool,
    live: bool,
    #[cfg(unix)]
    raw: Option<crate::raw::RawModeGuard>,
    fallback_max: (u16, u16),
    cursor: Option<(u16, u16)>,
    fg: Option<Color>,
    bg: Option<Color>,
}

impl AnsiFramer<io::Stdout> {
    /// A live framer over standard output. `open()` enters raw mode.
    #[cfg(unix)]
    #[must_use]
    pub fn stdout() -> Self {
        Self {
            attached: AttachedFrames::new(FramerId::next()),
            out: io::stdout(),
            opened: false,
            live: true,
            raw: None,
            fallback_max: (80, 25),
            cursor: None,
            fg: None,
            bg: None,
        }
    }
}

impl<W: Write> AnsiFramer<W> {
    /// A headless framer with a fixed maximum resolution, writing to any
    /// sink. Used by tests and by `--headless` runs.
    #[must_use]
    pub fn headless(max: (u16, u16), out: W) -> Self {
        Self {
            attached: AttachedFrames::new(FramerId::next()),
            out,
            opened: false,
            live: false,
            #[cfg(unix)]
            raw: None,
            fallback_max: max,
            cursor: None,
            fg: None,
            bg: None,
        }
    }

    fn emit_frame(&mut self, buf: &mut Vec<u8>, handle: &FrameHandle) -> io::Result<()> {
        let mut frame = handle.borrow_mut();
        if frame.take_resized() {
            buf.extend_from_slice(ansi::CLEAR_SCREEN);
            buf.extend_from_slice(ansi::CURSOR_HOME);
            self.cursor = Some((1, 1));
        }

        let dirty = frame.take_dirty();
        for (x, y) in dirty {
            let cell = frame.get(i64::from(x), i64::from(y));
            self.emit_cell(buf, x, y, &cell)?;
        }
        Ok(())
    }

    fn emit_cell(&mut self, buf: &mut Vec<u8>, x: u16, y: u16, cell: &Cell) -> io::Result<()> {
        if self.cursor != Some((x, y)) {
            ansi::cup(buf, x, y)?;
        }
        if self.fg != Some(cell.fg) {
            ansi::sgr_fg(buf, cell.fg)?;
            self.fg = Some(cell.fg);
        }
        if self.bg != Some(cell.bg) {
            ansi::sgr_bg(buf, cell.bg)?;
            self.bg = Some(cell.bg);
        }
        buf.extend_from_slice(cell.glyph.as_bytes());

        let width = cell.glyph.as_str().width() as u16;
        self.cursor = if width == 0 {
            None
        } else {
            Some((x + width, y))
        };
        Ok(())
    }
}

impl<W: Write> Framer for AnsiFramer<W> {
    fn id(&self) -> FramerId {
        self.attached.id()
    }

    fn open(&mut self) -> io::Result<()> {
        if self.opened {
            return Ok(());
        }
        if self.live {
            #[cfg(unix)]
            {
                self.raw = Some(crate::raw::RawModeGuard::enter()?);
            }
            self.out.write_all(ansi::CURSOR_HIDE)?;
            self.out.write_all(ansi::CLEAR_SCREEN)?;
            self.out.write_all(ansi::CURSOR_HOME)?;
            self.out.flush()?;
        }
        self.opened = true;
        Ok(())
    }

    fn close(&mut self) {
        if !self.opened {
            return;
        }
        if self.live {
            let _ = self.out.write_all(ansi::SGR_RESET);
            let _ = self.out.write_all(ansi::CURSOR_SHOW);
            let _ = self.out.flush();
        }
        #[cfg(unix)]
        {
            self.raw = None;
        }
        self.attached.clear();
        self.opened = false;
    }

    fn add(&mut self, frame: FrameHandle, index: Option<usize>) -> bool {
        self.attached.add(frame, index)
    }

    fn update(&mut self) -> Result<(), FramerError> {
        let frames: Vec<FrameHandle> = self.attached.iter().cloned().collect();
        let mut buf = Vec::new();
        for handle in &frames {
            self.emit_frame(&mut buf, handle)?;
        }
        if buf.is_empty() {
            return Ok(());
        }

        let wrote = self
            .out
            .write_all(&buf)
            .and_then(|()| self.out.flush());
        if let Err(err) = wrote {
            // What was drained is lost; force a full redraw next time.
            for handle in &frames {
                let mut frame = handle.borrow_mut();
                let (w, h) = frame.resolution();
                for y in 1..=i64::from(h) {
                    for x in 1..=i64::from(w) {
                        frame.invalidate(x, y);
                    }
                }
            }
            self.cursor = None;
            self.fg = None;
            self.bg = None;
            return Err(FramerError::Io(err));
        }
        Ok(())
    }

    fn max_resolution(&self) -> (u16, u16) {
        #[cfg(unix)]
        if self.live {
            if let Some(size) = crate::raw::terminal_size() {
                return size;
            }
        }
        self.fallback_max
    }

    /// Ring the terminal bell. A no-op while closed.
    fn bell(&mut self) -> io::Result<()> {
        if self.opened {
            self.out.write_all(b"\x07")?;
            self.out.flush()?;
        }
        Ok(())
    }
}

impl<W: Write> Drop for AnsiFramer<W> {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use boxen_frame::Frame;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Shared byte sink so the test can inspect what the framer wrote.
    #[derive(Clone, Default)]
    struct Sink(Rc<RefCell<Vec<u8>>>);

    impl Write for Sink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Sink {
        fn take(&self) -> Vec<u8> {
            std::mem::take(&mut self.0.borrow_mut())
        }
    }

    fn fixture() -> (AnsiFramer<Sink>, FrameHandle, Sink) {
        let sink = Sink::default();
        let mut framer = AnsiFramer::headless((80, 25), sink.clone());
        let frame = Frame::shared(10, 3);
        frame.borrow_mut().take_dirty();
        framer.add(frame.clone(), None);
        // Attach marks everything dirty; swallow the initial paint.
        framer.update().unwrap();
        sink.take();
        (framer, frame, sink)
    }

    #[test]
    fn second_update_emits_zero_bytes() {
        let (mut framer, frame, sink) = fixture();
        frame.borrow_mut().set_text(1, 1, "hi");
        framer.update().unwrap();
        assert!(!sink.take().is_empty());
        framer.update().unwrap();
        assert!(sink.take().is_empty());
    }

    #[test]
    fn run_of_identical_attributes_emits_one_color_and_one_move() {
        let (mut framer, frame, sink) = fixture();
        frame.borrow_mut().set_text(2, 2, "Hello");
        framer.update().unwrap();
        let text = String::from_utf8(sink.take()).unwrap();
        // One cursor move for the whole run, and the colors are unchanged
        // from the initial paint, so no SGR at all.
        assert_eq!(text.matches("\u{1b}[2;2H").count(), 1);
        assert_eq!(text.matches('\u{1b}').count(), 1, "CUP only: {text:?}");
        assert!(text.contains("Hello"));
    }

    #[test]
    fn color_change_mid_run_emits_once() {
        let (mut framer, frame, sink) = fixture();
        {
            let mut f = frame.borrow_mut();
            f.set_text(1, 1, "ab");
            f.set_foreground(Color::rgb(0xFF_00_00));
            f.set_text(3, 1, "cd");
        }
        framer.update().unwrap();
        let text = String::from_utf8(sink.take()).unwrap();
        assert_eq!(text.matches("38;2;255;0;0").count(), 1);
        assert!(text.contains("abcd") || text.contains("ab\u{1b}[38;2;255;0;0mcd"));
    }

    #[test]
    fn paletted_cells_use_indexed_sgr() {
        let (mut framer, frame, sink) = fixture();
        {
            let mut f = frame.borrow_mut();
            f.set_foreground(Color::paletted(3));
            f.set_text(1, 1, "x");
        }
        framer.update().unwrap();
        let text = String::from_utf8(sink.take()).unwrap();
        assert!(text.contains("\u{1b}[38;5;3m"), "{text:?}");
    }

    #[test]
    fn resize_clears_screen_and_repaints() {
        let (mut framer, frame, sink) = fixture();
        frame.borrow_mut().set_resolution(4, 2, false);
        framer.update().unwrap();
        let text = String::from_utf8(sink.take()).unwrap();
        assert!(text.starts_with("\u{1b}[2J\u{1b}[H"));
    }

    #[test]
    fn headless_max_resolution_is_fixed() {
        let framer = AnsiFramer::headless((42, 17), Vec::new());
        assert_eq!(framer.max_resolution(), (42, 17));
    }

    #[test]
    fn close_is_idempotent_and_detaches() {
        let (mut framer, frame, _sink) = fixture();
        framer.open().unwrap();
        framer.close();
        framer.close();
        assert_eq!(frame.borrow().framer(), None);
    }
}
