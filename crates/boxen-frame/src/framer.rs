#![forbid(unsafe_code)]

//! The framer contract and the shared attach bookkeeping.
//!
//! A framer owns a z-ordered list of attached frames (later = on top),
//! receives their dirty cells on `update()`, and writes them to an output
//! device. The back-link invariant: every attached frame's `framer()` equals
//! the owning framer's id; detaching clears it.

use std::fmt;
use std::io;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::frame::FrameHandle;

/// Identity token for a framer. Frames store this, never the framer itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FramerId(u64);

impl FramerId {
    /// Allocate a process-unique id.
    #[must_use]
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Flush failure. IO errors are retried by the caller; three consecutive
/// failures escalate to a halt.
#[derive(Debug)]
pub enum FramerError {
    Io(io::Error),
}

impl fmt::Display for FramerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "framer flush failed: {err}"),
        }
    }
}

impl std::error::Error for FramerError {}

impl From<io::Error> for FramerError {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

/// A backend that owns frames and flushes them to an output device.
pub trait Framer {
    /// This framer's identity token.
    fn id(&self) -> FramerId;

    /// Acquire the backend (terminal raw mode, cursor state).
    fn open(&mut self) -> io::Result<()>;

    /// Release the backend. Idempotent.
    fn close(&mut self);

    /// Attach a frame at `index` in z-order (append when `None`).
    /// Re-attaching an already attached frame moves it.
    fn add(&mut self, frame: FrameHandle, index: Option<usize>) -> bool;

    /// Flush dirty cells. Idempotent when nothing was invalidated since the
    /// previous call: emits zero bytes.
    fn update(&mut self) -> Result<(), FramerError>;

    /// Backend resolution limits.
    fn max_resolution(&self) -> (u16, u16);

    /// Surface a beep effect. Backends without an audible device ignore it.
    fn bell(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Z-order list plus back-link maintenance, shared by framer
/// implementations.
pub struct AttachedFrames {
    id: FramerId,
    frames: Vec<FrameHandle>,
}

impl AttachedFrames {
    #[must_use]
    pub fn new(id: FramerId) -> Self {
        Self {
            id,
            frames: Vec::new(),
        }
    }

    #[must_use]
    pub const fn id(&self) -> FramerId {
        self.id
    }

    /// Insert into z-order, maintaining the back-link invariant.
    pub fn add(&mut self, frame: FrameHandle, index: Option<usize>) -> bool {
        self.frames.retain(|f| !Rc::ptr_eq(f, &frame));
        frame.borrow_mut().attach(self.id);
        let index = index.unwrap_or(self.frames.len()).min(self.frames.len());
        self.frames.insert(index, frame);
        true
    }

    /// Detach everything, clearing back-links.
    pub fn clear(&mut self) {
        for frame in self.frames.drain(..) {
            frame.borrow_mut().detach();
        }
    }

    /// Frames in z-order, bottom first.
    #[must_use]
    pub fn iter(&self) -> std::slice::Iter<'_, FrameHandle> {
        self.frames.iter()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.frames.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Frame;

    #[test]
    fn framer_ids_are_unique() {
        assert_ne!(FramerId::next(), FramerId::next());
    }

    #[test]
    fn add_sets_back_link() {
        let mut attached = AttachedFrames::new(FramerId::next());
        let frame = Frame::shared(4, 2);
        assert!(attached.add(frame.clone(), None));
        assert_eq!(frame.borrow().framer(), Some(attached.id()));
    }

    #[test]
    fn re_add_moves_in_z_order() {
        let mut attached = AttachedFrames::new(FramerId::next());
        let a = Frame::shared(2, 2);
        let b = Frame::shared(2, 2);
        attached.add(a.clone(), None);
        attached.add(b.clone(), None);
        attached.add(a.clone(), None);
        assert_eq!(attached.len(), 2);
        assert!(Rc::ptr_eq(attached.iter().last().unwrap(), &a));
    }

    #[test]
    fn add_at_index_inserts_below() {
        let mut attached = AttachedFrames::new(FramerId::next());
        let a = Frame::shared(2, 2);
        let b = Frame::shared(2, 2);
        attached.add(a, None);
        attached.add(b.clone(), Some(0));
        assert!(Rc::ptr_eq(attached.iter().next().unwrap(), &b));
    }

    #[test]
    fn clear_detaches() {
        let mut attached = AttachedFrames::new(FramerId::next());
        let frame = Frame::shared(2, 2);
        attached.add(frame.clone(), None);
        attached.clear();
        assert!(attached.is_empty());
        assert_eq!(frame.borrow().framer(), None);
    }
}
