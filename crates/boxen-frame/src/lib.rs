#![forbid(unsafe_code)]

//! In-memory cell grids and the backend flush protocol.
//!
//! A [`Frame`] is passive storage: a width×height grid of [`Cell`]s with
//! current foreground/background colors and a scrolling flag. A [`Framer`]
//! owns a z-ordered set of attached frames and flushes their dirty cells to
//! an output device; `boxen-tty` provides the ANSI terminal instance.
//!
//! # Invalidation protocol
//!
//! Writes mark cells dirty inside the frame itself. On `update()` the framer
//! drains each attached frame's dirty set and emits only those cells,
//! coalescing runs of identical attributes. Two consecutive updates with no
//! intervening write produce no output at all.

pub mod cell;
pub mod frame;
pub mod framer;

pub use cell::{Cell, Color};
pub use frame::{Frame, FrameHandle};
pub use framer::{AttachedFrames, Framer, FramerError, FramerId};
