#![forbid(unsafe_code)]

//! ANSI terminal backend for boxen frames.
//!
//! The [`AnsiFramer`] is the reference [`Framer`](boxen_frame::Framer)
//! instance: it drains dirty cells from its attached frames and writes the
//! minimal escape-sequence stream to a terminal.
//!
//! ## Escape Sequence Reference
//!
//! | Feature          | Sequence                                   |
//! |------------------|--------------------------------------------|
//! | Cursor position  | `CSI row ; col H`                          |
//! | Truecolor fg/bg  | `CSI 38;2;r;g;b m` / `CSI 48;2;r;g;b m`    |
//! | Paletted fg/bg   | `CSI 38;5;n m` / `CSI 48;5;n m`            |
//! | SGR reset        | `CSI 0 m`                                  |
//! | Cursor show/hide | `CSI ? 25 h` / `CSI ? 25 l`                |
//! | Clear screen     | `CSI 2 J` + `CSI H`                        |

pub mod ansi;
pub mod framer;
#[cfg(unix)]
pub mod input;
#[cfg(unix)]
pub mod raw;

pub use framer::AnsiFramer;
#[cfg(unix)]
pub use input::{Key, KeyInput};
#[cfg(unix)]
pub use raw::{terminal_size, RawModeGuard, ResizeWatcher};
