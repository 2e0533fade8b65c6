#![forbid(unsafe_code)]

//! Pure escape-sequence generation.
//!
//! No state tracking here, just byte emission; the framer decides when a
//! sequence is actually needed.

use std::io::{self, Write};

use boxen_frame::Color;

/// SGR reset: `CSI 0 m`
pub const SGR_RESET: &[u8] = b"\x1b[0m";

pub const CURSOR_SHOW: &[u8] = b"\x1b[?25h";
pub const CURSOR_HIDE: &[u8] = b"\x1b[?25l";

pub const CLEAR_SCREEN: &[u8] = b"\x1b[2J";
pub const CURSOR_HOME: &[u8] = b"\x1b[H";

/// CUP (cursor position) from 1-based frame coordinates.
pub fn cup<W: Write>(w: &mut W, x: u16, y: u16) -> io::Result<()> {
    write!(w, "\x1b[{y};{x}H")
}

/// Foreground SGR: indexed for paletted colors, truecolor otherwise.
pub fn sgr_fg<W: Write>(w: &mut W, color: Color) -> io::Result<()> {
    if color.paletted {
        write!(w, "\x1b[38;5;{}m", color.rgb.min(255))
    } else {
        write!(w, "\x1b[38;2;{};{};{}m", color.red(), color.green(), color.blue())
    }
}

/// Background SGR: indexed for paletted colors, truecolor otherwise.
pub fn sgr_bg<W: Write>(w: &mut W, color: Color) -> io::Result<()> {
    if color.paletted {
        write!(w, "\x1b[48;5;{}m", color.rgb.min(255))
    } else {
        write!(w, "\x1b[48;2;{};{};{}m", color.red(), color.green(), color.blue())
    }
}
