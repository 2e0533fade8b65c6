#![forbid(unsafe_code)]

//! Terminal acquisition: raw mode, window size, resize notifications.

use std::fs::File;
use std::io;
use std::sync::mpsc;

use signal_hook::consts::signal::SIGWINCH;
use signal_hook::iterator::Signals;

/// RAII guard that saves the original termios and restores it on drop.
///
/// Panic-safe cleanup: even if the host panics mid-tick, dropping the guard
/// returns the terminal to its original state.
pub struct RawModeGuard {
    original_termios: nix::sys::termios::Termios,
    tty: File,
}

impl RawModeGuard {
    /// Enter raw mode on the controlling terminal.
    pub fn enter() -> io::Result<Self> {
        let tty = File::open("/dev/tty")?;
        let original_termios = nix::sys::termios::tcgetattr(&tty).map_err(io::Error::other)?;

        let mut raw = original_termios.clone();
        nix::sys::termios::cfmakeraw(&mut raw);
        nix::sys::termios::tcsetattr(&tty, nix::sys::termios::SetArg::TCSAFLUSH, &raw)
            .map_err(io::Error::other)?;

        Ok(Self {
            original_termios,
            tty,
        })
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        // Best-effort restore.
        let _ = nix::sys::termios::tcsetattr(
            &self.tty,
            nix::sys::termios::SetArg::TCSAFLUSH,
            &self.original_termios,
        );
    }
}

/// Current terminal size in cells, when a terminal is present.
#[must_use]
pub fn terminal_size() -> Option<(u16, u16)> {
    let tty = File::open("/dev/tty").ok()?;
    let ws = rustix::termios::tcgetwinsize(&tty).ok()?;
    if ws.ws_col > 0 && ws.ws_row > 0 {
        Some((ws.ws_col, ws.ws_row))
    } else {
        None
    }
}

/// Watches SIGWINCH on a dedicated thread and surfaces coalesced resize
/// notifications to the main loop.
///
/// The channel holds a single pending notification; storms coalesce since
/// the authoritative size is re-queried when the notification is consumed.
pub struct ResizeWatcher {
    handle: signal_hook::iterator::Handle,
    thread: Option<std::thread::JoinHandle<()>>,
    rx: mpsc::Receiver<()>,
}

impl ResizeWatcher {
    pub fn new() -> io::Result<Self> {
        let (tx, rx) = mpsc::sync_channel(1);
        let mut signals = Signals::new([SIGWINCH]).map_err(io::Error::other)?;
        let handle = signals.handle();
        let thread = std::thread::spawn(move || {
            for _ in signals.forever() {
                let _ = tx.try_send(());
            }
        });

        Ok(Self {
            handle,
            thread: Some(thread),
            rx,
        })
    }

    /// Whether a resize happened since the last poll.
    #[must_use]
    pub fn poll(&self) -> bool {
        let mut seen = false;
        while self.rx.try_recv().is_ok() {
            seen = true;
        }
        seen
    }
}

impl Drop for ResizeWatcher {
    fn drop(&mut self) {
        self.handle.close();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}
